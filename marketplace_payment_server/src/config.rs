use std::{env, time::Duration as StdDuration};

use chrono::Duration;
use log::*;
use marketplace_payment_engine::DEFAULT_LOCKDOWN_HOURS;
use mpg_common::Secret;

const DEFAULT_MPG_HOST: &str = "127.0.0.1";
const DEFAULT_MPG_PORT: u16 = 8360;
/// The outbound verification budget and the bounds it is clamped to. Provider round-trips that take longer than
/// this are treated as authentication failures, never silently accepted.
const DEFAULT_VERIFY_TIMEOUT_SECS: u64 = 20;
const MIN_VERIFY_TIMEOUT_SECS: u64 = 10;
const MAX_VERIFY_TIMEOUT_SECS: u64 = 30;
const DEFAULT_PAYPAL_VALIDATION_URL: &str = "https://www.paypal.com/cgi-bin/webscr";

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// If true, the X-Forwarded-For header will be used to determine the client's IP address, rather than the
    /// connection's remote address.
    pub use_x_forwarded_for: bool,
    /// If true, the Forwarded header will be used to determine the client's IP address, rather than the
    /// connection's remote address.
    pub use_forwarded: bool,
    /// Transactions older than this window reject financial updates from notifications.
    pub lockdown_window: Duration,
    /// Wall-clock budget for one outbound verification round-trip.
    pub verify_timeout: StdDuration,
    pub paypal: PaypalConfig,
    pub bango: BangoConfig,
    pub boku: BokuConfig,
    pub braintree: BraintreeConfig,
}

#[derive(Clone, Debug)]
pub struct PaypalConfig {
    /// The endpoint IPN bodies are replayed to for revalidation.
    pub validation_url: String,
}

#[derive(Clone, Debug)]
pub struct BangoConfig {
    /// Key for the HMAC signature on redirect notifications.
    pub signing_key: Secret<String>,
    /// The token-check service endpoint. Leave unset only with token checks disabled.
    pub token_check_url: String,
    pub token_checks: bool,
    /// Basic Auth credentials Bango uses on the server-to-server event endpoint.
    pub event_username: String,
    pub event_password: Secret<String>,
    pub event_auth_checks: bool,
}

#[derive(Clone, Debug)]
pub struct BokuConfig {
    /// The merchant secret the notification digest is computed with.
    pub secret: Secret<String>,
}

#[derive(Clone, Debug)]
pub struct BraintreeConfig {
    pub public_key: String,
    pub private_key: Secret<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_MPG_HOST.to_string(),
            port: DEFAULT_MPG_PORT,
            database_url: String::default(),
            use_x_forwarded_for: false,
            use_forwarded: false,
            lockdown_window: Duration::hours(DEFAULT_LOCKDOWN_HOURS),
            verify_timeout: StdDuration::from_secs(DEFAULT_VERIFY_TIMEOUT_SECS),
            paypal: PaypalConfig::default(),
            bango: BangoConfig::default(),
            boku: BokuConfig::default(),
            braintree: BraintreeConfig::default(),
        }
    }
}

impl Default for PaypalConfig {
    fn default() -> Self {
        Self { validation_url: DEFAULT_PAYPAL_VALIDATION_URL.to_string() }
    }
}

impl Default for BangoConfig {
    fn default() -> Self {
        Self {
            signing_key: random_session_secret("MPG_BANGO_SIGNING_KEY"),
            token_check_url: String::default(),
            token_checks: true,
            event_username: String::default(),
            event_password: random_session_secret("MPG_BANGO_EVENT_PASSWORD"),
            event_auth_checks: true,
        }
    }
}

impl Default for BokuConfig {
    fn default() -> Self {
        Self { secret: random_session_secret("MPG_BOKU_SECRET") }
    }
}

impl Default for BraintreeConfig {
    fn default() -> Self {
        Self { public_key: String::default(), private_key: random_session_secret("MPG_BRAINTREE_PRIVATE_KEY") }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("MPG_HOST").ok().unwrap_or_else(|| DEFAULT_MPG_HOST.into());
        let port = env::var("MPG_PORT")
            .map(|s| {
                s.parse::<u16>().unwrap_or_else(|e| {
                    error!(
                        "🪛️ {s} is not a valid port for MPG_PORT. {e} Using the default, {DEFAULT_MPG_PORT}, instead."
                    );
                    DEFAULT_MPG_PORT
                })
            })
            .ok()
            .unwrap_or(DEFAULT_MPG_PORT);
        let database_url = env::var("MPG_DATABASE_URL").ok().unwrap_or_else(|| {
            error!("🪛️ MPG_DATABASE_URL is not set. Please set it to the URL for the payments database.");
            String::default()
        });
        let use_x_forwarded_for =
            env::var("MPG_USE_X_FORWARDED_FOR").map(|s| &s == "1" || &s == "true").unwrap_or(false);
        let use_forwarded = env::var("MPG_USE_FORWARDED").map(|s| &s == "1" || &s == "true").unwrap_or(false);
        let lockdown_window = configure_lockdown_window();
        let verify_timeout = configure_verify_timeout();
        Self {
            host,
            port,
            database_url,
            use_x_forwarded_for,
            use_forwarded,
            lockdown_window,
            verify_timeout,
            paypal: PaypalConfig::from_env_or_default(),
            bango: BangoConfig::from_env_or_default(),
            boku: BokuConfig::from_env_or_default(),
            braintree: BraintreeConfig::from_env_or_default(),
        }
    }
}

impl PaypalConfig {
    pub fn from_env_or_default() -> Self {
        let validation_url = env::var("MPG_PAYPAL_VALIDATION_URL").ok().unwrap_or_else(|| {
            info!("🪛️ MPG_PAYPAL_VALIDATION_URL is not set. Using {DEFAULT_PAYPAL_VALIDATION_URL}.");
            DEFAULT_PAYPAL_VALIDATION_URL.into()
        });
        Self { validation_url }
    }
}

impl BangoConfig {
    pub fn from_env_or_default() -> Self {
        let signing_key = secret_from_env("MPG_BANGO_SIGNING_KEY");
        let token_checks = env::var("MPG_BANGO_TOKEN_CHECKS").map(|s| &s != "0" && &s != "false").unwrap_or(true);
        let token_check_url = env::var("MPG_BANGO_TOKEN_CHECK_URL").ok().unwrap_or_else(|| {
            if token_checks {
                error!(
                    "🪛️ MPG_BANGO_TOKEN_CHECK_URL is not set but token checks are enabled. Notifications that carry \
                     a token will be rejected. Set the URL, or set MPG_BANGO_TOKEN_CHECKS=0."
                );
            }
            String::default()
        });
        let event_username = env::var("MPG_BANGO_EVENT_USERNAME").ok().unwrap_or_else(|| {
            error!("🪛️ MPG_BANGO_EVENT_USERNAME is not set. The Bango event endpoint will refuse all requests.");
            String::default()
        });
        let event_password = secret_from_env("MPG_BANGO_EVENT_PASSWORD");
        let event_auth_checks =
            env::var("MPG_BANGO_EVENT_AUTH_CHECKS").map(|s| &s != "0" && &s != "false").unwrap_or(true);
        if !event_auth_checks {
            warn!("🚨️ Basic Auth on the Bango event endpoint is DISABLED. Do not run production like this.");
        }
        Self { signing_key, token_check_url, token_checks, event_username, event_password, event_auth_checks }
    }
}

impl BokuConfig {
    pub fn from_env_or_default() -> Self {
        Self { secret: secret_from_env("MPG_BOKU_SECRET") }
    }
}

impl BraintreeConfig {
    pub fn from_env_or_default() -> Self {
        let public_key = env::var("MPG_BRAINTREE_PUBLIC_KEY").ok().unwrap_or_else(|| {
            error!("🪛️ MPG_BRAINTREE_PUBLIC_KEY is not set. Braintree webhooks will fail verification.");
            String::default()
        });
        Self { public_key, private_key: secret_from_env("MPG_BRAINTREE_PRIVATE_KEY") }
    }
}

fn configure_lockdown_window() -> Duration {
    env::var("MPG_LOCKDOWN_HOURS")
        .map_err(|_| {
            info!("🪛️ MPG_LOCKDOWN_HOURS is not set. Using the default value of {DEFAULT_LOCKDOWN_HOURS} hrs.")
        })
        .and_then(|s| {
            s.parse::<i64>()
                .map(Duration::hours)
                .map_err(|e| warn!("🪛️ Invalid configuration value for MPG_LOCKDOWN_HOURS. {e}"))
        })
        .ok()
        .unwrap_or(Duration::hours(DEFAULT_LOCKDOWN_HOURS))
}

fn configure_verify_timeout() -> StdDuration {
    let secs = env::var("MPG_VERIFY_TIMEOUT")
        .map_err(|_| {
            info!("🪛️ MPG_VERIFY_TIMEOUT is not set. Using the default value of {DEFAULT_VERIFY_TIMEOUT_SECS} s.")
        })
        .and_then(|s| {
            s.parse::<u64>().map_err(|e| warn!("🪛️ Invalid configuration value for MPG_VERIFY_TIMEOUT. {e}"))
        })
        .ok()
        .unwrap_or(DEFAULT_VERIFY_TIMEOUT_SECS);
    let clamped = secs.clamp(MIN_VERIFY_TIMEOUT_SECS, MAX_VERIFY_TIMEOUT_SECS);
    if clamped != secs {
        warn!(
            "🪛️ MPG_VERIFY_TIMEOUT={secs} is outside the allowed range of {MIN_VERIFY_TIMEOUT_SECS} to \
             {MAX_VERIFY_TIMEOUT_SECS} s. Using {clamped} s."
        );
    }
    StdDuration::from_secs(clamped)
}

fn secret_from_env(name: &str) -> Secret<String> {
    match env::var(name) {
        Ok(s) => Secret::new(s),
        Err(_) => random_session_secret(name),
    }
}

/// A random value standing in for an unset secret. Nothing signed by a real provider will verify against it, which
/// is the point: the server runs, and every notification is rejected loudly instead of accepted blindly.
fn random_session_secret(name: &str) -> Secret<String> {
    warn!("🚨️🚨️🚨️ {name} has not been set. I'm using a random value for this session. 🚨️🚨️🚨️");
    let bytes: [u8; 32] = rand::random();
    Secret::new(hex::encode(bytes))
}

//-------------------------------------------------  ServerOptions  ----------------------------------------------------

/// A subset of the server configuration that route handlers need. Generally we try to keep this as small as
/// possible, and exclude secrets to avoid passing sensitive information around the system.
#[derive(Clone, Copy, Debug, Default)]
pub struct ServerOptions {
    pub use_x_forwarded_for: bool,
    pub use_forwarded: bool,
}

impl ServerOptions {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self { use_x_forwarded_for: config.use_x_forwarded_for, use_forwarded: config.use_forwarded }
    }
}
