use std::time::Duration;

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use log::info;
use marketplace_payment_engine::{
    providers::{BangoProcessor, BokuProcessor, BraintreeProcessor, HandlerRegistry, PaypalProcessor},
    traits::TransactionStore,
    SqliteDatabase,
};

use crate::{
    config::{ServerConfig, ServerOptions},
    errors::ServerError,
    integrations::{IpnRoundTripper, KeypairDecoder, TokenCheckClient},
    middleware::BasicAuthMiddlewareFactory,
    routes::{
        health,
        BangoEventRoute,
        BangoRedirectRoute,
        BokuEventRoute,
        BraintreeChallengeRoute,
        BraintreeWebhookRoute,
        PaypalIpnRoute,
    },
};

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, 25)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    info!("🗃️ Transaction store is at {}", db.url());
    db.run_migrations().await.map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let srv = create_server_instance(config, db)?;
    srv.await.map_err(|e| ServerError::Unspecified(e.to_string()))
}

/// Assembles the HTTP server instance.
///
/// The outbound verification clients and the webhook handler table are built once, up front, so that a broken
/// configuration fails here instead of on the first notification. The per-provider processors are cheap and are
/// built per worker from clones.
pub fn create_server_instance(config: ServerConfig, db: SqliteDatabase) -> Result<Server, ServerError> {
    let registry = HandlerRegistry::bootstrap().map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let kinds = registry.kinds().collect::<Vec<&str>>().join(", ");
    info!("🚀️ Braintree webhook handlers registered: {kinds}");
    let ipn_validator = IpnRoundTripper::new(&config.paypal, config.verify_timeout)?;
    let token_checker = TokenCheckClient::new(&config.bango, config.verify_timeout)?;
    let decoder = KeypairDecoder::new(&config.braintree);
    let options = ServerOptions::from_config(&config);
    let srv = HttpServer::new(move || {
        let paypal_api =
            PaypalProcessor::new(db.clone(), ipn_validator.clone()).with_lockdown_window(config.lockdown_window);
        let bango_api = BangoProcessor::new(db.clone(), config.bango.signing_key.clone(), token_checker.clone())
            .with_token_checks(config.bango.token_checks)
            .with_lockdown_window(config.lockdown_window);
        let boku_api =
            BokuProcessor::new(db.clone(), config.boku.secret.clone()).with_lockdown_window(config.lockdown_window);
        let braintree_api = BraintreeProcessor::new(db.clone(), decoder.clone(), registry.clone())
            .with_lockdown_window(config.lockdown_window);
        let app = App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("mpg::access_log"))
            .app_data(web::Data::new(paypal_api))
            .app_data(web::Data::new(bango_api))
            .app_data(web::Data::new(boku_api))
            .app_data(web::Data::new(braintree_api))
            .app_data(web::Data::new(options));
        // Bango's server-to-server feed authenticates with transport credentials. Every other endpoint's
        // notification carries its own proof of authenticity in the payload.
        let bango_events = web::scope("/event/bango")
            .wrap(BasicAuthMiddlewareFactory::new(
                &config.bango.event_username,
                config.bango.event_password.clone(),
                config.bango.event_auth_checks,
            ))
            .service(BangoEventRoute::<SqliteDatabase, TokenCheckClient>::new());
        app.service(health)
            .service(PaypalIpnRoute::<SqliteDatabase, IpnRoundTripper>::new())
            .service(BangoRedirectRoute::<SqliteDatabase, TokenCheckClient>::new())
            .service(bango_events)
            .service(BokuEventRoute::<SqliteDatabase>::new())
            .service(BraintreeWebhookRoute::<SqliteDatabase, KeypairDecoder>::new())
            .service(BraintreeChallengeRoute::<SqliteDatabase, KeypairDecoder>::new())
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((config.host.as_str(), config.port))?
    .run();
    Ok(srv)
}
