//! Request handler definitions
//!
//! Define each route and its handler here.
//! Handlers that are more than a line or two MUST go into a separate module. Keep this module neat and tidy 🙏
//!
//! A note about response codes:
//! A `2xx` answer tells the provider the notification has been dealt with and redelivery can stop, so it is the
//! answer for everything we handled, including notifications we deliberately ignored. Verification failures,
//! malformed payloads and updates the ledger refused map to error statuses through
//! [`ServerError`](crate::errors::ServerError), and the provider will retry those later.
//!
//! A note about performance:
//! Since each worker thread processes its requests sequentially, handlers which block the current thread will cause
//! the current worker to stop processing new requests. Any long, non-cpu-bound operation (I/O, the verification
//! round-trips, database work) must be expressed as futures or asynchronous functions so that worker threads keep
//! serving other requests while the operation is in flight.

use actix_web::{get, http::header::ContentType, web, HttpRequest, HttpResponse, Responder};
use log::*;
use marketplace_payment_engine::{
    db_types::PaymentProvider,
    errors::ProcessError,
    notification::NotificationContext,
    providers::{BangoProcessor, BokuProcessor, BraintreeProcessor, PaypalProcessor, ProcessOutcome},
    traits::{IpnValidator, SubscriptionStore, TokenChecker, TransactionStore, WebhookDecoder},
};

use crate::{
    config::ServerOptions,
    data_objects::{BraintreeChallengeQuery, BraintreeWebhookForm, JsonResponse},
    errors::ServerError,
    helpers::notification_context,
};

// Web-actix cannot handle generics in handlers, so it's implemented manually using the `route!` macro
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal impl $($param:ident: $($bound:ty),+);+) => {
        paste::paste! { pub struct [<$name:camel Route>]<$($param,)+>($(core::marker::PhantomData<fn() -> $param>,)+);}
        paste::paste! { impl<$($param,)+> [<$name:camel Route>]<$($param,)+> {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self($(core::marker::PhantomData::<fn() -> $param>,)+)
            }
        }}
        paste::paste! { impl<$($param,)+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$($param,)+>
        where
            $($param: $($bound +)+ 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::<$($param,)+>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//----------------------------------------------   PayPal  ----------------------------------------------------
route!(paypal_ipn => Post "/ipn/paypal" impl B: TransactionStore; V: IpnValidator);
/// Route handler for PayPal Instant Payment Notifications.
///
/// The body is taken as raw bytes. Verification replays it to PayPal byte-for-byte, so decoding it into a form
/// struct first would destroy the ordering and escapes the round-trip depends on.
pub async fn paypal_ipn<B, V>(
    req: HttpRequest,
    body: web::Bytes,
    api: web::Data<PaypalProcessor<B, V>>,
    options: web::Data<ServerOptions>,
) -> Result<HttpResponse, ServerError>
where
    B: TransactionStore,
    V: IpnValidator,
{
    let ctx = notification_context(&req, PaymentProvider::Paypal, &options);
    debug!("💻️ [{ctx}] IPN delivery of {} bytes", body.len());
    let outcome = api.process(&ctx, &body).await?;
    Ok(acknowledge(&ctx, &outcome))
}

//----------------------------------------------   Bango   ----------------------------------------------------
route!(bango_redirect => Get "/notification/bango" impl B: TransactionStore; T: TokenChecker);
/// Route handler for the browser redirect that completes a Bango checkout.
///
/// The query string is handed over un-parsed. The engine owns the decoding because the signature covers the raw
/// field values.
pub async fn bango_redirect<B, T>(
    req: HttpRequest,
    api: web::Data<BangoProcessor<B, T>>,
    options: web::Data<ServerOptions>,
) -> Result<HttpResponse, ServerError>
where
    B: TransactionStore,
    T: TokenChecker,
{
    let ctx = notification_context(&req, PaymentProvider::Bango, &options);
    debug!("💻️ [{ctx}] redirect notification received");
    let outcome = api.process_redirect(&ctx, req.query_string()).await?;
    Ok(acknowledge(&ctx, &outcome))
}

route!(bango_event => Post "" impl B: TransactionStore; T: TokenChecker);
/// Route handler for Bango's server-to-server event feed.
///
/// Registered with an empty path: [`crate::server`] mounts it inside a `/event/bango` scope wrapped with the
/// Basic Auth middleware, so the credential check runs before the body is ever read.
pub async fn bango_event<B, T>(
    req: HttpRequest,
    body: web::Bytes,
    api: web::Data<BangoProcessor<B, T>>,
    options: web::Data<ServerOptions>,
) -> Result<HttpResponse, ServerError>
where
    B: TransactionStore,
    T: TokenChecker,
{
    let ctx = notification_context(&req, PaymentProvider::Bango, &options);
    debug!("💻️ [{ctx}] event delivery of {} bytes", body.len());
    let outcome = api.process_event(&ctx, &body).await?;
    Ok(acknowledge(&ctx, &outcome))
}

//----------------------------------------------   Boku    ----------------------------------------------------
route!(boku_event => Post "/event/boku" impl B: TransactionStore);
/// Route handler for Boku billing result notifications.
pub async fn boku_event<B>(
    req: HttpRequest,
    body: web::Bytes,
    api: web::Data<BokuProcessor<B>>,
    options: web::Data<ServerOptions>,
) -> Result<HttpResponse, ServerError>
where
    B: TransactionStore,
{
    let ctx = notification_context(&req, PaymentProvider::Boku, &options);
    debug!("💻️ [{ctx}] event delivery of {} bytes", body.len());
    let outcome = api.process(&ctx, &body).await?;
    Ok(acknowledge(&ctx, &outcome))
}

//--------------------------------------------   Braintree  ---------------------------------------------------
route!(braintree_webhook => Post "/webhook/braintree" impl B: TransactionStore, SubscriptionStore; D: WebhookDecoder);
/// Route handler for Braintree webhooks.
///
/// Braintree posts exactly two form fields, a signature and a base64 payload, so this is the one notification
/// endpoint where form extraction is safe before verification.
pub async fn braintree_webhook<B, D>(
    req: HttpRequest,
    form: web::Form<BraintreeWebhookForm>,
    api: web::Data<BraintreeProcessor<B, D>>,
    options: web::Data<ServerOptions>,
) -> Result<HttpResponse, ServerError>
where
    B: TransactionStore + SubscriptionStore,
    D: WebhookDecoder,
{
    let ctx = notification_context(&req, PaymentProvider::Braintree, &options);
    debug!("💻️ [{ctx}] webhook received");
    let outcome = api.process(&ctx, &form.bt_signature, &form.bt_payload).await?;
    Ok(acknowledge(&ctx, &outcome))
}

route!(braintree_challenge => Get "/webhook/braintree" impl B: TransactionStore, SubscriptionStore; D: WebhookDecoder);
/// Route handler for Braintree's endpoint-verification challenge.
///
/// Braintree issues a `GET` with a `bt_challenge` query parameter when the webhook URL is registered and expects
/// the keyed digest back as plain text.
pub async fn braintree_challenge<B, D>(
    query: web::Query<BraintreeChallengeQuery>,
    api: web::Data<BraintreeProcessor<B, D>>,
) -> Result<HttpResponse, ServerError>
where
    B: TransactionStore + SubscriptionStore,
    D: WebhookDecoder,
{
    let answer = api.challenge(&query.bt_challenge).map_err(ProcessError::from)?;
    Ok(HttpResponse::Ok().content_type(ContentType::plaintext()).body(answer))
}

//--------------------------------------------   Helpers   ----------------------------------------------------

/// Builds the `200` acknowledgment that tells the provider to stop redelivering this notification.
fn acknowledge(ctx: &NotificationContext, outcome: &ProcessOutcome) -> HttpResponse {
    let message = match outcome {
        ProcessOutcome::Applied(tx) => format!("transaction {} is now {}", tx.uuid, tx.status),
        ProcessOutcome::Derived { transaction, created: true } => {
            format!("recorded a {} ({}) against the original payment", transaction.kind, transaction.uuid)
        },
        ProcessOutcome::Derived { transaction, created: false } => {
            format!("the {} ({}) was already on record", transaction.kind, transaction.uuid)
        },
        ProcessOutcome::Subscription(s) => {
            format!("{} charge(s) recorded, {} verified, {} skipped", s.created.len(), s.verified, s.skipped)
        },
        ProcessOutcome::Ignored(reason) => format!("acknowledged: {reason}"),
    };
    if outcome.mutated() {
        info!("💻️ [{ctx}] {message}");
    } else {
        debug!("💻️ [{ctx}] {message}");
    }
    HttpResponse::Ok().json(JsonResponse::success(message))
}
