use actix_web::{http::StatusCode, web, web::ServiceConfig};
use marketplace_payment_engine::{
    db_types::{NewSubscription, PaymentProvider, TransactionStatus},
    errors::AuthenticationError,
    traits::{SubscriptionStore, TransactionStore},
    BraintreeProcessor,
    HandlerRegistry,
    SqliteDatabase,
};

use super::{
    helpers::{get_request, new_test_db, post_request},
    mocks::MockDecoder,
};
use crate::{
    config::ServerOptions,
    routes::{BraintreeChallengeRoute, BraintreeWebhookRoute},
};

fn configure(db: SqliteDatabase, decoder: MockDecoder) -> impl FnOnce(&mut ServiceConfig) {
    move |cfg| {
        let registry = HandlerRegistry::bootstrap().expect("the standard handler table must build");
        let api = BraintreeProcessor::new(db, decoder, registry);
        cfg.service(BraintreeWebhookRoute::<SqliteDatabase, MockDecoder>::new())
            .service(BraintreeChallengeRoute::<SqliteDatabase, MockDecoder>::new())
            .app_data(web::Data::new(api))
            .app_data(web::Data::new(ServerOptions::default()));
    }
}

const CHARGED_XML: &str = r#"<notification>
  <kind>subscription_charged_successfully</kind>
  <subject>
    <subscription>
      <id>sub-e1</id>
      <billing-period-start-date type="date">2026-08-01</billing-period-start-date>
      <billing-period-end-date type="date">2026-08-31</billing-period-end-date>
      <transactions type="array">
        <transaction>
          <id>bt-e1</id>
          <status>settled</status>
          <amount>9.99</amount>
          <currency-iso-code>USD</currency-iso-code>
        </transaction>
      </transactions>
    </subscription>
  </subject>
</notification>"#;

#[actix_web::test]
async fn the_challenge_is_answered_in_plain_text() {
    let db = new_test_db().await;
    let mut decoder = MockDecoder::new();
    decoder.expect_challenge_response().returning(|c| Ok(format!("public_key|digest-of-{c}")));

    let (status, body) = get_request("/webhook/braintree?bt_challenge=20f9f8ed", configure(db, decoder))
        .await
        .expect("Challenge request should not fail");

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "public_key|digest-of-20f9f8ed");
}

#[actix_web::test]
async fn a_verified_charge_webhook_lands_in_the_ledger() {
    let db = new_test_db().await;
    db.create_subscription(NewSubscription::new(PaymentProvider::Braintree, "sub-e1"))
        .await
        .expect("Error seeding subscription");
    let mut decoder = MockDecoder::new();
    decoder.expect_verify_and_decode().returning(|_, _, _| Ok(CHARGED_XML.as_bytes().to_vec()));

    let form = "bt_signature=sig-e1&bt_payload=ZGVjb2RlZC1ieS10aGUtbW9jaw%3D%3D";
    let (status, body) = post_request("/webhook/braintree", form, "", configure(db.clone(), decoder))
        .await
        .expect("Webhook request should not fail");

    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("\"success\":true"), "unexpected body: {body}");
    let charge = db.fetch_transaction_by_provider_id(PaymentProvider::Braintree, "bt-e1").await.unwrap().unwrap();
    assert_eq!(charge.status, TransactionStatus::Checked);
}

#[actix_web::test]
async fn an_unhandled_kind_is_acknowledged_untouched() {
    let db = new_test_db().await;
    let mut decoder = MockDecoder::new();
    decoder
        .expect_verify_and_decode()
        .returning(|_, _, _| Ok(b"<notification><kind>check</kind></notification>".to_vec()));

    let form = "bt_signature=sig-e2&bt_payload=aWdub3JlZA%3D%3D";
    let (status, body) = post_request("/webhook/braintree", form, "", configure(db, decoder))
        .await
        .expect("Webhook request should not fail");

    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("\"success\":true"), "unexpected body: {body}");
}

#[actix_web::test]
async fn a_webhook_the_decoder_refuses_answers_403() {
    let db = new_test_db().await;
    let mut decoder = MockDecoder::new();
    decoder.expect_verify_and_decode().returning(|_, _, _| {
        Err(AuthenticationError::Rejected("no signature pair matches this server's public key".to_string()))
    });

    let form = "bt_signature=bad&bt_payload=aWdub3JlZA%3D%3D";
    let (status, body) = post_request("/webhook/braintree", form, "", configure(db, decoder))
        .await
        .expect("Webhook request should not fail");

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body.contains("error"), "unexpected body: {body}");
}
