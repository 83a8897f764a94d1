use actix_web::{http::StatusCode, web, web::ServiceConfig};
use marketplace_payment_engine::{
    db_types::{NewTransaction, PaymentProvider, TransactionStatus, TransactionUuid},
    traits::{AuthServiceError, IpnVerdict, TransactionStore},
    PaypalProcessor,
    SqliteDatabase,
};

use super::{
    helpers::{new_test_db, post_request},
    mocks::MockValidator,
};
use crate::{config::ServerOptions, routes::PaypalIpnRoute};

fn configure(db: SqliteDatabase, validator: MockValidator) -> impl FnOnce(&mut ServiceConfig) {
    move |cfg| {
        let api = PaypalProcessor::new(db, validator);
        cfg.service(PaypalIpnRoute::<SqliteDatabase, MockValidator>::new())
            .app_data(web::Data::new(api))
            .app_data(web::Data::new(ServerOptions::default()));
    }
}

async fn seed(db: &SqliteDatabase, uuid: &str, pay_key: &str) {
    db.create_transaction(
        NewTransaction::new(TransactionUuid::from(uuid.to_string()), PaymentProvider::Paypal).with_uid_pay(pay_key),
    )
    .await
    .expect("Error seeding transaction");
}

#[actix_web::test]
async fn a_verified_ipn_is_acknowledged_and_applied() {
    let db = new_test_db().await;
    seed(&db, "uuid-ep1", "AP-EP1").await;
    let mut validator = MockValidator::new();
    validator.expect_validate_ipn().returning(|_, _| Ok(IpnVerdict::Verified));

    let body = "status=COMPLETED&pay_key=AP-EP1&tracking_id=uuid-ep1&amount=USD%204.00&txn_id=TX-EP1";
    let (status, body) = post_request("/ipn/paypal", body, "", configure(db.clone(), validator))
        .await
        .expect("IPN request should not fail");

    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("\"success\":true"), "unexpected body: {body}");
    let stored = db.fetch_transaction_by_uuid("uuid-ep1").await.unwrap().unwrap();
    assert_eq!(stored.status, TransactionStatus::Completed);
}

#[actix_web::test]
async fn an_ipn_the_provider_disowns_answers_403() {
    let db = new_test_db().await;
    seed(&db, "uuid-ep2", "AP-EP2").await;
    let mut validator = MockValidator::new();
    validator.expect_validate_ipn().returning(|_, _| Ok(IpnVerdict::Invalid("INVALID".to_string())));

    let body = "status=COMPLETED&pay_key=AP-EP2&amount=USD%204.00&txn_id=TX-EP2";
    let (status, body) = post_request("/ipn/paypal", body, "", configure(db.clone(), validator))
        .await
        .expect("IPN request should not fail");

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body.contains("error"), "unexpected body: {body}");
    let stored = db.fetch_transaction_by_uuid("uuid-ep2").await.unwrap().unwrap();
    assert_eq!(stored.status, TransactionStatus::Pending);
}

#[actix_web::test]
async fn a_pending_ipn_is_acknowledged_without_a_round_trip() {
    let db = new_test_db().await;
    let mut validator = MockValidator::new();
    validator.expect_validate_ipn().never();

    let body = "status=PENDING&pay_key=AP-EP3&tracking_id=uuid-ep3";
    let (status, body) =
        post_request("/ipn/paypal", body, "", configure(db, validator)).await.expect("IPN request should not fail");

    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("\"success\":true"), "unexpected body: {body}");
}

#[actix_web::test]
async fn a_verification_timeout_answers_403_so_paypal_retries() {
    let db = new_test_db().await;
    seed(&db, "uuid-ep4", "AP-EP4").await;
    let mut validator = MockValidator::new();
    validator.expect_validate_ipn().returning(|_, _| Err(AuthServiceError::Timeout));

    let body = "status=COMPLETED&pay_key=AP-EP4&txn_id=TX-EP4";
    let (status, _) = post_request("/ipn/paypal", body, "", configure(db.clone(), validator))
        .await
        .expect("IPN request should not fail");

    assert_eq!(status, StatusCode::FORBIDDEN);
    let stored = db.fetch_transaction_by_uuid("uuid-ep4").await.unwrap().unwrap();
    assert_eq!(stored.status, TransactionStatus::Pending);
}
