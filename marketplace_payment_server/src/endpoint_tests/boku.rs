use actix_web::{http::StatusCode, web, web::ServiceConfig};
use marketplace_payment_engine::{
    db_types::{NewTransaction, PaymentProvider, TransactionStatus, TransactionUuid},
    helpers::FormFields,
    providers::boku_signature,
    traits::TransactionStore,
    BokuProcessor,
    SqliteDatabase,
};
use mpg_common::Secret;

use super::helpers::{new_test_db, post_request};
use crate::{config::ServerOptions, routes::BokuEventRoute};

const SECRET: &str = "endpoint-merchant-secret";

fn configure(db: SqliteDatabase) -> impl FnOnce(&mut ServiceConfig) {
    move |cfg| {
        let api = BokuProcessor::new(db, Secret::new(SECRET.to_string()));
        cfg.service(BokuEventRoute::<SqliteDatabase>::new())
            .app_data(web::Data::new(api))
            .app_data(web::Data::new(ServerOptions::default()));
    }
}

fn signed(base: &str) -> String {
    let fields = FormFields::from_query(base).unwrap();
    let sig = boku_signature(SECRET, fields.pairs());
    format!("{base}&sig={sig}")
}

async fn seed(db: &SqliteDatabase, uuid: &str) {
    db.create_transaction(NewTransaction::new(TransactionUuid::from(uuid.to_string()), PaymentProvider::Boku))
        .await
        .expect("Error seeding transaction");
}

#[actix_web::test]
async fn a_signed_notification_is_acknowledged() {
    let db = new_test_db().await;
    seed(&db, "uuid-ek1").await;
    let body = signed("action=billingresult&param=uuid-ek1&result-code=8&trx-id=BK-E1");

    let (status, body) =
        post_request("/event/boku", &body, "", configure(db.clone())).await.expect("Event request should not fail");

    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("\"success\":true"), "unexpected body: {body}");
    let stored = db.fetch_transaction_by_uuid("uuid-ek1").await.unwrap().unwrap();
    assert_eq!(stored.status, TransactionStatus::Cancelled);
}

#[actix_web::test]
async fn a_tampered_signature_answers_403() {
    let db = new_test_db().await;
    seed(&db, "uuid-ek2").await;
    let mut body = signed("action=billingresult&param=uuid-ek2&result-code=8&trx-id=BK-E2");
    let flipped = if body.ends_with('0') { "1" } else { "0" };
    body.replace_range(body.len() - 1.., flipped);

    let (status, _) =
        post_request("/event/boku", &body, "", configure(db.clone())).await.expect("Event request should not fail");

    assert_eq!(status, StatusCode::FORBIDDEN);
    let stored = db.fetch_transaction_by_uuid("uuid-ek2").await.unwrap().unwrap();
    assert_eq!(stored.status, TransactionStatus::Pending);
}

#[actix_web::test]
async fn an_untabled_result_code_answers_400() {
    let db = new_test_db().await;
    seed(&db, "uuid-ek3").await;
    let body = signed("action=billingresult&param=uuid-ek3&result-code=99&trx-id=BK-E3");

    let (status, body) =
        post_request("/event/boku", &body, "", configure(db.clone())).await.expect("Event request should not fail");

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("error"), "unexpected body: {body}");
    let stored = db.fetch_transaction_by_uuid("uuid-ek3").await.unwrap().unwrap();
    assert_eq!(stored.status, TransactionStatus::Pending);
}
