use actix_web::{http::StatusCode, web, web::ServiceConfig};
use marketplace_payment_engine::{
    db_types::{NewTransaction, PaymentProvider, TransactionStatus, TransactionUuid},
    providers::sign_redirect_query,
    traits::TransactionStore,
    BangoProcessor,
    SqliteDatabase,
};
use mpg_common::Secret;

use super::{
    helpers::{get_request, new_test_db, post_request},
    mocks::MockChecker,
};
use crate::{
    config::ServerOptions,
    middleware::BasicAuthMiddlewareFactory,
    routes::{BangoEventRoute, BangoRedirectRoute},
};

const SECRET: &str = "endpoint-signing-key";
const EVENT_USER: &str = "bango-feed";
const EVENT_PASSWORD: &str = "second-breakfast";

fn configure(db: SqliteDatabase, checker: MockChecker) -> impl FnOnce(&mut ServiceConfig) {
    move |cfg| {
        let api = BangoProcessor::new(db, Secret::new(SECRET.to_string()), checker);
        let events = web::scope("/event/bango")
            .wrap(BasicAuthMiddlewareFactory::new(EVENT_USER, Secret::new(EVENT_PASSWORD.to_string()), true))
            .service(BangoEventRoute::<SqliteDatabase, MockChecker>::new());
        cfg.service(BangoRedirectRoute::<SqliteDatabase, MockChecker>::new())
            .service(events)
            .app_data(web::Data::new(api))
            .app_data(web::Data::new(ServerOptions::default()));
    }
}

fn basic(user: &str, password: &str) -> String {
    format!("Basic {}", base64::encode(format!("{user}:{password}")))
}

async fn seed(db: &SqliteDatabase, uuid: &str) {
    db.create_transaction(NewTransaction::new(TransactionUuid::from(uuid.to_string()), PaymentProvider::Bango))
        .await
        .expect("Error seeding transaction");
}

const EVENT_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<eventList>
  <event>
    <action>PAYMENT</action>
    <data>
      <field name="responseCode" value="OK"/>
      <field name="responseMessage" value="Success"/>
      <field name="transId" value="BG-E1"/>
      <field name="externalCPTransId" value="uuid-eb3"/>
    </data>
  </event>
</eventList>"#;

#[actix_web::test]
async fn a_signed_redirect_is_acknowledged() {
    let db = new_test_db().await;
    seed(&db, "uuid-eb1").await;
    let sig = sign_redirect_query(SECRET, "uuid-eb1").unwrap();
    let path = format!("/notification/bango?bango_response_code=OK&moz_transaction=uuid-eb1&moz_signature={sig}");

    let (status, body) = get_request(&path, configure(db.clone(), MockChecker::new()))
        .await
        .expect("Redirect request should not fail");

    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("\"success\":true"), "unexpected body: {body}");
    let stored = db.fetch_transaction_by_uuid("uuid-eb1").await.unwrap().unwrap();
    assert_eq!(stored.status, TransactionStatus::Completed);
}

#[actix_web::test]
async fn a_tampered_redirect_answers_403() {
    let db = new_test_db().await;
    seed(&db, "uuid-eb2").await;
    let sig = sign_redirect_query(SECRET, "somebody-else").unwrap();
    let path = format!("/notification/bango?bango_response_code=OK&moz_transaction=uuid-eb2&moz_signature={sig}");

    let (status, _) = get_request(&path, configure(db.clone(), MockChecker::new()))
        .await
        .expect("Redirect request should not fail");

    assert_eq!(status, StatusCode::FORBIDDEN);
    let stored = db.fetch_transaction_by_uuid("uuid-eb2").await.unwrap().unwrap();
    assert_eq!(stored.status, TransactionStatus::Pending);
}

#[actix_web::test]
async fn an_event_without_credentials_is_turned_away() {
    let db = new_test_db().await;
    let err = post_request("/event/bango", EVENT_XML, "", configure(db, MockChecker::new()))
        .await
        .expect_err("Expected the middleware to reject the request");
    assert_eq!(err, "Authorization required.");
}

#[actix_web::test]
async fn an_event_with_wrong_credentials_is_forbidden() {
    let db = new_test_db().await;
    let header = basic(EVENT_USER, "wrong-password");
    let err = post_request("/event/bango", EVENT_XML, &header, configure(db, MockChecker::new()))
        .await
        .expect_err("Expected the middleware to reject the request");
    assert_eq!(err, "Invalid credentials.");
}

#[actix_web::test]
async fn an_authenticated_event_reaches_the_ledger() {
    let db = new_test_db().await;
    seed(&db, "uuid-eb3").await;
    let header = basic(EVENT_USER, EVENT_PASSWORD);

    let (status, body) = post_request("/event/bango", EVENT_XML, &header, configure(db.clone(), MockChecker::new()))
        .await
        .expect("Event request should not fail");

    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("\"success\":true"), "unexpected body: {body}");
    let stored = db.fetch_transaction_by_uuid("uuid-eb3").await.unwrap().unwrap();
    assert_eq!(stored.status, TransactionStatus::Completed);
    assert_eq!(stored.uid_support.as_deref(), Some("BG-E1"));
}
