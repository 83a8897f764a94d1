use actix_web::{body::MessageBody, http::StatusCode, test, test::TestRequest, web::ServiceConfig, App};
use marketplace_payment_engine::{
    test_utils::{prepare_test_env, random_db_path},
    SqliteDatabase,
};

/// Stands up a fresh, migrated throwaway database for one test.
pub async fn new_test_db() -> SqliteDatabase {
    let url = random_db_path();
    prepare_test_env(&url).await;
    SqliteDatabase::new_with_url(&url, 2).await.expect("Error creating test database")
}

pub async fn get_request(
    path: &str,
    configure: impl FnOnce(&mut ServiceConfig),
) -> Result<(StatusCode, String), String> {
    let req = TestRequest::get().uri(path).to_request();
    send(req, configure).await
}

/// Posts a raw body, the shape every provider notification arrives in. An empty `auth_header` sends no
/// Authorization header.
pub async fn post_request(
    path: &str,
    body: &str,
    auth_header: &str,
    configure: impl FnOnce(&mut ServiceConfig),
) -> Result<(StatusCode, String), String> {
    let mut req = TestRequest::post()
        .uri(path)
        .insert_header(("Content-Type", "application/x-www-form-urlencoded"))
        .set_payload(body.to_string());
    if !auth_header.is_empty() {
        req = req.insert_header(("Authorization", auth_header));
    }
    send(req.to_request(), configure).await
}

async fn send(
    req: actix_http::Request,
    configure: impl FnOnce(&mut ServiceConfig),
) -> Result<(StatusCode, String), String> {
    let app = App::new().configure(configure);
    let service = test::init_service(app).await;
    let (_, res) = test::try_call_service(&service, req).await.map_err(|e| e.to_string())?.into_parts();
    let status = res.status();
    let body = String::from_utf8_lossy(&res.into_body().try_into_bytes().unwrap()).into_owned();
    Ok((status, body))
}
