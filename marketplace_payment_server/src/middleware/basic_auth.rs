//! Basic Auth middleware for Actix Web.
//!
//! Bango's server-to-server event notifications are authenticated at the transport level: the delivery agent is
//! configured with a username and password and sends them in a standard `Authorization: Basic` header. This
//! middleware checks those credentials before the request body is ever parsed.
//!
//! Wrap the event endpoint(s) with this middleware; the payload-level checks stay in the engine.

use std::{
    future::{ready, Ready},
    rc::Rc,
};

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    error::{ErrorForbidden, ErrorUnauthorized},
    Error,
};
use futures::future::LocalBoxFuture;
use log::{trace, warn};
use mpg_common::Secret;

pub struct BasicAuthMiddlewareFactory {
    username: String,
    password: Secret<String>,
    // If false, the middleware will not check credentials and always allow the call
    enabled: bool,
}

impl BasicAuthMiddlewareFactory {
    pub fn new(username: &str, password: Secret<String>, enabled: bool) -> Self {
        BasicAuthMiddlewareFactory { username: username.into(), password, enabled }
    }
}

impl<S, B> Transform<S, ServiceRequest> for BasicAuthMiddlewareFactory
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;
    type InitError = ();
    type Response = ServiceResponse<B>;
    type Transform = BasicAuthMiddlewareService<S>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(BasicAuthMiddlewareService {
            username: self.username.clone(),
            password: self.password.clone(),
            enabled: self.enabled,
            service: Rc::new(service),
        }))
    }
}

pub struct BasicAuthMiddlewareService<S> {
    username: String,
    password: Secret<String>,
    enabled: bool,
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for BasicAuthMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;
    type Response = ServiceResponse<B>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let username = self.username.clone();
        let password = self.password.reveal().clone();
        let enabled = self.enabled;
        Box::pin(async move {
            trace!("🔐️ Checking Basic Auth credentials for request");
            if !enabled {
                trace!("🔐️ Basic Auth checks are disabled. Allowing request.");
                return service.call(req).await;
            }
            let header = req.headers().get("Authorization").and_then(|v| v.to_str().ok()).ok_or_else(|| {
                warn!("🔐️ No Authorization header found in request. Denying access.");
                ErrorUnauthorized("Authorization required.")
            })?;
            let (supplied_user, supplied_pass) = decode_basic_credentials(header).ok_or_else(|| {
                warn!("🔐️ Authorization header is not valid Basic Auth. Denying access.");
                ErrorUnauthorized("Authorization required.")
            })?;
            if supplied_user == username && supplied_pass == password {
                trace!("🔐️ Basic Auth check for request ✅️");
                service.call(req).await
            } else {
                warn!("🔐️ Invalid Basic Auth credentials in request. Denying access.");
                Err(ErrorForbidden("Invalid credentials."))
            }
        })
    }
}

fn decode_basic_credentials(header: &str) -> Option<(String, String)> {
    let encoded = header.strip_prefix("Basic ")?;
    let decoded = base64::decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, pass) = decoded.split_once(':')?;
    Some((user.to_string(), pass.to_string()))
}
