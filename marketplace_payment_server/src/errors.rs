use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use marketplace_payment_engine::errors::ProcessError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("UnspecifiedError. {0}")]
    Unspecified(String),
    #[error("The notification was not accepted. {0}")]
    ProcessingError(#[from] ProcessError),
}

/// Status-code policy for the notification endpoints: anything in the 2xx range stops the provider's redelivery
/// loop, so only outcomes that must never be redelivered answer 2xx. Authentication failures answer 403, malformed
/// payloads 400, rejected status transitions 409, and store or consistency trouble 500, which invites a redelivery.
impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::ProcessingError(e) => match e {
                ProcessError::Authentication(_) => StatusCode::FORBIDDEN,
                ProcessError::Parse(_) => StatusCode::BAD_REQUEST,
                ProcessError::Transition(_) => StatusCode::CONFLICT,
                ProcessError::Consistency(_) => StatusCode::INTERNAL_SERVER_ERROR,
                ProcessError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::InitializeError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::IOError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unspecified(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .body(serde_json::json!({ "error": self.to_string() }).to_string())
    }
}
