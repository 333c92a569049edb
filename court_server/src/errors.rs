use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use court_engine::CourtError;
use log::error;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("Invalid server configuration. {0}")]
    ConfigurationError(String),
    #[error("UnspecifiedError. {0}")]
    Unspecified(String),
    #[error("Could not read request body: {0}")]
    InvalidRequestBody(String),
    #[error("No caller identity was supplied. {0}")]
    MissingIdentity(String),
    #[error("Insufficient Permissions. {0}")]
    InsufficientPermissions(String),
    #[error("{0}")]
    Court(#[from] CourtError),
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InitializeError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::IOError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ConfigurationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unspecified(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            Self::MissingIdentity(_) => StatusCode::UNAUTHORIZED,
            Self::InsufficientPermissions(_) => StatusCode::FORBIDDEN,
            Self::Court(e) => court_error_status(e),
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            error!("💻️ {self}");
        }
        HttpResponse::build(status)
            .insert_header(ContentType::json())
            .body(serde_json::json!({ "error": self.to_string() }).to_string())
    }
}

/// Replays the engine absorbs (a repeated payment callback, a redelivered webhook) never reach this mapping: they
/// come back as successes. `AlreadyProcessed` here means a conflicting second attempt.
pub fn court_error_status(e: &CourtError) -> StatusCode {
    match e {
        CourtError::ValidationError(_) => StatusCode::BAD_REQUEST,
        CourtError::ItemUnavailable(_) => StatusCode::BAD_REQUEST,
        CourtError::NotFound(_) => StatusCode::NOT_FOUND,
        CourtError::OrderNotFound(_) => StatusCode::NOT_FOUND,
        CourtError::CartNotFound => StatusCode::NOT_FOUND,
        CourtError::Forbidden(_) => StatusCode::FORBIDDEN,
        CourtError::InvalidSignature => StatusCode::UNAUTHORIZED,
        CourtError::InvalidTransition { .. } => StatusCode::CONFLICT,
        CourtError::ConcurrentModification => StatusCode::CONFLICT,
        CourtError::AlreadyProcessed(_) => StatusCode::CONFLICT,
        CourtError::AlreadyRated(_) => StatusCode::CONFLICT,
        CourtError::NoPendingPayouts(_) => StatusCode::CONFLICT,
        CourtError::VendorIneligible(..) => StatusCode::CONFLICT,
        CourtError::DuplicateOrderNumber(_) => StatusCode::CONFLICT,
        CourtError::GatewayUnavailable(_) => StatusCode::BAD_GATEWAY,
        CourtError::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[cfg(test)]
mod test {
    use actix_web::body::MessageBody;
    use court_engine::db_types::OrderStatusType;

    use super::*;

    #[test]
    fn engine_errors_map_to_statuses() {
        let cases = [
            (CourtError::validation("bad quantity"), StatusCode::BAD_REQUEST),
            (CourtError::OrderNotFound(7), StatusCode::NOT_FOUND),
            (CourtError::forbidden("not yours"), StatusCode::FORBIDDEN),
            (CourtError::InvalidSignature, StatusCode::UNAUTHORIZED),
            (
                CourtError::invalid_transition(OrderStatusType::Preparing, OrderStatusType::Cancelled, "too late"),
                StatusCode::CONFLICT,
            ),
            (CourtError::GatewayUnavailable("timeout".into()), StatusCode::BAD_GATEWAY),
        ];
        for (e, status) in cases {
            assert_eq!(ServerError::from(e).status_code(), status);
        }
    }

    #[test]
    fn error_body_is_json() {
        let res = ServerError::from(CourtError::CartNotFound).error_response();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        let body = res.into_body().try_into_bytes().unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "There is no active cart for this customer");
    }
}
