use crate::api::v1::handler::ApiResponse;
use crate::application_port::*;
use serde::Serialize;
use std::convert::Infallible;
use thiserror::Error;
use tracing::{error, warn};
use warp::http::StatusCode;
use warp::{Rejection, reject};

pub async fn recover_error(err: Rejection) -> Result<impl warp::Reply, Infallible> {
    let code = if let Some(code) = err.find::<ApiErrorCode>() {
        code.clone()
    } else if err.is_not_found() {
        ApiErrorCode::NotFound
    } else if err.find::<warp::filters::body::BodyDeserializeError>().is_some() {
        ApiErrorCode::ValidationError
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        ApiErrorCode::PayloadTooLarge
    } else if err.find::<warp::reject::LengthRequired>().is_some() {
        ApiErrorCode::LengthRequired
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        ApiErrorCode::MethodNotAllowed
    } else {
        error!("Unhandled rejection: {:?}", err);
        ApiErrorCode::InternalError
    };

    let json = warp::reply::json(&ApiResponse::<()>::err(code.clone(), code.to_string()));
    Ok(warp::reply::with_status(json, code.status()))
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: ApiErrorCode,
    pub message: String,
}

#[derive(Debug, Clone, Error, Serialize, PartialEq, Eq)]
pub enum ApiErrorCode {
    #[error("Request is malformed")]
    ValidationError,
    #[error("Token is not valid")]
    InvalidToken,
    #[error("Signature verification failed")]
    InvalidSignature,
    #[error("Event payload is malformed")]
    MalformedEvent,
    #[error("Operator credentials required")]
    Unauthorized,
    #[error("Not found")]
    NotFound,
    #[error("Method not allowed")]
    MethodNotAllowed,
    #[error("Payload too large")]
    PayloadTooLarge,
    #[error("Content-Length required")]
    LengthRequired,
    #[error("Storage unavailable, retry later")]
    StorageUnavailable,
    #[error("Internal error")]
    InternalError,
}

impl ApiErrorCode {
    pub fn internal<E: std::fmt::Display>(error: E) -> ApiErrorCode {
        warn!("Internal error: {}", error);
        ApiErrorCode::InternalError
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiErrorCode::ValidationError
            | ApiErrorCode::InvalidSignature
            | ApiErrorCode::MalformedEvent => StatusCode::BAD_REQUEST,
            ApiErrorCode::InvalidToken | ApiErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiErrorCode::NotFound => StatusCode::NOT_FOUND,
            ApiErrorCode::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiErrorCode::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ApiErrorCode::LengthRequired => StatusCode::LENGTH_REQUIRED,
            ApiErrorCode::StorageUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl reject::Reject for ApiErrorCode {}

impl From<SessionError> for ApiErrorCode {
    fn from(error: SessionError) -> Self {
        match error {
            SessionError::Validation(_) => ApiErrorCode::ValidationError,
            SessionError::TokenInvalid => ApiErrorCode::InvalidToken,
            SessionError::Storage(e) => {
                error!("session storage fault: {}", e);
                ApiErrorCode::StorageUnavailable
            }
            SessionError::Internal(e) => ApiErrorCode::internal(e),
        }
    }
}

impl From<IngestError> for ApiErrorCode {
    fn from(error: IngestError) -> Self {
        match error {
            IngestError::Signature(_) => ApiErrorCode::InvalidSignature,
            IngestError::Malformed(e) => {
                warn!("verified webhook with malformed body: {}", e);
                ApiErrorCode::MalformedEvent
            }
            IngestError::Storage(e) => {
                error!("dedup storage fault: {}", e);
                ApiErrorCode::StorageUnavailable
            }
            IngestError::NotFound => ApiErrorCode::NotFound,
        }
    }
}
