use super::error::*;
use crate::application_port::*;
use crate::domain_model::EventId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use warp::http::StatusCode;
use warp::hyper::body::Bytes;
use warp::{self, reject};

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ApiError>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        ApiResponse {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(code: ApiErrorCode, message: impl Into<String>) -> Self {
        ApiResponse {
            success: false,
            data: None,
            error: Some(ApiError {
                code,
                message: message.into(),
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub refresh_token: String,
}

/// Identical for every well-formed logout, whether or not the token was live.
#[derive(Debug, Serialize)]
pub struct LogoutResponse {
    pub acknowledged: bool,
}

pub async fn logout(
    body: TokenRequest,
    session_service: Arc<dyn SessionService>,
) -> Result<impl warp::Reply, warp::Rejection> {
    session_service
        .revoke(&body.refresh_token)
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;

    Ok(warp::reply::json(&ApiResponse::ok(LogoutResponse {
        acknowledged: true,
    })))
}

pub async fn refresh(
    body: TokenRequest,
    session_service: Arc<dyn SessionService>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let tokens = session_service
        .rotate(&body.refresh_token)
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;

    Ok(warp::reply::json(&ApiResponse::ok(tokens)))
}

#[derive(Debug, Serialize)]
pub struct ReceiptResponse {
    pub received: bool,
    #[serde(flatten)]
    pub outcome: IngestOutcome,
}

pub async fn billing_webhook(
    signature: Option<String>,
    body: Bytes,
    webhook_service: Arc<dyn WebhookService>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let outcome = webhook_service
        .ingest(&body, signature.as_deref())
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;

    Ok(warp::reply::json(&ApiResponse::ok(ReceiptResponse {
        received: true,
        outcome,
    })))
}

pub async fn replay_event(
    event_id: String,
    webhook_service: Arc<dyn WebhookService>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let outcome = webhook_service
        .replay(&EventId(event_id))
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;

    Ok(warp::reply::json(&ApiResponse::ok(outcome)))
}

pub async fn health(
    health_service: Arc<dyn HealthService>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let report = health_service.report().await;
    let status = match report.status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Degraded => StatusCode::SERVICE_UNAVAILABLE,
    };
    Ok(warp::reply::with_status(warp::reply::json(&report), status))
}
