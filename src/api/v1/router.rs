use super::error::*;
use super::handler;
use crate::application_impl::SIGNATURE_HEADER;
use crate::server::*;
use sha2::{Digest, Sha256};
use std::convert::Infallible;
use std::sync::Arc;
use warp::{Filter, reject};

const TOKEN_BODY_LIMIT: u64 = 4 * 1024;
const WEBHOOK_BODY_LIMIT: u64 = 256 * 1024;

pub fn routes(
    server: Arc<Server>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    let logout = warp::path!("session" / "logout")
        .and(warp::post())
        .and(warp::body::content_length_limit(TOKEN_BODY_LIMIT))
        .and(warp::body::json())
        .and(with(server.session_service.clone()))
        .and_then(handler::logout);

    let refresh = warp::path!("session" / "refresh")
        .and(warp::post())
        .and(warp::body::content_length_limit(TOKEN_BODY_LIMIT))
        .and(warp::body::json())
        .and(with(server.session_service.clone()))
        .and_then(handler::refresh);

    // raw bytes: the signature covers the exact body
    let billing_webhook = warp::path!("webhooks" / "billing")
        .and(warp::post())
        .and(warp::header::optional::<String>(SIGNATURE_HEADER))
        .and(warp::body::content_length_limit(WEBHOOK_BODY_LIMIT))
        .and(warp::body::bytes())
        .and(with(server.webhook_service.clone()))
        .and_then(handler::billing_webhook);

    let replay = warp::path!("webhooks" / "replay" / String)
        .and(warp::post())
        .and(with_operator(server.operator_token.clone()))
        .and(with(server.webhook_service.clone()))
        .and_then(handler::replay_event);

    let health = warp::path!("health")
        .and(warp::get())
        .and(with(server.health_service.clone()))
        .and_then(handler::health);

    logout
        .or(refresh)
        .or(billing_webhook)
        .or(replay)
        .or(health)
        .with(warp::trace::request())
}

fn with<ServiceType>(
    service: Arc<ServiceType>,
) -> impl Filter<Extract = (Arc<ServiceType>,), Error = Infallible> + Clone
where
    ServiceType: Send + Sync + ?Sized,
{
    warp::any().map(move || service.clone())
}

/// Requires `Authorization: Bearer <operator token>`. With no operator token
/// configured every request is refused.
fn with_operator(
    operator_token: Option<String>,
) -> impl Filter<Extract = (), Error = warp::Rejection> + Clone {
    let expected = operator_token.map(|t| Sha256::digest(t.as_bytes()).to_vec());
    warp::header::optional::<String>("authorization")
        .and_then(move |header: Option<String>| {
            let expected = expected.clone();
            async move {
                let presented = header
                    .as_deref()
                    .and_then(|h| h.strip_prefix("Bearer "))
                    .map(|t| Sha256::digest(t.as_bytes()).to_vec());
                match (expected, presented) {
                    (Some(expected), Some(presented)) if expected == presented => Ok(()),
                    _ => Err(reject::custom(ApiErrorCode::Unauthorized)),
                }
            }
        })
        .untuple_one()
}
