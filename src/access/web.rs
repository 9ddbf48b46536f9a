use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use miette::IntoDiagnostic;
use serde::Serialize;

use crate::access::errors::AccessError;
use crate::access::types::{Request, ResourceId};
use crate::access::AccessService;
use crate::settings::Settings;

#[derive(Debug, Serialize)]
pub struct EnforceResponse {
    pub allowed: bool,
}

#[derive(Debug, Serialize)]
pub struct FilterResponse {
    pub allowed: Vec<ResourceId>,
}

pub fn router(service: Arc<AccessService>) -> Router {
    Router::new()
        .route("/v1/enforce", post(handle_enforce))
        .route("/v1/filter", post(handle_filter))
        .route("/healthz", get(health))
        .with_state(service)
}

/// Bind the configured address and serve the decision API until the server stops.
pub async fn serve(settings: &Settings, service: Arc<AccessService>) -> miette::Result<()> {
    let addr: std::net::SocketAddr = settings
        .bind_addr()
        .parse()
        .map_err(|e| miette::miette!("bad bind addr: {e}"))?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .into_diagnostic()?;
    tracing::info!(%addr, "Access decision API listening");
    axum::serve(listener, router(service))
        .await
        .into_diagnostic()?;
    Ok(())
}

/// Body errors are reported like any other malformed request.
fn decode(body: Result<Json<Request>, JsonRejection>) -> Result<Request, AccessError> {
    body.map(|Json(req)| req)
        .map_err(|e| AccessError::MalformedRequest(e.body_text()))
}

async fn handle_enforce(
    State(service): State<Arc<AccessService>>,
    body: Result<Json<Request>, JsonRejection>,
) -> impl IntoResponse {
    let req = match decode(body) {
        Ok(req) => req,
        Err(e) => return e.into_response(),
    };
    match service.enforcer().enforce(&req).await {
        Ok(()) => Json(EnforceResponse { allowed: true }).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn handle_filter(
    State(service): State<Arc<AccessService>>,
    body: Result<Json<Request>, JsonRejection>,
) -> impl IntoResponse {
    let req = match decode(body) {
        Ok(req) => req,
        Err(e) => return e.into_response(),
    };
    match service.enforcer().filter(&req).await {
        Ok(allowed) => {
            let mut allowed: Vec<_> = allowed.into_iter().collect();
            allowed.sort();
            Json(FilterResponse { allowed }).into_response()
        }
        Err(e) => e.into_response(),
    }
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}
