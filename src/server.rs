//! HTTP boundary for the detection engine.
//!
//! Provides two endpoints:
//! - `/api/health` - liveness probe
//! - `/api/detect?domain=...` - rate-limited CMS detection
//!
//! Every `/api/detect` response carries `X-RateLimit-Limit` and
//! `X-RateLimit-Remaining` derived from the limiter's decision for that call.

use anyhow::Context;
use axum::{
    extract::{ConnectInfo, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::core::{CmsDetector, DetectionReport};
use crate::error::DetectError;
use crate::rate_limit::{client_identity, RateDecision, RateLimiter, RETRY_AFTER_SECS};

/// How often idle client windows are dropped from the limiter.
const PURGE_INTERVAL: Duration = Duration::from_secs(300);

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub detector: Arc<CmsDetector>,
    pub limiter: Arc<RateLimiter>,
}

impl AppState {
    pub fn new(detector: CmsDetector, limiter: RateLimiter) -> Self {
        Self {
            detector: Arc::new(detector),
            limiter: Arc::new(limiter),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct DetectQuery {
    domain: Option<String>,
}

/// Builds the router without binding it.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/detect", get(detect_handler))
        .with_state(state)
}

/// Binds `addr` and serves until the process exits.
pub async fn start_server(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind server to {}", addr))?;
    serve(listener, state).await
}

/// Serves on an already bound listener.
pub async fn serve(listener: TcpListener, state: AppState) -> anyhow::Result<()> {
    let local = listener.local_addr().context("Listener has no local address")?;
    info!("Detection API listening on http://{}/", local);
    info!("  - Detect: http://{}/api/detect?domain=example.com", local);
    info!("  - Health: http://{}/api/health", local);

    if state.limiter.is_enabled() {
        let limiter = Arc::clone(&state.limiter);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(PURGE_INTERVAL);
            loop {
                ticker.tick().await;
                limiter.purge_idle(Instant::now());
            }
        });
    }

    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("Detection API server error")?;

    Ok(())
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn detect_handler(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Query(query): Query<DetectQuery>,
) -> Response {
    let forwarded = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok());
    let client = client_identity(forwarded, Some(peer.ip()));
    let decision = state.limiter.check(&client);

    let mut response = if decision.allowed {
        run_detection(&state, query.domain).await
    } else {
        warn!("Rejecting request from {}: rate limit exceeded", client);
        error_response(
            DetectError::RateLimited {
                limit: decision.limit,
                retry_after_secs: RETRY_AFTER_SECS,
            },
            0,
        )
    };

    apply_rate_headers(response.headers_mut(), &decision);
    response
}

async fn run_detection(state: &AppState, domain: Option<String>) -> Response {
    let Some(raw) = domain.filter(|d| !d.trim().is_empty()) else {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({
                "error": "Missing domain parameter",
                "detail": "Pass ?domain=example.com",
            })),
        )
            .into_response();
    };

    let start = Instant::now();
    match state.detector.detect(&raw).await {
        Ok(report) => {
            debug!("Detection for {} finished in {} ms", report.domain, report.elapsed_ms);
            report_response(report)
        }
        Err(e @ DetectError::InvalidDomain(_)) => invalid_domain_response(&raw, &e),
        Err(e) => error_response(e, start.elapsed().as_millis() as u64),
    }
}

/// 200 with the detection record, cacheable by shared caches for a day.
pub fn report_response(report: DetectionReport) -> Response {
    let mut response = Json(report).into_response();
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("s-maxage=86400"));
    response
}

/// 422 echoing the input as the caller sent it; `detail` names the host that failed validation.
pub fn invalid_domain_response(raw: &str, err: &DetectError) -> Response {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(json!({
            "error": format!("Invalid domain: {}", raw),
            "detail": err.to_string(),
        })),
    )
        .into_response()
}

/// Translates a detection error into its HTTP status and JSON body.
pub fn error_response(err: DetectError, elapsed_ms: u64) -> Response {
    match err {
        DetectError::InvalidDomain(ref host) => invalid_domain_response(host, &err),
        DetectError::FetchTimeout { domain } => (
            StatusCode::GATEWAY_TIMEOUT,
            Json(json!({
                "error": format!("Timeout fetching {}", domain),
                "domain": domain,
                "elapsed_ms": elapsed_ms,
            })),
        )
            .into_response(),
        DetectError::Unreachable { domain, cause } => (
            StatusCode::BAD_GATEWAY,
            Json(json!({
                "error": format!("Could not reach {}", domain),
                "detail": cause,
                "domain": domain,
                "elapsed_ms": elapsed_ms,
            })),
        )
            .into_response(),
        DetectError::RateLimited {
            limit,
            retry_after_secs,
        } => {
            let mut response = (
                StatusCode::TOO_MANY_REQUESTS,
                Json(json!({
                    "error": "Rate limit exceeded",
                    "detail": format!("Maximum {} requests per minute", limit),
                    "retry_after": retry_after_secs,
                })),
            )
                .into_response();
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
            response
        }
    }
}

fn apply_rate_headers(headers: &mut HeaderMap, decision: &RateDecision) {
    headers.insert("x-ratelimit-limit", HeaderValue::from(decision.limit));
    headers.insert("x-ratelimit-remaining", HeaderValue::from(decision.remaining));
}
