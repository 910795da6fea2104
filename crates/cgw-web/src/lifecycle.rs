//! Request lifecycle: entry hook, error boundary, exit hook.
//!
//! Every request gets a fresh [`RequestContext`]. After the handler (or the
//! error boundary) has produced a response, one audit entry is written.
//! Failed responses are rewritten into an [`ErrorEnvelope`] here, so that
//! handler errors, extractor rejections and panics all look the same.

use axum::body::{to_bytes, Body, Bytes};
use axum::extract::{ConnectInfo, OriginalUri, Request, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use cgw_core::audit::AuditLogEntry;
use cgw_core::GatewayError;
use std::net::SocketAddr;
use tracing::{debug, error};

use crate::context::RequestContext;
use crate::error::{ApiError, ErrorEnvelope, FailureReport};
use crate::state::GatewayState;

/// Largest framework error body read back as an error message.
const REJECTION_BODY_LIMIT: usize = 64 * 1024;

/// Request body bytes included in an error log line.
const LOGGED_BODY_CHARS: usize = 1024;

pub async fn track_request(State(state): State<GatewayState>, request: Request, next: Next) -> Response {
    let ctx = RequestContext::start();
    let url = request
        .extensions()
        .get::<OriginalUri>()
        .map(|OriginalUri(uri)| uri.to_string())
        .unwrap_or_else(|| request.uri().to_string());
    let user_ip = client_ip(&request);

    let (parts, body) = request.into_parts();
    let (response, request_body) = match to_bytes(body, state.config.max_body_bytes).await {
        Ok(bytes) => {
            let mut request = Request::from_parts(parts, Body::from(bytes.clone()));
            request.extensions_mut().insert(ctx.clone());
            (next.run(request).await, bytes)
        }
        Err(e) => {
            let err = GatewayError::client_input(format!("Request body could not be read: {e}"));
            (ApiError::from(err).into_response(), Bytes::new())
        }
    };
    let request_body = String::from_utf8_lossy(&request_body).into_owned();

    let status = response.status();
    let response = if status.is_client_error() || status.is_server_error() {
        into_envelope(&state, &ctx, response, &url, &user_ip, &request_body).await
    } else {
        response
    };

    let response_time_ms = ctx.elapsed_ms();
    debug!("Response time: {:.3}ms", response_time_ms);

    state
        .audit
        .record(&AuditLogEntry {
            table_id: ctx.table_id().map(str::to_string),
            user_id: ctx.user_id().to_string(),
            user_ip,
            request_time: ctx.start_date(),
            response_time_ms,
            url,
            request_body,
            request_type: ctx.request_type().to_string(),
            status_code: response.status().as_u16(),
        })
        .await;

    response
}

/// Log the failure and replace the body with the error envelope. Status and
/// headers of the handler response are kept.
async fn into_envelope(
    state: &GatewayState,
    ctx: &RequestContext,
    response: Response,
    url: &str,
    user_ip: &str,
    request_body: &str,
) -> Response {
    let (mut parts, body) = response.into_parts();

    let report = match parts.extensions.remove::<FailureReport>() {
        Some(report) => report,
        None => {
            let text = to_bytes(body, REJECTION_BODY_LIMIT)
                .await
                .map(|b| String::from_utf8_lossy(&b).trim().to_string())
                .unwrap_or_default();
            let message = if text.is_empty() {
                parts.status.canonical_reason().unwrap_or("Request failed").to_string()
            } else {
                text
            };
            FailureReport {
                status: parts.status,
                message,
                trace: None,
                domain: parts.status != StatusCode::INTERNAL_SERVER_ERROR,
            }
        }
    };

    error!(
        status_code = report.status.as_u16(),
        message = %report.message,
        url,
        user_ip,
        request_type = ctx.request_type(),
        table_id = ctx.table_id().unwrap_or(""),
        user_id = ctx.user_id(),
        request_time = %ctx.start_date().to_rfc3339(),
        response_time_ms = ctx.elapsed_ms(),
        request_body = %truncate(request_body, LOGGED_BODY_CHARS),
        traceback = ?report.trace,
        "Request failed"
    );

    let envelope = ErrorEnvelope::new(ctx, &report, !state.config.is_production());
    let payload = match serde_json::to_vec(&envelope) {
        Ok(payload) => payload,
        Err(e) => {
            debug!(error = %e, "Error envelope serialization failed");
            report.message.into_bytes()
        }
    };

    parts.headers.remove(header::CONTENT_LENGTH);
    parts
        .headers
        .insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    Response::from_parts(parts, Body::from(payload))
}

/// Caller address: first `X-Forwarded-For` hop, else the socket peer.
fn client_ip(request: &Request) -> String {
    if let Some(forwarded) = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        return forwarded.to_string();
    }
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_default()
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
