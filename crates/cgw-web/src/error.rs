//! HTTP projection of gateway errors.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use cgw_core::GatewayError;
use serde::{Deserialize, Serialize};
use std::any::Any;

use crate::context::RequestContext;

/// Handler error. Wraps [`GatewayError`] so it can become a response.
#[derive(Debug)]
pub struct ApiError(pub GatewayError);

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        Self(err)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self(GatewayError::Unclassified(err))
    }
}

/// Failure details attached to an error response as an extension. The
/// lifecycle middleware turns it into the final [`ErrorEnvelope`].
#[derive(Debug, Clone)]
pub struct FailureReport {
    pub status: StatusCode,
    pub message: String,
    pub trace: Option<Vec<String>>,
    pub domain: bool,
}

impl FailureReport {
    pub fn from_error(err: &GatewayError) -> Self {
        Self {
            status: StatusCode::from_u16(err.status_code())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            message: err.to_string(),
            trace: err.trace(),
            domain: err.is_domain(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let report = FailureReport::from_error(&self.0);
        let mut response = (
            report.status,
            Json(serde_json::json!({
                "status_code": report.status.as_u16(),
                "message": report.message,
            })),
        )
            .into_response();
        response.extensions_mut().insert(report);
        response
    }
}

/// JSON body of every error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub timestamp: String,
    pub duration_ms: f64,
    pub status_code: u16,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traceback: Option<Vec<String>>,
}

impl ErrorEnvelope {
    /// Envelope for `report`. The trace is kept only when `include_trace`
    /// is set and the failure was unclassified.
    pub fn new(ctx: &RequestContext, report: &FailureReport, include_trace: bool) -> Self {
        Self {
            timestamp: ctx.start_date().to_rfc3339(),
            duration_ms: ctx.elapsed_ms(),
            status_code: report.status.as_u16(),
            message: report.message.clone(),
            traceback: if include_trace && !report.domain {
                report.trace.clone()
            } else {
                None
            },
        }
    }
}

/// Response for a panicking handler: an unclassified 500.
pub fn handle_panic(payload: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };
    ApiError::from(anyhow::anyhow!("Handler panicked: {detail}")).into_response()
}
