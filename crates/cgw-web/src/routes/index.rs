//! Service-level routes.

use axum::extract::{Extension, Path};
use axum::http::Uri;
use cgw_core::GatewayError;
use std::time::Duration;

use crate::context::RequestContext;
use crate::error::ApiError;

pub async fn index(Extension(ctx): Extension<RequestContext>) -> String {
    ctx.set_request_type("index");
    format!("ChunkedGraph Gateway -- {}", env!("CARGO_PKG_VERSION"))
}

/// Diagnostic delay.
pub async fn sleep(Extension(ctx): Extension<RequestContext>, Path(seconds): Path<u64>) -> String {
    ctx.set_request_type("sleep");
    tokio::time::sleep(Duration::from_secs(seconds)).await;
    format!("zzz... {seconds} ... awake")
}

pub async fn not_found(uri: Uri) -> ApiError {
    GatewayError::not_found(format!("No route for {}", uri.path())).into()
}
