//! Caller credentials.

use axum::extract::FromRequestParts;
use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::http::request::Parts;
use cgw_core::auth::{require_role, AuthUser};
use cgw_core::GatewayResult;
use std::convert::Infallible;

use crate::context::RequestContext;
use crate::state::GatewayState;

/// Name of the query parameter and cookie carrying the token.
pub const TOKEN_PARAM: &str = "middle_auth_token";

/// Bearer token of the caller, if any. Extraction never fails; missing
/// credentials are rejected where a role is required.
#[derive(Debug, Clone, Default)]
pub struct Credentials(pub Option<String>);

impl<S: Send + Sync> FromRequestParts<S> for Credentials {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(token_from_parts(parts)))
    }
}

fn token_from_parts(parts: &Parts) -> Option<String> {
    let bearer = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|v| v.trim().to_string());

    // Query values are form-encoded, so `+` stands for a space.
    let query = || {
        parts.uri.query().and_then(|q| {
            q.split('&')
                .filter_map(|pair| pair.split_once('='))
                .find(|(k, _)| *k == TOKEN_PARAM)
                .and_then(|(_, v)| percent_decode(&v.replace('+', " ")))
        })
    };

    let cookie = || {
        parts
            .headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(';'))
            .filter_map(|c| c.trim().split_once('='))
            .find(|(k, _)| *k == TOKEN_PARAM)
            .and_then(|(_, v)| percent_decode(v))
    };

    bearer.or_else(query).or_else(cookie).filter(|t| !t.is_empty())
}

/// `None` when the decoded bytes are not UTF-8.
fn percent_decode(raw: &str) -> Option<String> {
    urlencoding::decode(raw).ok().map(|v| v.into_owned())
}

/// Require the configured edit role. Tags the request with the user id.
pub async fn require_editor(
    state: &GatewayState,
    ctx: &RequestContext,
    credentials: &Credentials,
) -> GatewayResult<AuthUser> {
    let user = require_role(
        state.auth.as_ref(),
        credentials.0.as_deref(),
        &state.config.edit_role,
    )
    .await?;
    ctx.set_user(&user.id);
    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts(builder: axum::http::request::Builder) -> Parts {
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_token_sources() {
        let p = parts(Request::builder().uri("/x").header(AUTHORIZATION, "Bearer abc"));
        assert_eq!(token_from_parts(&p).as_deref(), Some("abc"));

        let p = parts(Request::builder().uri("/x?a=1&middle_auth_token=qq"));
        assert_eq!(token_from_parts(&p).as_deref(), Some("qq"));

        let p = parts(Request::builder().uri("/x").header(COOKIE, "theme=dark; middle_auth_token=cc"));
        assert_eq!(token_from_parts(&p).as_deref(), Some("cc"));

        let p = parts(Request::builder().uri("/x").header(AUTHORIZATION, "Basic Zm9v"));
        assert_eq!(token_from_parts(&p), None);
    }

    #[test]
    fn test_query_and_cookie_tokens_are_percent_decoded() {
        let p = parts(Request::builder().uri("/x?middle_auth_token=a%2Bb%3D%2F"));
        assert_eq!(token_from_parts(&p).as_deref(), Some("a+b=/"));

        let p = parts(Request::builder().uri("/x?middle_auth_token=two+words"));
        assert_eq!(token_from_parts(&p).as_deref(), Some("two words"));

        let p = parts(Request::builder().uri("/x").header(COOKIE, "middle_auth_token=a%2Bb%3D"));
        assert_eq!(token_from_parts(&p).as_deref(), Some("a+b="));

        let p = parts(Request::builder().uri("/x").header(COOKIE, "middle_auth_token=a+b"));
        assert_eq!(token_from_parts(&p).as_deref(), Some("a+b"));

        let p = parts(Request::builder().uri("/x?middle_auth_token=%FF%FE"));
        assert_eq!(token_from_parts(&p), None);
    }

    #[test]
    fn test_header_wins_over_query() {
        let p = parts(
            Request::builder()
                .uri("/x?middle_auth_token=from-query")
                .header(AUTHORIZATION, "Bearer from-header"),
        );
        assert_eq!(token_from_parts(&p).as_deref(), Some("from-header"));
    }
}
