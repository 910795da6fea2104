//! Caller identity and role checks.
//!
//! Authentication itself belongs to an external identity provider. The
//! gateway hands it the caller's token and gets back a user with roles.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{GatewayError, GatewayResult};

/// Role required for merge and split unless configured otherwise.
pub const DEFAULT_EDIT_ROLE: &str = "edit_all";

/// Authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl AuthUser {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

/// Resolves a bearer token to a user. `Ok(None)` means the token is unknown.
#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn authenticate(&self, token: &str) -> GatewayResult<Option<AuthUser>>;
}

/// Resolve `token` and require `role`. Fails with an authorization error
/// when the token is missing, unknown or lacks the role.
pub async fn require_role(
    authorizer: &dyn Authorizer,
    token: Option<&str>,
    role: &str,
) -> GatewayResult<AuthUser> {
    let token = token.ok_or_else(|| GatewayError::authorization("Authentication required"))?;

    let user = authorizer
        .authenticate(token)
        .await?
        .ok_or_else(|| GatewayError::authorization("Invalid or expired token"))?;

    if !user.has_role(role) {
        debug!(user_id = %user.id, role, "Caller lacks required role");
        return Err(GatewayError::authorization(format!(
            "User {} lacks the '{role}' role",
            user.id
        )));
    }

    Ok(user)
}

/// Fixed token table, configured at startup.
#[derive(Debug, Clone, Default)]
pub struct StaticAuthorizer {
    users: HashMap<String, AuthUser>,
}

impl StaticAuthorizer {
    pub fn new(users: HashMap<String, AuthUser>) -> Self {
        Self { users }
    }

    pub fn with_user(mut self, token: &str, user: AuthUser) -> Self {
        self.users.insert(token.to_string(), user);
        self
    }
}

#[async_trait]
impl Authorizer for StaticAuthorizer {
    async fn authenticate(&self, token: &str) -> GatewayResult<Option<AuthUser>> {
        Ok(self.users.get(token).cloned())
    }
}

/// Client for an HTTP identity service exposing `GET /api/v1/user/cache`.
#[derive(Clone)]
pub struct RemoteAuthorizer {
    client: reqwest::Client,
    base_url: String,
}

impl RemoteAuthorizer {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(2))
                .build()
                .unwrap_or_default(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl Authorizer for RemoteAuthorizer {
    async fn authenticate(&self, token: &str) -> GatewayResult<Option<AuthUser>> {
        let url = format!("{}/api/v1/user/cache", self.base_url);
        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, url = %url, "Identity service unreachable");
                GatewayError::upstream(502, "Identity service unreachable")
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(GatewayError::upstream(
                502,
                format!("Identity service error ({status})"),
            ));
        }

        let user = response
            .json::<AuthUser>()
            .await
            .map_err(|e| GatewayError::upstream(502, format!("Malformed identity response: {e}")))?;
        Ok(Some(user))
    }
}
