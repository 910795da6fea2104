//! Centralized error types for the gateway.

use thiserror::Error;

/// Main error type for gateway operations.
///
/// Every variant except [`GatewayError::Unclassified`] is a domain error
/// carrying its own HTTP status. Unclassified errors always project to 500.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("{0}")]
    ClientInput(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Invalid table id: '{0}'")]
    InvalidTable(String),

    #[error("{0}")]
    Authorization(String),

    #[error("{message}")]
    Upstream { status: u16, message: String },

    #[error(transparent)]
    Unclassified(#[from] anyhow::Error),
}

/// Result type for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

impl GatewayError {
    /// Create a client input error (400).
    pub fn client_input(msg: impl Into<String>) -> Self {
        Self::ClientInput(msg.into())
    }

    /// Create a not found error (404).
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create an authorization error (403).
    pub fn authorization(msg: impl Into<String>) -> Self {
        Self::Authorization(msg.into())
    }

    /// Create an upstream error with the status reported by the collaborator.
    ///
    /// Statuses outside the 5xx range are coerced to 502.
    pub fn upstream(status: u16, msg: impl Into<String>) -> Self {
        let status = if (500..=599).contains(&status) { status } else { 502 };
        Self::Upstream {
            status,
            message: msg.into(),
        }
    }

    /// HTTP status code this error projects to.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::ClientInput(_) => 400,
            Self::NotFound(_) | Self::InvalidTable(_) => 404,
            Self::Authorization(_) => 403,
            Self::Upstream { status, .. } => *status,
            Self::Unclassified(_) => 500,
        }
    }

    /// Whether this is a domain error (explicit status) rather than an
    /// unclassified fault.
    pub fn is_domain(&self) -> bool {
        !matches!(self, Self::Unclassified(_))
    }

    /// Failure trace, one line per cause. Only unclassified errors carry one.
    pub fn trace(&self) -> Option<Vec<String>> {
        match self {
            Self::Unclassified(err) => Some(
                format!("{err:?}")
                    .lines()
                    .map(str::to_string)
                    .collect(),
            ),
            _ => None,
        }
    }
}
