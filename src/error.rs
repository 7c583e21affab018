//! Gateway error taxonomy
//!
//! Every failure carries a machine-readable kind (the `code` GraphQL error
//! extension) plus a human-readable message. `Unavailable` marks upstream
//! timeouts and transport faults and is the only kind a caller may retry.

use async_graphql::ErrorExtensions;
use thiserror::Error;

/// Errors surfaced by the gateway's resolution, authorization, and
/// relationship logic.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// Missing/invalid token, caller is not the owner, or insufficient role.
    #[error("Unauthorized")]
    Unauthorized,

    /// A referenced entity is absent.
    #[error("{0} not found")]
    NotFound(String),

    /// `addFollow` target already present in the follows set.
    #[error("Already following")]
    AlreadyFollowing,

    /// `removeFollow` target absent from the follows set.
    #[error("Not following")]
    NotFollowing,

    /// Too many failed login attempts inside the configured window.
    #[error("Too many login attempts, try again later")]
    RateLimited,

    /// Malformed input or configuration.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Identity service or store unreachable or timed out.
    #[error("Upstream unavailable: {0}")]
    Unavailable(String),
}

impl GatewayError {
    /// Shorthand for a `NotFound` naming the missing entity kind.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Machine-readable error kind, attached to GraphQL responses as the
    /// `code` extension.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized => "UNAUTHORIZED",
            Self::NotFound(_) => "NOT_FOUND",
            Self::AlreadyFollowing => "ALREADY_FOLLOWING",
            Self::NotFollowing => "NOT_FOLLOWING",
            Self::RateLimited => "RATE_LIMITED",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Unavailable(_) => "UNAVAILABLE",
        }
    }
}

impl ErrorExtensions for GatewayError {
    fn extend(&self) -> async_graphql::Error {
        async_graphql::Error::new(self.to_string())
            .extend_with(|_, e| e.set("code", self.code()))
    }
}

/// Result type for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(GatewayError::Unauthorized.code(), "UNAUTHORIZED");
        assert_eq!(GatewayError::not_found("Picture").code(), "NOT_FOUND");
        assert_eq!(GatewayError::AlreadyFollowing.code(), "ALREADY_FOLLOWING");
        assert_eq!(GatewayError::NotFollowing.code(), "NOT_FOLLOWING");
        assert_eq!(GatewayError::RateLimited.code(), "RATE_LIMITED");
        assert_eq!(GatewayError::Unavailable("x".into()).code(), "UNAVAILABLE");
    }

    #[test]
    fn not_found_names_the_entity() {
        assert_eq!(
            GatewayError::not_found("Picture").to_string(),
            "Picture not found"
        );
    }
}
