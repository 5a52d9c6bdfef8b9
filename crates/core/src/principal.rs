//! Authenticated principal and request context.

use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// The authenticated caller of a request.
///
/// Produced by whatever authenticates the request (token validation lives
/// outside this crate). Only the id format is checked here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub organization_id: String,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

impl Principal {
    /// Create a principal, rejecting ids that cannot be used as cache-key parts.
    pub fn new(
        organization_id: impl Into<String>,
        user_id: impl Into<String>,
        role: Option<String>,
    ) -> AppResult<Self> {
        let organization_id = organization_id.into();
        let user_id = user_id.into();

        validate_id("organization_id", &organization_id)?;
        validate_id("user_id", &user_id)?;

        Ok(Self {
            organization_id,
            user_id,
            role,
        })
    }
}

fn validate_id(field: &str, value: &str) -> AppResult<()> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{} must not be empty", field)));
    }
    if value.contains(':') {
        return Err(AppError::Validation(format!(
            "{} must not contain ':' (got {:?})",
            field, value
        )));
    }
    Ok(())
}

/// Per-request context: who is asking, plus a correlation id for logs.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub principal: Principal,
    pub request_id: String,
}

impl RequestContext {
    /// Create a context with a freshly generated request id.
    pub fn new(principal: Principal) -> Self {
        Self {
            principal,
            request_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    /// Reuse a caller-supplied correlation id.
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    pub fn organization_id(&self) -> &str {
        &self.principal.organization_id
    }

    pub fn user_id(&self) -> &str {
        &self.principal.user_id
    }

    /// Span carrying the request's correlation fields.
    pub fn span(&self) -> tracing::Span {
        tracing::info_span!(
            "request",
            request_id = %self.request_id,
            organization_id = %self.principal.organization_id,
            user_id = %self.principal.user_id,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_principal_validation() {
        assert!(Principal::new("org1", "alice", None).is_ok());
        assert!(matches!(
            Principal::new("", "alice", None),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            Principal::new("org:1", "alice", None),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            Principal::new("org1", "  ", None),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_request_ids_are_unique() {
        let principal = Principal::new("org1", "alice", None).unwrap();
        let a = RequestContext::new(principal.clone());
        let b = RequestContext::new(principal);
        assert_ne!(a.request_id, b.request_id);
        assert_eq!(a.organization_id(), "org1");
        assert_eq!(a.user_id(), "alice");
    }

    #[test]
    fn test_explicit_request_id() {
        let principal = Principal::new("org1", "alice", Some("admin".to_string())).unwrap();
        let ctx = RequestContext::new(principal).with_request_id("req-42");
        assert_eq!(ctx.request_id, "req-42");
        assert_eq!(ctx.principal.role.as_deref(), Some("admin"));
    }
}
