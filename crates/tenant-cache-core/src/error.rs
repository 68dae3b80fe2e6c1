use thiserror::Error;

/// A value that would break the cache key scheme.
///
/// These are configuration-time failures: a malformed namespace or tenant id
/// can corrupt wildcard prefix matching for every tenant, so callers are
/// expected to fail fast instead of serving traffic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeySchemeError {
    #[error("Invalid tenant id {value:?}: {reason}")]
    InvalidTenant { value: String, reason: &'static str },

    #[error("Invalid namespace {value:?}: {reason}")]
    InvalidNamespace { value: String, reason: &'static str },

    #[error("Cache identifier must not be empty")]
    EmptyIdentifier,
}

impl KeySchemeError {
    pub(crate) fn tenant(value: &str, reason: &'static str) -> Self {
        Self::InvalidTenant {
            value: value.to_string(),
            reason,
        }
    }

    pub(crate) fn namespace(value: &str, reason: &'static str) -> Self {
        Self::InvalidNamespace {
            value: value.to_string(),
            reason,
        }
    }
}

/// Failure to turn a wire message into an [`crate::InvalidationEvent`].
#[derive(Debug, Error)]
pub enum EventError {
    #[error("Malformed invalidation payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unresolvable invalidation event: {0}")]
    KeyScheme(#[from] KeySchemeError),
}
