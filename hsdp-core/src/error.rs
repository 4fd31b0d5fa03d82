//! Provider error taxonomy

use thiserror::Error;

/// Errors produced while driving the remote APIs
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The remote API answered with a non-success status
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// Neither a response nor an error came back from an attempt
    #[error("response is nil")]
    NoResponse,

    /// The request never produced a response (DNS, TLS, connection reset)
    #[error("transport error: {0}")]
    Transport(String),

    /// The response body could not be decoded
    #[error("failed to decode response: {0}")]
    Decode(String),

    /// Family-specific "does not exist" sentinel
    #[error("{0} not found")]
    NotFound(String),

    /// Local precondition failure
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("missing credentials: {0}")]
    MissingCredentials(String),

    #[error("invalid endpoint '{0}'")]
    EndpointInvalid(String),

    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// A 403 that, under family rules, proves the entity is gone
    #[error("{0} is no longer accessible and is treated as deleted")]
    PermissionMeansGone(String),

    /// Adding a permission the remote does not know
    #[error("permission '{0}' is invalid")]
    InvalidPermission(String),

    /// A conflicting remote entity exists but differs from the desired one
    #[error("existing {kind} found but {field} mismatch")]
    AdoptMismatch { kind: String, field: String },

    #[error("operation cancelled")]
    Cancelled,

    /// Import of an identifier whose remote entity does not exist
    #[error("cannot import non-existent remote object")]
    ImportNonExistent,

    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<ProviderError>,
    },
}

/// Coarse classification used by retry and diagnostics policies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    TransientServerError,
    RateLimited,
    Unauthorized,
    Conflict,
    NotFound,
    ValidationError,
    MissingCredentials,
    PermissionMeansGone,
    InvalidPermission,
    Cancelled,
    Other,
}

impl ProviderError {
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::Http {
            status,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn mismatch(kind: impl Into<String>, field: impl Into<String>) -> Self {
        Self::AdoptMismatch {
            kind: kind.into(),
            field: field.into(),
        }
    }

    /// Prefix the error with a short phrase naming where it happened
    pub fn context(self, context: impl Into<String>) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, skipping context wrappers
    pub fn root(&self) -> &ProviderError {
        match self {
            Self::Context { source, .. } => source.root(),
            other => other,
        }
    }

    /// HTTP status carried anywhere in the context chain
    pub fn status(&self) -> Option<u16> {
        match self.root() {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.root(), Self::NotFound(_)) || self.status() == Some(404)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.root(), Self::Cancelled)
    }

    pub fn kind(&self) -> ErrorKind {
        match self.root() {
            Self::Http { status, .. } => match *status {
                404 => ErrorKind::NotFound,
                409 => ErrorKind::Conflict,
                429 => ErrorKind::RateLimited,
                401 | 403 => ErrorKind::Unauthorized,
                s if s >= 500 => ErrorKind::TransientServerError,
                _ => ErrorKind::Other,
            },
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Validation(_) | Self::EndpointInvalid(_) => ErrorKind::ValidationError,
            Self::MissingCredentials(_) => ErrorKind::MissingCredentials,
            Self::PermissionMeansGone(_) => ErrorKind::PermissionMeansGone,
            Self::InvalidPermission(_) => ErrorKind::InvalidPermission,
            Self::Cancelled => ErrorKind::Cancelled,
            _ => ErrorKind::Other,
        }
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Attach a context phrase to the error side of a result
pub trait ResultExt<T> {
    fn context(self, context: &str) -> ProviderResult<T>;
}

impl<T> ResultExt<T> for ProviderResult<T> {
    fn context(self, context: &str) -> ProviderResult<T> {
        self.map_err(|e| e.context(context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_keeps_status_and_prefixes_message() {
        let err = ProviderError::http(409, "duplicate name").context("createApplication");
        assert_eq!(err.status(), Some(409));
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(err.to_string(), "createApplication: HTTP 409: duplicate name");
    }

    #[test]
    fn not_found_sentinel_and_status() {
        assert!(ProviderError::not_found("export route").is_not_found());
        assert!(ProviderError::http(404, "gone").is_not_found());
        assert!(!ProviderError::http(403, "denied").is_not_found());
    }

    #[test]
    fn kind_classifies_statuses() {
        assert_eq!(
            ProviderError::http(503, "x").kind(),
            ErrorKind::TransientServerError
        );
        assert_eq!(ProviderError::http(429, "x").kind(), ErrorKind::RateLimited);
        assert_eq!(ProviderError::http(401, "x").kind(), ErrorKind::Unauthorized);
        assert_eq!(ProviderError::http(400, "x").kind(), ErrorKind::Other);
        assert_eq!(ProviderError::Cancelled.kind(), ErrorKind::Cancelled);
    }

    #[test]
    fn mismatch_names_the_field() {
        let err = ProviderError::mismatch("application", "description");
        assert_eq!(
            err.to_string(),
            "existing application found but description mismatch"
        );
    }
}
