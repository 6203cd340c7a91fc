use thiserror::Error;

// ---------------------------------------------------------------------------
// Storage errors
// ---------------------------------------------------------------------------

/// Errors originating from the object listing backends.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("listing prefix {prefix:?} failed: {reason}")]
    ListFailed {
        prefix: String,
        reason: String,
        retryable: bool,
    },
}

impl StorageError {
    /// Build a listing failure that the retry policy may retry.
    pub fn transient(prefix: &str, reason: impl Into<String>) -> Self {
        StorageError::ListFailed {
            prefix: prefix.to_string(),
            reason: reason.into(),
            retryable: true,
        }
    }

    /// Build a listing failure that will fail the same way on every attempt
    /// (bad credentials, missing bucket).
    pub fn terminal(prefix: &str, reason: impl Into<String>) -> Self {
        StorageError::ListFailed {
            prefix: prefix.to_string(),
            reason: reason.into(),
            retryable: false,
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            StorageError::ListFailed { retryable, .. } => *retryable,
        }
    }
}

// ---------------------------------------------------------------------------
// Signing errors
// ---------------------------------------------------------------------------

/// Errors raised while turning storage locators into signed URLs.
#[derive(Debug, Error)]
pub enum SigningError {
    #[error("invalid signing credentials: {reason}")]
    InvalidCredentials { reason: String },

    #[error("failed to sign /{bucket}/{key}: {reason}")]
    SignFailed {
        bucket: String,
        key: String,
        reason: String,
    },

    #[error("signer produced an invalid URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

// ---------------------------------------------------------------------------
// Map request errors
// ---------------------------------------------------------------------------

/// Errors surfaced to callers of the map endpoint.
#[derive(Debug, Error)]
pub enum MapError {
    #[error("method not allowed")]
    MethodNotAllowed,

    #[error("prefix cannot be empty")]
    EmptyPrefix,

    #[error(transparent)]
    Listing(#[from] StorageError),

    #[error(transparent)]
    Signing(#[from] SigningError),
}

impl MapError {
    /// Map a MapError to its HTTP status code.
    pub fn status_code(&self) -> u16 {
        match self {
            MapError::MethodNotAllowed => 405,
            MapError::EmptyPrefix => 400,
            MapError::Listing(_) => 500,
            MapError::Signing(_) => 500,
        }
    }

    /// Short label used for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            MapError::MethodNotAllowed => "method_not_allowed",
            MapError::EmptyPrefix => "empty_prefix",
            MapError::Listing(_) => "listing_failure",
            MapError::Signing(_) => "signing_failure",
        }
    }
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors detected while validating configuration at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("mapping.bucket is required")]
    MissingBucket,

    #[error("invalid {field} pattern {pattern:?}: {reason}")]
    InvalidPattern {
        field: &'static str,
        pattern: String,
        reason: String,
    },

    #[error("signer private key is not valid base64: {reason}")]
    InvalidPrivateKey { reason: String },

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}
