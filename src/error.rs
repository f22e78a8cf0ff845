use std::error::Error as StdError;

use thiserror::Error;

/// Failures validating key material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum KeyError {
    /// The candidate did not decode from url-safe base64 to exactly
    /// [`KEY_LEN`](crate::key::KEY_LEN) bytes.
    #[error("key must be 32 url-safe base64-encoded bytes")]
    Malformed,
}

/// Failures decoding, verifying or decrypting a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TokenError {
    /// Bad text encoding, unknown version marker, or truncated fields.
    #[error("token is malformed")]
    Malformed,
    /// The integrity tag did not verify. Covers both a wrong key and
    /// tampered or corrupted content.
    #[error("token signature is invalid; wrong key or tampered-with data")]
    InvalidSignature,
    /// The embedded timestamp is outside the configured freshness window.
    #[error("token has expired")]
    Expired,
}

/// The operating system's secure random source failed.
///
/// Nothing can be encrypted safely without entropy, so callers should treat
/// this as fatal rather than retrying.
#[derive(Debug, Error)]
#[error("secure random source failed")]
pub struct EntropySourceFailure(#[source] pub(crate) rand::rngs::SysError);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorCategory {
    /// Any failure that cannot be confidently attributed to any other error
    /// category in this enum.
    ///
    /// In particular this means that use of Internal is never a guarantee
    /// the error is not, for example due to a user error - merely that it
    /// cannot be confidently determined by the code.
    Internal,

    /// The user provided invalid input or performed an action that is
    /// unsupported or impossible to complete.
    User,
}

/// Fine-grained condition flags for consumers that want to branch on error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Key material did not decode to the required length.
    KeyMalformed,
    /// Token text could not be decoded into its fields.
    TokenMalformed,
    /// Authentication failed due to a wrong key, tampering or corruption.
    InvalidSignature,
    /// Token is older than the allowed age, or too far in the future.
    Expired,
    /// The secure random source failed.
    EntropySource,
    /// Key could not be obtained from the configured source.
    KeyUnavailable,
    /// A YAML document could not be serialized or parsed.
    Document,
    /// Interaction with the filesystem, stdin/stdout, or other I/O failed.
    Io,
}

#[derive(Debug, Error)]
#[error("{msg}")]
pub struct SealdocError {
    /// Broad error category, always provided.
    pub category: ErrorCategory,
    /// Optional specific condition tag for consumers that need to
    /// branch their behavior. Any code consuming errors MUST handle
    /// the absence of a defined kind.
    pub kind: Option<ErrorKind>,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
    msg: String,
}

impl SealdocError {
    /// Creates a new error with a required category and display message.
    pub fn new(category: ErrorCategory, msg: impl Into<String>) -> Self {
        Self {
            category,
            kind: None,
            source: None,
            msg: msg.into(),
        }
    }

    /// Creates a new error that also tags the failure with a kind.
    pub fn with_kind(category: ErrorCategory, kind: ErrorKind, msg: impl Into<String>) -> Self {
        Self {
            category,
            kind: Some(kind),
            source: None,
            msg: msg.into(),
        }
    }

    /// Creates a new error that carries both a kind tag and the originating source error.
    pub fn with_kind_and_source(
        category: ErrorCategory,
        kind: ErrorKind,
        msg: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self {
            category,
            kind: Some(kind),
            source: Some(Box::new(source)),
            msg: msg.into(),
        }
    }

    /// The user-facing message carried by the error.
    pub fn message(&self) -> &str {
        &self.msg
    }

    /// Returns the preserved source error if present.
    pub fn source_error(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.source.as_deref()
    }

    /// Wraps the current error with a higher-level message while preserving the original as source.
    pub fn with_context(self, msg: impl Into<String>) -> Self {
        let category = self.category;
        let kind = self.kind;
        Self {
            category,
            kind,
            source: Some(Box::new(self)),
            msg: msg.into(),
        }
    }
}

impl From<KeyError> for SealdocError {
    fn from(err: KeyError) -> Self {
        let kind = match err {
            KeyError::Malformed => ErrorKind::KeyMalformed,
        };
        Self::with_kind_and_source(ErrorCategory::User, kind, err.to_string(), err)
    }
}

impl From<TokenError> for SealdocError {
    fn from(err: TokenError) -> Self {
        let kind = match err {
            TokenError::Malformed => ErrorKind::TokenMalformed,
            TokenError::InvalidSignature => ErrorKind::InvalidSignature,
            TokenError::Expired => ErrorKind::Expired,
        };
        Self::with_kind_and_source(ErrorCategory::User, kind, err.to_string(), err)
    }
}

impl From<EntropySourceFailure> for SealdocError {
    fn from(err: EntropySourceFailure) -> Self {
        Self::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::EntropySource,
            err.to_string(),
            err,
        )
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, SealdocError>;
