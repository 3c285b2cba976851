//! Error types shared by the puzzle runtime.
//!
//! Storage and remote failures are kept in their own enums so callers can tell
//! "the session is not durable" apart from "that puzzle does not exist".

use thiserror::Error;

/// Failures of the local persistence tiers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// The browser (or test store) refused the write because it is full.
    #[error("storage quota exceeded")]
    QuotaExceeded,

    /// The store cannot be reached at all (private mode, disabled storage, ...).
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// A stored record could not be decoded.
    #[error("stored record `{key}` is corrupt: {message}")]
    Corrupt { key: String, message: String },
}

impl StorageError {
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    pub fn corrupt(key: impl Into<String>, message: impl ToString) -> Self {
        Self::Corrupt {
            key: key.into(),
            message: message.to_string(),
        }
    }

    /// True when freeing space (e.g. deleting custom puzzles) could fix the failure.
    pub fn is_quota(&self) -> bool {
        matches!(self, Self::QuotaExceeded)
    }
}

/// Failures talking to the hosted catalog or the content repository.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// No bearer credential has been entered yet.
    #[error("no repository credential configured")]
    MissingCredential,

    /// The service rejected the credential (HTTP 401).
    #[error("credential rejected: {0}")]
    Unauthorized(String),

    /// The request never produced a response.
    #[error("network error: {0}")]
    Network(String),

    /// The service answered with a non-success status.
    #[error("remote error {status}: {message}")]
    Api { status: u16, message: String },

    /// The response body did not have the expected shape.
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl RemoteError {
    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    pub fn decode(msg: impl ToString) -> Self {
        Self::Decode(msg.to_string())
    }

    /// True when the stored credential must be discarded and re-prompted.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Unauthorized(_) | Self::MissingCredential)
    }
}

/// Top-level error for puzzle operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PuzzleError {
    /// Unknown puzzle, custom puzzle or target.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Authored or imported data breaks a puzzle rule.
    #[error("invalid puzzle: {0}")]
    Invalid(String),

    /// A position key that does not belong to the loaded puzzle.
    #[error("unknown position key: {0}")]
    UnknownPosition(String),

    /// An operation that needs an active puzzle ran without one.
    #[error("no puzzle loaded")]
    NoPuzzleLoaded,

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Remote(#[from] RemoteError),
}

impl PuzzleError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// The persistence failure behind this error, if any.
    pub fn storage(&self) -> Option<&StorageError> {
        match self {
            Self::Storage(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_errors_are_distinguishable_from_not_found() {
        let err: PuzzleError = StorageError::QuotaExceeded.into();
        assert!(!err.is_not_found());
        assert_eq!(err.storage(), Some(&StorageError::QuotaExceeded));
        assert!(err.storage().is_some_and(StorageError::is_quota));

        let missing = PuzzleError::not_found("puzzle", "zoo");
        assert!(missing.is_not_found());
        assert!(missing.storage().is_none());
        assert_eq!(missing.to_string(), "puzzle not found: zoo");
    }

    #[test]
    fn only_credential_failures_are_auth_errors() {
        assert!(RemoteError::Unauthorized("Bad credentials".into()).is_auth());
        assert!(RemoteError::MissingCredential.is_auth());
        assert!(!RemoteError::network("offline").is_auth());
        assert!(
            !RemoteError::Api {
                status: 422,
                message: "sha missing".into()
            }
            .is_auth()
        );
    }
}
