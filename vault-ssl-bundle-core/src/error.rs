//! Error taxonomy for bundle resolution.
//!
//! Every variant is `Clone` so that one failed load can be handed to all
//! callers that were waiting on it.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while reading a secret from the store.
///
/// These are passed through to callers unchanged inside
/// [`BundleError::FetchTransportFailure`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("Secret store request failed: {0}")]
    Transport(String),

    #[error("Secret store returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to decode secret store response: {0}")]
    Decode(String),
}

/// Errors that can occur while resolving, decoding or building a bundle
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BundleError {
    #[error("Unsupported bundle name '{0}': expected 'vault:<path>'")]
    UnsupportedBundleName(String),

    #[error("Missing secret data at '{path}': {reason}")]
    MissingSecretData { path: String, reason: String },

    #[error("Failed to parse certificate: {0}")]
    MalformedCertificate(String),

    #[error("Failed to parse private key: {0}")]
    MalformedPrivateKey(String),

    #[error("Failed to initialize key/trust managers: {0}")]
    ManagerInitializationFailure(String),

    #[error("Failed to fetch secret: {0}")]
    FetchTransportFailure(#[from] FetchError),

    #[error("SSL bundle not found: {0}")]
    NoSuchBundle(String),

    #[error("Failed to read {path}: {message}")]
    Io { path: PathBuf, message: String },
}

impl BundleError {
    pub fn missing(path: &str, reason: impl Into<String>) -> Self {
        Self::MissingSecretData {
            path: path.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether the failure came from data the secret store returned, as opposed
    /// to the caller's input or the store being unreachable.
    pub fn is_data_error(&self) -> bool {
        matches!(
            self,
            Self::MissingSecretData { .. }
                | Self::MalformedCertificate(_)
                | Self::MalformedPrivateKey(_)
                | Self::ManagerInitializationFailure(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, BundleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_error_passes_through_verbatim() {
        let err: BundleError = FetchError::Status {
            status: 403,
            body: "permission denied".to_string(),
        }
        .into();

        assert_eq!(
            err.to_string(),
            "Failed to fetch secret: Secret store returned 403: permission denied"
        );
        assert!(!err.is_data_error());
    }

    #[test]
    fn test_data_errors_are_classified() {
        assert!(BundleError::missing("secret/x", "no certificate").is_data_error());
        assert!(BundleError::MalformedPrivateKey("bad".into()).is_data_error());
        assert!(!BundleError::UnsupportedBundleName("x".into()).is_data_error());
        assert!(!BundleError::NoSuchBundle("x".into()).is_data_error());
    }
}
