//! Error types for the garden client map
//!
//! Errors carry the canonical form of the client set key they relate to so
//! that log lines and reconciler conditions point at the cluster in question.
//! The type is `Clone` because the outcome of a single client set build is
//! shared by every caller that waited on it.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Main error type for client map operations
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {0}")]
    Kube(#[source] Arc<kube::Error>),

    /// The routing facts for a cluster cannot be determined yet
    #[error("cluster {key} cannot be resolved yet: {message}")]
    Unresolved {
        /// Canonical key of the cluster
        key: String,
        /// What is missing (e.g. "shoot is not scheduled yet")
        message: String,
    },

    /// Routing target found but its credentials are incomplete
    #[error("credentials for cluster {key} are not ready: {message}")]
    CredentialsNotReady {
        /// Canonical key of the cluster
        key: String,
        /// What is missing (e.g. "token not populated")
        message: String,
    },

    /// Building a client from the credential material failed
    #[error("failed to build client set for {key}: {message}")]
    Build {
        /// Canonical key of the cluster
        key: String,
        /// Description of what failed
        message: String,
    },

    /// A factory or client map received a key of the wrong category
    #[error("unsupported client set key {key}: expected a {expected} key")]
    UnsupportedKey {
        /// Canonical key that was passed in
        key: String,
        /// Category the receiver handles
        expected: String,
    },

    /// A factory call did not finish in time
    #[error("client set operation for {key} timed out after {after:?}")]
    Timeout {
        /// Canonical key of the cluster
        key: String,
        /// Configured bound that elapsed
        after: Duration,
    },

    /// Invalid configuration
    #[error("configuration error: {message}")]
    Config {
        /// Description of what's invalid
        message: String,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred
        context: String,
    },
}

impl From<kube::Error> for Error {
    fn from(e: kube::Error) -> Self {
        Self::Kube(Arc::new(e))
    }
}

impl Error {
    /// Create an unresolved-identity error
    pub fn unresolved(key: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Unresolved {
            key: key.into(),
            message: msg.into(),
        }
    }

    /// Create a credentials-not-ready error
    pub fn credentials_not_ready(key: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::CredentialsNotReady {
            key: key.into(),
            message: msg.into(),
        }
    }

    /// Create a client build error
    pub fn build(key: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Build {
            key: key.into(),
            message: msg.into(),
        }
    }

    /// Create an unsupported key error
    pub fn unsupported_key(key: impl Into<String>, expected: impl Into<String>) -> Self {
        Self::UnsupportedKey {
            key: key.into(),
            expected: expected.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(key: impl Into<String>, after: Duration) -> Self {
        Self::Timeout {
            key: key.into(),
            after,
        }
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create an internal error with the given message
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: UNKNOWN_CONTEXT.to_string(),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Check if the calling reconciler should requeue on this error
    ///
    /// Unresolved identities and missing credentials clear up on their own once
    /// other controllers catch up, so both requeue with backoff. Programmer
    /// errors never do.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube(source) => !matches!(
                source.as_ref(),
                kube::Error::Api(ae) if (400..500).contains(&ae.code) && ae.code != 404 && ae.code != 429
            ),
            Error::Unresolved { .. } => true,
            Error::CredentialsNotReady { .. } => true,
            Error::Build { .. } => true,
            Error::Timeout { .. } => true,
            Error::UnsupportedKey { .. } => false,
            Error::Config { .. } => false,
            Error::Internal { .. } => false,
        }
    }

    /// Check if this error indicates a bug in the caller
    pub fn is_programmer_error(&self) -> bool {
        matches!(self, Error::UnsupportedKey { .. })
    }

    /// Get the canonical cluster key if this error is associated with one
    pub fn key(&self) -> Option<&str> {
        match self {
            Error::Unresolved { key, .. }
            | Error::CredentialsNotReady { key, .. }
            | Error::Build { key, .. }
            | Error::UnsupportedKey { key, .. }
            | Error::Timeout { key, .. } => Some(key),
            Error::Kube(_) | Error::Config { .. } | Error::Internal { .. } => None,
        }
    }
}
