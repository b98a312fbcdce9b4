//! Unified error types and result handling.
//!
//! The taxonomy mirrors how failures are allowed to propagate: only
//! [`AuthError`] reaches callers as a typed result they must branch on.
//! Sync, subscription and cache failures are caught at the pipeline
//! boundary, logged, and never interrupt the optimistic in-memory state.

use thiserror::Error;

/// Authentication failures, drawn from a fixed vocabulary so the UI can map
/// them to human-readable messages.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// The password did not match the registered account.
    #[error("wrong credential")]
    WrongCredential,

    /// No account is registered under the given email.
    #[error("account not found")]
    NotFound,

    /// An account already exists under the given email.
    #[error("email already registered")]
    AlreadyRegistered,

    /// The auth provider could not be reached.
    #[error("network failure during authentication: {0}")]
    Network(String),

    /// An auth or profile-resolution call exceeded its bounded timeout.
    #[error("authentication timed out")]
    Timeout,
}

impl AuthError {
    /// Stable error code, matching the provider-side vocabulary.
    pub fn code(&self) -> &'static str {
        match self {
            Self::WrongCredential => "auth/wrong-credential",
            Self::NotFound => "auth/user-not-found",
            Self::AlreadyRegistered => "auth/email-already-in-use",
            Self::Network(_) => "auth/network-failure",
            Self::Timeout => "auth/timeout",
        }
    }

    /// Message suitable for showing directly to the user.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::WrongCredential => "Incorrect email or password.",
            Self::NotFound => "No account exists for that email.",
            Self::AlreadyRegistered => "An account already exists for that email.",
            Self::Network(_) => "Could not reach the server. Check your connection.",
            Self::Timeout => "The server took too long to respond. Try again.",
        }
    }
}

/// A remote create/update/delete failed. Logged by the mutation pipeline;
/// the optimistic local state is deliberately left in place.
#[derive(Debug, Clone, Error)]
pub enum SyncError {
    /// The document store rejected or failed the call.
    #[error("remote store error: {0}")]
    Store(String),

    /// A remote document did not match its expected shape.
    #[error("malformed remote document {id}: {reason}")]
    Decode {
        /// Raw remote document id.
        id: String,
        /// Decode failure detail.
        reason: String,
    },

    /// The referenced document does not exist remotely.
    #[error("remote document not found: {0}")]
    NotFound(String),
}

/// Terminal failure of a live collection subscription (permission loss,
/// quota). Fires once; there is no auto-retry and the store keeps its last
/// good snapshot.
#[derive(Debug, Clone, Error)]
#[error("subscription failed: {reason}")]
pub struct SubscriptionError {
    /// Provider-reported failure detail.
    pub reason: String,
}

/// Local cache serialization or storage failure. Never fatal: the in-memory
/// store remains authoritative even if the mirror write fails.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cache serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {message}")]
    Config {
        /// What was wrong with the configuration.
        message: String,
    },

    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    #[error("Subscription error: {0}")]
    Subscription(#[from] SubscriptionError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Notification error: {0}")]
    Notify(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;
