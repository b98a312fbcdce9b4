//! Authentication provider interface.
//!
//! The session binder consumes identity through this narrow seam: credential
//! calls that resolve to a uid, and a push-style identity feed that fires on
//! every login and logout. Profile data beyond uid and email lives in the
//! document store, not here.

pub mod memory;

use async_trait::async_trait;
use tokio::sync::watch;

use crate::errors::AuthError;

/// The identity the provider vouches for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub uid: String,
    pub email: String,
}

/// External authentication collaborator.
///
/// `observe_identity` is the single source of login/logout events; the
/// credential methods drive it but callers react to the feed, not to the
/// return values, for state changes.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Signs in with email and password.
    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, AuthError>;

    /// Registers a new user and signs them in.
    async fn sign_up(&self, email: &str, password: &str) -> Result<Identity, AuthError>;

    /// Ends the current session.
    async fn sign_out(&self) -> Result<(), AuthError>;

    /// Push-style identity feed; holds `None` while signed out.
    fn observe_identity(&self) -> watch::Receiver<Option<Identity>>;
}
