//! In-process [`AuthProvider`] used by tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::debug;

use super::{AuthProvider, Identity};
use crate::errors::AuthError;

#[derive(Debug)]
struct Registered {
    uid: String,
    password: String,
}

/// Credential registry plus an identity feed, mirroring how the real
/// provider behaves: unknown email, wrong password and duplicate
/// registration map to their fixed error codes.
#[derive(Debug)]
pub struct MemoryAuth {
    users: Mutex<HashMap<String, Registered>>,
    identity: watch::Sender<Option<Identity>>,
    offline: AtomicBool,
    next_uid: Mutex<u64>,
}

impl Default for MemoryAuth {
    fn default() -> Self {
        Self {
            users: Mutex::new(HashMap::new()),
            identity: watch::channel(None).0,
            offline: AtomicBool::new(false),
            next_uid: Mutex::new(0),
        }
    }
}

impl MemoryAuth {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test knob: while set, every credential call fails with a network
    /// error.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> Result<(), AuthError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(AuthError::Network("simulated outage".into()));
        }
        Ok(())
    }

    fn mint_uid(&self) -> String {
        let mut next = self
            .next_uid
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *next += 1;
        format!("uid{next}")
    }
}

#[async_trait]
impl AuthProvider for MemoryAuth {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        self.check_online()?;
        let users = self
            .users
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let registered = users.get(email).ok_or(AuthError::NotFound)?;
        if registered.password != password {
            return Err(AuthError::WrongCredential);
        }
        let identity = Identity {
            uid: registered.uid.clone(),
            email: email.to_string(),
        };
        drop(users);
        debug!(uid = identity.uid, "signed in");
        let _ = self.identity.send(Some(identity.clone()));
        Ok(identity)
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        self.check_online()?;
        let mut users = self
            .users
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if users.contains_key(email) {
            return Err(AuthError::AlreadyRegistered);
        }
        let uid = self.mint_uid();
        users.insert(
            email.to_string(),
            Registered {
                uid: uid.clone(),
                password: password.to_string(),
            },
        );
        drop(users);
        let identity = Identity {
            uid,
            email: email.to_string(),
        };
        debug!(uid = identity.uid, "registered");
        let _ = self.identity.send(Some(identity.clone()));
        Ok(identity)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        self.check_online()?;
        let _ = self.identity.send(None);
        Ok(())
    }

    fn observe_identity(&self) -> watch::Receiver<Option<Identity>> {
        self.identity.subscribe()
    }
}
