//! Credential storage shared by every request a client makes.
//!
//! The credential is never mutated in place. A login installs a new
//! `Arc<Credential>` and bumps a generation counter; readers clone the `Arc`
//! and keep using the token they saw even if a refresh lands concurrently.
//! Refreshes are serialized through an async mutex so that several requests
//! failing with 401 on the same stale token trigger a single login.

use crate::types::User;
use crate::{Error, Result};
use std::sync::{Arc, RwLock};
use tokio::sync::{Mutex, MutexGuard};

/// A bearer token and the identity it was issued for.
#[derive(Clone, PartialEq)]
pub struct Credential {
    token: String,
    user: User,
}

impl Credential {
    /// Creates a credential.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyToken`] if `token` is empty.
    pub fn new(token: impl Into<String>, user: User) -> Result<Self> {
        let token = token.into();
        if token.is_empty() {
            return Err(Error::EmptyToken);
        }
        Ok(Self { token, user })
    }

    /// The bearer token.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// The identity the token was issued for.
    pub fn user(&self) -> &User {
        &self.user
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"<redacted>")
            .field("user", &self.user)
            .finish()
    }
}

/// The credential a request was sent with, as observed by the executor.
#[derive(Debug, Clone)]
pub(crate) struct Snapshot {
    pub(crate) credential: Option<Arc<Credential>>,
    pub(crate) generation: u64,
}

impl Snapshot {
    /// A credential must have been installed by a login, and its token must
    /// be non-empty.
    pub(crate) fn is_authenticated(&self) -> bool {
        self.credential
            .as_ref()
            .is_some_and(|c| !c.token.is_empty())
    }
}

#[derive(Debug, Default)]
pub(crate) struct AuthState {
    current: RwLock<Slot>,
    refresh: Mutex<()>,
}

#[derive(Debug, Default)]
struct Slot {
    credential: Option<Arc<Credential>>,
    generation: u64,
}

impl AuthState {
    pub(crate) fn snapshot(&self) -> Snapshot {
        let slot = self.current.read().unwrap_or_else(|e| e.into_inner());
        Snapshot {
            credential: slot.credential.clone(),
            generation: slot.generation,
        }
    }

    pub(crate) fn is_authenticated(&self) -> bool {
        self.snapshot().is_authenticated()
    }

    pub(crate) fn generation(&self) -> u64 {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .generation
    }

    /// Replaces the stored credential wholesale.
    pub(crate) fn install(&self, credential: Credential) {
        let mut slot = self.current.write().unwrap_or_else(|e| e.into_inner());
        slot.credential = Some(Arc::new(credential));
        slot.generation += 1;
    }

    pub(crate) fn clear(&self) {
        let mut slot = self.current.write().unwrap_or_else(|e| e.into_inner());
        slot.credential = None;
        slot.generation += 1;
    }

    /// Waits for exclusive rights to refresh the credential.
    pub(crate) async fn lock_refresh(&self) -> MutexGuard<'_, ()> {
        self.refresh.lock().await
    }
}
