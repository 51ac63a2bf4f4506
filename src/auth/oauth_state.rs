//! CSRF protection for the OAuth authorization-code flow.
//!
//! `connect` mints an opaque random nonce, remembers which user and provider
//! it was issued for, and hands it to the browser both as the `state` query
//! parameter and as an HTTP-only cookie. The callback must present the same
//! value in both places, and the nonce is consumed on first use.

use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use rand::RngCore;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::models::integration_token::Provider;

pub const STATE_COOKIE: &str = "oauth_state";
const STATE_TTL: Duration = Duration::from_secs(600);

#[derive(Debug, Clone, PartialEq)]
pub struct PendingAuthorization {
    pub user_id: Uuid,
    pub provider: Provider,
}

struct Entry {
    pending: PendingAuthorization,
    issued_at: Instant,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum StateError {
    #[error("state cookie missing")]
    MissingCookie,
    #[error("state does not match cookie")]
    Mismatch,
    #[error("state unknown, expired or already used")]
    Unknown,
    #[error("state was issued for a different provider")]
    WrongProvider,
}

#[derive(Clone, Default)]
pub struct OAuthStateStore {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
}

impl OAuthStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn issue(&self, user_id: Uuid, provider: Provider) -> String {
        let nonce = generate_nonce();
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        entries.retain(|_, e| now.duration_since(e.issued_at) < STATE_TTL);
        entries.insert(
            nonce.clone(),
            Entry {
                pending: PendingAuthorization { user_id, provider },
                issued_at: now,
            },
        );
        nonce
    }

    /// Validate the callback `state` against the cookie and consume it.
    pub async fn consume(
        &self,
        state: &str,
        cookie: Option<&str>,
        provider: Provider,
    ) -> Result<PendingAuthorization, StateError> {
        let cookie = cookie.ok_or(StateError::MissingCookie)?;
        if !constant_time_eq(state.as_bytes(), cookie.as_bytes()) {
            return Err(StateError::Mismatch);
        }

        // Removed before any further checks so a failed attempt still burns the nonce.
        let entry = self
            .entries
            .lock()
            .await
            .remove(state)
            .ok_or(StateError::Unknown)?;

        if entry.issued_at.elapsed() >= STATE_TTL {
            return Err(StateError::Unknown);
        }
        if entry.pending.provider != provider {
            return Err(StateError::WrongProvider);
        }
        Ok(entry.pending)
    }
}

fn generate_nonce() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
