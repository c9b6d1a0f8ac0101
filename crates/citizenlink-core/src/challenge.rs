//! One-time verification codes and the per-identity challenge table.
//!
//! Each identity is in exactly one [`ChallengeState`]. Issuing a code moves it
//! to `Pending` (replacing any earlier code), a successful verification moves
//! it to `Verified`. The table lives behind the [`ChallengeStore`] trait so the
//! retention policy can be swapped without touching the verification flow.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::RngExt;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

/// Lowest code value (inclusive).
pub const CODE_MIN: u32 = 100_000;
/// Highest code value (inclusive).
pub const CODE_MAX: u32 = 999_999;

/// Opaque key of a chat-platform account.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdentityId(String);

impl IdentityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdentityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A six-digit one-time code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeCode(String);

impl ChallengeCode {
    /// Draw a fresh code uniformly from `[CODE_MIN, CODE_MAX]`.
    pub fn generate() -> Self {
        let mut rng = rand::rng();
        Self(rng.random_range(CODE_MIN..=CODE_MAX).to_string())
    }

    /// Accept an existing code string if it is in range.
    pub fn parse(s: &str) -> Option<Self> {
        if s.len() != 6 || !s.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let value: u32 = s.parse().ok()?;
        (CODE_MIN..=CODE_MAX)
            .contains(&value)
            .then(|| Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the code appears anywhere in `text`.
    pub fn is_contained_in(&self, text: &str) -> bool {
        text.contains(self.0.as_str())
    }
}

impl fmt::Display for ChallengeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Verification state of one identity.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ChallengeState {
    /// No code has been issued (or it expired).
    #[default]
    Unchallenged,
    /// A code was issued and is waiting to show up in the profile bio.
    Pending { code: ChallengeCode, issued_at: Instant },
    /// The identity proved ownership of `handle`.
    Verified { handle: String, verified_at: Instant },
}

impl ChallengeState {
    pub fn pending(code: ChallengeCode) -> Self {
        Self::Pending {
            code,
            issued_at: Instant::now(),
        }
    }

    pub const fn pending_code(&self) -> Option<&ChallengeCode> {
        match self {
            Self::Pending { code, .. } => Some(code),
            _ => None,
        }
    }
}

/// Storage for challenge states keyed by identity.
///
/// Absent identities read as [`ChallengeState::Unchallenged`].
#[async_trait]
pub trait ChallengeStore: Send + Sync {
    async fn get(&self, identity: &IdentityId) -> ChallengeState;

    /// Replace the state of `identity` (last writer wins).
    async fn put(&self, identity: &IdentityId, state: ChallengeState);

    /// Remove `identity`, returning its previous state.
    async fn delete(&self, identity: &IdentityId) -> ChallengeState;

    /// Atomically replace the state only if it still equals `expected`.
    ///
    /// Returns `false` (leaving the table untouched) when another writer got
    /// there first.
    async fn transition(
        &self,
        identity: &IdentityId,
        expected: &ChallengeState,
        next: ChallengeState,
    ) -> bool;

    /// Drop verified entries older than `verified_retention` and, when
    /// `pending_ttl` is set, pending entries older than it. Returns the
    /// number of entries removed.
    async fn prune(&self, verified_retention: Duration, pending_ttl: Option<Duration>) -> usize;
}

/// In-memory challenge table. State is lost on restart.
#[derive(Debug, Default, Clone)]
pub struct MemoryChallengeStore {
    states: Arc<RwLock<HashMap<IdentityId, ChallengeState>>>,
}

impl MemoryChallengeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of identities with a non-default state.
    pub async fn len(&self) -> usize {
        self.states.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.states.read().await.is_empty()
    }
}

#[async_trait]
impl ChallengeStore for MemoryChallengeStore {
    async fn get(&self, identity: &IdentityId) -> ChallengeState {
        self.states
            .read()
            .await
            .get(identity)
            .cloned()
            .unwrap_or_default()
    }

    async fn put(&self, identity: &IdentityId, state: ChallengeState) {
        let mut states = self.states.write().await;
        if state == ChallengeState::Unchallenged {
            states.remove(identity);
        } else {
            states.insert(identity.clone(), state);
        }
    }

    async fn delete(&self, identity: &IdentityId) -> ChallengeState {
        self.states
            .write()
            .await
            .remove(identity)
            .unwrap_or_default()
    }

    async fn transition(
        &self,
        identity: &IdentityId,
        expected: &ChallengeState,
        next: ChallengeState,
    ) -> bool {
        let mut states = self.states.write().await;
        let current = states.get(identity).cloned().unwrap_or_default();
        if &current != expected {
            return false;
        }
        if next == ChallengeState::Unchallenged {
            states.remove(identity);
        } else {
            states.insert(identity.clone(), next);
        }
        true
    }

    async fn prune(&self, verified_retention: Duration, pending_ttl: Option<Duration>) -> usize {
        let mut states = self.states.write().await;
        let before = states.len();
        states.retain(|_, state| match state {
            ChallengeState::Verified { verified_at, .. } => {
                verified_at.elapsed() <= verified_retention
            }
            ChallengeState::Pending { issued_at, .. } => {
                pending_ttl.is_none_or(|ttl| issued_at.elapsed() <= ttl)
            }
            ChallengeState::Unchallenged => false,
        });
        before - states.len()
    }
}

/// Issue a fresh code for `identity`, replacing any earlier pending code.
pub async fn issue(store: &dyn ChallengeStore, identity: &IdentityId) -> ChallengeCode {
    let code = ChallengeCode::generate();
    store
        .put(identity, ChallengeState::pending(code.clone()))
        .await;
    debug!(%identity, %code, "Issued verification code");
    code
}
