//! Session storage.
//!
//! A session binds a transcript to one identity under a caller-chosen key.
//! Handles are `Arc<Mutex<Session>>`: the mutex serializes concurrent
//! messages into the same conversation, while different sessions proceed in
//! parallel. Expiry is pluggable; the in-memory store sweeps on demand.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::error::DocentError;
use crate::types::Transcript;

/// One conversation and the identity it belongs to.
#[derive(Debug)]
pub struct Session {
    pub key: String,
    pub identity: String,
    pub transcript: Transcript,
    pub created_at: DateTime<Utc>,
    pub last_used: DateTime<Utc>,
}

impl Session {
    pub fn new(key: impl Into<String>, identity: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            key: key.into(),
            identity: identity.into(),
            transcript: Transcript::new(),
            created_at: now,
            last_used: now,
        }
    }

    /// Mark the session as just used.
    pub fn touch(&mut self) {
        self.last_used = Utc::now();
    }
}

/// Shared, lockable handle to one session.
pub type SessionHandle = Arc<Mutex<Session>>;

/// Decides when a session is stale enough to drop.
#[cfg_attr(test, mockall::automock)]
pub trait ExpiryPolicy: Send + Sync {
    fn is_expired(&self, session: &Session, now: DateTime<Utc>) -> bool;
}

/// Sessions never expire. The default.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverExpire;

impl ExpiryPolicy for NeverExpire {
    fn is_expired(&self, _session: &Session, _now: DateTime<Utc>) -> bool {
        false
    }
}

/// Expire sessions idle for longer than `max_idle`.
#[derive(Debug, Clone, Copy)]
pub struct IdleExpiry {
    pub max_idle: Duration,
}

impl IdleExpiry {
    pub fn new(max_idle: Duration) -> Self {
        Self { max_idle }
    }
}

impl ExpiryPolicy for IdleExpiry {
    fn is_expired(&self, session: &Session, now: DateTime<Utc>) -> bool {
        match chrono::Duration::from_std(self.max_idle) {
            Ok(max_idle) => now.signed_duration_since(session.last_used) > max_idle,
            Err(_) => false,
        }
    }
}

/// Keyed storage for sessions.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Fetch the session under `key`, creating it bound to `identity` if
    /// absent. A key already bound to a different identity is refused.
    async fn open(&self, key: &str, identity: &str) -> crate::Result<SessionHandle>;

    /// Fetch an existing session without creating one.
    async fn get(&self, key: &str) -> Option<SessionHandle>;

    /// Drop the session under `key`. Returns whether one existed.
    async fn remove(&self, key: &str) -> bool;

    /// Number of live sessions.
    async fn session_count(&self) -> usize;

    /// Drop every expired session and return how many went.
    async fn sweep_expired(&self) -> usize;
}

/// In-memory store. Cloning shares the underlying map.
#[derive(Clone)]
pub struct MemorySessionStore {
    sessions: Arc<RwLock<HashMap<String, SessionHandle>>>,
    expiry: Arc<dyn ExpiryPolicy>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::with_expiry(Arc::new(NeverExpire))
    }

    pub fn with_expiry(expiry: Arc<dyn ExpiryPolicy>) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            expiry,
        }
    }

    async fn reuse(&self, key: &str, identity: &str, handle: SessionHandle) -> crate::Result<SessionHandle> {
        {
            let mut session = handle.lock().await;
            if session.identity != identity {
                warn!(session = %key, "refusing to re-bind session to a different identity");
                return Err(DocentError::identity_mismatch(key));
            }
            session.touch();
        }
        Ok(handle)
    }
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn open(&self, key: &str, identity: &str) -> crate::Result<SessionHandle> {
        let existing = self.sessions.read().await.get(key).cloned();
        if let Some(handle) = existing {
            return self.reuse(key, identity, handle).await;
        }

        let raced = {
            let mut sessions = self.sessions.write().await;
            match sessions.get(key).cloned() {
                Some(handle) => handle,
                None => {
                    let handle: SessionHandle = Arc::new(Mutex::new(Session::new(key, identity)));
                    sessions.insert(key.to_string(), Arc::clone(&handle));
                    debug!(session = %key, identity = %identity, "created session");
                    return Ok(handle);
                }
            }
        };
        // Lost the creation race; validate against whoever won.
        self.reuse(key, identity, raced).await
    }

    async fn get(&self, key: &str) -> Option<SessionHandle> {
        self.sessions.read().await.get(key).cloned()
    }

    async fn remove(&self, key: &str) -> bool {
        self.sessions.write().await.remove(key).is_some()
    }

    async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    async fn sweep_expired(&self) -> usize {
        let now = Utc::now();
        let mut expired = Vec::new();
        {
            let sessions = self.sessions.read().await;
            for (key, handle) in sessions.iter() {
                // A locked session is in use; it gets the next sweep.
                if let Ok(session) = handle.try_lock() {
                    if self.expiry.is_expired(&session, now) {
                        expired.push(key.clone());
                    }
                }
            }
        }

        let mut sessions = self.sessions.write().await;
        let mut removed = 0;
        for key in expired {
            if sessions.remove(&key).is_some() {
                removed += 1;
            }
        }
        if removed > 0 {
            debug!(removed, "swept expired sessions");
        }
        removed
    }
}
