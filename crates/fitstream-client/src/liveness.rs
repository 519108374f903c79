//! Session identity shared by every periodic task of a running session.
//!
//! A task holds a [`SessionToken`] and checks it on each tick; once the
//! session ends (or a newer one begins) the token is dead and the tick is a
//! no-op, even if the task has not been cancelled yet.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Id 0 means "no session".
#[derive(Debug, Clone, Default)]
pub struct SessionLiveness {
    current: Arc<AtomicU64>,
    next: Arc<AtomicU64>,
}

impl SessionLiveness {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new session, invalidating every earlier token.
    pub fn begin(&self) -> SessionToken {
        let id = self.next.fetch_add(1, Ordering::Relaxed) + 1;
        self.current.store(id, Ordering::Release);
        SessionToken { id, current: Arc::clone(&self.current) }
    }

    pub fn end(&self) {
        self.current.store(0, Ordering::Release);
    }

    pub fn current(&self) -> Option<u64> {
        match self.current.load(Ordering::Acquire) {
            0 => None,
            id => Some(id),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionToken {
    id: u64,
    current: Arc<AtomicU64>,
}

impl SessionToken {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_live(&self) -> bool {
        self.current.load(Ordering::Acquire) == self.id
    }
}
