//! Typed session events
//!
//! Listeners are plain callbacks held by an [`EventBus`] owned by whoever
//! emits; there is no process-wide registry. `subscribe` hands back a
//! [`Subscription`]; the listener stays attached until the handle is
//! dropped or `unsubscribe` is called.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tollgate_core::{AuthFailure, MfaMethod};

type Listener<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct Listeners<E> {
    next_id: AtomicU64,
    entries: Mutex<HashMap<u64, Listener<E>>>,
}

pub struct EventBus<E> {
    listeners: Arc<Listeners<E>>,
}

impl<E: 'static> EventBus<E> {
    pub fn new() -> Self {
        Self {
            listeners: Arc::new(Listeners {
                next_id: AtomicU64::new(1),
                entries: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = self.listeners.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners
            .entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, Arc::new(listener));

        let weak: Weak<Listeners<E>> = Arc::downgrade(&self.listeners);
        Subscription {
            detach: Some(Box::new(move || {
                if let Some(listeners) = weak.upgrade() {
                    listeners
                        .entries
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .remove(&id);
                }
            })),
        }
    }

    /// Deliver an event to every current listener
    ///
    /// Listeners run outside the registry lock, so they may subscribe or
    /// unsubscribe while being called.
    pub fn emit(&self, event: &E) {
        let snapshot: Vec<Listener<E>> = self
            .listeners
            .entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect();
        for listener in snapshot {
            listener(event);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners
            .entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}

impl<E: 'static> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle returned by [`EventBus::subscribe`]; dropping it removes the listener
#[must_use = "the listener is removed as soon as the subscription is dropped"]
pub struct Subscription {
    detach: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn unsubscribe(mut self) {
        self.detach();
    }

    fn detach(&mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.detach();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.detach.is_some())
            .finish()
    }
}

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignOutReason {
    UserInitiated,
    IdleTimeout,
    SessionExpired,
    /// A new sign-in took over
    Replaced,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    SignedIn {
        user_id: String,
        expires_at: DateTime<Utc>,
    },
    MfaRequired {
        method: MfaMethod,
        expires_at: DateTime<Utc>,
    },
    Refreshed {
        expires_at: DateTime<Utc>,
    },
    SignedOut {
        reason: SignOutReason,
    },
    AuthFailed(AuthFailure),
}
