//! Request-scoped caller identity.
//!
//! A fresh [`RequestContext`] is created for every inbound request and travels in the
//! request's extensions. Nothing about it is global or tied to a worker thread, so two
//! requests running concurrently (or one after the other on the same worker) can never
//! see each other's identity. [`ContextGuard`] clears the context when it is dropped,
//! which covers normal completion, early returns, cancellation of the request future
//! and panics unwinding through the handler.

use std::sync::{Arc, PoisonError, RwLock};

use crate::models::Identity;

#[derive(Debug, Default)]
pub struct RequestContext {
    identity: RwLock<Option<Identity>>,
}

impl RequestContext {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set(&self, identity: Identity) {
        *self
            .identity
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(identity);
    }

    /// The current caller, or `None` for an unauthenticated request. `None` must never
    /// be read as any particular role.
    pub fn get(&self) -> Option<Identity> {
        self.identity
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn clear(&self) {
        self.identity
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    pub fn is_authenticated(&self) -> bool {
        self.identity
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Returns a guard that clears this context when dropped.
    pub fn guard(self: &Arc<Self>) -> ContextGuard {
        ContextGuard {
            context: Arc::clone(self),
        }
    }
}

/// Clears its [`RequestContext`] on drop, on every exit path.
#[derive(Debug)]
pub struct ContextGuard {
    context: Arc<RequestContext>,
}

impl ContextGuard {
    pub fn context(&self) -> &Arc<RequestContext> {
        &self.context
    }
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        self.context.clear();
    }
}
