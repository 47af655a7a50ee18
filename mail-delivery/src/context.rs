//! Explicit per-tenant execution context.
//!
//! The tenant identifier is carried as a value through every call in the
//! background path, never through thread-local or global state, because
//! attempts for different tenants interleave on the same worker pool. The registry
//! exists so teardown is observable: a scope is removed on `Drop`, which
//! runs on success, terminal failure, and panic unwind alike.

use dashmap::DashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Identity of one unit of background work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TenantContext {
    pub tenant_id: Uuid,
    pub attempt_id: Uuid,
}

/// Registry of contexts currently attached to background work.
#[derive(Clone, Default)]
pub struct ContextRegistry {
    active: Arc<DashMap<Uuid, Uuid>>,
}

impl ContextRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a context. The returned scope detaches it when dropped.
    pub fn enter(&self, context: TenantContext) -> ContextScope {
        self.active.insert(context.attempt_id, context.tenant_id);
        ContextScope {
            active: Arc::clone(&self.active),
            attempt_id: context.attempt_id,
        }
    }

    /// Number of contexts currently attached.
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// True when no tenant context is attached to any worker.
    pub fn is_clear(&self) -> bool {
        self.active.is_empty()
    }
}

pub struct ContextScope {
    active: Arc<DashMap<Uuid, Uuid>>,
    attempt_id: Uuid,
}

impl Drop for ContextScope {
    fn drop(&mut self) {
        self.active.remove(&self.attempt_id);
    }
}
