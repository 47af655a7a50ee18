//! Background dispatch.
//!
//! One detached unit of work per attempt, admitted through a per-tenant
//! semaphore so a single tenant's transmissions cannot overwhelm that
//! tenant's mail server. Completion is observable via [`Dispatcher::wait_idle`],
//! which tests use to run the engine deterministically.

use dashmap::DashMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Notify, Semaphore};
use tracing::warn;
use uuid::Uuid;

pub struct Dispatcher {
    per_tenant: DashMap<Uuid, Arc<Semaphore>>,
    tenant_limit: usize,
    in_flight: AtomicUsize,
    idle: Notify,
}

impl Dispatcher {
    pub fn new(tenant_limit: usize) -> Self {
        Self {
            per_tenant: DashMap::new(),
            tenant_limit: tenant_limit.max(1),
            in_flight: AtomicUsize::new(0),
            idle: Notify::new(),
        }
    }

    fn semaphore(&self, tenant_id: Uuid) -> Arc<Semaphore> {
        self.per_tenant
            .entry(tenant_id)
            .or_insert_with(|| Arc::new(Semaphore::new(self.tenant_limit)))
            .clone()
    }

    /// Schedule one unit of background work for a tenant. The task starts
    /// once a per-tenant permit is available and runs to completion
    /// without further coordination.
    pub fn spawn<F>(self: &Arc<Self>, tenant_id: Uuid, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let dispatcher = Arc::clone(self);

        tokio::spawn(async move {
            match dispatcher.semaphore(tenant_id).acquire_owned().await {
                Ok(_permit) => task.await,
                Err(_) => warn!(tenant_id = %tenant_id, "tenant admission semaphore closed"),
            }

            if dispatcher.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
                dispatcher.idle.notify_waiters();
            }
        });
    }

    /// Number of units currently scheduled or running.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Resolve once no background unit is in flight.
    pub async fn wait_idle(&self) {
        loop {
            if self.in_flight.load(Ordering::SeqCst) == 0 {
                return;
            }
            let notified = self.idle.notified();
            if self.in_flight.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}
