//! Persistence interfaces.
//!
//! The persistent store is an external collaborator; the engine talks to
//! it only through these traits. Every method is tenant-scoped (a query
//! for one tenant can never observe another tenant's rows) and each
//! background unit issues its own calls against the pooled store, so no
//! session state is shared across concurrent attempts.

pub mod memory;
pub mod postgres;

use crate::error::DeliveryResult;
use crate::models::{AttemptFilter, EmailAttempt, IdempotencyRecord, TenantSmtpConfig};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub use memory::MemoryMailStore;
pub use postgres::PgMailStore;

/// Tenant SMTP configuration rows.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// The effective configuration: active, latest `created_at`, ties
    /// broken by store insertion order (newest insertion wins).
    async fn effective_for_tenant(
        &self,
        tenant_id: Uuid,
    ) -> DeliveryResult<Option<TenantSmtpConfig>>;

    async fn insert(&self, config: TenantSmtpConfig) -> DeliveryResult<TenantSmtpConfig>;

    /// Replace the mutable fields of an existing row in place.
    async fn update(&self, config: TenantSmtpConfig) -> DeliveryResult<TenantSmtpConfig>;

    /// Rollback hook for configurations that fail connectivity validation
    /// after being saved.
    async fn deactivate(&self, tenant_id: Uuid, config_id: Uuid) -> DeliveryResult<()>;
}

/// Audit records. Rows are created `pending`, receive exactly one terminal
/// transition, and are never deleted here.
#[async_trait]
pub trait AttemptStore: Send + Sync {
    async fn insert(&self, attempt: EmailAttempt) -> DeliveryResult<EmailAttempt>;

    async fn mark_sent(
        &self,
        tenant_id: Uuid,
        attempt_id: Uuid,
        subject: &str,
        body_preview: &str,
        retry_count: i32,
        sent_at: DateTime<Utc>,
    ) -> DeliveryResult<()>;

    async fn mark_failed(
        &self,
        tenant_id: Uuid,
        attempt_id: Uuid,
        error_detail: &str,
        retry_count: i32,
    ) -> DeliveryResult<()>;

    async fn get(&self, tenant_id: Uuid, attempt_id: Uuid)
        -> DeliveryResult<Option<EmailAttempt>>;

    async fn list(
        &self,
        tenant_id: Uuid,
        filter: &AttemptFilter,
    ) -> DeliveryResult<Vec<EmailAttempt>>;
}

/// `(tenant, idempotency key)` deduplication records.
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// Find a record that has not expired as of `now`.
    async fn find_valid(
        &self,
        tenant_id: Uuid,
        key: &str,
        now: DateTime<Utc>,
    ) -> DeliveryResult<Option<IdempotencyRecord>>;

    async fn insert(&self, record: IdempotencyRecord) -> DeliveryResult<()>;
}
