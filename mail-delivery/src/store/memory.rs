//! In-memory store.
//!
//! Reference implementation of the store traits used in tests and local
//! development. Semantics mirror the Postgres implementation, including
//! insertion-order tie-breaking for effective-config selection.

use crate::error::{DeliveryError, DeliveryResult};
use crate::models::{
    AttemptFilter, AttemptStatus, EmailAttempt, IdempotencyRecord, TenantSmtpConfig,
};
use crate::store::{AttemptStore, ConfigStore, IdempotencyStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

#[derive(Default)]
struct Inner {
    configs: Vec<TenantSmtpConfig>,
    attempts: Vec<EmailAttempt>,
    idempotency: Vec<IdempotencyRecord>,
}

#[derive(Default)]
pub struct MemoryMailStore {
    inner: Mutex<Inner>,
}

impl MemoryMailStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> DeliveryResult<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| DeliveryError::Store("memory store lock poisoned".into()))
    }
}

#[async_trait]
impl ConfigStore for MemoryMailStore {
    async fn effective_for_tenant(
        &self,
        tenant_id: Uuid,
    ) -> DeliveryResult<Option<TenantSmtpConfig>> {
        let inner = self.lock()?;
        let mut best: Option<&TenantSmtpConfig> = None;
        for config in inner
            .configs
            .iter()
            .filter(|c| c.tenant_id == tenant_id && c.active)
        {
            // `>=` lets a later insertion win a created_at tie.
            if best.map_or(true, |b| config.created_at >= b.created_at) {
                best = Some(config);
            }
        }
        Ok(best.cloned())
    }

    async fn insert(&self, config: TenantSmtpConfig) -> DeliveryResult<TenantSmtpConfig> {
        let mut inner = self.lock()?;
        inner.configs.push(config.clone());
        Ok(config)
    }

    async fn update(&self, config: TenantSmtpConfig) -> DeliveryResult<TenantSmtpConfig> {
        let mut inner = self.lock()?;
        let slot = inner
            .configs
            .iter_mut()
            .find(|c| c.tenant_id == config.tenant_id && c.id == config.id)
            .ok_or_else(|| DeliveryError::Store("config not found for update".into()))?;
        *slot = config.clone();
        Ok(config)
    }

    async fn deactivate(&self, tenant_id: Uuid, config_id: Uuid) -> DeliveryResult<()> {
        let mut inner = self.lock()?;
        if let Some(config) = inner
            .configs
            .iter_mut()
            .find(|c| c.tenant_id == tenant_id && c.id == config_id)
        {
            config.active = false;
            config.updated_at = Utc::now();
        }
        Ok(())
    }
}

#[async_trait]
impl AttemptStore for MemoryMailStore {
    async fn insert(&self, attempt: EmailAttempt) -> DeliveryResult<EmailAttempt> {
        let mut inner = self.lock()?;
        inner.attempts.push(attempt.clone());
        Ok(attempt)
    }

    async fn mark_sent(
        &self,
        tenant_id: Uuid,
        attempt_id: Uuid,
        subject: &str,
        body_preview: &str,
        retry_count: i32,
        sent_at: DateTime<Utc>,
    ) -> DeliveryResult<()> {
        let mut inner = self.lock()?;
        if let Some(attempt) = inner
            .attempts
            .iter_mut()
            .find(|a| a.tenant_id == tenant_id && a.id == attempt_id)
        {
            if attempt.status == AttemptStatus::Pending {
                attempt.status = AttemptStatus::Sent;
                attempt.subject = Some(subject.to_string());
                attempt.body_preview = Some(body_preview.to_string());
                attempt.retry_count = retry_count;
                attempt.sent_at = Some(sent_at);
            }
        }
        Ok(())
    }

    async fn mark_failed(
        &self,
        tenant_id: Uuid,
        attempt_id: Uuid,
        error_detail: &str,
        retry_count: i32,
    ) -> DeliveryResult<()> {
        let mut inner = self.lock()?;
        if let Some(attempt) = inner
            .attempts
            .iter_mut()
            .find(|a| a.tenant_id == tenant_id && a.id == attempt_id)
        {
            if attempt.status == AttemptStatus::Pending {
                attempt.status = AttemptStatus::Failed;
                attempt.error_detail = Some(error_detail.to_string());
                attempt.retry_count = retry_count;
            }
        }
        Ok(())
    }

    async fn get(
        &self,
        tenant_id: Uuid,
        attempt_id: Uuid,
    ) -> DeliveryResult<Option<EmailAttempt>> {
        let inner = self.lock()?;
        Ok(inner
            .attempts
            .iter()
            .find(|a| a.tenant_id == tenant_id && a.id == attempt_id)
            .cloned())
    }

    async fn list(
        &self,
        tenant_id: Uuid,
        filter: &AttemptFilter,
    ) -> DeliveryResult<Vec<EmailAttempt>> {
        let inner = self.lock()?;
        let mut rows: Vec<EmailAttempt> = inner
            .attempts
            .iter()
            .filter(|a| a.tenant_id == tenant_id)
            .filter(|a| filter.status.map_or(true, |s| a.status == s))
            .filter(|a| {
                filter
                    .recipient
                    .as_deref()
                    .map_or(true, |r| a.recipient == r)
            })
            .filter(|a| {
                filter
                    .sent_after
                    .map_or(true, |t| a.sent_at.map_or(false, |s| s >= t))
            })
            .filter(|a| {
                filter
                    .sent_before
                    .map_or(true, |t| a.sent_at.map_or(false, |s| s <= t))
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows
            .into_iter()
            .skip(filter.offset.max(0) as usize)
            .take(filter.limit.max(0) as usize)
            .collect())
    }
}

#[async_trait]
impl IdempotencyStore for MemoryMailStore {
    async fn find_valid(
        &self,
        tenant_id: Uuid,
        key: &str,
        now: DateTime<Utc>,
    ) -> DeliveryResult<Option<IdempotencyRecord>> {
        let inner = self.lock()?;
        Ok(inner
            .idempotency
            .iter()
            .find(|r| r.tenant_id == tenant_id && r.key == key && r.expires_at > now)
            .cloned())
    }

    async fn insert(&self, record: IdempotencyRecord) -> DeliveryResult<()> {
        let mut inner = self.lock()?;
        // The (tenant, key) pair is unique; keep the first live record.
        let exists = inner
            .idempotency
            .iter()
            .any(|r| r.tenant_id == record.tenant_id && r.key == record.key);
        if !exists {
            inner.idempotency.push(record);
        }
        Ok(())
    }
}
