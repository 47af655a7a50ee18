//! Postgres-backed store.
//!
//! Queries are tenant-scoped at the SQL level and use the pooled
//! connection per call; no session is shared between concurrent attempts.
//! See `schema.sql` at the crate root for the table and index layout.

use crate::error::{DeliveryError, DeliveryResult};
use crate::models::{
    AttemptFilter, AttemptStatus, EmailAttempt, IdempotencyRecord, TenantSmtpConfig,
    TransportMode,
};
use crate::store::{AttemptStore, ConfigStore, IdempotencyStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool, QueryBuilder};
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct PgMailStore {
    pool: PgPool,
}

impl PgMailStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(connection_string: &str) -> DeliveryResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(20)
            .min_connections(2)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(connection_string)
            .await?;

        info!("mail store connection pool created");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn is_healthy(&self) -> bool {
        match sqlx::query("SELECT 1").fetch_one(&self.pool).await {
            Ok(_) => true,
            Err(e) => {
                warn!("mail store health check failed: {}", e);
                false
            }
        }
    }
}

#[derive(FromRow)]
struct SmtpConfigRow {
    id: Uuid,
    tenant_id: Uuid,
    host: String,
    port: i32,
    username: String,
    secret_enc: String,
    from_address: String,
    from_name: String,
    transport: String,
    connect_timeout_secs: i32,
    active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<SmtpConfigRow> for TenantSmtpConfig {
    type Error = DeliveryError;

    fn try_from(row: SmtpConfigRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            tenant_id: row.tenant_id,
            host: row.host,
            port: u16::try_from(row.port)
                .map_err(|_| DeliveryError::Store("stored port out of range".into()))?,
            username: row.username,
            secret_enc: row.secret_enc,
            from_address: row.from_address,
            from_name: row.from_name,
            transport: row
                .transport
                .parse::<TransportMode>()
                .map_err(DeliveryError::Store)?,
            connect_timeout_secs: u16::try_from(row.connect_timeout_secs)
                .map_err(|_| DeliveryError::Store("stored timeout out of range".into()))?,
            active: row.active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
struct AttemptRow {
    id: Uuid,
    tenant_id: Uuid,
    recipient: String,
    scenario: String,
    subject: Option<String>,
    body_preview: Option<String>,
    status: String,
    sent_at: Option<DateTime<Utc>>,
    error_detail: Option<String>,
    retry_count: i32,
    idempotency_key: Option<String>,
    idempotency_expires_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<AttemptRow> for EmailAttempt {
    type Error = DeliveryError;

    fn try_from(row: AttemptRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            tenant_id: row.tenant_id,
            recipient: row.recipient,
            scenario: row.scenario,
            subject: row.subject,
            body_preview: row.body_preview,
            status: row.status.parse::<AttemptStatus>().map_err(DeliveryError::Store)?,
            sent_at: row.sent_at,
            error_detail: row.error_detail,
            retry_count: row.retry_count,
            idempotency_key: row.idempotency_key,
            idempotency_expires_at: row.idempotency_expires_at,
            created_at: row.created_at,
        })
    }
}

const CONFIG_COLUMNS: &str = "id, tenant_id, host, port, username, secret_enc, from_address, \
     from_name, transport, connect_timeout_secs, active, created_at, updated_at";

const ATTEMPT_COLUMNS: &str = "id, tenant_id, recipient, scenario, subject, body_preview, \
     status, sent_at, error_detail, retry_count, idempotency_key, idempotency_expires_at, \
     created_at";

#[async_trait]
impl ConfigStore for PgMailStore {
    async fn effective_for_tenant(
        &self,
        tenant_id: Uuid,
    ) -> DeliveryResult<Option<TenantSmtpConfig>> {
        let sql = format!(
            "SELECT {CONFIG_COLUMNS} FROM tenant_smtp_configs \
             WHERE tenant_id = $1 AND active = TRUE \
             ORDER BY created_at DESC, seq DESC LIMIT 1"
        );
        let row = sqlx::query_as::<_, SmtpConfigRow>(&sql)
            .bind(tenant_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(TenantSmtpConfig::try_from).transpose()
    }

    async fn insert(&self, config: TenantSmtpConfig) -> DeliveryResult<TenantSmtpConfig> {
        let sql = format!(
            "INSERT INTO tenant_smtp_configs ({CONFIG_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)"
        );
        sqlx::query(&sql)
            .bind(config.id)
            .bind(config.tenant_id)
            .bind(&config.host)
            .bind(i32::from(config.port))
            .bind(&config.username)
            .bind(&config.secret_enc)
            .bind(&config.from_address)
            .bind(&config.from_name)
            .bind(config.transport.as_str())
            .bind(i32::from(config.connect_timeout_secs))
            .bind(config.active)
            .bind(config.created_at)
            .bind(config.updated_at)
            .execute(&self.pool)
            .await?;
        Ok(config)
    }

    async fn update(&self, config: TenantSmtpConfig) -> DeliveryResult<TenantSmtpConfig> {
        let result = sqlx::query(
            "UPDATE tenant_smtp_configs SET host = $3, port = $4, username = $5, \
             secret_enc = $6, from_address = $7, from_name = $8, transport = $9, \
             connect_timeout_secs = $10, active = $11, updated_at = $12 \
             WHERE tenant_id = $1 AND id = $2",
        )
        .bind(config.tenant_id)
        .bind(config.id)
        .bind(&config.host)
        .bind(i32::from(config.port))
        .bind(&config.username)
        .bind(&config.secret_enc)
        .bind(&config.from_address)
        .bind(&config.from_name)
        .bind(config.transport.as_str())
        .bind(i32::from(config.connect_timeout_secs))
        .bind(config.active)
        .bind(config.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DeliveryError::Store("config not found for update".into()));
        }
        Ok(config)
    }

    async fn deactivate(&self, tenant_id: Uuid, config_id: Uuid) -> DeliveryResult<()> {
        sqlx::query(
            "UPDATE tenant_smtp_configs SET active = FALSE, updated_at = $3 \
             WHERE tenant_id = $1 AND id = $2",
        )
        .bind(tenant_id)
        .bind(config_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl AttemptStore for PgMailStore {
    async fn insert(&self, attempt: EmailAttempt) -> DeliveryResult<EmailAttempt> {
        let sql = format!(
            "INSERT INTO email_attempts ({ATTEMPT_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)"
        );
        sqlx::query(&sql)
            .bind(attempt.id)
            .bind(attempt.tenant_id)
            .bind(&attempt.recipient)
            .bind(&attempt.scenario)
            .bind(&attempt.subject)
            .bind(&attempt.body_preview)
            .bind(attempt.status.as_str())
            .bind(attempt.sent_at)
            .bind(&attempt.error_detail)
            .bind(attempt.retry_count)
            .bind(&attempt.idempotency_key)
            .bind(attempt.idempotency_expires_at)
            .bind(attempt.created_at)
            .execute(&self.pool)
            .await?;
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
        sqlx::query(
            "UPDATE email_attempts SET status = 'sent', subject = $3, body_preview = $4, \
             retry_count = $5, sent_at = $6 \
             WHERE tenant_id = $1 AND id = $2 AND status = 'pending'",
        )
        .bind(tenant_id)
        .bind(attempt_id)
        .bind(subject)
        .bind(body_preview)
        .bind(retry_count)
        .bind(sent_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_failed(
        &self,
        tenant_id: Uuid,
        attempt_id: Uuid,
        error_detail: &str,
        retry_count: i32,
    ) -> DeliveryResult<()> {
        sqlx::query(
            "UPDATE email_attempts SET status = 'failed', error_detail = $3, \
             retry_count = $4 \
             WHERE tenant_id = $1 AND id = $2 AND status = 'pending'",
        )
        .bind(tenant_id)
        .bind(attempt_id)
        .bind(error_detail)
        .bind(retry_count)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(
        &self,
        tenant_id: Uuid,
        attempt_id: Uuid,
    ) -> DeliveryResult<Option<EmailAttempt>> {
        let sql = format!(
            "SELECT {ATTEMPT_COLUMNS} FROM email_attempts WHERE tenant_id = $1 AND id = $2"
        );
        let row = sqlx::query_as::<_, AttemptRow>(&sql)
            .bind(tenant_id)
            .bind(attempt_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(EmailAttempt::try_from).transpose()
    }

    async fn list(
        &self,
        tenant_id: Uuid,
        filter: &AttemptFilter,
    ) -> DeliveryResult<Vec<EmailAttempt>> {
        let mut qb: QueryBuilder<sqlx::Postgres> = QueryBuilder::new(format!(
            "SELECT {ATTEMPT_COLUMNS} FROM email_attempts WHERE tenant_id = "
        ));
        qb.push_bind(tenant_id);

        if let Some(status) = filter.status {
            qb.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(recipient) = &filter.recipient {
            qb.push(" AND recipient = ").push_bind(recipient.clone());
        }
        if let Some(after) = filter.sent_after {
            qb.push(" AND sent_at >= ").push_bind(after);
        }
        if let Some(before) = filter.sent_before {
            qb.push(" AND sent_at <= ").push_bind(before);
        }

        qb.push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(filter.limit)
            .push(" OFFSET ")
            .push_bind(filter.offset);

        let rows: Vec<AttemptRow> = qb.build_query_as().fetch_all(&self.pool).await?;
        rows.into_iter().map(EmailAttempt::try_from).collect()
    }
}

#[derive(FromRow)]
struct IdempotencyRow {
    tenant_id: Uuid,
    key: String,
    attempt_id: Uuid,
    response: serde_json::Value,
    expires_at: DateTime<Utc>,
}

impl From<IdempotencyRow> for IdempotencyRecord {
    fn from(row: IdempotencyRow) -> Self {
        Self {
            tenant_id: row.tenant_id,
            key: row.key,
            attempt_id: row.attempt_id,
            response: row.response,
            expires_at: row.expires_at,
        }
    }
}

#[async_trait]
impl IdempotencyStore for PgMailStore {
    async fn find_valid(
        &self,
        tenant_id: Uuid,
        key: &str,
        now: DateTime<Utc>,
    ) -> DeliveryResult<Option<IdempotencyRecord>> {
        let row = sqlx::query_as::<_, IdempotencyRow>(
            "SELECT tenant_id, key, attempt_id, response, expires_at \
             FROM email_idempotency \
             WHERE tenant_id = $1 AND key = $2 AND expires_at > $3",
        )
        .bind(tenant_id)
        .bind(key)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(IdempotencyRecord::from))
    }

    async fn insert(&self, record: IdempotencyRecord) -> DeliveryResult<()> {
        sqlx::query(
            "INSERT INTO email_idempotency (tenant_id, key, attempt_id, response, expires_at) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (tenant_id, key) DO NOTHING",
        )
        .bind(record.tenant_id)
        .bind(&record.key)
        .bind(record.attempt_id)
        .bind(&record.response)
        .bind(record.expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
