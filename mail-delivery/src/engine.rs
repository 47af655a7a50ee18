//! The delivery engine.
//!
//! `enqueue` synchronously writes a `pending` audit record and returns its
//! identifier; rendering and network transmission happen in a detached
//! background unit scheduled through the [`Dispatcher`]. Each unit carries
//! its [`TenantContext`] explicitly, runs the bounded retry loop, and
//! finalizes the audit record exactly once, whether the unit ends in
//! success, terminal failure, or a panic.

use crate::config::EngineSettings;
use crate::context::{ContextRegistry, TenantContext};
use crate::dispatch::Dispatcher;
use crate::error::DeliveryResult;
use crate::models::{AttemptStatus, EmailAttempt, IdempotencyRecord, ResolvedSmtpConfig};
use crate::resolver::ConfigResolver;
use crate::store::{AttemptStore, IdempotencyStore};
use crate::transport::MailTransport;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use mail_templates::Renderer;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Fixed backoff delays between transmissions. Exactly these three values;
/// retries are exhausted after the last one.
const BACKOFF_SCHEDULE: [Duration; 3] = [
    Duration::from_secs(2),
    Duration::from_secs(4),
    Duration::from_secs(8),
];

/// Characters of the text body kept on the audit record.
const BODY_PREVIEW_CHARS: usize = 500;

/// One send request as handed over by the caller.
#[derive(Debug, Clone)]
pub struct SendRequest {
    pub scenario: String,
    pub recipient: String,
    pub variables: Map<String, Value>,
    pub language: String,
    pub idempotency_key: Option<String>,
}

/// What `enqueue` returns, and what the idempotency record snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnqueueOutcome {
    pub attempt_id: Uuid,
    /// True when an earlier request with the same `(tenant, key)` already
    /// created the attempt.
    pub deduplicated: bool,
}

#[derive(Clone)]
pub struct DeliveryEngine {
    attempts: Arc<dyn AttemptStore>,
    idempotency: Arc<dyn IdempotencyStore>,
    resolver: Arc<ConfigResolver>,
    renderer: Arc<Renderer>,
    transport: Arc<dyn MailTransport>,
    dispatcher: Arc<Dispatcher>,
    contexts: ContextRegistry,
    idempotency_ttl: Duration,
}

impl DeliveryEngine {
    pub fn new(
        attempts: Arc<dyn AttemptStore>,
        idempotency: Arc<dyn IdempotencyStore>,
        resolver: Arc<ConfigResolver>,
        renderer: Arc<Renderer>,
        transport: Arc<dyn MailTransport>,
        settings: &EngineSettings,
    ) -> Self {
        Self {
            attempts,
            idempotency,
            resolver,
            renderer,
            transport,
            dispatcher: Arc::new(Dispatcher::new(settings.tenant_max_inflight)),
            contexts: ContextRegistry::new(),
            idempotency_ttl: settings.idempotency_ttl,
        }
    }

    /// Accept a send request: create the `pending` audit record and return
    /// its identifier before any rendering or network I/O. Duplicate
    /// submissions within the idempotency window return the original
    /// attempt instead of creating new work.
    pub async fn enqueue(
        &self,
        tenant_id: Uuid,
        request: SendRequest,
    ) -> DeliveryResult<EnqueueOutcome> {
        let now = Utc::now();

        if let Some(key) = &request.idempotency_key {
            if let Some(record) = self.idempotency.find_valid(tenant_id, key, now).await? {
                info!(
                    tenant_id = %tenant_id,
                    attempt_id = %record.attempt_id,
                    "duplicate enqueue deduplicated by idempotency key"
                );
                let mut outcome = serde_json::from_value::<EnqueueOutcome>(record.response)
                    .unwrap_or(EnqueueOutcome {
                        attempt_id: record.attempt_id,
                        deduplicated: true,
                    });
                outcome.deduplicated = true;
                return Ok(outcome);
            }
        }

        let expires_at = self.idempotency_expiry(now);
        let attempt = EmailAttempt {
            id: Uuid::new_v4(),
            tenant_id,
            recipient: request.recipient.clone(),
            scenario: request.scenario.clone(),
            subject: None,
            body_preview: None,
            status: AttemptStatus::Pending,
            sent_at: None,
            error_detail: None,
            retry_count: 0,
            idempotency_key: request.idempotency_key.clone(),
            idempotency_expires_at: request.idempotency_key.as_ref().map(|_| expires_at),
            created_at: now,
        };
        let attempt = self.attempts.insert(attempt).await?;

        let outcome = EnqueueOutcome {
            attempt_id: attempt.id,
            deduplicated: false,
        };

        if let Some(key) = &request.idempotency_key {
            self.idempotency
                .insert(IdempotencyRecord {
                    tenant_id,
                    key: key.clone(),
                    attempt_id: attempt.id,
                    response: serde_json::to_value(&outcome).unwrap_or(Value::Null),
                    expires_at,
                })
                .await?;
        }

        let context = TenantContext {
            tenant_id,
            attempt_id: attempt.id,
        };
        let engine = self.clone();
        self.dispatcher.spawn(tenant_id, async move {
            engine.run_attempt(context, request).await;
        });

        Ok(outcome)
    }

    /// Connect and authenticate against a configuration without sending
    /// anything. Used to verify a saved configuration before it stays
    /// active.
    pub async fn test_connection(&self, config: &ResolvedSmtpConfig) -> (bool, String) {
        match self.transport.probe(config).await {
            Ok(()) => (true, "connection and authentication succeeded".to_string()),
            Err(err) => (false, err.to_string()),
        }
    }

    /// Resolve once no background unit is in flight. Deterministic test
    /// hook; also useful for graceful shutdown.
    pub async fn wait_idle(&self) {
        self.dispatcher.wait_idle().await;
    }

    /// Number of tenant contexts currently attached to background work.
    pub fn active_contexts(&self) -> usize {
        self.contexts.active_count()
    }

    fn idempotency_expiry(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        chrono::Duration::from_std(self.idempotency_ttl)
            .map(|ttl| now + ttl)
            .unwrap_or(now)
    }

    /// One background unit. The context scope is registered first and
    /// detached on drop, so teardown happens on every exit path.
    async fn run_attempt(self, context: TenantContext, request: SendRequest) {
        let _scope = self.contexts.enter(context);

        let processing = AssertUnwindSafe(self.process_attempt(context, &request));
        if processing.catch_unwind().await.is_err() {
            error!(
                tenant_id = %context.tenant_id,
                attempt_id = %context.attempt_id,
                "attempt processing panicked"
            );
            self.finalize_failed(context, "unexpected internal error", 0)
                .await;
        }
    }

    async fn process_attempt(&self, context: TenantContext, request: &SendRequest) {
        let config = match self.resolver.resolved(context.tenant_id).await {
            Ok(config) => config,
            Err(err) => {
                // Covers store failures and credential decryption errors;
                // neither is retryable.
                self.finalize_failed(
                    context,
                    &format!("configuration resolution failed: {err}"),
                    0,
                )
                .await;
                return;
            }
        };

        let rendered = match self.renderer.render(
            &request.scenario,
            &request.language,
            &request.variables,
        ) {
            Ok(rendered) => rendered,
            Err(err) => {
                // Render failures are terminal before any connection is
                // opened.
                self.finalize_failed(context, &format!("render failed: {err}"), 0)
                    .await;
                return;
            }
        };

        let max_transmissions = BACKOFF_SCHEDULE.len() + 1;
        let mut transmissions = 0usize;

        loop {
            transmissions += 1;
            match self
                .transport
                .send(&config, &rendered, &request.recipient)
                .await
            {
                Ok(()) => {
                    let retry_count = (transmissions - 1) as i32;
                    let preview: String =
                        rendered.text_body.chars().take(BODY_PREVIEW_CHARS).collect();
                    if let Err(err) = self
                        .attempts
                        .mark_sent(
                            context.tenant_id,
                            context.attempt_id,
                            &rendered.subject,
                            &preview,
                            retry_count,
                            Utc::now(),
                        )
                        .await
                    {
                        error!(
                            tenant_id = %context.tenant_id,
                            attempt_id = %context.attempt_id,
                            "failed to record sent attempt: {err}"
                        );
                    }
                    info!(
                        tenant_id = %context.tenant_id,
                        attempt_id = %context.attempt_id,
                        retry_count,
                        "email sent"
                    );
                    return;
                }
                Err(err) if err.is_retryable() && transmissions < max_transmissions => {
                    let delay = BACKOFF_SCHEDULE
                        .get(transmissions - 1)
                        .copied()
                        .unwrap_or(Duration::from_secs(8));
                    warn!(
                        tenant_id = %context.tenant_id,
                        attempt_id = %context.attempt_id,
                        transmission = transmissions,
                        delay_secs = delay.as_secs(),
                        "transient transport failure, backing off: {err}"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    let retry_count = (transmissions - 1) as i32;
                    self.finalize_failed(context, &err.to_string(), retry_count)
                        .await;
                    return;
                }
            }
        }
    }

    async fn finalize_failed(&self, context: TenantContext, detail: &str, retry_count: i32) {
        if let Err(err) = self
            .attempts
            .mark_failed(context.tenant_id, context.attempt_id, detail, retry_count)
            .await
        {
            error!(
                tenant_id = %context.tenant_id,
                attempt_id = %context.attempt_id,
                "failed to record failed attempt: {err}"
            );
        }
        warn!(
            tenant_id = %context.tenant_id,
            attempt_id = %context.attempt_id,
            retry_count,
            detail,
            "email attempt failed"
        );
    }
}
