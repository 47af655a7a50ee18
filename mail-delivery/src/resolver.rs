//! Tenant configuration resolution.
//!
//! Reads the effective SMTP configuration for a tenant, falls back to the
//! process-wide defaults when none exists, and decrypts the stored secret
//! on the way out. Administrative saves go through [`ConfigResolver::upsert`],
//! which encrypts the incoming secret and replaces an existing active row
//! in place rather than stacking duplicates.

use crate::config::FallbackSmtp;
use crate::error::{DeliveryError, DeliveryResult};
use crate::models::{ResolvedSmtpConfig, TenantSmtpConfig, TransportMode};
use crate::store::ConfigStore;
use chrono::Utc;
use mail_crypto::CredentialCipher;
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;
use validator::ValidateEmail;

/// Administrative input for creating or replacing a tenant configuration.
#[derive(Clone)]
pub struct SmtpConfigInput {
    pub host: String,
    pub port: u16,
    pub username: String,
    /// Plaintext secret; `None` keeps the stored one on update.
    pub secret: Option<SecretString>,
    pub from_address: String,
    pub from_name: String,
    pub transport: TransportMode,
    pub connect_timeout_secs: u16,
}

/// Field-level validation outcome. `advisories` carries conventions that
/// do not block a save (e.g. unconventional port for the transport mode).
#[derive(Debug, Clone)]
pub struct ValidationReport {
    pub valid: bool,
    pub reason: Option<String>,
    pub advisories: Vec<String>,
}

pub struct ConfigResolver {
    store: Arc<dyn ConfigStore>,
    cipher: Arc<CredentialCipher>,
    fallback: FallbackSmtp,
}

impl ConfigResolver {
    pub fn new(
        store: Arc<dyn ConfigStore>,
        cipher: Arc<CredentialCipher>,
        fallback: FallbackSmtp,
    ) -> Self {
        Self {
            store,
            cipher,
            fallback,
        }
    }

    /// The effective stored configuration for a tenant, if any.
    pub async fn effective(&self, tenant_id: Uuid) -> DeliveryResult<Option<TenantSmtpConfig>> {
        self.store.effective_for_tenant(tenant_id).await
    }

    /// Connection parameters ready for the transport: the tenant's
    /// effective configuration with its secret decrypted, or the global
    /// fallback when the tenant has none. Outbound mail keeps working for
    /// tenants that never configured their own server.
    pub async fn resolved(&self, tenant_id: Uuid) -> DeliveryResult<ResolvedSmtpConfig> {
        match self.store.effective_for_tenant(tenant_id).await? {
            Some(config) => {
                let secret = self.cipher.decrypt(&config.secret_enc)?;
                Ok(ResolvedSmtpConfig {
                    host: config.host,
                    port: config.port,
                    username: config.username,
                    secret,
                    from_address: config.from_address,
                    from_name: config.from_name,
                    transport: config.transport,
                    connect_timeout: Duration::from_secs(u64::from(
                        config.connect_timeout_secs,
                    )),
                })
            }
            None => {
                debug!(tenant_id = %tenant_id, "no tenant config, using fallback");
                Ok(self.fallback.resolved())
            }
        }
    }

    /// Create or replace the tenant's active configuration. The incoming
    /// secret is encrypted before it touches the store; on update the
    /// stored secret is replaced only when a new one was supplied.
    pub async fn upsert(
        &self,
        tenant_id: Uuid,
        input: SmtpConfigInput,
    ) -> DeliveryResult<TenantSmtpConfig> {
        let report = Self::validate(&input);
        if !report.valid {
            return Err(DeliveryError::Configuration(
                report
                    .reason
                    .unwrap_or_else(|| "invalid configuration".to_string()),
            ));
        }

        let now = Utc::now();
        let existing = self.store.effective_for_tenant(tenant_id).await?;

        match existing {
            Some(mut config) => {
                config.host = input.host;
                config.port = input.port;
                config.username = input.username;
                if let Some(secret) = &input.secret {
                    config.secret_enc = self.cipher.encrypt(secret.expose_secret())?;
                }
                config.from_address = input.from_address;
                config.from_name = input.from_name;
                config.transport = input.transport;
                config.connect_timeout_secs = input.connect_timeout_secs;
                config.updated_at = now;

                let updated = self.store.update(config).await?;
                info!(tenant_id = %tenant_id, config_id = %updated.id, "tenant smtp config replaced");
                Ok(updated)
            }
            None => {
                let secret = input.secret.as_ref().ok_or_else(|| {
                    DeliveryError::Configuration(
                        "a secret is required for a new configuration".to_string(),
                    )
                })?;
                let config = TenantSmtpConfig {
                    id: Uuid::new_v4(),
                    tenant_id,
                    host: input.host,
                    port: input.port,
                    username: input.username,
                    secret_enc: self.cipher.encrypt(secret.expose_secret())?,
                    from_address: input.from_address,
                    from_name: input.from_name,
                    transport: input.transport,
                    connect_timeout_secs: input.connect_timeout_secs,
                    active: true,
                    created_at: now,
                    updated_at: now,
                };

                let inserted = self.store.insert(config).await?;
                info!(tenant_id = %tenant_id, config_id = %inserted.id, "tenant smtp config created");
                Ok(inserted)
            }
        }
    }

    /// Rollback hook: deactivate a saved configuration that failed
    /// connectivity validation.
    pub async fn deactivate(&self, tenant_id: Uuid, config_id: Uuid) -> DeliveryResult<()> {
        self.store.deactivate(tenant_id, config_id).await
    }

    /// Field validation. Returns `(false, reason)` style results instead
    /// of errors so callers can surface field-level feedback; port/mode
    /// conventions are advisories and never block a save.
    pub fn validate(input: &SmtpConfigInput) -> ValidationReport {
        let mut reason = None;

        if input.host.trim().is_empty() {
            reason = Some("SMTP host must not be empty".to_string());
        } else if input.port == 0 {
            reason = Some("port must be between 1 and 65535".to_string());
        } else if !(5..=120).contains(&input.connect_timeout_secs) {
            reason = Some("connect timeout must be between 5 and 120 seconds".to_string());
        } else if !input.from_address.validate_email() {
            reason = Some("from address is not a valid email address".to_string());
        }

        let mut advisories = Vec::new();
        match input.transport {
            TransportMode::Tls if input.port != 465 => {
                advisories.push(format!(
                    "implicit TLS servers conventionally use port 465, not {}",
                    input.port
                ));
            }
            TransportMode::StartTls if input.port != 587 && input.port != 25 => {
                advisories.push(format!(
                    "STARTTLS servers conventionally use port 587 or 25, not {}",
                    input.port
                ));
            }
            _ => {}
        }

        ValidationReport {
            valid: reason.is_none(),
            reason,
            advisories,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryMailStore;
    use mail_crypto::CipherKey;

    fn input() -> SmtpConfigInput {
        SmtpConfigInput {
            host: "smtp.clinic-a.example".into(),
            port: 587,
            username: "mailer@clinic-a.example".into(),
            secret: Some(SecretString::new("app-password".into())),
            from_address: "noreply@clinic-a.example".into(),
            from_name: "Clinic A".into(),
            transport: TransportMode::StartTls,
            connect_timeout_secs: 30,
        }
    }

    fn resolver() -> ConfigResolver {
        let cipher = Arc::new(CredentialCipher::new(&CipherKey::generate()).unwrap());
        let fallback = FallbackSmtp {
            host: "fallback.example".into(),
            port: 587,
            username: "fallback".into(),
            password: SecretString::new("fallback-secret".into()),
            from_address: "noreply@crm.local".into(),
            from_name: "CRM Notifications".into(),
            transport: TransportMode::StartTls,
            connect_timeout_secs: 30,
        };
        ConfigResolver::new(Arc::new(MemoryMailStore::new()), cipher, fallback)
    }

    #[test]
    fn empty_host_is_rejected() {
        let mut bad = input();
        bad.host = "  ".into();

        let report = ConfigResolver::validate(&bad);
        assert!(!report.valid);
        assert!(report.reason.unwrap().contains("host"));
    }

    #[test]
    fn timeout_out_of_range_is_rejected() {
        let mut bad = input();
        bad.connect_timeout_secs = 3;

        let report = ConfigResolver::validate(&bad);
        assert!(!report.valid);
        assert!(report.reason.unwrap().contains("timeout"));
    }

    #[test]
    fn bad_from_address_is_rejected() {
        let mut bad = input();
        bad.from_address = "not-an-address".into();

        let report = ConfigResolver::validate(&bad);
        assert!(!report.valid);
    }

    #[test]
    fn unconventional_port_is_advisory_only() {
        let mut odd = input();
        odd.transport = TransportMode::Tls;
        odd.port = 2525;

        let report = ConfigResolver::validate(&odd);
        assert!(report.valid);
        assert_eq!(report.advisories.len(), 1);
        assert!(report.advisories[0].contains("465"));
    }

    #[tokio::test]
    async fn secret_is_encrypted_before_storage() {
        let resolver = resolver();
        let tenant = Uuid::new_v4();

        let saved = resolver.upsert(tenant, input()).await.unwrap();

        assert!(saved.secret_enc.starts_with("v1:"));
        assert!(!saved.secret_enc.contains("app-password"));
    }

    #[tokio::test]
    async fn upsert_replaces_active_row_in_place() {
        let resolver = resolver();
        let tenant = Uuid::new_v4();

        let first = resolver.upsert(tenant, input()).await.unwrap();

        let mut second_input = input();
        second_input.host = "smtp2.clinic-a.example".into();
        second_input.secret = None;
        let second = resolver.upsert(tenant, second_input).await.unwrap();

        // Same row, new fields, untouched secret.
        assert_eq!(first.id, second.id);
        assert_eq!(second.host, "smtp2.clinic-a.example");
        assert_eq!(first.secret_enc, second.secret_enc);
    }

    #[tokio::test]
    async fn new_config_requires_a_secret() {
        let resolver = resolver();
        let mut no_secret = input();
        no_secret.secret = None;

        let err = resolver.upsert(Uuid::new_v4(), no_secret).await.unwrap_err();
        assert!(matches!(err, DeliveryError::Configuration(_)));
    }

    #[tokio::test]
    async fn resolved_decrypts_the_stored_secret() {
        let resolver = resolver();
        let tenant = Uuid::new_v4();
        resolver.upsert(tenant, input()).await.unwrap();

        let resolved = resolver.resolved(tenant).await.unwrap();
        assert_eq!(resolved.host, "smtp.clinic-a.example");
        assert_eq!(resolved.secret.expose_secret(), "app-password");
    }

    #[tokio::test]
    async fn missing_config_falls_back_to_process_defaults() {
        let resolver = resolver();

        let resolved = resolver.resolved(Uuid::new_v4()).await.unwrap();
        assert_eq!(resolved.host, "fallback.example");
        assert_eq!(resolved.secret.expose_secret(), "fallback-secret");
    }
}
