//! Engine settings loaded once at startup.
//!
//! The fallback SMTP identity keeps outbound mail working for tenants that
//! have not configured their own server. It is read from the environment
//! exactly once and passed by value into the resolver; nothing re-reads
//! process state per send.

use crate::error::{DeliveryError, DeliveryResult};
use crate::models::{ResolvedSmtpConfig, TransportMode};
use secrecy::SecretString;
use std::time::Duration;

/// Process-wide default mail settings used when a tenant has no
/// configuration of its own.
#[derive(Clone)]
pub struct FallbackSmtp {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
    pub from_address: String,
    pub from_name: String,
    pub transport: TransportMode,
    pub connect_timeout_secs: u16,
}

impl FallbackSmtp {
    /// Load the fallback identity from `MAIL_FALLBACK_*` variables.
    pub fn from_env() -> DeliveryResult<Self> {
        let transport = std::env::var("MAIL_FALLBACK_TRANSPORT")
            .unwrap_or_else(|_| "starttls".to_string())
            .parse::<TransportMode>()
            .map_err(DeliveryError::Configuration)?;

        Ok(Self {
            host: std::env::var("MAIL_FALLBACK_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: std::env::var("MAIL_FALLBACK_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(587),
            username: std::env::var("MAIL_FALLBACK_USERNAME").unwrap_or_default(),
            password: SecretString::new(
                std::env::var("MAIL_FALLBACK_PASSWORD").unwrap_or_default(),
            ),
            from_address: std::env::var("MAIL_FALLBACK_FROM")
                .unwrap_or_else(|_| "noreply@crm.local".to_string()),
            from_name: std::env::var("MAIL_FALLBACK_FROM_NAME")
                .unwrap_or_else(|_| "CRM Notifications".to_string()),
            transport,
            connect_timeout_secs: std::env::var("MAIL_FALLBACK_TIMEOUT_SECS")
                .ok()
                .and_then(|t| t.parse().ok())
                .unwrap_or(30),
        })
    }

    /// The fallback as ready-to-use connection parameters. No decryption
    /// is involved; the fallback secret comes from process configuration.
    pub fn resolved(&self) -> ResolvedSmtpConfig {
        ResolvedSmtpConfig {
            host: self.host.clone(),
            port: self.port,
            username: self.username.clone(),
            secret: self.password.clone(),
            from_address: self.from_address.clone(),
            from_name: self.from_name.clone(),
            transport: self.transport,
            connect_timeout: Duration::from_secs(u64::from(self.connect_timeout_secs)),
        }
    }
}

/// Immutable engine configuration assembled at startup.
#[derive(Clone)]
pub struct EngineSettings {
    pub fallback: FallbackSmtp,
    /// Maximum simultaneous outbound transmissions per tenant.
    pub tenant_max_inflight: usize,
    /// Validity window for idempotency keys.
    pub idempotency_ttl: Duration,
}

impl EngineSettings {
    pub fn from_env() -> DeliveryResult<Self> {
        Ok(Self {
            fallback: FallbackSmtp::from_env()?,
            tenant_max_inflight: std::env::var("MAIL_TENANT_MAX_INFLIGHT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8),
            idempotency_ttl: Duration::from_secs(
                std::env::var("MAIL_IDEMPOTENCY_TTL_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(86_400),
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_defaults_are_usable() {
        std::env::remove_var("MAIL_FALLBACK_HOST");
        std::env::remove_var("MAIL_FALLBACK_TRANSPORT");

        let fallback = FallbackSmtp::from_env().unwrap();
        assert_eq!(fallback.port, 587);
        assert_eq!(fallback.transport, TransportMode::StartTls);

        let resolved = fallback.resolved();
        assert_eq!(resolved.connect_timeout, Duration::from_secs(30));
    }
}
