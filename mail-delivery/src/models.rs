use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

/// How the SMTP connection is secured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportMode {
    /// Implicit TLS from the first byte (conventionally port 465).
    Tls,
    /// Plaintext connection upgraded via STARTTLS (conventionally 587/25).
    StartTls,
    /// No transport security. Test environments only.
    None,
}

impl TransportMode {
    pub fn as_str(self) -> &'static str {
        match self {
            TransportMode::Tls => "tls",
            TransportMode::StartTls => "starttls",
            TransportMode::None => "none",
        }
    }
}

impl FromStr for TransportMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "tls" | "ssl" | "implicit-tls" => Ok(TransportMode::Tls),
            "starttls" | "start-tls" => Ok(TransportMode::StartTls),
            "none" | "plain" => Ok(TransportMode::None),
            other => Err(format!(
                "unknown transport mode: {other}. Valid options: tls, starttls, none"
            )),
        }
    }
}

/// One tenant's outbound mail identity. The SMTP password is stored only
/// as the cipher envelope in `secret_enc`; the delivery engine never
/// mutates these rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantSmtpConfig {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub secret_enc: String,
    pub from_address: String,
    pub from_name: String,
    pub transport: TransportMode,
    pub connect_timeout_secs: u16,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Lifecycle state of an [`EmailAttempt`]. `sending` is implicit and never
/// persisted; a row moves from `pending` to exactly one terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    Pending,
    Sent,
    Failed,
}

impl AttemptStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AttemptStatus::Pending => "pending",
            AttemptStatus::Sent => "sent",
            AttemptStatus::Failed => "failed",
        }
    }
}

impl FromStr for AttemptStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(AttemptStatus::Pending),
            "sent" => Ok(AttemptStatus::Sent),
            "failed" => Ok(AttemptStatus::Failed),
            other => Err(format!("unknown attempt status: {other}")),
        }
    }
}

/// Audit record for one logical send request. One row per request, not per
/// network retry; `retry_count` is the number of transmissions actually
/// made minus one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailAttempt {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub recipient: String,
    pub scenario: String,
    pub subject: Option<String>,
    pub body_preview: Option<String>,
    pub status: AttemptStatus,
    pub sent_at: Option<DateTime<Utc>>,
    pub error_detail: Option<String>,
    pub retry_count: i32,
    pub idempotency_key: Option<String>,
    pub idempotency_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Deduplication record for `(tenant, idempotency key)`. A record past its
/// expiry is treated as absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub tenant_id: Uuid,
    pub key: String,
    pub attempt_id: Uuid,
    pub response: serde_json::Value,
    pub expires_at: DateTime<Utc>,
}

/// Effective connection parameters with the decrypted secret. Ephemeral;
/// never persisted or logged.
#[derive(Debug, Clone)]
pub struct ResolvedSmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub secret: SecretString,
    pub from_address: String,
    pub from_name: String,
    pub transport: TransportMode,
    pub connect_timeout: Duration,
}

/// Filters for the tenant-scoped attempt listing used by log viewers.
#[derive(Debug, Clone)]
pub struct AttemptFilter {
    pub status: Option<AttemptStatus>,
    pub recipient: Option<String>,
    pub sent_after: Option<DateTime<Utc>>,
    pub sent_before: Option<DateTime<Utc>>,
    pub limit: i64,
    pub offset: i64,
}

impl Default for AttemptFilter {
    fn default() -> Self {
        Self {
            status: None,
            recipient: None,
            sent_after: None,
            sent_before: None,
            limit: 50,
            offset: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_mode_parses_aliases() {
        assert_eq!("ssl".parse::<TransportMode>().unwrap(), TransportMode::Tls);
        assert_eq!(
            "STARTTLS".parse::<TransportMode>().unwrap(),
            TransportMode::StartTls
        );
        assert_eq!(
            "plain".parse::<TransportMode>().unwrap(),
            TransportMode::None
        );
        assert!("carrier-pigeon".parse::<TransportMode>().is_err());
    }

    #[test]
    fn attempt_status_roundtrips_through_strings() {
        for status in [
            AttemptStatus::Pending,
            AttemptStatus::Sent,
            AttemptStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<AttemptStatus>().unwrap(), status);
        }
    }
}
