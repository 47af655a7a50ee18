//! Tenant-isolated email delivery engine.
//!
//! The core of the CRM's outbound mail: turning a business event into a
//! reliably delivered, audited email without ever leaking one tenant's
//! credentials, content, or delivery history to another.
//!
//! - [`resolver::ConfigResolver`] picks the effective SMTP configuration
//!   for a tenant, falling back to process-wide defaults, and decrypts the
//!   stored secret via `mail-crypto`.
//! - [`engine::DeliveryEngine::enqueue`] writes a `pending` audit record
//!   and returns immediately; transmission happens in detached background
//!   units with bounded retries (fixed 2s/4s/8s backoff), per-tenant
//!   admission limits, and explicit tenant context threaded through every
//!   call.
//! - [`transport::SmtpMailer`] submits the two-part MIME message over
//!   implicit TLS, STARTTLS, or plaintext via Stalwart's `mail-send`.
//! - The store is reached only through the traits in [`store`]; Postgres
//!   and in-memory implementations are provided.

pub mod config;
pub mod context;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod models;
pub mod resolver;
pub mod store;
pub mod transport;

pub use config::{EngineSettings, FallbackSmtp};
pub use context::{ContextRegistry, TenantContext};
pub use engine::{DeliveryEngine, EnqueueOutcome, SendRequest};
pub use error::{DeliveryError, DeliveryResult};
pub use models::{
    AttemptFilter, AttemptStatus, EmailAttempt, IdempotencyRecord, ResolvedSmtpConfig,
    TenantSmtpConfig, TransportMode,
};
pub use resolver::{ConfigResolver, SmtpConfigInput, ValidationReport};
pub use store::{AttemptStore, ConfigStore, IdempotencyStore, MemoryMailStore, PgMailStore};
pub use transport::{MailTransport, SmtpMailer, TransportError, TransportErrorKind};
