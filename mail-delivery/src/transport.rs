//! Outbound SMTP transport.
//!
//! The engine talks to the network only through [`MailTransport`]; the
//! production implementation drives Stalwart's `mail-send` client. Every
//! failure is classified into a [`TransportErrorKind`] so the retry loop
//! can tell transient trouble from permanent rejection.

use crate::models::{ResolvedSmtpConfig, TransportMode};
use async_trait::async_trait;
use mail_builder::MessageBuilder;
use mail_send::SmtpClientBuilder;
use mail_templates::RenderedMessage;
use secrecy::ExposeSecret;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// Network-level connect/read/write failure.
    Connection,
    /// The configured timeout elapsed.
    Timeout,
    /// Transient (4xx-class) server response.
    TransientResponse,
    /// TLS negotiation failed.
    Tls,
    /// The server rejected the credentials.
    AuthRejected,
    /// The server rejected the recipient.
    RecipientRejected,
    /// Permanent (5xx-class) server response.
    PermanentResponse,
    /// Anything not classified above.
    Unexpected,
}

impl TransportErrorKind {
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            TransportErrorKind::Connection
                | TransportErrorKind::Timeout
                | TransportErrorKind::TransientResponse
        )
    }
}

#[derive(Debug, Clone, Error)]
#[error("{detail}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub detail: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    pub fn timeout(detail: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Timeout, detail)
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

/// Mail-transfer abstraction. `send` submits one two-part MIME message;
/// `probe` connects and authenticates without submitting anything.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(
        &self,
        config: &ResolvedSmtpConfig,
        message: &RenderedMessage,
        recipient: &str,
    ) -> Result<(), TransportError>;

    async fn probe(&self, config: &ResolvedSmtpConfig) -> Result<(), TransportError>;
}

/// Production SMTP transport backed by `mail-send`.
#[derive(Debug, Default)]
pub struct SmtpMailer;

impl SmtpMailer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MailTransport for SmtpMailer {
    async fn send(
        &self,
        config: &ResolvedSmtpConfig,
        message: &RenderedMessage,
        recipient: &str,
    ) -> Result<(), TransportError> {
        let builder = MessageBuilder::new()
            .from((config.from_name.as_str(), config.from_address.as_str()))
            .to(recipient)
            .subject(message.subject.as_str())
            .text_body(message.text_body.as_str())
            .html_body(message.html_body.as_str());

        let secret = config.secret.expose_secret();

        match config.transport {
            TransportMode::Tls | TransportMode::StartTls => {
                let mut client_builder =
                    SmtpClientBuilder::new(config.host.as_str(), config.port)
                        .implicit_tls(config.transport == TransportMode::Tls);
                if !config.username.is_empty() {
                    client_builder = client_builder
                        .credentials((config.username.as_str(), secret.as_str()));
                }

                let mut client = tokio::time::timeout(
                    config.connect_timeout,
                    client_builder.connect(),
                )
                .await
                .map_err(|_| TransportError::timeout("SMTP connection timed out"))?
                .map_err(classify)?;

                tokio::time::timeout(config.connect_timeout, client.send(builder))
                    .await
                    .map_err(|_| TransportError::timeout("SMTP send timed out"))?
                    .map_err(classify)?;
            }
            TransportMode::None => {
                let mut client_builder =
                    SmtpClientBuilder::new(config.host.as_str(), config.port);
                if !config.username.is_empty() {
                    client_builder = client_builder
                        .credentials((config.username.as_str(), secret.as_str()));
                }

                let mut client = tokio::time::timeout(
                    config.connect_timeout,
                    client_builder.connect_plain(),
                )
                .await
                .map_err(|_| TransportError::timeout("SMTP connection timed out"))?
                .map_err(classify)?;

                tokio::time::timeout(config.connect_timeout, client.send(builder))
                    .await
                    .map_err(|_| TransportError::timeout("SMTP send timed out"))?
                    .map_err(classify)?;
            }
        }

        debug!(host = %config.host, "message submitted");
        Ok(())
    }

    async fn probe(&self, config: &ResolvedSmtpConfig) -> Result<(), TransportError> {
        let secret = config.secret.expose_secret();

        match config.transport {
            TransportMode::Tls | TransportMode::StartTls => {
                let mut client_builder =
                    SmtpClientBuilder::new(config.host.as_str(), config.port)
                        .implicit_tls(config.transport == TransportMode::Tls);
                if !config.username.is_empty() {
                    client_builder = client_builder
                        .credentials((config.username.as_str(), secret.as_str()));
                }

                tokio::time::timeout(config.connect_timeout, client_builder.connect())
                    .await
                    .map_err(|_| TransportError::timeout("SMTP connection timed out"))?
                    .map_err(classify)?;
            }
            TransportMode::None => {
                let mut client_builder =
                    SmtpClientBuilder::new(config.host.as_str(), config.port);
                if !config.username.is_empty() {
                    client_builder = client_builder
                        .credentials((config.username.as_str(), secret.as_str()));
                }

                tokio::time::timeout(config.connect_timeout, client_builder.connect_plain())
                    .await
                    .map_err(|_| TransportError::timeout("SMTP connection timed out"))?
                    .map_err(classify)?;
            }
        }

        Ok(())
    }
}

/// Map a `mail-send` failure onto the retry taxonomy.
fn classify(err: mail_send::Error) -> TransportError {
    let detail = err.to_string();
    let kind = match &err {
        mail_send::Error::Io(_) | mail_send::Error::Timeout => TransportErrorKind::Connection,
        mail_send::Error::Tls(_) => TransportErrorKind::Tls,
        mail_send::Error::AuthenticationFailed(_) => TransportErrorKind::AuthRejected,
        mail_send::Error::UnexpectedReply(_) => classify_reply(&detail),
        _ => TransportErrorKind::Unexpected,
    };
    TransportError::new(kind, detail)
}

/// Classify a server reply by its status class: 4xx responses are
/// transient, 5xx permanent, with recipient rejections split out.
fn classify_reply(detail: &str) -> TransportErrorKind {
    let code = detail
        .split(|c: char| !c.is_ascii_digit())
        .find(|s| s.len() == 3)
        .and_then(|s| s.parse::<u16>().ok());

    match code {
        Some(550) | Some(551) | Some(553) => TransportErrorKind::RecipientRejected,
        Some(c) if (400..500).contains(&c) => TransportErrorKind::TransientResponse,
        Some(c) if (500..600).contains(&c) => TransportErrorKind::PermanentResponse,
        _ => TransportErrorKind::Unexpected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryability_follows_the_taxonomy() {
        assert!(TransportErrorKind::Connection.is_retryable());
        assert!(TransportErrorKind::Timeout.is_retryable());
        assert!(TransportErrorKind::TransientResponse.is_retryable());

        assert!(!TransportErrorKind::AuthRejected.is_retryable());
        assert!(!TransportErrorKind::RecipientRejected.is_retryable());
        assert!(!TransportErrorKind::PermanentResponse.is_retryable());
        assert!(!TransportErrorKind::Tls.is_retryable());
        assert!(!TransportErrorKind::Unexpected.is_retryable());
    }

    #[test]
    fn server_replies_classify_by_status_class() {
        assert_eq!(
            classify_reply("unexpected reply: 451 temporary local problem"),
            TransportErrorKind::TransientResponse
        );
        assert_eq!(
            classify_reply("unexpected reply: 554 transaction failed"),
            TransportErrorKind::PermanentResponse
        );
        assert_eq!(
            classify_reply("unexpected reply: 550 no such user"),
            TransportErrorKind::RecipientRejected
        );
        assert_eq!(
            classify_reply("no status code here"),
            TransportErrorKind::Unexpected
        );
    }
}
