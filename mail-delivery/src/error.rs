use crate::transport::TransportError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("store error: {0}")]
    Store(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Cipher(#[from] mail_crypto::CipherError),

    #[error(transparent)]
    Render(#[from] mail_templates::RenderError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("configuration error: {0}")]
    Configuration(String),
}

pub type DeliveryResult<T> = Result<T, DeliveryError>;
