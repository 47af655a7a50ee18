//! At-rest encryption for tenant SMTP credentials.
//!
//! Tenant mail passwords are never stored in the clear. This crate wraps
//! them in AES-256-GCM under a single process-wide key loaded at startup,
//! producing a self-describing envelope string that embeds the nonce and
//! authentication tag. Decryption verifies the tag before returning the
//! plaintext, so a tampered row or a key mismatch surfaces as a distinct
//! error instead of garbage credentials reaching a mail server.

pub mod cipher;
pub mod error;

pub use cipher::{CipherKey, CredentialCipher};
pub use error::{CipherError, CipherResult};
