use crate::error::{CipherError, CipherResult};
use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::RngCore;
use secrecy::SecretString;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Envelope version written by this build. Decryption rejects anything else.
const ENVELOPE_VERSION: u32 = 1;

/// Process-wide secret key for credential encryption.
///
/// Loaded once at startup; the raw bytes are zeroized when the key is
/// dropped. A missing or malformed key is a fatal configuration error:
/// the process must refuse to start rather than fall back to storing
/// tenant SMTP passwords in the clear.
#[derive(ZeroizeOnDrop)]
pub struct CipherKey {
    bytes: [u8; 32],
}

impl CipherKey {
    /// Environment variable holding the base64-encoded 32-byte key.
    pub const ENV_VAR: &'static str = "MAIL_CIPHER_KEY";

    /// Load the key from `MAIL_CIPHER_KEY`.
    pub fn from_env() -> CipherResult<Self> {
        let raw = std::env::var(Self::ENV_VAR).map_err(|_| {
            CipherError::MissingKey(format!("{} must be set before startup", Self::ENV_VAR))
        })?;
        Self::from_base64(raw.trim())
    }

    /// Decode a base64-encoded key (standard alphabet, exactly 32 bytes).
    pub fn from_base64(key_b64: &str) -> CipherResult<Self> {
        let mut decoded = BASE64
            .decode(key_b64)
            .map_err(|_| CipherError::InvalidKey("key is not valid base64".into()))?;

        if decoded.len() != 32 {
            let got = decoded.len();
            decoded.zeroize();
            return Err(CipherError::InvalidKeyLength { expected: 32, got });
        }

        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&decoded);
        decoded.zeroize();

        Ok(Self { bytes })
    }

    /// Generate a fresh random key. Intended for provisioning and tests.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        OsRng.fill_bytes(&mut bytes);
        Self { bytes }
    }

    /// Base64 form, for writing the key into deployment configuration.
    pub fn to_base64(&self) -> String {
        BASE64.encode(self.bytes)
    }

    fn bytes(&self) -> &[u8; 32] {
        &self.bytes
    }
}

/// AES-256-GCM cipher for tenant SMTP passwords at rest.
///
/// Every `encrypt` call draws a fresh 96-bit nonce from the OS RNG, so
/// encrypting the same plaintext twice yields different envelopes that
/// both decrypt to the original. The persisted form is a single
/// self-describing string, `v{version}:{nonce_b64}:{ciphertext_b64}`,
/// with the authentication tag inside the ciphertext segment.
pub struct CredentialCipher {
    cipher: Aes256Gcm,
    key_version: u32,
}

impl CredentialCipher {
    pub fn new(key: &CipherKey) -> CipherResult<Self> {
        let cipher = Aes256Gcm::new_from_slice(key.bytes())
            .map_err(|_| CipherError::InvalidKey("key rejected by cipher".into()))?;

        Ok(Self {
            cipher,
            key_version: ENVELOPE_VERSION,
        })
    }

    /// Build the cipher straight from `MAIL_CIPHER_KEY`.
    pub fn from_env() -> CipherResult<Self> {
        Self::new(&CipherKey::from_env()?)
    }

    /// Encrypt a plaintext secret into the versioned envelope format.
    pub fn encrypt(&self, plaintext: &str) -> CipherResult<String> {
        let mut nonce_bytes = [0u8; 12];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| CipherError::Encryption)?;

        Ok(format!(
            "v{}:{}:{}",
            self.key_version,
            BASE64.encode(nonce_bytes),
            BASE64.encode(&ciphertext)
        ))
    }

    /// Decrypt an envelope produced by [`encrypt`](Self::encrypt).
    ///
    /// Verifies the GCM authentication tag before returning anything. A
    /// tag mismatch means the stored blob was tampered with or encrypted
    /// under a different key; the event is logged at security severity
    /// without any key or plaintext material.
    pub fn decrypt(&self, envelope: &str) -> CipherResult<SecretString> {
        let result = self.decrypt_inner(envelope);
        if matches!(result, Err(CipherError::Decryption)) {
            tracing::error!(
                security = true,
                envelope_version = self.key_version,
                "credential decryption failed: authentication tag mismatch"
            );
        }
        result
    }

    fn decrypt_inner(&self, envelope: &str) -> CipherResult<SecretString> {
        let mut parts = envelope.splitn(3, ':');
        let (version_part, nonce_part, ciphertext_part) =
            match (parts.next(), parts.next(), parts.next()) {
                (Some(v), Some(n), Some(c)) => (v, n, c),
                _ => {
                    return Err(CipherError::InvalidEnvelope(
                        "expected v{n}:{nonce}:{ciphertext}".into(),
                    ))
                }
            };

        let version = version_part
            .strip_prefix('v')
            .and_then(|v| v.parse::<u32>().ok())
            .ok_or_else(|| CipherError::InvalidEnvelope("missing version prefix".into()))?;

        if version != self.key_version {
            return Err(CipherError::UnsupportedVersion {
                version,
                supported: self.key_version,
            });
        }

        let nonce_bytes = BASE64
            .decode(nonce_part)
            .map_err(|_| CipherError::InvalidEnvelope("nonce is not valid base64".into()))?;
        if nonce_bytes.len() != 12 {
            return Err(CipherError::InvalidEnvelope("nonce must be 12 bytes".into()));
        }

        let ciphertext = BASE64
            .decode(ciphertext_part)
            .map_err(|_| CipherError::InvalidEnvelope("ciphertext is not valid base64".into()))?;

        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_ref())
            .map_err(|_| CipherError::Decryption)?;

        String::from_utf8(plaintext)
            .map(SecretString::new)
            .map_err(|err| {
                let mut bytes = err.into_bytes();
                bytes.zeroize();
                CipherError::InvalidUtf8
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    fn cipher() -> CredentialCipher {
        CredentialCipher::new(&CipherKey::generate()).unwrap()
    }

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let cipher = cipher();

        let plaintext = "smtp-app-password-123";
        let envelope = cipher.encrypt(plaintext).unwrap();
        let decrypted = cipher.decrypt(&envelope).unwrap();

        assert_eq!(plaintext, decrypted.expose_secret());
    }

    #[test]
    fn same_plaintext_yields_different_envelopes() {
        let cipher = cipher();

        let plaintext = "same plaintext";
        let first = cipher.encrypt(plaintext).unwrap();
        let second = cipher.encrypt(plaintext).unwrap();

        assert_ne!(first, second);
        assert_eq!(cipher.decrypt(&first).unwrap().expose_secret(), plaintext);
        assert_eq!(cipher.decrypt(&second).unwrap().expose_secret(), plaintext);
    }

    #[test]
    fn envelope_format_is_versioned() {
        let cipher = cipher();

        let envelope = cipher.encrypt("secret").unwrap();
        assert!(envelope.starts_with("v1:"));
        assert_eq!(envelope.split(':').count(), 3);
    }

    #[test]
    fn tampered_envelope_is_rejected() {
        let cipher = cipher();

        let mut envelope = cipher.encrypt("authenticated data").unwrap();
        envelope.push('A');

        assert!(matches!(
            cipher.decrypt(&envelope),
            Err(CipherError::Decryption) | Err(CipherError::InvalidEnvelope(_))
        ));
    }

    #[test]
    fn wrong_key_is_rejected() {
        let encrypting = cipher();
        let decrypting = cipher();

        let envelope = encrypting.encrypt("cross-key secret").unwrap();
        assert!(matches!(
            decrypting.decrypt(&envelope),
            Err(CipherError::Decryption)
        ));
    }

    #[test]
    fn unknown_version_is_rejected() {
        let cipher = cipher();

        let envelope = cipher.encrypt("secret").unwrap();
        let bumped = envelope.replacen("v1:", "v9:", 1);

        assert!(matches!(
            cipher.decrypt(&bumped),
            Err(CipherError::UnsupportedVersion {
                version: 9,
                supported: 1
            })
        ));
    }

    #[test]
    fn malformed_envelope_is_rejected() {
        let cipher = cipher();

        for bad in ["", "v1", "v1:only-two", "1:abc:def", "vX:abc:def"] {
            assert!(matches!(
                cipher.decrypt(bad),
                Err(CipherError::InvalidEnvelope(_))
            ));
        }
    }

    #[test]
    fn short_key_is_rejected() {
        let short = BASE64.encode(b"too-short");
        assert!(matches!(
            CipherKey::from_base64(&short),
            Err(CipherError::InvalidKeyLength {
                expected: 32,
                got: 9
            })
        ));
    }

    #[test]
    fn key_base64_roundtrip() {
        let key = CipherKey::generate();
        let restored = CipherKey::from_base64(&key.to_base64()).unwrap();
        assert_eq!(key.bytes(), restored.bytes());
    }

    #[test]
    fn empty_plaintext_roundtrips() {
        let cipher = cipher();

        let envelope = cipher.encrypt("").unwrap();
        assert_eq!(cipher.decrypt(&envelope).unwrap().expose_secret(), "");
    }

    #[test]
    fn missing_env_key_is_a_configuration_error() {
        std::env::remove_var(CipherKey::ENV_VAR);
        assert!(matches!(
            CipherKey::from_env(),
            Err(CipherError::MissingKey(_))
        ));
    }

    proptest::proptest! {
        #[test]
        fn roundtrip_holds_for_arbitrary_secrets(plaintext in ".*") {
            let cipher = cipher();
            let envelope = cipher.encrypt(&plaintext).unwrap();
            let decrypted = cipher.decrypt(&envelope).unwrap();
            proptest::prop_assert_eq!(
                decrypted.expose_secret(),
                &plaintext
            );
        }
    }
}
