use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rsa::pkcs8::DecodePublicKey;
use rsa::rand_core::OsRng;
use rsa::{Oaep, RsaPublicKey};
use serde::Serialize;
use sha2::Sha256;

use crate::error::Error;

/// A credential secret that has already been encrypted for the provider.
///
/// Only [`SecretCipher::encrypt_field`] and [`EncryptedField::from_ciphertext`]
/// produce values of this type, so request fields typed `EncryptedField`
/// cannot carry plaintext. `Debug` is redacted.
#[derive(Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct EncryptedField(String);

impl EncryptedField {
    /// Wrap a base64 ciphertext produced elsewhere (for example in a browser).
    #[must_use]
    pub fn from_ciphertext(base64_ciphertext: impl Into<String>) -> Self {
        Self(base64_ciphertext.into())
    }

    /// Base64 of the raw RSA-OAEP ciphertext.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for EncryptedField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EncryptedField(<{} chars>)", self.0.len())
    }
}

enum KeyState {
    Missing,
    Invalid(String),
    Ready(Box<RsaPublicKey>),
}

/// RSA-OAEP (SHA-256) encryption of individual credential fields.
///
/// Construction never fails: a missing or unparseable key is remembered and
/// reported by every [`encrypt_field`](SecretCipher::encrypt_field) call.
pub struct SecretCipher {
    key: KeyState,
}

impl SecretCipher {
    /// Build a cipher from an SPKI public key, PEM armored or bare base64.
    #[must_use]
    pub fn new(public_key: &str) -> Self {
        let key = if public_key.trim().is_empty() {
            KeyState::Missing
        } else {
            match parse_public_key(public_key) {
                Ok(key) => KeyState::Ready(Box::new(key)),
                Err(e) => {
                    tracing::warn!(error = %e, "RSA public key could not be imported");
                    KeyState::Invalid(e.to_string())
                }
            }
        };
        Self { key }
    }

    /// Like [`new`](SecretCipher::new), but fails immediately on a bad key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Encryption`] if the key is missing or cannot be parsed.
    pub fn try_new(public_key: &str) -> Result<Self, Error> {
        let cipher = Self::new(public_key);
        cipher.public_key()?;
        Ok(cipher)
    }

    /// Whether a usable public key is loaded.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self.key, KeyState::Ready(_))
    }

    /// Encrypt one secret. Output is randomized; equal inputs give different ciphertexts.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Encryption`] if no usable key is configured or the
    /// plaintext is too long for the key size.
    pub fn encrypt_field(&self, plaintext: &str) -> Result<EncryptedField, Error> {
        let key = self.public_key()?;
        let ciphertext = key
            .encrypt(&mut OsRng, Oaep::new::<Sha256>(), plaintext.as_bytes())
            .map_err(|e| Error::Encryption(e.to_string()))?;
        tracing::debug!(
            plaintext_len = plaintext.len(),
            ciphertext_len = ciphertext.len(),
            "Encrypted credential field"
        );
        Ok(EncryptedField(STANDARD.encode(ciphertext)))
    }

    /// Encrypt an optional secret, passing `None` through.
    ///
    /// # Errors
    ///
    /// See [`encrypt_field`](SecretCipher::encrypt_field).
    pub fn encrypt_optional(&self, plaintext: Option<&str>) -> Result<Option<EncryptedField>, Error> {
        plaintext
            .filter(|p| !p.is_empty())
            .map(|p| self.encrypt_field(p))
            .transpose()
    }

    fn public_key(&self) -> Result<&RsaPublicKey, Error> {
        match &self.key {
            KeyState::Ready(key) => Ok(&**key),
            KeyState::Missing => Err(Error::Encryption("public key is not configured".into())),
            KeyState::Invalid(reason) => {
                Err(Error::Encryption(format!("public key is invalid: {reason}")))
            }
        }
    }
}

/// Parses an SPKI RSA public key given as PEM or as bare base64 DER.
///
/// # Errors
///
/// Returns `Error::Encryption` if the base64 or the DER structure is invalid.
pub fn parse_public_key(public_key: &str) -> Result<RsaPublicKey, Error> {
    let body: String = public_key
        .replace("-----BEGIN PUBLIC KEY-----", "")
        .replace("-----END PUBLIC KEY-----", "")
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    let der = STANDARD
        .decode(body)
        .map_err(|e| Error::Encryption(format!("invalid base64: {e}")))?;
    RsaPublicKey::from_public_key_der(&der)
        .map_err(|e| Error::Encryption(format!("invalid SPKI key: {e}")))
}

#[cfg(test)]
mod tests {
    use rsa::RsaPrivateKey;
    use rsa::pkcs8::{EncodePublicKey, LineEnding};

    use super::*;

    fn key_pair() -> (RsaPrivateKey, String) {
        let private = RsaPrivateKey::new(&mut OsRng, 1024).unwrap();
        let pem = RsaPublicKey::from(&private)
            .to_public_key_pem(LineEnding::LF)
            .unwrap();
        (private, pem)
    }

    fn decrypt(private: &RsaPrivateKey, field: &EncryptedField) -> String {
        let raw = STANDARD.decode(field.as_str()).unwrap();
        String::from_utf8(private.decrypt(Oaep::new::<Sha256>(), &raw).unwrap()).unwrap()
    }

    #[test]
    fn test_encrypt_roundtrip_is_randomized() {
        let (private, pem) = key_pair();
        let cipher = SecretCipher::new(&pem);
        assert!(cipher.is_ready());

        let first = cipher.encrypt_field("1234").unwrap();
        let second = cipher.encrypt_field("1234").unwrap();

        assert_ne!(first, second, "OAEP output should be randomized");
        assert_eq!(decrypt(&private, &first), "1234");
        assert_eq!(decrypt(&private, &second), "1234");
    }

    #[test]
    fn test_bare_base64_key_accepted() {
        let (private, pem) = key_pair();
        let bare: String = pem.lines().filter(|l| !l.starts_with("-----")).collect();
        let cipher = SecretCipher::new(&bare);
        let field = cipher.encrypt_field("pw").unwrap();
        assert_eq!(decrypt(&private, &field), "pw");
    }

    #[test]
    fn test_missing_key_fails_per_call() {
        let cipher = SecretCipher::new("  ");
        assert!(!cipher.is_ready());
        let err = cipher.encrypt_field("1234").unwrap_err();
        assert!(matches!(err, Error::Encryption(ref m) if m.contains("not configured")));
    }

    #[test]
    fn test_invalid_key_fails_per_call() {
        let cipher = SecretCipher::new("-----BEGIN PUBLIC KEY-----\nbm90IGEga2V5\n-----END PUBLIC KEY-----");
        assert!(matches!(cipher.encrypt_field("x"), Err(Error::Encryption(_))));
        assert!(SecretCipher::try_new("%%%").is_err());
    }

    #[test]
    fn test_encrypt_optional_skips_empty() {
        let (_, pem) = key_pair();
        let cipher = SecretCipher::new(&pem);
        assert!(cipher.encrypt_optional(None).unwrap().is_none());
        assert!(cipher.encrypt_optional(Some("")).unwrap().is_none());
        assert!(cipher.encrypt_optional(Some("a")).unwrap().is_some());
    }

    #[test]
    fn test_debug_is_redacted() {
        let field = EncryptedField::from_ciphertext("c2VjcmV0");
        assert!(!format!("{field:?}").contains("c2VjcmV0"));
    }
}
