//! Connection-string encryption hooks.
//!
//! The actual cryptography lives outside this crate. A [`Cipher`] is plugged
//! into the context together with the [`KeyPair`] it should use: the private
//! key decrypts `Encrypt: true` connection strings, the public key produces
//! new ciphertext for the detail file.

use std::fmt;

/// Asymmetric key material, in whatever encoding the cipher expects.
#[derive(Clone, Default)]
pub struct KeyPair {
    pub public_key: String,
    pub private_key: String,
}

impl KeyPair {
    pub fn new(public_key: impl Into<String>, private_key: impl Into<String>) -> Self {
        Self {
            public_key: public_key.into(),
            private_key: private_key.into(),
        }
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &self.public_key)
            .field("private_key", &"****")
            .finish()
    }
}

/// Error returned by a [`Cipher`]; only its message is kept.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct CipherError(pub String);

impl CipherError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// External encryption collaborator.
pub trait Cipher: Send + Sync {
    fn decrypt(&self, cipher_text: &str, private_key: &str) -> Result<String, CipherError>;

    fn encrypt(&self, plain_text: &str, public_key: &str) -> Result<String, CipherError>;
}

impl<F> Cipher for F
where
    F: Fn(&str, &str) -> Result<String, CipherError> + Send + Sync,
{
    /// A bare function only decrypts.
    fn decrypt(&self, cipher_text: &str, private_key: &str) -> Result<String, CipherError> {
        self(cipher_text, private_key)
    }

    fn encrypt(&self, _plain_text: &str, _public_key: &str) -> Result<String, CipherError> {
        Err(CipherError::new("this cipher only supports decryption"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_pair_debug_hides_private_key() {
        let keys = KeyPair::new("pub", "very-secret");
        let shown = format!("{:?}", keys);
        assert!(shown.contains("pub"));
        assert!(!shown.contains("very-secret"));
    }

    #[test]
    fn test_closure_cipher_decrypts_only() {
        let cipher = |text: &str, key: &str| -> Result<String, CipherError> {
            Ok(format!("{}:{}", key, text))
        };
        assert_eq!(cipher.decrypt("abc", "k").unwrap(), "k:abc");
        assert!(cipher.encrypt("abc", "k").is_err());
    }
}
