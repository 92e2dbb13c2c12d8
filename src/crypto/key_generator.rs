//! PBKDF2 key derivation

use pbkdf2::pbkdf2_hmac;
use sha2::{Sha256, Sha384, Sha512};

use crate::error::{SessionError, SessionResult};

/// Minimum length of the secret key base, in bytes. The same secret is used to derive
/// both the signing and the encryption key.
pub const MIN_SECRET_LENGTH: usize = 64;

/// Digest used by the HMAC inside PBKDF2
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum KeyDigest {
    #[default]
    Sha256,
    Sha384,
    Sha512,
}

/// Parameters for deriving keys from a secret and a salt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeyGenerator {
    /// Number of PBKDF2 iterations (default: `1000`)
    pub iterations: u32,
    /// Length of the derived key in bytes (default: `32`)
    pub length: usize,
    /// HMAC digest (default: SHA-256)
    pub digest: KeyDigest,
}

impl Default for KeyGenerator {
    fn default() -> Self {
        Self {
            iterations: 1000,
            length: 32,
            digest: KeyDigest::Sha256,
        }
    }
}

impl KeyGenerator {
    pub(crate) fn validate(&self) -> SessionResult<()> {
        if self.iterations == 0 {
            return Err(SessionError::Configuration(
                "key iterations must be greater than zero".to_owned(),
            ));
        }
        if self.length == 0 {
            return Err(SessionError::Configuration(
                "key length must be greater than zero".to_owned(),
            ));
        }
        Ok(())
    }

    /// Derive a key from the secret and salt. The result only depends on the inputs.
    pub fn derive(&self, secret: &[u8], salt: &[u8]) -> SessionResult<Vec<u8>> {
        self.validate()?;
        check_secret(secret)?;

        let mut key = vec![0u8; self.length];
        match self.digest {
            KeyDigest::Sha256 => pbkdf2_hmac::<Sha256>(secret, salt, self.iterations, &mut key),
            KeyDigest::Sha384 => pbkdf2_hmac::<Sha384>(secret, salt, self.iterations, &mut key),
            KeyDigest::Sha512 => pbkdf2_hmac::<Sha512>(secret, salt, self.iterations, &mut key),
        }
        Ok(key)
    }
}

/// Make sure the secret is long enough to derive independent keys from
pub(crate) fn check_secret(secret: &[u8]) -> SessionResult<()> {
    if secret.len() < MIN_SECRET_LENGTH {
        return Err(SessionError::Configuration(format!(
            "secret key base must be at least {MIN_SECRET_LENGTH} bytes (got {})",
            secret.len()
        )));
    }
    Ok(())
}
