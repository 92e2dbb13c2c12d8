//! Encrypted payloads (AES-256-GCM)
//!
//! Token format: `base64url("A256GCM") . base64url(nonce) . base64url(ciphertext + tag)`.
//! The header and the signing key are bound to the ciphertext as associated data, so a token
//! only opens with the same pair of keys it was sealed with.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use rand::RngCore;

use super::{decode_segment, encode_segment, split_token};
use crate::error::{SessionError, SessionResult};

/// Encoded `"A256GCM"` header
const HEADER: &str = "QTI1NkdDTQ";

/// Size of the AES-256 key in bytes. Derived encryption keys must be at least this long.
pub const KEY_LENGTH: usize = 32;

const NONCE_LENGTH: usize = 12;

/// Encrypt a payload, producing a token that can be opened with [`decrypt`].
pub fn encrypt(payload: &[u8], encryption_key: &[u8], signing_key: &[u8]) -> SessionResult<String> {
    let cipher = new_cipher(encryption_key).ok_or_else(|| {
        SessionError::Configuration(format!(
            "encryption key must be at least {KEY_LENGTH} bytes"
        ))
    })?;

    let mut nonce = [0u8; NONCE_LENGTH];
    rand::rng().fill_bytes(&mut nonce);

    let ciphertext = cipher
        .encrypt(
            Nonce::from_slice(&nonce),
            Payload {
                msg: payload,
                aad: &associated_data(signing_key),
            },
        )
        .map_err(|e| SessionError::Serialization(e.to_string().into()))?;

    Ok(format!(
        "{HEADER}.{}.{}",
        encode_segment(&nonce),
        encode_segment(&ciphertext)
    ))
}

/// Decrypt a token produced by [`encrypt`].
///
/// Returns `None` if the token is malformed, was tampered with, or was sealed with other keys.
pub fn decrypt(token: &str, encryption_key: &[u8], signing_key: &[u8]) -> Option<Vec<u8>> {
    let (nonce_segment, ciphertext_segment) = split_token(token, HEADER)?;
    let nonce = decode_segment(nonce_segment)?;
    if nonce.len() != NONCE_LENGTH {
        return None;
    }
    let ciphertext = decode_segment(ciphertext_segment)?;

    new_cipher(encryption_key)?
        .decrypt(
            Nonce::from_slice(&nonce),
            Payload {
                msg: &ciphertext,
                aad: &associated_data(signing_key),
            },
        )
        .ok()
}

fn new_cipher(key: &[u8]) -> Option<Aes256Gcm> {
    let key = key.get(..KEY_LENGTH)?;
    Aes256Gcm::new_from_slice(key).ok()
}

fn associated_data(signing_key: &[u8]) -> Vec<u8> {
    let mut aad = Vec::with_capacity(HEADER.len() + signing_key.len());
    aad.extend_from_slice(HEADER.as_bytes());
    aad.extend_from_slice(signing_key);
    aad
}
