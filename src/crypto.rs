//! Key derivation and payload envelopes
//!
//! Session payloads can be wrapped in one of two envelopes before they reach storage:
//! - [`verifier`]: the payload is signed with HMAC-SHA256, so it can be read by anyone
//!   with database access but can't be modified.
//! - [`encryptor`]: the payload is encrypted with AES-256-GCM, so it can be neither read nor modified.
//!
//! Both envelopes produce a single URL-safe text token, and both return `None` for any
//! token they can't open.

pub mod encryptor;
pub mod key_generator;
pub mod verifier;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};

pub use key_generator::{KeyDigest, KeyGenerator};

/// Split a three-part `header.body.tail` token, checking the header
fn split_token<'a>(token: &'a str, header: &str) -> Option<(&'a str, &'a str)> {
    let mut parts = token.splitn(3, '.');
    let (token_header, body, tail) = (parts.next()?, parts.next()?, parts.next()?);
    (token_header == header).then_some((body, tail))
}

fn encode_segment(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

fn decode_segment(segment: &str) -> Option<Vec<u8>> {
    URL_SAFE_NO_PAD.decode(segment).ok()
}
