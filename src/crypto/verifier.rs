//! Signed payloads (HMAC-SHA256)
//!
//! Token format: `base64url("HS256") . base64url(payload) . base64url(signature)`, where the
//! signature covers the first two segments.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::{decode_segment, encode_segment, split_token};

type HmacSha256 = Hmac<Sha256>;

/// Encoded `"HS256"` header
const HEADER: &str = "SFMyNTY";

/// Sign a payload, producing a token that can be checked with [`verify`].
pub fn sign(payload: &[u8], signing_key: &[u8]) -> String {
    let signed_part = format!("{HEADER}.{}", encode_segment(payload));
    let signature = compute_hmac(signed_part.as_bytes(), signing_key);
    format!("{signed_part}.{}", encode_segment(&signature))
}

/// Verify a token produced by [`sign`] and return its payload.
///
/// Returns `None` if the token is malformed or the signature doesn't match.
pub fn verify(token: &str, signing_key: &[u8]) -> Option<Vec<u8>> {
    let (payload_segment, signature_segment) = split_token(token, HEADER)?;
    let signature = decode_segment(signature_segment)?;
    let payload = decode_segment(payload_segment)?;

    let signed_len = HEADER.len() + 1 + payload_segment.len();
    let mut mac = new_mac(signing_key);
    mac.update(&token.as_bytes()[..signed_len]);
    mac.verify_slice(&signature).ok()?;

    Some(payload)
}

fn compute_hmac(message: &[u8], key: &[u8]) -> Vec<u8> {
    let mut mac = new_mac(key);
    mac.update(message);
    mac.finalize().into_bytes().to_vec()
}

#[allow(clippy::expect_used)]
fn new_mac(key: &[u8]) -> HmacSha256 {
    HmacSha256::new_from_slice(key).expect("HMAC accepts keys of any size")
}
