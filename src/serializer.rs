//! Session data serialization

use crate::error::{DecodeError, SessionError, SessionResult};

/// Session data: a map of string keys to arbitrary JSON-compatible values.
/// An empty map represents an empty session.
pub type SessionData = serde_json::Map<String, serde_json::Value>;

/// Converts session data to and from the bytes kept in storage (before any
/// signing/encryption is applied). You can use your own format by implementing this trait.
///
/// Stored bytes must be treated as untrusted: `decode` should never panic, and should
/// return a [`DecodeError`] for anything it can't safely reconstruct.
pub trait SessionSerializer: Send + Sync {
    /// Encode the session data
    fn encode(&self, data: &SessionData) -> SessionResult<Vec<u8>>;

    /// Decode session data previously produced by `encode`
    fn decode(&self, bytes: &[u8]) -> Result<SessionData, DecodeError>;
}

/// The default serializer, storing session data as a JSON object.
///
/// Decoding is bounded: payloads over `max_size` bytes are rejected before parsing, and
/// serde_json limits nesting depth, so a corrupt or hostile payload can't exhaust memory or stack.
#[derive(Clone, Debug)]
pub struct JsonSerializer {
    /// Maximum payload size accepted when decoding (default: 1 MiB)
    pub max_size: usize,
}

impl Default for JsonSerializer {
    fn default() -> Self {
        Self {
            max_size: 1024 * 1024,
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("payload of {0} bytes exceeds the limit of {1} bytes")]
struct PayloadTooLarge(usize, usize);

impl SessionSerializer for JsonSerializer {
    fn encode(&self, data: &SessionData) -> SessionResult<Vec<u8>> {
        serde_json::to_vec(data).map_err(|e| SessionError::Serialization(Box::new(e)))
    }

    fn decode(&self, bytes: &[u8]) -> Result<SessionData, DecodeError> {
        if bytes.len() > self.max_size {
            return Err(DecodeError::new(PayloadTooLarge(bytes.len(), self.max_size)));
        }
        serde_json::from_slice(bytes).map_err(DecodeError::new)
    }
}
