//! Store configuration: expiry, payload envelope, serializer and logging.

use std::{
    borrow::Cow,
    fmt,
    sync::{Arc, OnceLock},
};

use bon::Builder;
use rocket::time::Duration;

use crate::{
    crypto::{encryptor, key_generator::check_secret, verifier, KeyDigest, KeyGenerator},
    error::{SessionError, SessionResult},
    serializer::{JsonSerializer, SessionData, SessionSerializer},
    store::SessionCarrier,
};

/// The secret that signing and encryption keys are derived from. Must be at least 64 bytes.
#[derive(Clone)]
pub struct SecretKeyBase(Vec<u8>);

impl SecretKeyBase {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self(secret.into())
    }

    pub fn expose_secret(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for SecretKeyBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKeyBase([REDACTED])")
    }
}

impl From<&str> for SecretKeyBase {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}
impl From<String> for SecretKeyBase {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}
impl From<Vec<u8>> for SecretKeyBase {
    fn from(value: Vec<u8>) -> Self {
        Self(value)
    }
}
impl From<&[u8]> for SecretKeyBase {
    fn from(value: &[u8]) -> Self {
        Self::new(value)
    }
}

/// A key derivation salt. Either a fixed value, or a function that's called on every
/// request (e.g. to rotate salts without restarting).
#[derive(Clone)]
pub enum Salt {
    Static(String),
    Deferred(Arc<dyn Fn() -> String + Send + Sync>),
}

impl Salt {
    /// Create a salt that's resolved on each request
    pub fn deferred(f: impl Fn() -> String + Send + Sync + 'static) -> Self {
        Self::Deferred(Arc::new(f))
    }

    fn resolve(&self) -> SessionResult<Cow<'_, str>> {
        let salt = match self {
            Salt::Static(salt) => Cow::Borrowed(salt.as_str()),
            Salt::Deferred(f) => Cow::Owned(f()),
        };
        if salt.is_empty() {
            return Err(SessionError::Configuration("salt must not be empty".to_owned()));
        }
        Ok(salt)
    }
}

impl fmt::Debug for Salt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Salt::Static(salt) => f.debug_tuple("Static").field(salt).finish(),
            Salt::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

impl From<&str> for Salt {
    fn from(value: &str) -> Self {
        Self::Static(value.to_owned())
    }
}
impl From<String> for Salt {
    fn from(value: String) -> Self {
        Self::Static(value)
    }
}

/**
Options for signing or encrypting session payloads.

Setting an `encryption_salt` switches the store from signing payloads to encrypting them.
If a `secret_key_base` is given here, the keys are derived once when the config is built;
otherwise the secret is read from the request on every call.

```
use rocket_db_session::config::CryptoOptions;

let options = CryptoOptions::builder()
    .secret_key_base("a very long secret that is at least sixty-four bytes long ......!")
    .signing_salt("signed session")
    .encryption_salt("encrypted session")
    .build();
```
*/
#[derive(Builder, Clone, Debug)]
pub struct CryptoOptions {
    /// Fixed secret for key derivation. If unset, the request carrier must provide one.
    #[builder(into)]
    secret_key_base: Option<SecretKeyBase>,
    /// Salt for the signing key.
    #[builder(into)]
    signing_salt: Salt,
    /// Salt for the encryption key. Enables encryption when set.
    #[builder(into)]
    encryption_salt: Option<Salt>,
    /// PBKDF2 iterations (default: `1000`)
    #[builder(default = 1000)]
    key_iterations: u32,
    /// Derived key length in bytes (default: `32`)
    #[builder(default = 32)]
    key_length: usize,
    /// PBKDF2 digest (default: SHA-256)
    #[builder(default)]
    key_digest: KeyDigest,
}

/// How to report sessions that were found but couldn't be read (bad signature, failed
/// decryption, corrupt data).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    #[default]
    Debug,
}

impl LogLevel {
    pub(crate) fn log(self, args: fmt::Arguments<'_>) {
        match self {
            LogLevel::Off => {}
            LogLevel::Error => rocket::error!("{}", args),
            LogLevel::Warn => rocket::warn!("{}", args),
            LogLevel::Info => rocket::info!("{}", args),
            LogLevel::Debug => rocket::debug!("{}", args),
        }
    }
}

/// Options for building a [`StoreConfig`].
#[derive(Clone)]
pub struct StoreOptions {
    /// How long sessions stay valid after they're created, read, or saved, in seconds.
    /// The session cookie uses the same `Max-Age`. (default: 2 weeks)
    pub max_age: u32,
    /// Sign or encrypt the stored payload. If `None`, the serialized data is stored as-is.
    /// (default: `None`)
    pub crypto: Option<CryptoOptions>,
    /// Serializer for session data (default: [`JsonSerializer`])
    pub serializer: Arc<dyn SessionSerializer>,
    /// Log level for unreadable sessions (default: [`LogLevel::Debug`])
    pub log_level: LogLevel,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            max_age: 14 * 24 * 60 * 60, // 14 days
            crypto: None,
            serializer: Arc::new(JsonSerializer::default()),
            log_level: LogLevel::default(),
        }
    }
}

/// Validated store configuration, built once at startup and shared by every request.
pub struct StoreConfig {
    pub(crate) max_age: Duration,
    pub(crate) serializer: Arc<dyn SessionSerializer>,
    pub(crate) log_level: LogLevel,
    crypto: Option<CryptoConfig>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        let options = StoreOptions::default();
        Self {
            max_age: Duration::seconds(options.max_age.into()),
            serializer: options.serializer,
            log_level: options.log_level,
            crypto: None,
        }
    }
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("max_age", &self.max_age)
            .field("log_level", &self.log_level)
            .field("crypto", &self.crypto.as_ref().map(|c| c.mode()))
            .finish_non_exhaustive()
    }
}

impl StoreConfig {
    /// Validate the options and pre-derive keys where possible.
    pub fn init(options: StoreOptions) -> SessionResult<Self> {
        if options.max_age == 0 {
            return Err(SessionError::Configuration(
                "max_age must be greater than zero".to_owned(),
            ));
        }
        let crypto = options.crypto.map(CryptoConfig::init).transpose()?;

        Ok(Self {
            max_age: Duration::seconds(options.max_age.into()),
            serializer: options.serializer,
            log_level: options.log_level,
            crypto,
        })
    }

    /**
    Check the secret that requests will carry, and derive its keys once so they don't
    need to be derived again on every call. Fails if payloads are signed or encrypted and
    no usable secret is available, either here or in the [`CryptoOptions`].

    The [`RocketDbSession`](crate::RocketDbSession) fairing calls this on ignite with its
    `secret_key_base`.
    */
    pub fn prepare(&self, secret: Option<&SecretKeyBase>) -> SessionResult<()> {
        if let Some(secret) = secret {
            check_secret(secret.expose_secret())?;
        }
        match &self.crypto {
            Some(crypto) => crypto.prepare(secret),
            None => Ok(()),
        }
    }

    #[cfg(test)]
    pub(crate) fn has_cached_keys(&self, secret: &[u8]) -> bool {
        self.crypto
            .as_ref()
            .is_some_and(|crypto| crypto.cached_keys(secret).is_some())
    }

    /// Session lifetime in seconds
    pub fn max_age(&self) -> u32 {
        self.max_age.whole_seconds().try_into().unwrap_or(u32::MAX)
    }

    /// Serialize the session data and seal it in the configured envelope.
    pub(crate) fn encode_payload(
        &self,
        carrier: &dyn SessionCarrier,
        data: &SessionData,
    ) -> SessionResult<Vec<u8>> {
        let bytes = self.serializer.encode(data)?;
        let Some(crypto) = &self.crypto else {
            return Ok(bytes);
        };

        let keys = crypto.keys(carrier)?;
        let token = match &keys.encryption {
            Some(encryption_key) => encryptor::encrypt(&bytes, encryption_key, &keys.signing)?,
            None => verifier::sign(&bytes, &keys.signing),
        };
        Ok(token.into_bytes())
    }

    /// Open the envelope and deserialize the session data. The outer result carries fatal
    /// (configuration) errors, the inner one a payload that should be treated as absent.
    pub(crate) fn decode_payload(
        &self,
        carrier: &dyn SessionCarrier,
        payload: &[u8],
    ) -> SessionResult<Result<SessionData, Rejection>> {
        let opened = match &self.crypto {
            None => Cow::Borrowed(payload),
            Some(crypto) => {
                let keys = crypto.keys(carrier)?;
                let Ok(token) = std::str::from_utf8(payload) else {
                    return Ok(Err(Rejection::Malformed));
                };
                let opened = match &keys.encryption {
                    Some(encryption_key) => encryptor::decrypt(token, encryption_key, &keys.signing),
                    None => verifier::verify(token, &keys.signing),
                };
                match opened {
                    Some(bytes) => Cow::Owned(bytes),
                    None => return Ok(Err(Rejection::Envelope(crypto.mode()))),
                }
            }
        };

        Ok(self
            .serializer
            .decode(&opened)
            .map_err(|e| Rejection::Decode(e.to_string())))
    }
}

/// Why a stored payload couldn't be read
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Rejection {
    Malformed,
    Envelope(&'static str),
    Decode(String),
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::Malformed => f.write_str("payload is not a valid token"),
            Rejection::Envelope(mode) => write!(f, "{mode} payload could not be opened"),
            Rejection::Decode(e) => f.write_str(e),
        }
    }
}

#[derive(Clone)]
struct SessionKeys {
    signing: Vec<u8>,
    encryption: Option<Vec<u8>>,
}

struct CryptoConfig {
    options: CryptoOptions,
    generator: KeyGenerator,
    /// Keys derived at startup, when the secret and salts are static
    prepared: Option<SessionKeys>,
    /// Keys derived for the secret carried by requests, once it's known
    carrier_keys: OnceLock<(SecretKeyBase, SessionKeys)>,
}

impl CryptoConfig {
    fn init(options: CryptoOptions) -> SessionResult<Self> {
        let generator = KeyGenerator {
            iterations: options.key_iterations,
            length: options.key_length,
            digest: options.key_digest,
        };
        generator.validate()?;
        if options.encryption_salt.is_some() && options.key_length < encryptor::KEY_LENGTH {
            return Err(SessionError::Configuration(format!(
                "key length must be at least {} bytes to encrypt sessions",
                encryptor::KEY_LENGTH
            )));
        }
        for salt in std::iter::once(&options.signing_salt).chain(&options.encryption_salt) {
            if let Salt::Static(_) = salt {
                salt.resolve()?;
            }
        }

        let mut config = Self {
            options,
            generator,
            prepared: None,
            carrier_keys: OnceLock::new(),
        };
        if let Some(secret) = &config.options.secret_key_base {
            check_secret(secret.expose_secret())?;
            if config.has_static_salts() {
                config.prepared = Some(config.derive(secret.expose_secret())?);
            }
        }

        Ok(config)
    }

    fn has_static_salts(&self) -> bool {
        matches!(self.options.signing_salt, Salt::Static(_))
            && !matches!(self.options.encryption_salt, Some(Salt::Deferred(_)))
    }

    fn prepare(&self, secret: Option<&SecretKeyBase>) -> SessionResult<()> {
        if self.options.secret_key_base.is_some() {
            return Ok(());
        }
        let secret = secret.ok_or_else(|| {
            SessionError::Configuration(format!(
                "{} sessions need a secret key base",
                self.mode()
            ))
        })?;
        if self.has_static_salts() && self.carrier_keys.get().is_none() {
            let keys = self.derive(secret.expose_secret())?;
            let _ = self.carrier_keys.set((secret.clone(), keys));
        }
        Ok(())
    }

    /// Whether keys are already derived for the given secret
    fn cached_keys(&self, secret: &[u8]) -> Option<&SessionKeys> {
        self.prepared.as_ref().or_else(|| {
            self.carrier_keys
                .get()
                .filter(|(cached, _)| cached.expose_secret() == secret)
                .map(|(_, keys)| keys)
        })
    }

    fn mode(&self) -> &'static str {
        match self.options.encryption_salt {
            Some(_) => "encrypted",
            None => "signed",
        }
    }

    fn keys(&self, carrier: &dyn SessionCarrier) -> SessionResult<Cow<'_, SessionKeys>> {
        if let Some(keys) = &self.prepared {
            return Ok(Cow::Borrowed(keys));
        }
        let secret = match &self.options.secret_key_base {
            Some(secret) => secret.expose_secret(),
            None => carrier.secret_key_base().ok_or_else(|| {
                SessionError::Configuration(
                    "no secret key base configured or available from the request".to_owned(),
                )
            })?,
        };
        match self.cached_keys(secret) {
            Some(keys) => Ok(Cow::Borrowed(keys)),
            None => Ok(Cow::Owned(self.derive(secret)?)),
        }
    }

    fn derive(&self, secret: &[u8]) -> SessionResult<SessionKeys> {
        let signing_salt = self.options.signing_salt.resolve()?;
        let signing = self.generator.derive(secret, signing_salt.as_bytes())?;
        let encryption = match &self.options.encryption_salt {
            Some(salt) => Some(self.generator.derive(secret, salt.resolve()?.as_bytes())?),
            None => None,
        };
        Ok(SessionKeys {
            signing,
            encryption,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use super::*;

    const SECRET: &str = "0123456789012345678901234567890123456789012345678901234567890123";

    fn session() -> SessionData {
        json!({ "foo": "bar" }).as_object().cloned().unwrap()
    }

    fn config(crypto: Option<CryptoOptions>) -> StoreConfig {
        StoreConfig::init(StoreOptions {
            crypto,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn plain_payload_is_serialized_data() {
        let config = config(None);
        let payload = config.encode_payload(&(), &session()).unwrap();
        assert_eq!(payload, br#"{"foo":"bar"}"#);
        assert_eq!(config.decode_payload(&(), &payload).unwrap(), Ok(session()));
    }

    #[test]
    fn keys_are_prepared_for_static_secret() {
        let options = CryptoOptions::builder()
            .secret_key_base(SECRET)
            .signing_salt("signing")
            .encryption_salt("encryption")
            .build();
        let config = config(Some(options));
        let crypto = config.crypto.as_ref().unwrap();
        let keys = crypto.prepared.as_ref().expect("keys should be derived up front");
        assert_eq!(keys.signing.len(), 32);
        assert_ne!(Some(&keys.signing), keys.encryption.as_ref());

        let payload = config.encode_payload(&(), &session()).unwrap();
        assert!(payload.starts_with(b"QTI1NkdDTQ."));
        assert_eq!(config.decode_payload(&(), &payload).unwrap(), Ok(session()));
    }

    #[test]
    fn signed_payload_is_readable_but_protected() {
        let options = CryptoOptions::builder()
            .secret_key_base(SECRET)
            .signing_salt("signing")
            .build();
        let config = config(Some(options));
        let payload = config.encode_payload(&(), &session()).unwrap();
        assert!(payload.starts_with(b"SFMyNTY."));

        let mut tampered = payload.clone();
        let last = tampered.len() - 2;
        tampered[last] ^= 0x01;
        assert_eq!(
            config.decode_payload(&(), &tampered).unwrap(),
            Err(Rejection::Envelope("signed"))
        );
        assert_eq!(
            config.decode_payload(&(), &[0xff, 0xfe]).unwrap(),
            Err(Rejection::Malformed)
        );
    }

    #[test]
    fn secret_from_carrier() {
        let options = CryptoOptions::builder().signing_salt("signing").build();
        let config = config(Some(options));
        assert!(config.crypto.as_ref().unwrap().prepared.is_none());

        let carrier = SecretKeyBase::new(SECRET);
        let payload = config.encode_payload(&carrier, &session()).unwrap();
        assert_eq!(
            config.decode_payload(&carrier, &payload).unwrap(),
            Ok(session())
        );

        let other = SecretKeyBase::new(SECRET.replace('0', "9"));
        assert!(config.decode_payload(&other, &payload).unwrap().is_err());

        let missing = config.encode_payload(&(), &session());
        assert!(matches!(missing, Err(SessionError::Configuration(_))));
        let short = config.encode_payload(&SecretKeyBase::new("short"), &session());
        assert!(matches!(short, Err(SessionError::Configuration(_))));
    }

    #[test]
    fn prepare_caches_keys_for_carrier_secret() {
        let options = CryptoOptions::builder()
            .signing_salt("signing")
            .encryption_salt("encryption")
            .build();
        let config = config(Some(options));
        let secret = SecretKeyBase::new(SECRET);
        config.prepare(Some(&secret)).unwrap();

        let crypto = config.crypto.as_ref().unwrap();
        assert!(crypto.cached_keys(SECRET.as_bytes()).is_some());
        let other = SECRET.replace('0', "9");
        assert!(crypto.cached_keys(other.as_bytes()).is_none());

        let payload = config.encode_payload(&secret, &session()).unwrap();
        assert_eq!(
            config.decode_payload(&secret, &payload).unwrap(),
            Ok(session())
        );
        let other = SecretKeyBase::new(other);
        assert!(config.decode_payload(&other, &payload).unwrap().is_err());
    }

    #[test]
    fn prepare_rejects_unusable_secrets() {
        let signed = config(Some(CryptoOptions::builder().signing_salt("signing").build()));
        let missing = signed.prepare(None);
        assert!(matches!(missing, Err(SessionError::Configuration(_))));
        let short = signed.prepare(Some(&SecretKeyBase::new("short")));
        assert!(matches!(short, Err(SessionError::Configuration(_))));
        assert!(signed.crypto.as_ref().unwrap().carrier_keys.get().is_none());

        // Plain sessions don't need a secret, but a short one is still a mistake
        let plain = config(None);
        assert!(plain.prepare(None).is_ok());
        assert!(plain.prepare(Some(&SecretKeyBase::new("short"))).is_err());

        // A secret in the options is enough
        let own_secret = config(Some(
            CryptoOptions::builder()
                .secret_key_base(SECRET)
                .signing_salt("signing")
                .build(),
        ));
        assert!(own_secret.prepare(None).is_ok());
    }

    #[test]
    fn deferred_salt_is_resolved_per_call() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let options = CryptoOptions::builder()
            .secret_key_base(SECRET)
            .signing_salt(Salt::deferred(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                "signing".to_owned()
            }))
            .build();
        let config = config(Some(options));
        assert!(config.crypto.as_ref().unwrap().prepared.is_none());

        let payload = config.encode_payload(&(), &session()).unwrap();
        config.decode_payload(&(), &payload).unwrap().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn rejects_invalid_options() {
        let short_secret = CryptoOptions::builder()
            .secret_key_base("too short")
            .signing_salt("signing")
            .build();
        let empty_salt = CryptoOptions::builder()
            .secret_key_base(SECRET)
            .signing_salt("")
            .build();
        let short_key = CryptoOptions::builder()
            .secret_key_base(SECRET)
            .signing_salt("signing")
            .encryption_salt("encryption")
            .key_length(16)
            .build();
        let no_iterations = CryptoOptions::builder()
            .signing_salt("signing")
            .key_iterations(0)
            .build();

        for options in [short_secret, empty_salt, short_key, no_iterations] {
            let result = StoreConfig::init(StoreOptions {
                crypto: Some(options),
                ..Default::default()
            });
            assert!(matches!(result, Err(SessionError::Configuration(_))));
        }

        let no_max_age = StoreConfig::init(StoreOptions {
            max_age: 0,
            ..Default::default()
        });
        assert!(matches!(no_max_age, Err(SessionError::Configuration(_))));
    }
}
