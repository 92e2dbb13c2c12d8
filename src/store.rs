//! The session store contract and its database-backed implementation

use std::sync::Arc;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use bon::Builder;
use rand::RngCore;
use rocket::{async_trait, time::OffsetDateTime, Request};

use crate::{
    config::{SecretKeyBase, StoreConfig},
    error::{SessionError, SessionResult},
    serializer::SessionData,
    storage::{memory::MemoryRepository, SessionChangeset, SessionRepository},
};

/// Number of random bytes in a session identifier (encodes to 128 characters)
pub const IDENTIFIER_BYTES: usize = 96;

/// Per-request context passed to the store. When the store's crypto options don't include
/// a secret key base, keys are derived from the carrier's secret.
pub trait SessionCarrier: Sync {
    /// The secret key base available for this request, if any
    fn secret_key_base(&self) -> Option<&[u8]>;
}

impl SessionCarrier for () {
    fn secret_key_base(&self) -> Option<&[u8]> {
        None
    }
}

impl SessionCarrier for SecretKeyBase {
    fn secret_key_base(&self) -> Option<&[u8]> {
        Some(self.expose_secret())
    }
}

/// Rocket requests carry the [`SecretKeyBase`] managed by the
/// [`RocketDbSession`](crate::RocketDbSession) fairing, if one was configured.
impl SessionCarrier for Request<'_> {
    fn secret_key_base(&self) -> Option<&[u8]> {
        self.rocket()
            .state::<SecretKeyBase>()
            .map(|secret| secret.expose_secret())
    }
}

/// Trait representing a session store. The request pipeline only talks to sessions
/// through these three operations, so backends can be swapped without touching call sites.
///
/// Sessions that are unknown, expired, or unreadable are all reported the same way:
/// `(None, empty data)`. Errors are reserved for failures the caller can't recover from
/// (misconfiguration, storage I/O).
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Load a session, renewing its expiry. Returns the identifier (if the session is live)
    /// and the session data (empty if not).
    async fn get(
        &self,
        carrier: &dyn SessionCarrier,
        identifier: Option<&str>,
        config: &StoreConfig,
    ) -> SessionResult<(Option<String>, SessionData)>;

    /// Save session data. Without an identifier, a new session is created with a generated
    /// identifier. Returns the identifier to place in the cookie, or `None` if the write was
    /// rejected because the session has expired.
    async fn put(
        &self,
        carrier: &dyn SessionCarrier,
        identifier: Option<&str>,
        data: &SessionData,
        config: &StoreConfig,
    ) -> SessionResult<Option<String>>;

    /// Delete a session. Deleting a session that doesn't exist succeeds.
    async fn delete(
        &self,
        carrier: &dyn SessionCarrier,
        identifier: Option<&str>,
        config: &StoreConfig,
    ) -> SessionResult<()>;

    /// Optional setup of resources that will be called on server startup
    async fn setup(&self) -> SessionResult<()> {
        Ok(()) // Default no-op
    }

    /// Optional teardown of resources that will be called on server shutdown
    async fn shutdown(&self) -> SessionResult<()> {
        Ok(()) // Default no-op
    }
}

/// Source of the current time
pub type Clock = Arc<dyn Fn() -> OffsetDateTime + Send + Sync>;

/**
Session store backed by a [`SessionRepository`].

Expired sessions are never returned or written to, but their rows are left in place for a
cleanup job (see the `cleanup_interval` option of the sqlx repositories).

```
use rocket_db_session::{storage::memory::MemoryRepository, store::DatabaseStore};

let store = DatabaseStore::builder()
    .repository(MemoryRepository::default())
    .build();
```
*/
#[derive(Builder)]
pub struct DatabaseStore {
    /// The repository that session records are stored in.
    #[builder(with = |repository: impl SessionRepository + 'static| Arc::new(repository))]
    repository: Arc<dyn SessionRepository>,
    /// Clock used for expiry checks (default: system UTC time).
    #[builder(default = Arc::new(OffsetDateTime::now_utc))]
    clock: Clock,
}

impl Default for DatabaseStore {
    /// Create a store backed by an in-memory repository.
    fn default() -> Self {
        Self::new(MemoryRepository::default())
    }
}

impl DatabaseStore {
    /// Create a store using the given repository and the system clock
    pub fn new(repository: impl SessionRepository + 'static) -> Self {
        Self::builder().repository(repository).build()
    }

    async fn create(
        &self,
        carrier: &dyn SessionCarrier,
        identifier: String,
        data: &SessionData,
        config: &StoreConfig,
        now: OffsetDateTime,
    ) -> SessionResult<String> {
        let changeset = SessionChangeset {
            identifier: Some(identifier),
            payload: Some(config.encode_payload(carrier, data)?),
            valid_from: Some(now),
            valid_to: Some(now + config.max_age),
        };
        let record = self.repository.create(changeset).await?;
        rocket::debug!("Created session '{}'", redact(&record.identifier));
        Ok(record.identifier)
    }
}

#[async_trait]
impl SessionStore for DatabaseStore {
    async fn get(
        &self,
        carrier: &dyn SessionCarrier,
        identifier: Option<&str>,
        config: &StoreConfig,
    ) -> SessionResult<(Option<String>, SessionData)> {
        let Some(identifier) = identifier.filter(|id| !id.is_empty()) else {
            return Ok((None, SessionData::new()));
        };
        let Some(record) = self.repository.find_by_identifier(identifier).await? else {
            rocket::debug!("Session '{}' not found", redact(identifier));
            return Ok((None, SessionData::new()));
        };

        let now = (self.clock)();
        if now >= record.valid_to {
            rocket::debug!("Session '{}' has expired", redact(identifier));
            return Ok((None, SessionData::new()));
        }

        let data = match config.decode_payload(carrier, &record.payload)? {
            Ok(data) => data,
            Err(rejection) => {
                config.log_level.log(format_args!(
                    "Ignoring unreadable session '{}': {rejection}",
                    redact(identifier)
                ));
                return Ok((None, SessionData::new()));
            }
        };

        let renewal = SessionChangeset {
            valid_to: Some(now + config.max_age),
            ..Default::default()
        };
        match self.repository.update(&record, renewal).await {
            Ok(_) => Ok((Some(record.identifier), data)),
            Err(SessionError::NotFound) => {
                rocket::debug!("Session '{}' was deleted during renewal", redact(identifier));
                Ok((None, SessionData::new()))
            }
            Err(e) => Err(e),
        }
    }

    async fn put(
        &self,
        carrier: &dyn SessionCarrier,
        identifier: Option<&str>,
        data: &SessionData,
        config: &StoreConfig,
    ) -> SessionResult<Option<String>> {
        let now = (self.clock)();
        let Some(identifier) = identifier.filter(|id| !id.is_empty()) else {
            let identifier = generate_identifier();
            return Ok(Some(
                self.create(carrier, identifier, data, config, now).await?,
            ));
        };

        let Some(record) = self.repository.find_by_identifier(identifier).await? else {
            let identifier = identifier.to_owned();
            return Ok(Some(
                self.create(carrier, identifier, data, config, now).await?,
            ));
        };
        if now >= record.valid_to {
            rocket::debug!(
                "Rejected write to expired session '{}'",
                redact(identifier)
            );
            return Ok(None);
        }

        let changes = SessionChangeset {
            payload: Some(config.encode_payload(carrier, data)?),
            valid_to: Some(now + config.max_age),
            ..Default::default()
        };
        match self.repository.update(&record, changes).await {
            Ok(record) => Ok(Some(record.identifier)),
            Err(SessionError::NotFound) => {
                rocket::debug!("Session '{}' was deleted before saving", redact(identifier));
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn delete(
        &self,
        _carrier: &dyn SessionCarrier,
        identifier: Option<&str>,
        _config: &StoreConfig,
    ) -> SessionResult<()> {
        let Some(identifier) = identifier.filter(|id| !id.is_empty()) else {
            return Ok(());
        };
        if self
            .repository
            .delete_by_identifier(identifier)
            .await?
            .is_some()
        {
            rocket::debug!("Deleted session '{}'", redact(identifier));
        }
        Ok(())
    }

    async fn setup(&self) -> SessionResult<()> {
        self.repository.setup().await
    }

    async fn shutdown(&self) -> SessionResult<()> {
        self.repository.shutdown().await
    }
}

/// Generate a new session identifier from the thread-local CSPRNG
pub fn generate_identifier() -> String {
    let mut bytes = [0u8; IDENTIFIER_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Shorten an identifier for log output
pub(crate) fn redact(identifier: &str) -> String {
    let prefix: String = identifier.chars().take(8).collect();
    format!("{prefix}...")
}
