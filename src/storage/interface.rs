//! Shared interface for session repositories

use std::sync::Arc;

use rocket::{async_trait, time::OffsetDateTime};

use crate::error::{SessionError, SessionResult};

/// A persisted session record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionRecord {
    /// Primary key assigned by the repository
    pub id: i64,
    /// Public session identifier (the cookie value)
    pub identifier: String,
    /// Serialized session data, possibly signed or encrypted
    pub payload: Vec<u8>,
    /// When the session was created
    pub valid_from: Option<OffsetDateTime>,
    /// When the session expires
    pub valid_to: OffsetDateTime,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// A set of changes to a session record. Fields left as `None` are unchanged on update.
/// `identifier`, `payload` and `valid_to` are required to create a record.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionChangeset {
    pub identifier: Option<String>,
    pub payload: Option<Vec<u8>>,
    pub valid_from: Option<OffsetDateTime>,
    pub valid_to: Option<OffsetDateTime>,
}

/// The validated fields of a new session record
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewSessionRecord {
    pub identifier: String,
    pub payload: Vec<u8>,
    pub valid_from: Option<OffsetDateTime>,
    pub valid_to: OffsetDateTime,
}

impl SessionChangeset {
    /// Validate the changeset for inserting a new record
    pub fn validate_insert(self) -> SessionResult<NewSessionRecord> {
        let identifier = self
            .identifier
            .filter(|id| !id.is_empty())
            .ok_or_else(|| missing("identifier"))?;
        let payload = self.payload.ok_or_else(|| missing("payload"))?;
        let valid_to = self.valid_to.ok_or_else(|| missing("valid_to"))?;

        Ok(NewSessionRecord {
            identifier,
            payload,
            valid_from: self.valid_from,
            valid_to,
        })
    }

    /// Validate the changeset for updating a record. Only the fields that are set
    /// should be written, so a partial update never reverts a concurrent one.
    pub fn validate_update(&self) -> SessionResult<()> {
        if self.identifier.as_deref() == Some("") {
            return Err(missing("identifier"));
        }
        Ok(())
    }

    /// Apply the changes to the current state of a record, validating the result.
    /// Bookkeeping timestamps are left for the repository to set.
    pub fn apply_to(self, record: &SessionRecord) -> SessionResult<SessionRecord> {
        self.validate_update()?;

        Ok(SessionRecord {
            id: record.id,
            identifier: self.identifier.unwrap_or_else(|| record.identifier.clone()),
            payload: self.payload.unwrap_or_else(|| record.payload.clone()),
            valid_from: self.valid_from.or(record.valid_from),
            valid_to: self.valid_to.unwrap_or(record.valid_to),
            created_at: record.created_at,
            updated_at: record.updated_at,
        })
    }
}

fn missing(field: &str) -> SessionError {
    SessionError::Validation(format!("{field} can't be blank"))
}

/// Trait representing durable storage of session records. You can use your own storage by
/// implementing this trait.
///
/// Repositories hold no session logic: expiry checks, renewal and payload encoding all
/// happen in the [`DatabaseStore`](crate::store::DatabaseStore).
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Find the session record with the given identifier. If more than one row
    /// shares the identifier, the newest one should be returned.
    async fn find_by_identifier(&self, identifier: &str) -> SessionResult<Option<SessionRecord>>;

    /// Insert a new record. Should return a [`SessionError::Validation`] error if
    /// required fields are missing (see [`SessionChangeset::validate_insert`]).
    async fn create(&self, changeset: SessionChangeset) -> SessionResult<SessionRecord>;

    /// Update an existing record, writing only the fields set in the changeset. Columns left
    /// as `None` must keep their current stored value, not the one in `record`, which may be
    /// stale. Should return a [`SessionError::Validation`] error if the changes are invalid
    /// (see [`SessionChangeset::validate_update`]), and a [`SessionError::NotFound`] error if
    /// the record no longer exists.
    async fn update(
        &self,
        record: &SessionRecord,
        changeset: SessionChangeset,
    ) -> SessionResult<SessionRecord>;

    /// Delete the record(s) with the given identifier, returning the deleted record if there was one.
    async fn delete_by_identifier(&self, identifier: &str) -> SessionResult<Option<SessionRecord>>;

    /// Optional setup of resources that will be called on server startup
    async fn setup(&self) -> SessionResult<()> {
        Ok(()) // Default no-op
    }

    /// Optional teardown of resources that will be called on server shutdown
    async fn shutdown(&self) -> SessionResult<()> {
        Ok(()) // Default no-op
    }
}

/// A shared repository, e.g. one also used by a cleanup job or by tests
#[async_trait]
impl<R: SessionRepository + ?Sized> SessionRepository for Arc<R> {
    async fn find_by_identifier(&self, identifier: &str) -> SessionResult<Option<SessionRecord>> {
        (**self).find_by_identifier(identifier).await
    }

    async fn create(&self, changeset: SessionChangeset) -> SessionResult<SessionRecord> {
        (**self).create(changeset).await
    }

    async fn update(
        &self,
        record: &SessionRecord,
        changeset: SessionChangeset,
    ) -> SessionResult<SessionRecord> {
        (**self).update(record, changeset).await
    }

    async fn delete_by_identifier(&self, identifier: &str) -> SessionResult<Option<SessionRecord>> {
        (**self).delete_by_identifier(identifier).await
    }

    async fn setup(&self) -> SessionResult<()> {
        (**self).setup().await
    }

    async fn shutdown(&self) -> SessionResult<()> {
        (**self).shutdown().await
    }
}
