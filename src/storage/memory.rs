//! In-memory session repository implementation

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
};

use rocket::{async_trait, time::OffsetDateTime};

use crate::error::{SessionError, SessionResult};

use super::interface::{SessionChangeset, SessionRecord, SessionRepository};

/// In-memory repository for session records. This is designed mostly for local
/// development and testing, and not for production use: records are lost on restart,
/// and expired records are only removed by [`MemoryRepository::delete_expired`].
///
/// Cloning the repository gives another handle to the same records.
#[derive(Clone, Default)]
pub struct MemoryRepository {
    table: Arc<Mutex<MemoryTable>>,
}

#[derive(Default)]
struct MemoryTable {
    last_id: i64,
    rows: BTreeMap<i64, SessionRecord>,
}

impl MemoryRepository {
    /// Number of stored records, including expired ones
    pub fn len(&self) -> usize {
        self.table.lock().unwrap().rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Delete records that have expired as of `now`, returning how many were removed
    pub fn delete_expired(&self, now: OffsetDateTime) -> u64 {
        let mut table = self.table.lock().unwrap();
        let before = table.rows.len();
        table.rows.retain(|_, record| record.valid_to > now);
        (before - table.rows.len()) as u64
    }
}

#[async_trait]
impl SessionRepository for MemoryRepository {
    async fn find_by_identifier(&self, identifier: &str) -> SessionResult<Option<SessionRecord>> {
        let table = self.table.lock().unwrap();
        let record = table
            .rows
            .values()
            .rev()
            .find(|record| record.identifier == identifier)
            .cloned();
        Ok(record)
    }

    async fn create(&self, changeset: SessionChangeset) -> SessionResult<SessionRecord> {
        let new = changeset.validate_insert()?;
        let now = OffsetDateTime::now_utc();

        let mut table = self.table.lock().unwrap();
        table.last_id += 1;
        let record = SessionRecord {
            id: table.last_id,
            identifier: new.identifier,
            payload: new.payload,
            valid_from: new.valid_from,
            valid_to: new.valid_to,
            created_at: now,
            updated_at: now,
        };
        table.rows.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update(
        &self,
        record: &SessionRecord,
        changeset: SessionChangeset,
    ) -> SessionResult<SessionRecord> {
        changeset.validate_update()?;

        let mut table = self.table.lock().unwrap();
        let Some(row) = table.rows.get_mut(&record.id) else {
            return Err(SessionError::NotFound);
        };
        let mut updated = changeset.apply_to(row)?;
        updated.updated_at = OffsetDateTime::now_utc();
        *row = updated.clone();
        Ok(updated)
    }

    async fn delete_by_identifier(&self, identifier: &str) -> SessionResult<Option<SessionRecord>> {
        let mut table = self.table.lock().unwrap();
        let ids: Vec<i64> = table
            .rows
            .values()
            .filter(|record| record.identifier == identifier)
            .map(|record| record.id)
            .collect();

        let mut deleted = None;
        for id in ids.into_iter().rev() {
            let record = table.rows.remove(&id);
            deleted = deleted.or(record);
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use rocket::time::Duration;

    use super::*;

    fn changeset(identifier: &str, payload: &[u8]) -> SessionChangeset {
        let now = OffsetDateTime::now_utc();
        SessionChangeset {
            identifier: Some(identifier.to_owned()),
            payload: Some(payload.to_vec()),
            valid_from: Some(now),
            valid_to: Some(now + Duration::hours(1)),
        }
    }

    #[rocket::async_test]
    async fn create_and_find() {
        let repository = MemoryRepository::default();
        let created = repository.create(changeset("abc", b"one")).await.unwrap();
        assert_eq!(created.id, 1);

        let found = repository.find_by_identifier("abc").await.unwrap();
        assert_eq!(found, Some(created));
        assert_eq!(repository.find_by_identifier("xyz").await.unwrap(), None);
    }

    #[rocket::async_test]
    async fn newest_record_wins() {
        let repository = MemoryRepository::default();
        repository.create(changeset("abc", b"old")).await.unwrap();
        repository.create(changeset("abc", b"new")).await.unwrap();

        let found = repository.find_by_identifier("abc").await.unwrap().unwrap();
        assert_eq!(found.payload, b"new");

        let deleted = repository.delete_by_identifier("abc").await.unwrap();
        assert_eq!(deleted.unwrap().payload, b"new");
        assert!(repository.is_empty());
    }

    #[rocket::async_test]
    async fn create_validates() {
        let repository = MemoryRepository::default();
        let result = repository
            .create(SessionChangeset {
                payload: None,
                ..changeset("abc", b"")
            })
            .await;
        assert!(matches!(result, Err(SessionError::Validation(_))));
        assert!(repository.is_empty());
    }

    #[rocket::async_test]
    async fn update_record() {
        let repository = MemoryRepository::default();
        let created = repository.create(changeset("abc", b"one")).await.unwrap();
        let updated = repository
            .update(
                &created,
                SessionChangeset {
                    payload: Some(b"two".to_vec()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.payload, b"two");
        assert_eq!(updated.valid_to, created.valid_to);
        assert!(updated.updated_at >= created.updated_at);
        let found = repository.find_by_identifier("abc").await.unwrap().unwrap();
        assert_eq!(found, updated);
    }

    #[rocket::async_test]
    async fn update_missing_record() {
        let repository = MemoryRepository::default();
        let created = repository.create(changeset("abc", b"one")).await.unwrap();
        repository.delete_by_identifier("abc").await.unwrap();

        let result = repository.update(&created, SessionChangeset::default()).await;
        assert!(matches!(result, Err(SessionError::NotFound)));
    }

    #[rocket::async_test]
    async fn delete_is_idempotent() {
        let repository = MemoryRepository::default();
        repository.create(changeset("abc", b"one")).await.unwrap();
        assert!(repository.delete_by_identifier("abc").await.unwrap().is_some());
        assert!(repository.delete_by_identifier("abc").await.unwrap().is_none());
        assert!(repository.delete_by_identifier("never").await.unwrap().is_none());
    }

    #[rocket::async_test]
    async fn delete_expired_records() {
        let repository = MemoryRepository::default();
        repository.create(changeset("live", b"one")).await.unwrap();
        let now = OffsetDateTime::now_utc();
        repository
            .create(SessionChangeset {
                valid_to: Some(now - Duration::seconds(1)),
                ..changeset("expired", b"two")
            })
            .await
            .unwrap();

        assert_eq!(repository.delete_expired(now), 1);
        assert_eq!(repository.len(), 1);
        assert!(repository.find_by_identifier("live").await.unwrap().is_some());
    }

    #[rocket::async_test]
    async fn delete_expired_at_boundary() {
        let repository = MemoryRepository::default();
        let now = OffsetDateTime::now_utc();
        repository
            .create(SessionChangeset {
                valid_to: Some(now),
                ..changeset("boundary", b"one")
            })
            .await
            .unwrap();

        // A session is expired once `now` reaches `valid_to`
        assert_eq!(repository.delete_expired(now), 1);
        assert!(repository.is_empty());
    }

    #[rocket::async_test]
    async fn update_keeps_unchanged_fields_of_current_row() {
        let repository = MemoryRepository::default();
        let snapshot = repository.create(changeset("abc", b"old")).await.unwrap();
        repository
            .update(
                &snapshot,
                SessionChangeset {
                    payload: Some(b"new".to_vec()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        // Renewing from the stale snapshot only touches the expiry
        let valid_to = snapshot.valid_to + Duration::hours(1);
        let renewed = repository
            .update(
                &snapshot,
                SessionChangeset {
                    valid_to: Some(valid_to),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(renewed.payload, b"new");
        assert_eq!(renewed.valid_to, valid_to);
        assert_eq!(renewed.created_at, snapshot.created_at);
    }
}
