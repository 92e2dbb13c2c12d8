use bon::bon;
use rocket::{async_trait, time::OffsetDateTime};
use sqlx::{sqlite::SqliteRow, SqlitePool};

use crate::{
    error::{SessionError, SessionResult},
    storage::{SessionChangeset, SessionRecord, SessionRepository},
};

use super::base::*;

/** Session repository using SQLite via [sqlx](https://docs.rs/crate/sqlx).

# Requirements
- You must pass in an initialized sqlx SQLite connection pool.
- Expects a table to already exist with the following columns:

| Name | Type |
|------|---------|
| id | INTEGER PRIMARY KEY AUTOINCREMENT |
| identifier | TEXT NOT NULL (indexed) |
| payload | BLOB NOT NULL |
| valid_from | TEXT |
| valid_to | TEXT NOT NULL |
| created_at | TEXT NOT NULL |
| updated_at | TEXT NOT NULL |

```sql
CREATE TABLE sessions (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    identifier TEXT NOT NULL,
    payload    BLOB NOT NULL,
    valid_from TEXT,
    valid_to   TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX sessions_identifier_index ON sessions (identifier);
```
 */
pub struct SqlxSqliteRepository {
    pool: SqlitePool,
    table_name: String,
    cleanup_task: SqlxCleanupTask,
}

#[bon]
impl SqlxSqliteRepository {
    #[builder]
    pub fn new(
        /// An initialized SQLite connection pool.
        pool: SqlitePool,
        /// The name of the table to use for storing sessions (default: `"sessions"`)
        #[builder(into, default = "sessions")]
        table_name: String,
        /// Interval to check for and delete expired sessions. If not set,
        /// expired sessions will not be cleaned up automatically.
        cleanup_interval: Option<std::time::Duration>,
    ) -> Self {
        Self {
            cleanup_task: SqlxCleanupTask::new(cleanup_interval, &table_name),
            table_name,
            pool,
        }
    }
}

fn parse_row(row: SqliteRow) -> SessionResult<SessionRecord> {
    Ok(record_from_row(&row)?)
}

#[async_trait]
impl SessionRepository for SqlxSqliteRepository {
    async fn find_by_identifier(&self, identifier: &str) -> SessionResult<Option<SessionRecord>> {
        let row = sqlx::query(&find_sql(&self.table_name))
            .bind(identifier)
            .fetch_optional(&self.pool)
            .await?;
        row.map(parse_row).transpose()
    }

    async fn create(&self, changeset: SessionChangeset) -> SessionResult<SessionRecord> {
        let new = changeset.validate_insert()?;
        let now = OffsetDateTime::now_utc();
        let row = sqlx::query(&insert_sql(&self.table_name))
            .bind(new.identifier)
            .bind(new.payload)
            .bind(new.valid_from)
            .bind(new.valid_to)
            .bind(now)
            .bind(now)
            .fetch_one(&self.pool)
            .await?;
        parse_row(row)
    }

    async fn update(
        &self,
        record: &SessionRecord,
        changeset: SessionChangeset,
    ) -> SessionResult<SessionRecord> {
        changeset.validate_update()?;
        let row = sqlx::query(&update_sql(&self.table_name))
            .bind(changeset.identifier)
            .bind(changeset.payload)
            .bind(changeset.valid_from)
            .bind(changeset.valid_to)
            .bind(OffsetDateTime::now_utc())
            .bind(record.id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(parse_row).transpose()?.ok_or(SessionError::NotFound)
    }

    async fn delete_by_identifier(&self, identifier: &str) -> SessionResult<Option<SessionRecord>> {
        let rows = sqlx::query(&delete_sql(&self.table_name))
            .bind(identifier)
            .fetch_all(&self.pool)
            .await?;
        let records = rows.into_iter().map(parse_row).collect::<SessionResult<_>>()?;
        Ok(newest(records))
    }

    async fn setup(&self) -> SessionResult<()> {
        self.cleanup_task.setup(&self.pool).await
    }

    async fn shutdown(&self) -> SessionResult<()> {
        self.cleanup_task.shutdown().await
    }
}
