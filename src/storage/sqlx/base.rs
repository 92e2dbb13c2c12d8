use rocket::{
    time::OffsetDateTime,
    tokio::{
        self,
        sync::{oneshot, Mutex},
        time::interval,
    },
};

use crate::{
    error::{SessionError, SessionResult},
    storage::SessionRecord,
};

pub(super) const ID_COLUMN: &str = "id";
pub(super) const IDENTIFIER_COLUMN: &str = "identifier";
pub(super) const PAYLOAD_COLUMN: &str = "payload";
pub(super) const VALID_FROM_COLUMN: &str = "valid_from";
pub(super) const VALID_TO_COLUMN: &str = "valid_to";
pub(super) const CREATED_AT_COLUMN: &str = "created_at";
pub(super) const UPDATED_AT_COLUMN: &str = "updated_at";

fn returned_columns() -> String {
    format!(
        "{ID_COLUMN}, {IDENTIFIER_COLUMN}, {PAYLOAD_COLUMN}, {VALID_FROM_COLUMN}, \
        {VALID_TO_COLUMN}, {CREATED_AT_COLUMN}, {UPDATED_AT_COLUMN}"
    )
}

/// Find the newest record for an identifier. Bind the identifier
pub(super) fn find_sql(table_name: &str) -> String {
    format!(
        "SELECT {} FROM \"{table_name}\" WHERE {IDENTIFIER_COLUMN} = $1 \
        ORDER BY {ID_COLUMN} DESC LIMIT 1",
        returned_columns()
    )
}

/// Insert a record. Bind identifier, payload, valid_from, valid_to, created_at, updated_at
pub(super) fn insert_sql(table_name: &str) -> String {
    format!(
        "INSERT INTO \"{table_name}\" \
        ({IDENTIFIER_COLUMN}, {PAYLOAD_COLUMN}, {VALID_FROM_COLUMN}, {VALID_TO_COLUMN}, \
        {CREATED_AT_COLUMN}, {UPDATED_AT_COLUMN}) \
        VALUES ($1, $2, $3, $4, $5, $6) \
        RETURNING {}",
        returned_columns()
    )
}

/// Update a record. Bind identifier, payload, valid_from, valid_to, updated_at, and the row ID.
/// A `NULL` binding leaves the stored column as it is.
pub(super) fn update_sql(table_name: &str) -> String {
    format!(
        "UPDATE \"{table_name}\" SET \
            {IDENTIFIER_COLUMN} = COALESCE($1, {IDENTIFIER_COLUMN}), \
            {PAYLOAD_COLUMN} = COALESCE($2, {PAYLOAD_COLUMN}), \
            {VALID_FROM_COLUMN} = COALESCE($3, {VALID_FROM_COLUMN}), \
            {VALID_TO_COLUMN} = COALESCE($4, {VALID_TO_COLUMN}), \
            {UPDATED_AT_COLUMN} = $5 \
        WHERE {ID_COLUMN} = $6 \
        RETURNING {}",
        returned_columns()
    )
}

/// Delete all records for an identifier. Bind the identifier
pub(super) fn delete_sql(table_name: &str) -> String {
    format!(
        "DELETE FROM \"{table_name}\" WHERE {IDENTIFIER_COLUMN} = $1 RETURNING {}",
        returned_columns()
    )
}

/// Delete expired records. Bind the current time
fn delete_expired_sql(table_name: &str) -> String {
    format!("DELETE FROM \"{table_name}\" WHERE {VALID_TO_COLUMN} <= $1")
}

/// Convert a returned row into a session record
pub(super) fn record_from_row<'r, R>(row: &'r R) -> sqlx::Result<SessionRecord>
where
    R: sqlx::Row,
    &'static str: sqlx::ColumnIndex<R>,
    i64: sqlx::Decode<'r, R::Database> + sqlx::Type<R::Database>,
    String: sqlx::Decode<'r, R::Database> + sqlx::Type<R::Database>,
    Vec<u8>: sqlx::Decode<'r, R::Database> + sqlx::Type<R::Database>,
    OffsetDateTime: sqlx::Decode<'r, R::Database> + sqlx::Type<R::Database>,
    Option<OffsetDateTime>: sqlx::Decode<'r, R::Database> + sqlx::Type<R::Database>,
{
    Ok(SessionRecord {
        id: row.try_get(ID_COLUMN)?,
        identifier: row.try_get(IDENTIFIER_COLUMN)?,
        payload: row.try_get(PAYLOAD_COLUMN)?,
        valid_from: row.try_get(VALID_FROM_COLUMN)?,
        valid_to: row.try_get(VALID_TO_COLUMN)?,
        created_at: row.try_get(CREATED_AT_COLUMN)?,
        updated_at: row.try_get(UPDATED_AT_COLUMN)?,
    })
}

/// Pick the newest of the deleted records
pub(super) fn newest(records: Vec<SessionRecord>) -> Option<SessionRecord> {
    records.into_iter().max_by_key(|record| record.id)
}

/// Expired session cleanup task
#[derive(Default)]
pub(super) struct SqlxCleanupTask {
    interval: Option<std::time::Duration>,
    shutdown_tx: Mutex<Option<oneshot::Sender<()>>>,
    table_name: String,
}

impl SqlxCleanupTask {
    pub fn new(cleanup_interval: Option<std::time::Duration>, table_name: &str) -> Self {
        Self {
            interval: cleanup_interval,
            shutdown_tx: Mutex::default(),
            table_name: table_name.to_string(),
        }
    }

    pub async fn setup<DB>(&self, pool: &sqlx::Pool<DB>) -> SessionResult<()>
    where
        DB: sqlx::Database,
        for<'q> <DB as sqlx::Database>::Arguments<'q>: sqlx::IntoArguments<'q, DB>,
        for<'c> &'c mut <DB as sqlx::Database>::Connection: sqlx::Executor<'c, Database = DB>,
        OffsetDateTime: for<'q> sqlx::Encode<'q, DB> + sqlx::Type<DB>,
    {
        let Some(cleanup_interval) = self.interval else {
            return Ok(());
        };

        let (tx, mut rx) = oneshot::channel();
        self.shutdown_tx.lock().await.replace(tx);

        let pool = pool.clone();
        let sql = delete_expired_sql(&self.table_name);
        tokio::spawn(async move {
            rocket::info!("Starting expired session cleanup");
            let mut interval = interval(cleanup_interval);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        rocket::debug!("Cleaning up expired sessions");
                        if let Err(e) = sqlx::query(&sql)
                            .bind(OffsetDateTime::now_utc())
                            .execute(&pool)
                            .await
                        {
                            rocket::error!("Error deleting expired sessions: {e}");
                        }
                    }
                    _ = &mut rx => {
                        rocket::info!("Expired session cleanup shutdown");
                        break;
                    }
                }
            }
        });

        Ok(())
    }

    pub async fn shutdown(&self) -> SessionResult<()> {
        if let Some(tx) = self.shutdown_tx.lock().await.take() {
            tx.send(()).map_err(|_| {
                SessionError::SetupTeardown("Failed to send shutdown signal".to_string())
            })?;
        }
        Ok(())
    }
}
