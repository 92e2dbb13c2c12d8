//! Session repositories via sqlx
//!
//! Both repositories expect the session table to already exist. Expired rows are not
//! deleted by the session store; set a `cleanup_interval` when building the repository
//! to have them removed periodically in the background.

mod base;

#[cfg(feature = "sqlx_postgres")]
mod postgres;
#[cfg(feature = "sqlx_postgres")]
pub use postgres::SqlxPostgresRepository;

#[cfg(feature = "sqlx_sqlite")]
mod sqlite;
#[cfg(feature = "sqlx_sqlite")]
pub use sqlite::SqlxSqliteRepository;
