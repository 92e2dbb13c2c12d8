//! Repository implementations for session records

mod interface;
pub use interface::*;

pub mod memory;

#[cfg(any(feature = "sqlx_postgres", feature = "sqlx_sqlite"))]
pub mod sqlx;
