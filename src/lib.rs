#![deny(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

/*!
# Overview
Database-backed sessions for Rocket applications.

- The browser only ever holds an opaque, high-entropy session identifier. Session data
  lives server-side in a table, as a serialized payload that can optionally be signed
  (HMAC-SHA256) or encrypted (AES-256-GCM) with keys derived from a secret via PBKDF2.
- Sessions expire a fixed time after they were last read or written. Expired sessions
  are never returned or updated.
- Unknown, expired, tampered, and undecodable sessions all look the same to the
  application: an empty session. Only storage and configuration failures are errors.
- Makes use of Rocket's request-local cache to ensure that only one store call will be
  made to load the session, and if the session is updated multiple times during the
  request, only one call will be made at the end of the request to save it.
- Multiple repositories are available, or you can store session records anywhere by
  implementing the [`SessionRepository`](crate::storage::SessionRepository) trait.

# Usage

## Basic setup

```rust
use rocket::routes;
use rocket_db_session::{RocketDbSession, Session};

#[rocket::launch]
fn rocket() -> _ {
    rocket::build()
        // attach the `RocketDbSession` fairing
        .attach(RocketDbSession::default())
        .mount("/", routes![login])
}

// use the `Session` request guard in a route handler
#[rocket::post("/login")]
fn login(mut session: Session) {
    session.set_key("user_id", "123");
}
```

## Signed or encrypted payloads

```rust
use rocket_db_session::{
    config::{CryptoOptions, StoreConfig, StoreOptions},
    RocketDbSession,
};

let crypto = CryptoOptions::builder()
    .signing_salt("signing salt")
    .encryption_salt("encryption salt")
    .build();
let config = StoreConfig::init(StoreOptions {
    crypto: Some(crypto),
    ..Default::default()
})
.expect("valid store options");

let fairing = RocketDbSession::builder()
    .config(config)
    // at least 64 bytes, e.g. loaded from the environment
    .secret_key_base("x".repeat(64))
    .build();
```

## Request guard auth

If a live session isn't found, the [Session] request guard will still succeed, but calling
[Session.get()](Session#method.get) will yield `None` - indicating an empty session. Build
your authentication on top of it with your own request guard:
```
use rocket::{
    http::Status,
    request::{FromRequest, Outcome},
    Request,
};
use rocket_db_session::Session;

struct User {
    id: String,
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for User {
    type Error = &'r str;

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let session = req.guard::<Session>().await.expect("should not fail");
        match session.get_key::<String>("user_id") {
            Some(id) => Outcome::Success(User { id }),
            None => Outcome::Error((Status::Unauthorized, "Not logged in")),
        }
    }
}
```

# Repositories

| Repository | Feature Flag | Use Case |
|---------|-------------|------------------|
| [`storage::memory::MemoryRepository`] | Built-in | Development, testing |
| `storage::sqlx::SqlxPostgresRepository` | `sqlx_postgres` | Production |
| `storage::sqlx::SqlxSqliteRepository` | `sqlx_sqlite` | Production, embedded |

# Feature flags

| Name    | Description    |
|---------|----------------|
| `sqlx_postgres`  | A session repository using PostgreSQL via the [sqlx](https://docs.rs/crate/sqlx) crate. |
| `sqlx_sqlite`  | A session repository using SQLite via the [sqlx](https://docs.rs/crate/sqlx) crate. |
| `rocket_okapi`  | Enables support for the [rocket_okapi](https://docs.rs/crate/rocket_okapi) crate if needed. |
*/

mod fairing;
mod guard;
mod options;
mod session;
mod session_inner;

pub mod config;
pub mod crypto;
pub mod error;
pub mod serializer;
pub mod storage;
pub mod store;

pub use fairing::{RocketDbSession, RocketDbSessionBuilder};
pub use options::RocketDbSessionOptions;
pub use serializer::SessionData;
pub use session::Session;
pub use store::{DatabaseStore, SessionStore};
