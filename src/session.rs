use std::{
    fmt::Display,
    sync::{Mutex, MutexGuard},
};

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::{error::SessionError, serializer::SessionData, session_inner::SessionInner};

/**
Represents the current session state. When used as a request guard, it will
attempt to load the session from the store. The request guard will always succeed - if a
live session wasn't found, `session.get()` will return `None` indicating an
inactive session.

Changes are collected during the request and written to the store once, after
the route handler has run. A new session's identifier is generated by the store
at that point, so [`Session::id`] is `None` for sessions created during the request.

# Example
```rust
use rocket_db_session::Session;

#[rocket::get("/profile")]
fn profile(session: Session) -> String {
    match session.get_key::<String>("user_id") {
        Some(user_id) => format!("Logged in as {user_id}"),
        None => "No active session".to_string(),
    }
}
```
*/
pub struct Session<'a> {
    /// Internal mutable state of the session
    inner: &'a Mutex<SessionInner>,
    /// Error (if any) when loading from the store
    error: Option<&'a SessionError>,
}

impl Display for Session<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let inner = self.get_inner_lock();
        let id = inner.get_id().map(crate::store::redact);
        write!(f, "Session(id: {id:?})")
    }
}

impl<'a> Session<'a> {
    pub(crate) fn new(inner: &'a Mutex<SessionInner>, error: Option<&'a SessionError>) -> Self {
        Self { inner, error }
    }

    /// Get the session identifier. Will be `None` if there's no active session,
    /// or if the session was created during this request and hasn't been stored yet.
    pub fn id(&self) -> Option<String> {
        self.get_inner_lock().get_id().map(|s| s.to_owned())
    }

    /// Get the current session data via cloning. Will be `None` if there's no active session.
    pub fn get(&self) -> Option<SessionData> {
        self.get_inner_lock().get_current_data().cloned()
    }

    /// Get a single value from the session data, deserialized into the requested type.
    /// Returns `None` if there's no active session, the key is missing, or the value
    /// doesn't match the type.
    pub fn get_key<V: DeserializeOwned>(&self, key: &str) -> Option<V> {
        let value = self
            .get_inner_lock()
            .get_current_data()
            .and_then(|data| data.get(key).cloned())?;
        serde_json::from_value(value).ok()
    }

    /// Get a reference to the current session data via a closure.
    /// Data will be `None` if there's no active session.
    pub fn tap<F, R>(&self, f: F) -> R
    where
        F: FnOnce(Option<&SessionData>) -> R,
    {
        f(self.get_inner_lock().get_current_data())
    }

    /// Get a mutable reference to the current session data via a closure.
    /// The function's argument will be `None` if there's no active session. Setting
    /// it to `None` deletes the session, and setting it to `Some` on an inactive
    /// session creates a new one.
    pub fn tap_mut<UpdateFn, R>(&mut self, f: UpdateFn) -> R
    where
        UpdateFn: FnOnce(&mut Option<SessionData>) -> R,
    {
        self.get_inner_lock().tap_data_mut(f)
    }

    /// Set/replace the session data. Will create a new active session if needed.
    pub fn set(&mut self, new_data: SessionData) {
        self.get_inner_lock().set_data(new_data);
    }

    /// Set the value of a key in the session data. Will create
    /// a new session if needed.
    pub fn set_key<V: Serialize>(&mut self, key: impl Into<String>, value: V) {
        let value = match serde_json::to_value(value) {
            Ok(value) => value,
            Err(e) => {
                rocket::error!("Session value isn't serializable, ignoring: {e}");
                return;
            }
        };
        self.tap_mut(|data| {
            data.get_or_insert_with(SessionData::new)
                .insert(key.into(), value);
        });
    }

    /// Remove a key from the session data, returning its previous value.
    /// This has no effect if there is no active session.
    pub fn remove_key(&mut self, key: &str) -> Option<Value> {
        let mut inner = self.get_inner_lock();
        if inner.get_current_data()?.contains_key(key) {
            inner.tap_data_mut(|data| data.as_mut().and_then(|d| d.remove(key)))
        } else {
            None
        }
    }

    /// Delete the session. The session cookie will be removed from the response.
    pub fn delete(&mut self) {
        self.get_inner_lock().delete();
    }

    /// Whether this session was created during the current request
    pub fn is_new(&self) -> bool {
        self.get_inner_lock().is_new()
    }

    /// Get the error (if any) while loading the session. Unknown, expired, and
    /// tampered sessions are not errors; this is only set when the store itself failed.
    pub fn error(&self) -> Option<&SessionError> {
        self.error
    }

    fn get_inner_lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().expect("Failed to get session data lock")
    }
}
