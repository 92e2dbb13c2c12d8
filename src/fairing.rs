use std::sync::{Arc, Mutex};

use bon::Builder;
use rocket::{
    fairing::Fairing,
    http::Cookie,
    time::Duration,
    Build, Orbit, Request, Response, Rocket,
};

use crate::{
    config::{SecretKeyBase, StoreConfig},
    guard::LocalCachedSession,
    session_inner::PendingChanges,
    store::{redact, DatabaseStore, SessionStore},
    RocketDbSessionOptions,
};

/**
A Rocket fairing that enables database-backed sessions.

# Example
```rust
use rocket_db_session::{
    config::{StoreConfig, StoreOptions},
    storage::memory::MemoryRepository,
    store::DatabaseStore,
    RocketDbSession,
};

#[rocket::launch]
fn rocket() -> _ {
    // Use default settings with an in-memory repository
    let session_fairing = RocketDbSession::default();

    // Or customize settings with the builder
    let config = StoreConfig::init(StoreOptions {
        max_age: 7 * 24 * 60 * 60, // 7 days
        ..Default::default()
    })
    .expect("valid store options");
    let custom_session = RocketDbSession::builder()
        .store(DatabaseStore::new(MemoryRepository::default()))
        .config(config)
        .with_options(|opt| {
            opt.cookie_name = "my_cookie".to_string();
            opt.path = "/app".to_string();
        })
        .build();

    rocket::build()
        .attach(custom_session)
        // ... other configuration ...
}
```
*/
#[derive(Builder, Clone)]
pub struct RocketDbSession {
    /// Set the cookie options directly. Alternatively, use `with_options` to customize the default options via a closure.
    #[builder(default)]
    pub(crate) options: RocketDbSessionOptions,
    /// Set the session store. The default is a [`DatabaseStore`] with an in-memory repository.
    #[builder(default = Arc::new(DatabaseStore::default()), with = |store: impl SessionStore + 'static| Arc::new(store))]
    pub(crate) store: Arc<dyn SessionStore>,
    /// Set the store configuration (expiry, signing/encryption, serializer).
    #[builder(default = Arc::new(StoreConfig::default()), with = |config: StoreConfig| Arc::new(config))]
    pub(crate) config: Arc<StoreConfig>,
    /// Secret used to derive session keys when the store's crypto options don't include one.
    /// It's checked and its keys are derived on ignite, then placed in Rocket's managed state
    /// for the store to read on every request. Ignition fails if the config signs or encrypts
    /// sessions and no usable secret is available.
    #[builder(into)]
    pub(crate) secret_key_base: Option<SecretKeyBase>,
}

impl Default for RocketDbSession {
    /// Create a new instance with default options and an in-memory repository.
    fn default() -> Self {
        Self::builder().build()
    }
}

use rocket_db_session_builder::{IsUnset, SetOptions, State};
impl<S: State> RocketDbSessionBuilder<S> {
    /// Customize the [options](RocketDbSessionOptions) via a closure. Any options that are not set will retain their default values.
    pub fn with_options<OptionsFn>(self, options_fn: OptionsFn) -> RocketDbSessionBuilder<SetOptions<S>>
    where
        S::Options: IsUnset,
        OptionsFn: FnOnce(&mut RocketDbSessionOptions),
    {
        let mut options = RocketDbSessionOptions::default();
        options_fn(&mut options);
        self.options(options)
    }
}

impl RocketDbSession {
    /// Create the session cookie
    fn session_cookie(&self, identifier: String) -> Cookie<'static> {
        let options = &self.options;
        let mut cookie = Cookie::build((options.cookie_name.to_owned(), identifier))
            .http_only(options.http_only)
            .max_age(Duration::seconds(self.config.max_age().into()))
            .path(options.path.clone())
            .same_site(options.same_site)
            .secure(options.secure);

        if let Some(domain) = &options.domain {
            cookie = cookie.domain(domain.clone());
        }

        cookie.build()
    }

    /// Create a cookie that removes the session cookie from the browser
    fn removal_cookie(&self) -> Cookie<'static> {
        let mut cookie =
            Cookie::build(self.options.cookie_name.to_owned()).path(self.options.path.to_owned());
        if let Some(domain) = &self.options.domain {
            cookie = cookie.domain(domain.to_owned());
        }
        let mut cookie = cookie.build();
        cookie.make_removal();
        cookie
    }

    /// Apply the request's session changes to the store, and return the cookie to
    /// send back (if any)
    async fn apply_changes(&self, req: &Request<'_>, changes: PendingChanges) -> Option<Cookie<'static>> {
        let mut cookie = None;

        if let Some(deleted_id) = changes.deleted {
            rocket::debug!("Found deleted session. Deleting session '{}'...", redact(&deleted_id));
            if let Err(e) = self.store.delete(req, Some(&deleted_id), &self.config).await {
                rocket::warn!("Error while deleting session '{}': {e}", redact(&deleted_id));
            }
            cookie = Some(self.removal_cookie());
        }

        if let Some((id, data)) = changes.updated {
            rocket::debug!("Found updated session. Saving session...");
            match self.store.put(req, id.as_deref(), &data, &self.config).await {
                Ok(Some(saved_id)) => {
                    rocket::debug!("Saved session '{}' successfully", redact(&saved_id));
                    cookie = Some(self.session_cookie(saved_id));
                }
                Ok(None) => {
                    rocket::debug!("Session expired before it could be saved");
                    cookie = Some(self.removal_cookie());
                }
                Err(e) => rocket::error!("Error while saving session: {e}"),
            }
        } else if let Some(unchanged_id) = changes.unchanged {
            if self.options.rolling {
                cookie = Some(self.session_cookie(unchanged_id));
            }
        } else if changes.stale_cookie && cookie.is_none() {
            rocket::debug!("Removing cookie for missing session");
            cookie = Some(self.removal_cookie());
        }

        cookie
    }
}

#[rocket::async_trait]
impl Fairing for RocketDbSession {
    fn info(&self) -> rocket::fairing::Info {
        use rocket::fairing::Kind;
        rocket::fairing::Info {
            name: "Rocket DB Session",
            kind: Kind::Ignite | Kind::Response | Kind::Shutdown | Kind::Singleton,
        }
    }

    async fn on_ignite(&self, rocket: Rocket<Build>) -> Result<Rocket<Build>, Rocket<Build>> {
        rocket::debug!("Session store config: {:?}", self.config);
        if let Err(e) = self.config.prepare(self.secret_key_base.as_ref()) {
            rocket::error!("Invalid session store configuration: {e}");
            return Err(rocket);
        }

        rocket::debug!("Setting up session resources...");
        if let Err(e) = self.store.setup().await {
            rocket::warn!("Error during session store setup: {}", e);
        }

        let rocket = match &self.secret_key_base {
            Some(secret) => rocket.manage(secret.clone()),
            None => rocket,
        };
        Ok(rocket.manage::<RocketDbSession>(self.clone()))
    }

    async fn on_response<'r>(&self, req: &'r Request<'_>, res: &mut Response<'r>) {
        // Get session data from request local cache, or generate a default empty one
        let (session_inner, _): &LocalCachedSession = req.local_cache(|| (Mutex::default(), None));

        // Take pending changes
        let changes = session_inner.lock().unwrap().take_for_storage();

        if let Some(cookie) = self.apply_changes(req, changes).await {
            res.adjoin_header(&cookie);
        }
    }

    async fn on_shutdown(&self, _rocket: &Rocket<Orbit>) {
        rocket::debug!("Shutting down session resources...");
        if let Err(e) = self.store.shutdown().await {
            rocket::warn!("Error during session store shutdown: {e}");
        }
    }
}
