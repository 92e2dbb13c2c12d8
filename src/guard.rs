use std::sync::Mutex;

use rocket::{
    request::{FromRequest, Outcome},
    Request,
};

use crate::{
    error::SessionError, session_inner::SessionInner, store::redact, RocketDbSession, Session,
};

/// Type of the cached inner session data in Rocket's request local cache
pub(crate) type LocalCachedSession = (Mutex<SessionInner>, Option<SessionError>);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Session<'r> {
    /// Unused outcome error type - this request guard shouldn't fail
    type Error = &'r str;

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let fairing = get_fairing(req.rocket());

        let (cached_inner, session_error): &LocalCachedSession = req
            .local_cache_async(async {
                let identifier = req
                    .cookies()
                    .get(&fairing.options.cookie_name)
                    .map(|cookie| cookie.value().to_owned());
                get_session_data(req, identifier, fairing).await
            })
            .await;

        Outcome::Success(Session::new(cached_inner, session_error.as_ref()))
    }
}

/// Get session configuration from Rocket state
#[inline(always)]
fn get_fairing(rocket: &rocket::Rocket<rocket::Orbit>) -> &RocketDbSession {
    rocket
        .state::<RocketDbSession>()
        .unwrap_or_else(|| panic!("The RocketDbSession fairing should be attached to the server"))
}

/// Load the session from the store
async fn get_session_data(
    req: &Request<'_>,
    identifier: Option<String>,
    fairing: &RocketDbSession,
) -> LocalCachedSession {
    let Some(identifier) = identifier else {
        rocket::debug!("No session cookie found. Creating empty session...");
        return (Mutex::default(), None);
    };

    rocket::debug!("Got session '{}' from cookie. Loading session...", redact(&identifier));
    match fairing
        .store
        .get(req, Some(&identifier), &fairing.config)
        .await
    {
        Ok((Some(id), data)) => {
            rocket::debug!("Session found. Creating existing session...");
            (Mutex::new(SessionInner::new_existing(id, data)), None)
        }
        Ok((None, _)) => {
            rocket::debug!("No live session for cookie. Creating empty session...");
            (Mutex::new(SessionInner::new_stale()), None)
        }
        Err(e) => {
            rocket::error!("Error from session store, creating empty session: {e}");
            (Mutex::default(), Some(e))
        }
    }
}

/// If using rocket-okapi, this implements OpenApiFromRequest for Session to ignore the request guard
#[cfg(feature = "rocket_okapi")]
impl<'r> rocket_okapi::request::OpenApiFromRequest<'r> for Session<'r> {
    fn from_request_input(
        _gen: &mut rocket_okapi::gen::OpenApiGenerator,
        _name: String,
        _required: bool,
    ) -> rocket_okapi::Result<rocket_okapi::request::RequestHeaderInput> {
        Ok(rocket_okapi::request::RequestHeaderInput::None)
    }
}
