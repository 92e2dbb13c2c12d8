/// Options for configuring the session cookie.
#[derive(Clone, Debug)]
pub struct RocketDbSessionOptions {
    /// The name of the cookie used to store the session identifier (default: `"rocket_session"`)
    pub cookie_name: String,
    /// The session cookie's `Domain` attribute (default: `None`)
    pub domain: Option<String>,
    /// The session cookie's `HttpOnly` attribute (default: `true`)
    pub http_only: bool,
    /// The session cookie's `Path` attribute (default: `"/"`)
    pub path: String,
    /// Re-send the session cookie with a fresh `Max-Age` every time the session is read.
    /// The stored session is always renewed on read; this keeps the browser cookie's
    /// lifetime in step with it. (default: `false`)
    pub rolling: bool,
    /// The session cookie's `SameSite` attribute (default: `SameSite::Lax`)
    pub same_site: rocket::http::SameSite,
    /// The session cookie's `Secure` attribute (default: `true`).
    /// When developing on localhost, you may need to set this to `false` on some browsers.
    pub secure: bool,
}

impl Default for RocketDbSessionOptions {
    fn default() -> Self {
        Self {
            cookie_name: "rocket_session".to_owned(),
            domain: None,
            http_only: true,
            path: "/".to_owned(),
            rolling: false,
            same_site: rocket::http::SameSite::Lax,
            secure: true,
        }
    }
}
