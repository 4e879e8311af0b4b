//! Cookie-keyed session lookup.

use crate::services::SessionSlot;
use crate::AppState;
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use std::convert::Infallible;
use std::sync::Arc;
use uuid::Uuid;

pub const SESSION_COOKIE: &str = "repertoire_session";

/// The caller's session, created on first contact.
///
/// A missing, malformed, or expired cookie yields a fresh conversation.
pub struct SessionContext {
    pub session_id: Uuid,
    pub slot: Arc<SessionSlot>,
    secure: bool,
}

impl SessionContext {
    /// Cookie jar carrying the session id back to the browser.
    pub fn cookie_jar(&self) -> CookieJar {
        CookieJar::new().add(session_cookie(self.session_id, self.secure))
    }
}

fn session_cookie(session_id: Uuid, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, session_id.to_string()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .build()
}

#[async_trait]
impl FromRequestParts<AppState> for SessionContext {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let requested = jar
            .get(SESSION_COOKIE)
            .and_then(|cookie| Uuid::parse_str(cookie.value()).ok());

        let (session_id, slot) = state.sessions.resolve(requested);
        Ok(Self {
            session_id,
            slot,
            secure: state.config.secure_cookies,
        })
    }
}

/// Cookie that removes the session id from the browser.
pub fn expired_session_cookie() -> CookieJar {
    CookieJar::new().remove(Cookie::build(SESSION_COOKIE).path("/").build())
}
