//! Password hashing, server-side sessions and the extractors that gate
//! teacher and admin routes.

use crate::error::AppResult;
use crate::AppState;
use actix_web::cookie::{Cookie, SameSite};
use actix_web::dev::Payload;
use actix_web::http::{header, StatusCode};
use actix_web::{web, FromRequest, HttpRequest, HttpResponse, ResponseError};
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use std::future::{ready, Ready};
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};
use thiserror::Error;

pub const SESSION_COOKIE: &str = "sid";
pub const FLASH_COOKIE: &str = "flash";
pub const SESSION_IDLE_TIMEOUT: Duration = Duration::from_secs(8 * 60 * 60);
const TOKEN_LEN: usize = 48;

#[derive(Debug, Clone, Copy)]
pub struct PasswordHasher {
    cost: u32,
}

impl PasswordHasher {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }

    pub async fn hash(&self, password: &str) -> AppResult<String> {
        let cost = self.cost;
        let password = password.to_string();
        let hashed = tokio::task::spawn_blocking(move || bcrypt::hash(password, cost)).await??;
        Ok(hashed)
    }

    /// Returns false for a wrong password and for an unreadable hash.
    pub async fn verify(&self, password: &str, hash: &str) -> bool {
        let password = password.to_string();
        let hash = hash.to_string();
        match tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash)).await {
            Ok(Ok(matches)) => matches,
            Ok(Err(err)) => {
                tracing::warn!(error = %err, "stored password hash could not be checked");
                false
            }
            Err(err) => {
                tracing::error!(error = %err, "password verification task failed");
                false
            }
        }
    }
}

/// Who a session belongs to. A session holds at most one of these, so a
/// teacher login and an admin login can never coexist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    Teacher { id: i64, name: String },
    Admin { username: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FlashLevel {
    Success,
    Info,
    Warning,
    Danger,
}

impl FlashLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlashLevel::Success => "success",
            FlashLevel::Info => "info",
            FlashLevel::Warning => "warning",
            FlashLevel::Danger => "danger",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "success" => Some(FlashLevel::Success),
            "info" => Some(FlashLevel::Info),
            "warning" => Some(FlashLevel::Warning),
            "danger" => Some(FlashLevel::Danger),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Flash {
    pub level: FlashLevel,
    pub message: String,
}

impl Flash {
    pub fn new(level: FlashLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }

    /// Cookie value form, `level:message`.
    fn encode(&self) -> String {
        format!("{}:{}", self.level.as_str(), self.message)
    }

    fn decode(raw: &str) -> Option<Self> {
        let (level, message) = raw.split_once(':')?;
        Some(Flash::new(FlashLevel::parse(level)?, message))
    }
}

#[derive(Debug)]
struct SessionData {
    identity: Identity,
    flashes: Vec<Flash>,
    last_seen: Instant,
}

/// In-process store of logged-in sessions keyed by the random token in the
/// `sid` cookie. Only logins create entries; sessions idle for longer than
/// the timeout are dropped. Callers without a session get their flash
/// messages through the `flash` cookie instead.
#[derive(Debug)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, SessionData>>,
    secure_cookies: bool,
    idle_timeout: Duration,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(false)
    }
}

impl SessionStore {
    pub fn new(secure_cookies: bool) -> Self {
        Self::with_idle_timeout(secure_cookies, SESSION_IDLE_TIMEOUT)
    }

    pub fn with_idle_timeout(secure_cookies: bool, idle_timeout: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            secure_cookies,
            idle_timeout,
        }
    }

    fn new_token() -> String {
        thread_rng()
            .sample_iter(&Alphanumeric)
            .take(TOKEN_LEN)
            .map(char::from)
            .collect()
    }

    fn prune(&self, sessions: &mut HashMap<String, SessionData>) {
        let before = sessions.len();
        sessions.retain(|_, s| s.last_seen.elapsed() < self.idle_timeout);
        let dropped = before - sessions.len();
        if dropped > 0 {
            tracing::debug!(dropped, "expired sessions pruned");
        }
    }

    /// Identity behind `token`, refreshing its idle timer.
    pub fn identity(&self, token: &str) -> Option<Identity> {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        let session = sessions.get_mut(token)?;
        if session.last_seen.elapsed() < self.idle_timeout {
            session.last_seen = Instant::now();
            return Some(session.identity.clone());
        }
        sessions.remove(token);
        None
    }

    /// Drops the previous session (if any) and issues a fresh token bound to `identity`.
    pub fn login(&self, previous: Option<&str>, identity: Identity) -> String {
        let token = Self::new_token();
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        self.prune(&mut sessions);
        if let Some(previous) = previous {
            sessions.remove(previous);
        }
        sessions.insert(
            token.clone(),
            SessionData {
                identity,
                flashes: Vec::new(),
                last_seen: Instant::now(),
            },
        );
        token
    }

    pub fn logout(&self, token: &str) {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        sessions.remove(token);
    }

    /// Queues a message on a live session. Returns false when `token` has no
    /// session; the caller then has to deliver it with [`SessionStore::flash_cookie`].
    pub fn flash(&self, token: &str, flash: Flash) -> bool {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        self.prune(&mut sessions);
        match sessions.get_mut(token) {
            Some(session) => {
                session.flashes.push(flash);
                true
            }
            None => false,
        }
    }

    pub fn take_flashes(&self, token: &str) -> Vec<Flash> {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        sessions
            .get_mut(token)
            .map(|s| std::mem::take(&mut s.flashes))
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn cookie(&self, token: &str) -> Cookie<'static> {
        Cookie::build(SESSION_COOKIE, token.to_string())
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(self.secure_cookies)
            .finish()
    }

    pub fn removal_cookie(&self) -> Cookie<'static> {
        let mut cookie = Cookie::build(SESSION_COOKIE, "").path("/").finish();
        cookie.make_removal();
        cookie
    }

    /// One-shot message for a caller without a session.
    pub fn flash_cookie(&self, flash: &Flash) -> Cookie<'static> {
        Cookie::build(FLASH_COOKIE, flash.encode())
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(self.secure_cookies)
            .finish()
    }

    pub fn flash_removal_cookie(&self) -> Cookie<'static> {
        let mut cookie = Cookie::build(FLASH_COOKIE, "").path("/").finish();
        cookie.make_removal();
        cookie
    }
}

pub fn session_token(req: &HttpRequest) -> Option<String> {
    req.cookie(SESSION_COOKIE).map(|c| c.value().to_string())
}

/// Message left in the `flash` cookie, if any.
pub fn cookie_flash(req: &HttpRequest) -> Option<Flash> {
    req.cookie(FLASH_COOKIE).and_then(|c| Flash::decode(c.value()))
}

fn current_identity(req: &HttpRequest) -> Option<(String, Identity)> {
    let state = req.app_data::<web::Data<AppState>>()?;
    let token = session_token(req)?;
    let identity = state.sessions.identity(&token)?;
    Some((token, identity))
}

#[derive(Debug, Error)]
pub enum AuthRejection {
    #[error("login required")]
    Login { location: &'static str },

    #[error("unauthorized")]
    Unauthorized,
}

impl ResponseError for AuthRejection {
    fn status_code(&self) -> StatusCode {
        match self {
            AuthRejection::Login { .. } => StatusCode::SEE_OTHER,
            AuthRejection::Unauthorized => StatusCode::UNAUTHORIZED,
        }
    }

    fn error_response(&self) -> HttpResponse {
        match self {
            AuthRejection::Login { location } => HttpResponse::SeeOther()
                .insert_header((header::LOCATION, *location))
                .finish(),
            AuthRejection::Unauthorized => HttpResponse::Unauthorized().json(json!({
                "error": "Unauthorized",
                "code": "UNAUTHORIZED",
            })),
        }
    }
}

/// Logged-in teacher, for HTML routes. Anyone else is sent to `/login`.
#[derive(Debug, Clone)]
pub struct TeacherSession {
    pub teacher_id: i64,
    pub name: String,
    pub token: String,
}

impl TeacherSession {
    fn resolve(req: &HttpRequest) -> Option<Self> {
        match current_identity(req)? {
            (token, Identity::Teacher { id, name }) => Some(TeacherSession {
                teacher_id: id,
                name,
                token,
            }),
            _ => None,
        }
    }
}

impl FromRequest for TeacherSession {
    type Error = AuthRejection;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(TeacherSession::resolve(req).ok_or(AuthRejection::Login { location: "/login" }))
    }
}

/// Logged-in teacher, for JSON routes. Anyone else gets a 401.
#[derive(Debug, Clone)]
pub struct TeacherApi(pub TeacherSession);

impl FromRequest for TeacherApi {
    type Error = AuthRejection;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(
            TeacherSession::resolve(req)
                .map(TeacherApi)
                .ok_or(AuthRejection::Unauthorized),
        )
    }
}

/// Logged-in admin. Anyone else is sent to the admin login page.
#[derive(Debug, Clone)]
pub struct AdminSession {
    pub username: String,
    pub token: String,
}

impl FromRequest for AdminSession {
    type Error = AuthRejection;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let session = match current_identity(req) {
            Some((token, Identity::Admin { username })) => Some(AdminSession { username, token }),
            _ => None,
        };
        ready(session.ok_or(AuthRejection::Login { location: "/admin" }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn teacher(id: i64) -> Identity {
        Identity::Teacher {
            id,
            name: format!("teacher-{id}"),
        }
    }

    #[test]
    fn login_replaces_the_previous_session() {
        let store = SessionStore::new(false);
        let first = store.login(None, teacher(1));
        let second = store.login(
            Some(&first),
            Identity::Admin {
                username: "root".into(),
            },
        );

        assert_ne!(first, second);
        assert_eq!(store.identity(&first), None);
        assert_eq!(
            store.identity(&second),
            Some(Identity::Admin {
                username: "root".into()
            })
        );
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn flashes_are_delivered_once() {
        let store = SessionStore::new(false);
        let token = store.login(None, teacher(3));
        assert!(store.flash(&token, Flash::new(FlashLevel::Info, "hello")));
        assert!(store.flash(&token, Flash::new(FlashLevel::Danger, "again")));

        let flashes = store.take_flashes(&token);
        assert_eq!(flashes.len(), 2);
        assert_eq!(flashes[1].message, "again");
        assert!(store.take_flashes(&token).is_empty());
    }

    #[test]
    fn anonymous_flashes_never_create_sessions() {
        let store = SessionStore::new(false);
        for i in 0..500 {
            let flash = Flash::new(FlashLevel::Danger, "Invalid email or password.");
            assert!(!store.flash(&format!("unknown-{i}"), flash.clone()));
            let cookie = store.flash_cookie(&flash);
            assert_eq!(Flash::decode(cookie.value()), Some(flash));
        }
        assert!(store.is_empty());
    }

    #[test]
    fn flash_cookie_keeps_colons_in_the_message() {
        let flash = Flash::new(FlashLevel::Success, "Saved: all good");
        assert_eq!(Flash::decode(&flash.encode()), Some(flash));
        assert_eq!(Flash::decode("bogus:level"), None);
        assert_eq!(Flash::decode("no separator"), None);
    }

    #[test]
    fn idle_sessions_expire_and_are_pruned() {
        let store = SessionStore::with_idle_timeout(false, Duration::ZERO);
        let stale = store.login(None, teacher(1));
        assert_eq!(store.identity(&stale), None);
        assert!(store.is_empty());

        for id in 0..100 {
            store.login(None, teacher(id));
        }
        // each login prunes everything already idle past the timeout
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn active_sessions_survive_pruning() {
        let store = SessionStore::new(false);
        let a = store.login(None, teacher(1));
        let b = store.login(None, teacher(2));
        assert!(store.identity(&a).is_some());
        assert!(store.identity(&b).is_some());
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn logout_forgets_the_identity() {
        let store = SessionStore::new(false);
        let token = store.login(None, teacher(7));
        store.logout(&token);
        assert_eq!(store.identity(&token), None);
        assert!(store.is_empty());
    }

    #[test]
    fn tokens_are_long_and_distinct() {
        let a = SessionStore::new_token();
        let b = SessionStore::new_token();
        assert_eq!(a.len(), TOKEN_LEN);
        assert_ne!(a, b);
    }

    #[actix_web::test]
    async fn hashes_verify_against_their_password() {
        let hasher = PasswordHasher::new(4);
        let hash = hasher.hash("s3cret").await.unwrap();
        assert!(hasher.verify("s3cret", &hash).await);
        assert!(!hasher.verify("wrong", &hash).await);
        assert!(!hasher.verify("s3cret", "not-a-hash").await);
    }
}
