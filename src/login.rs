#![cfg(feature = "web")]
//! Accounts and sessions: argon2 password hashing, sign-up, login and the
//! session table used by the authentication middleware.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, SystemTime};

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use axum::{
    Form, Json,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use log::{info, warn};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::app::{SharedState, render_page};
use crate::error::AuthError;
use crate::store::ResultStore;

pub const SESSION_COOKIE: &str = "session";

/// Login form fields.
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

/// Sign-up form fields.
#[derive(Debug, Deserialize)]
pub struct SignupForm {
    pub username: String,
    pub password: String,
    pub confirm_password: String,
    pub full_name: String,
    pub email: String,
}

/// Query string of the login and sign-up pages.
#[derive(Debug, Default, Deserialize)]
pub struct PageMessage {
    pub error: Option<String>,
    pub registered: Option<bool>,
}

/// The authenticated user, inserted into request extensions by [`require_auth`].
#[derive(Debug, Clone, PartialEq)]
pub struct CurrentUser(pub String);

/// User session data
#[derive(Debug, Clone)]
pub struct Session {
    /// Username of the authenticated user
    pub username: String,

    /// Time when the session expires
    pub expires_at: SystemTime,
}

/// In-process session table, owned by the application state
#[derive(Debug)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Session>>,
    lifetime: Duration,
}

impl SessionStore {
    pub fn new(lifetime: Duration) -> Self {
        SessionStore {
            sessions: RwLock::new(HashMap::new()),
            lifetime,
        }
    }

    /// Create a session and return its id.
    pub fn create(&self, username: &str) -> String {
        let session_id = Uuid::new_v4().to_string();
        let session = Session {
            username: username.to_string(),
            expires_at: SystemTime::now() + self.lifetime,
        };

        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        sessions.insert(session_id.clone(), session);
        session_id
    }

    /// The username behind a live session. Expired sessions are dropped.
    pub fn validate(&self, session_id: &str) -> Option<String> {
        {
            let sessions = self.sessions.read().unwrap_or_else(|e| e.into_inner());
            match sessions.get(session_id) {
                Some(session) if session.expires_at > SystemTime::now() => {
                    return Some(session.username.clone());
                }
                None => return None,
                Some(_) => {}
            }
        }
        self.remove(session_id);
        None
    }

    pub fn remove(&self, session_id: &str) {
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        sessions.remove(session_id);
    }

    /// Drop every expired session, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = SystemTime::now();
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        let before = sessions.len();
        sessions.retain(|_, session| session.expires_at > now);
        before - sessions.len()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Hash a password using Argon2
///
/// # Arguments
/// * `password` - The plaintext password to hash
///
/// # Returns
/// * `Result<String, AuthError>` - The PHC-format hash or a hashing error
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::Hashing(e.to_string()))
}

/// Verify a password against a stored hash
///
/// # Returns
/// * `Result<bool, AuthError>` - Whether the password matches; an error if the hash is malformed
pub fn verify_password(password: &str, hash: &str) -> Result<bool, AuthError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|e| AuthError::Hashing(e.to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// Register a new account
///
/// Every field must be non-blank, the two passwords must match and the
/// username must be free.
///
/// # Arguments
/// * `store` - Store to create the account in
/// * `form` - Submitted sign-up fields
///
/// # Returns
/// * `Result<(), AuthError>` - Ok if the account was created
pub fn register_user(store: &mut dyn ResultStore, form: &SignupForm) -> Result<(), AuthError> {
    let username = form.username.trim();
    let fields = [
        username,
        form.password.as_str(),
        form.confirm_password.as_str(),
        form.full_name.trim(),
        form.email.trim(),
    ];
    if fields.iter().any(|field| field.is_empty()) {
        return Err(AuthError::MissingField);
    }
    if form.password != form.confirm_password {
        return Err(AuthError::PasswordMismatch);
    }
    if store.get_account(username)?.is_some() {
        return Err(AuthError::UsernameTaken);
    }

    let password_hash = hash_password(&form.password)?;
    if !store.create_account(username, &password_hash, form.full_name.trim(), form.email.trim())? {
        return Err(AuthError::UsernameTaken);
    }
    Ok(())
}

/// Check credentials, recording the login time on success.
pub fn authenticate(
    store: &mut dyn ResultStore,
    username: &str,
    password: &str,
) -> Result<bool, AuthError> {
    let Some(account) = store.get_account(username)? else {
        return Ok(false);
    };
    if !verify_password(password, &account.password_hash)? {
        return Ok(false);
    }
    store.record_login(username)?;
    Ok(true)
}

fn page_context(message: &PageMessage) -> serde_json::Value {
    json!({
        "error": message.error,
        "registered": message.registered.unwrap_or(false),
    })
}

pub async fn serve_login_page(
    State(state): State<SharedState>,
    Query(message): Query<PageMessage>,
) -> Response {
    render_page(&state, "login", &page_context(&message))
}

pub async fn serve_signup_page(
    State(state): State<SharedState>,
    Query(message): Query<PageMessage>,
) -> Response {
    render_page(&state, "signup", &page_context(&message))
}

/// Handle user login
///
/// # Arguments
/// * `jar` - Cookie jar for storing the session cookie
/// * `form` - Form data containing the username and password
///
/// # Returns
/// * `Response` - Redirect to the dashboard, or back to the login page with an error
pub async fn handle_login(
    State(state): State<SharedState>,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Response {
    let username = form.username.trim();
    let outcome = state.with_store(|store| authenticate(store, username, &form.password));

    match outcome {
        Ok(true) => {
            let session_id = state.sessions.create(username);
            info!("{} logged in", username);
            let cookie = Cookie::build((SESSION_COOKIE, session_id))
                .path("/")
                .http_only(true);
            (jar.add(cookie), Redirect::to("/dashboard")).into_response()
        }
        Ok(false) => {
            warn!("Failed login for {}", username);
            Redirect::to("/login?error=Invalid+username+or+password").into_response()
        }
        Err(e) => {
            warn!("Login error for {}: {}", username, e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Authentication error").into_response()
        }
    }
}

/// Handle user registration
///
/// # Returns
/// * `Response` - Redirect to the login page, or back to sign-up with the reason
pub async fn handle_signup(State(state): State<SharedState>, Form(form): Form<SignupForm>) -> Response {
    match state.with_store(|store| register_user(store, &form)) {
        Ok(()) => Redirect::to("/login?registered=true").into_response(),
        Err(AuthError::Store(e)) => {
            warn!("Sign-up failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Could not create account").into_response()
        }
        Err(reason) => Redirect::to(&format!(
            "/signup?error={}",
            urlencoding::encode(&reason.to_string())
        ))
        .into_response(),
    }
}

/// Handle user logout
///
/// Drops the server-side session and clears the cookie.
pub async fn handle_logout(State(state): State<SharedState>, jar: CookieJar) -> (CookieJar, Redirect) {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        state.sessions.remove(cookie.value());
    }
    let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/"));
    (jar, Redirect::to("/login"))
}

/// Authentication middleware
///
/// Requests with a live session get a [`CurrentUser`] extension. Others are
/// redirected to the login page, or answered with 401 under `/api/`.
pub async fn require_auth(
    State(state): State<SharedState>,
    jar: CookieJar,
    mut request: axum::extract::Request,
    next: axum::middleware::Next,
) -> Response {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        if let Some(username) = state.sessions.validate(cookie.value()) {
            request.extensions_mut().insert(CurrentUser(username));
            return next.run(request).await;
        }
    }

    if request.uri().path().starts_with("/api/") {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "Not logged in" })),
        )
            .into_response();
    }
    Redirect::to("/login").into_response()
}
