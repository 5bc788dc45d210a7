//! Admin auth: argon2 password hash persisted in auth_config, cookie
//! sessions, brute-force lockout.

use std::collections::HashSet;
use std::sync::Mutex;

use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use storage::Store;

use crate::brute_force::BruteForceGuard;
use crate::{ApiError, AppState};

const SESSION_COOKIE: &str = "dsa_session";
const PASSWORD_HASH_KEY: &str = "admin_password_hash";

pub struct AuthState {
    enabled: bool,
    sessions: Mutex<HashSet<String>>,
    guard: BruteForceGuard,
}

impl AuthState {
    /// Bootstrap: hash ADMIN_PASSWORD into auth_config on first boot;
    /// later password changes live in the database only.
    pub async fn init(config: &app_config::Config, store: &Store) -> anyhow::Result<Self> {
        if config.admin_auth_enabled {
            let existing = store.get_auth_value(PASSWORD_HASH_KEY).await?;
            if existing.is_none() {
                let password = config
                    .admin_password
                    .as_deref()
                    .ok_or_else(|| anyhow::anyhow!("ADMIN_PASSWORD required when auth enabled"))?;
                let hash = hash_password(password)?;
                store.set_auth_value(PASSWORD_HASH_KEY, &hash).await?;
                tracing::info!("admin password hash initialized");
            }
        }
        Ok(AuthState {
            enabled: config.admin_auth_enabled,
            sessions: Mutex::new(HashSet::new()),
            guard: BruteForceGuard::default(),
        })
    }

    fn issue_session(&self) -> String {
        let token = uuid::Uuid::new_v4().simple().to_string();
        self.sessions.lock().expect("session lock").insert(token.clone());
        token
    }

    fn revoke_session(&self, token: &str) {
        self.sessions.lock().expect("session lock").remove(token);
    }

    fn is_valid(&self, token: &str) -> bool {
        self.sessions.lock().expect("session lock").contains(token)
    }
}

fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| anyhow::anyhow!("hashing failed: {e}"))
}

fn verify_password(password: &str, stored_hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored_hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

fn session_from_request(request: &Request) -> Option<String> {
    let cookies = request.headers().get(header::COOKIE)?.to_str().ok()?;
    cookies.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key == SESSION_COOKIE).then(|| value.to_string())
    })
}

/// Session middleware: when auth is enabled, everything except the auth
/// endpoints themselves requires a valid session cookie.
pub async fn require_session(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    if !state.auth.enabled {
        return next.run(request).await;
    }
    // Auth endpoints and liveness stay reachable whether or not the
    // /api/v1 prefix was stripped by nesting.
    let path = request.uri().path();
    if path.contains("/auth/") || path.ends_with("/health") {
        return next.run(request).await;
    }
    match session_from_request(&request) {
        Some(token) if state.auth.is_valid(&token) => next.run(request).await,
        _ => ApiError::new(StatusCode::UNAUTHORIZED, "unauthorized", "login required")
            .into_response(),
    }
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/auth/status", get(auth_status))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/change-password", post(change_password))
}

async fn auth_status(State(state): State<AppState>, request: Request) -> Json<serde_json::Value> {
    let authenticated = !state.auth.enabled
        || session_from_request(&request)
            .map(|t| state.auth.is_valid(&t))
            .unwrap_or(false);
    Json(json!({ "enabled": state.auth.enabled, "authenticated": authenticated }))
}

#[derive(Deserialize)]
struct LoginRequest {
    password: String,
}

async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<LoginRequest>,
) -> Result<Response, ApiError> {
    if !state.auth.enabled {
        return Err(ApiError::bad_request("auth is disabled"));
    }
    // Lockout key: the proxy-reported client, or one shared bucket.
    let client = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .unwrap_or_else(|| "direct".to_string());

    if state.auth.guard.is_locked(&client) {
        return Err(ApiError::new(
            StatusCode::TOO_MANY_REQUESTS,
            "locked_out",
            "too many failed attempts, retry later",
        ));
    }

    let stored = state
        .store
        .get_auth_value(PASSWORD_HASH_KEY)
        .await?
        .ok_or_else(|| ApiError::internal("password hash missing"))?;

    if !verify_password(&request.password, &stored) {
        state.auth.guard.record_failure(&client);
        return Err(ApiError::new(
            StatusCode::UNAUTHORIZED,
            "bad_credentials",
            "wrong password",
        ));
    }

    state.auth.guard.record_success(&client);
    let token = state.auth.issue_session();
    let cookie = format!("{SESSION_COOKIE}={token}; HttpOnly; SameSite=Lax; Path=/");
    Ok((
        [(header::SET_COOKIE, cookie)],
        Json(json!({ "ok": true })),
    )
        .into_response())
}

async fn logout(State(state): State<AppState>, request: Request) -> Json<serde_json::Value> {
    if let Some(token) = session_from_request(&request) {
        state.auth.revoke_session(&token);
    }
    Json(json!({ "ok": true }))
}

#[derive(Deserialize)]
struct ChangePasswordRequest {
    old_password: String,
    new_password: String,
}

async fn change_password(
    State(state): State<AppState>,
    request: Request,
) -> Result<Json<serde_json::Value>, ApiError> {
    if !state.auth.enabled {
        return Err(ApiError::bad_request("auth is disabled"));
    }
    session_from_request(&request)
        .filter(|t| state.auth.is_valid(t))
        .ok_or_else(|| ApiError::new(StatusCode::UNAUTHORIZED, "unauthorized", "login required"))?;

    let bytes = axum::body::to_bytes(request.into_body(), 64 * 1024)
        .await
        .map_err(|e| ApiError::bad_request(e.to_string()))?;
    let body: ChangePasswordRequest =
        serde_json::from_slice(&bytes).map_err(|e| ApiError::bad_request(e.to_string()))?;

    if body.new_password.len() < 8 {
        return Err(ApiError::bad_request("new password must be at least 8 characters"));
    }

    let stored = state
        .store
        .get_auth_value(PASSWORD_HASH_KEY)
        .await?
        .ok_or_else(|| ApiError::internal("password hash missing"))?;
    if !verify_password(&body.old_password, &stored) {
        return Err(ApiError::new(
            StatusCode::UNAUTHORIZED,
            "bad_credentials",
            "wrong password",
        ));
    }

    let new_hash =
        hash_password(&body.new_password).map_err(|e| ApiError::internal(e.to_string()))?;
    state.store.set_auth_value(PASSWORD_HASH_KEY, &new_hash).await?;
    Ok(Json(json!({ "ok": true })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_round_trip() {
        let hash = hash_password("hunter22").unwrap();
        assert!(verify_password("hunter22", &hash));
        assert!(!verify_password("hunter23", &hash));
    }

    #[test]
    fn malformed_hash_never_verifies() {
        assert!(!verify_password("x", "not-a-phc-string"));
    }
}
