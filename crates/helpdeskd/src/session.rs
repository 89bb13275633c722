//! Admin sessions and credential checks.
//!
//! A session token is 32 random bytes, hex encoded, handed to the browser in an
//! HttpOnly cookie. Only its sha256 digest is stored, so a leaked database does
//! not yield usable sessions.

use axum::http::{header, HeaderMap};
use chrono::{DateTime, Duration, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use helpdesk_common::config::SessionConfig;
use helpdesk_common::{hash_password_with_cost, is_password_hashed, verify_password, AdminUser};

use crate::error::ApiError;
use crate::server::AppState;

const TOKEN_BYTES: usize = 32;

/// Authenticated admin behind a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminSession {
    pub username: String,
    pub name: String,
    pub token_digest: String,
    pub expires_at: DateTime<Utc>,
}

/// Fresh random session token
pub fn new_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Digest under which a token is stored
pub fn token_digest(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Value of cookie `name` across all Cookie headers
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Set-Cookie value issuing `token`
pub fn session_cookie(config: &SessionConfig, token: &str) -> String {
    let mut cookie = format!(
        "{}={}; HttpOnly; SameSite=Lax; Path=/; Max-Age={}",
        config.cookie_name,
        token,
        config.ttl_hours * 60 * 60
    );
    if config.secure_cookie {
        cookie.push_str("; Secure");
    }
    cookie
}

/// Set-Cookie value that clears the session cookie
pub fn clear_cookie(config: &SessionConfig) -> String {
    format!("{}=; Path=/; Max-Age=0", config.cookie_name)
}

/// Resolve the request's session cookie to a live admin session
pub async fn current_session(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<Option<AdminSession>, ApiError> {
    let Some(token) = cookie_value(headers, &state.config.session.cookie_name) else {
        return Ok(None);
    };
    let digest = token_digest(&token);

    let record = {
        let store = state.store.lock().await;
        store.find_session(&digest, Utc::now())?
    };

    Ok(record.map(|r| AdminSession {
        username: r.username,
        name: r.name,
        token_digest: digest,
        expires_at: r.expires_at,
    }))
}

/// Like `current_session` but 401 when absent
pub async fn require_session(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<AdminSession, ApiError> {
    current_session(state, headers)
        .await?
        .ok_or(ApiError::Unauthorized)
}

/// Result of a successful credential check
#[derive(Debug, Clone)]
pub struct ValidatedAdmin {
    pub admin: AdminUser,
    /// Stored value was legacy plaintext and should be replaced
    pub needs_rehash: bool,
}

/// Check a username/password pair against active admins.
/// scrypt runs on the blocking pool.
pub async fn validate_admin_credentials(
    state: &AppState,
    username: &str,
    password: &str,
) -> Result<Option<ValidatedAdmin>, ApiError> {
    let username = username.trim();
    let admin = {
        let store = state.store.lock().await;
        store.find_admin(username)?
    };

    let Some(admin) = admin.filter(|a| a.active) else {
        debug!("Login rejected for unknown or inactive admin");
        return Ok(None);
    };

    let stored = admin.password.clone();
    let supplied = password.to_string();
    let matched =
        tokio::task::spawn_blocking(move || verify_password(&supplied, &stored)).await?;

    if !matched {
        return Ok(None);
    }

    let needs_rehash = !is_password_hashed(&admin.password);
    Ok(Some(ValidatedAdmin {
        admin,
        needs_rehash,
    }))
}

/// Hash with the configured cost on the blocking pool
pub async fn hash_for_storage(state: &AppState, password: &str) -> Result<String, ApiError> {
    let cost = state.config.password;
    let plain = password.to_string();
    let hashed = tokio::task::spawn_blocking(move || hash_password_with_cost(&plain, cost))
        .await?
        .map_err(|e| ApiError::Internal(e.into()))?;
    Ok(hashed)
}

/// A freshly issued session
#[derive(Debug, Clone)]
pub struct OpenedSession {
    pub admin: AdminUser,
    /// Raw token for the cookie; never stored
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Log in: mark online, migrate a legacy password, store a session.
pub async fn open_session(
    state: &AppState,
    validated: &ValidatedAdmin,
    password: &str,
) -> Result<OpenedSession, ApiError> {
    let rehashed = if validated.needs_rehash {
        info!("Migrating legacy password for admin {}", validated.admin.username);
        Some(hash_for_storage(state, password).await?)
    } else {
        None
    };

    let now = Utc::now();
    let token = new_token();
    let expires_at = session_expiry(&state.config.session, now);

    let updated = {
        let store = state.store.lock().await;
        let updated = store.set_admin_online(
            &validated.admin.username,
            true,
            rehashed.as_deref(),
            now,
        )?;
        store.insert_session(&token_digest(&token), &validated.admin.username, now, expires_at)?;
        updated
    };

    let updated = updated.ok_or_else(|| {
        warn!("Admin {} vanished during login", validated.admin.username);
        ApiError::InvalidCredentials
    })?;

    Ok(OpenedSession {
        admin: updated,
        token,
        expires_at,
    })
}

/// Log out: mark offline and drop the session. Missing admins are ignored.
pub async fn close_session(
    state: &AppState,
    session: &AdminSession,
) -> Result<Option<AdminUser>, ApiError> {
    let store = state.store.lock().await;
    store.delete_session(&session.token_digest)?;
    let updated = store.set_admin_online(&session.username, false, None, Utc::now())?;
    Ok(updated)
}

pub fn session_expiry(config: &SessionConfig, now: DateTime<Utc>) -> DateTime<Utc> {
    now + Duration::hours(config.ttl_hours)
}
