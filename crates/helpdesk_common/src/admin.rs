//! Admin accounts and presence.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Role reported for every authenticated admin session
pub const ADMIN_ROLE: &str = "admin";

pub const MIN_USERNAME_LEN: usize = 3;
pub const MIN_PASSWORD_LEN: usize = 4;
pub const MIN_NAME_LEN: usize = 2;

/// A persisted admin account, including its stored password value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminUser {
    pub id: String,
    pub username: String,
    pub name: String,
    /// Encoded scrypt record, or legacy plaintext
    pub password: String,
    pub active: bool,
    pub is_online: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AdminUser {
    pub fn summary(&self) -> AdminSummary {
        AdminSummary {
            id: self.id.clone(),
            username: self.username.clone(),
            name: self.name.clone(),
            active: self.active,
            created_at: self.created_at,
        }
    }

    pub fn presence_event(&self) -> PresenceEvent {
        PresenceEvent::from_admin(self)
    }
}

/// Admin listing entry; never carries the password
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminSummary {
    pub id: String,
    pub username: String,
    pub name: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// Presence change pushed to the admin panel's live feed.
///
/// `id` is unique per (admin, update time) so subscribers can drop duplicates
/// that arrive from both the live channel and the fallback poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceEvent {
    pub id: String,
    pub admin_id: String,
    pub username: String,
    pub name: String,
    pub active: bool,
    pub is_online: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl PresenceEvent {
    pub fn from_admin(admin: &AdminUser) -> Self {
        let updated_at = iso_millis(admin.updated_at);
        Self {
            id: format!("presence:{}:{}", admin.id, updated_at),
            admin_id: admin.id.clone(),
            username: admin.username.clone(),
            name: admin.name.clone(),
            active: admin.active,
            is_online: admin.is_online,
            created_at: iso_millis(admin.created_at),
            updated_at,
        }
    }

    /// Parsed `updated_at`, if well formed
    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.updated_at)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

fn iso_millis(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdminValidationError {
    #[error("username, password, and name are required")]
    Missing,

    #[error("Username, password or name is too short.")]
    TooShort,
}

/// Admin creation request after trimming and length checks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAdmin {
    pub username: String,
    pub password: String,
    pub name: String,
}

impl NewAdmin {
    /// Trim and validate raw request fields
    pub fn validate(
        username: Option<&str>,
        password: Option<&str>,
        name: Option<&str>,
    ) -> Result<Self, AdminValidationError> {
        let (Some(username), Some(password), Some(name)) = (username, password, name) else {
            return Err(AdminValidationError::Missing);
        };

        let username = username.trim();
        let password = password.trim();
        let name = name.trim();

        if username.chars().count() < MIN_USERNAME_LEN
            || password.chars().count() < MIN_PASSWORD_LEN
            || name.chars().count() < MIN_NAME_LEN
        {
            return Err(AdminValidationError::TooShort);
        }

        Ok(Self {
            username: username.to_string(),
            password: password.to_string(),
            name: name.to_string(),
        })
    }
}
