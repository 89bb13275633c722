//! Help desk database - SQLite persistence for admins, sessions and tickets.
//!
//! Schema:
//! - admin_users: accounts, stored password records, online flag
//! - admin_sessions: sha256 digests of issued session tokens
//! - sla_policies: response/resolve targets per priority
//! - tickets: tickets with their SLA deadlines
//! - ticket_messages: conversation entries per ticket
//!
//! Timestamps are stored as integer milliseconds since the Unix epoch.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::str::FromStr;
use uuid::Uuid;

use helpdesk_common::ticket::{ticket_code, FEEDBACK_RATING_RANGE};
use helpdesk_common::{
    AdminUser, NewTicket, SlaPolicy, Ticket, TicketCategory, TicketMessage, TicketPriority,
    TicketStatus,
};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS admin_users (
    id TEXT PRIMARY KEY,
    username TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    password TEXT NOT NULL,
    active INTEGER NOT NULL DEFAULT 1,
    is_online INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_admin_users_updated ON admin_users(updated_at);

CREATE TABLE IF NOT EXISTS admin_sessions (
    token_hash TEXT PRIMARY KEY,
    username TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    expires_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS sla_policies (
    priority TEXT PRIMARY KEY,
    response_minutes INTEGER NOT NULL,
    resolve_minutes INTEGER NOT NULL,
    active INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS tickets (
    id TEXT PRIMARY KEY,
    seq INTEGER NOT NULL UNIQUE,
    code TEXT NOT NULL UNIQUE,
    title TEXT NOT NULL,
    description TEXT NOT NULL,
    priority TEXT NOT NULL,
    category TEXT NOT NULL,
    status TEXT NOT NULL,
    first_reply_at INTEGER,
    response_due_at INTEGER NOT NULL,
    resolve_due_at INTEGER NOT NULL,
    closed_at INTEGER,
    feedback_rating INTEGER,
    feedback_submitted_at INTEGER,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_tickets_status ON tickets(status);

CREATE TABLE IF NOT EXISTS ticket_messages (
    id TEXT PRIMARY KEY,
    ticket_id TEXT NOT NULL REFERENCES tickets(id),
    sender TEXT NOT NULL,
    message TEXT NOT NULL,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_messages_ticket ON ticket_messages(ticket_id, created_at);
"#;

const ADMIN_COLUMNS: &str =
    "id, username, name, password, active, is_online, created_at, updated_at";

const TICKET_COLUMNS: &str = "id, code, title, description, priority, category, status, \
     first_reply_at, response_due_at, resolve_due_at, closed_at, feedback_rating, \
     feedback_submitted_at, created_at, updated_at";

/// Result of posting a message to a ticket
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOutcome {
    Saved(TicketMessage),
    NotFound,
    Closed,
}

/// Result of submitting feedback on a ticket
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedbackOutcome {
    Saved(Ticket),
    NotFound,
    NotClosed,
    AlreadySubmitted,
    InvalidRating,
}

/// Session lookup result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub username: String,
    pub name: String,
    pub expires_at: DateTime<Utc>,
}

/// SQLite-backed help desk store
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open or create the database at `path`
    pub fn open_at<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;

        // Enable WAL mode for better concurrent access
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::init(conn)
    }

    /// Throwaway in-memory database
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    // ========================================================================
    // Admins
    // ========================================================================

    pub fn count_admins(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM admin_users", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Active admins first, then oldest first
    pub fn list_admins(&self) -> Result<Vec<AdminUser>> {
        let sql = format!(
            "SELECT {ADMIN_COLUMNS} FROM admin_users ORDER BY active DESC, created_at ASC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let admins = stmt
            .query_map([], admin_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(admins)
    }

    pub fn find_admin(&self, username: &str) -> Result<Option<AdminUser>> {
        let sql = format!("SELECT {ADMIN_COLUMNS} FROM admin_users WHERE username = ?1");
        Ok(self
            .conn
            .query_row(&sql, params![username], admin_from_row)
            .optional()?)
    }

    /// Insert an active admin. Returns `None` when the username is taken.
    /// `password` must already be an encoded record.
    pub fn create_admin(
        &self,
        username: &str,
        password: &str,
        name: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<AdminUser>> {
        let inserted = self.conn.execute(
            "INSERT INTO admin_users (id, username, name, password, active, is_online, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, 1, 0, ?5, ?5)
             ON CONFLICT(username) DO NOTHING",
            params![
                Uuid::new_v4().to_string(),
                username,
                name,
                password,
                to_millis(now)
            ],
        )?;

        if inserted == 0 {
            return Ok(None);
        }
        self.find_admin(username)
    }

    /// Set the online flag, optionally replacing the stored password.
    /// `updated_at` strictly increases so every change yields a new presence id.
    pub fn set_admin_online(
        &self,
        username: &str,
        online: bool,
        new_password: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Option<AdminUser>> {
        let changed = self.conn.execute(
            "UPDATE admin_users
             SET is_online = ?2,
                 password = COALESCE(?3, password),
                 updated_at = MAX(?4, updated_at + 1)
             WHERE username = ?1",
            params![username, online, new_password, to_millis(now)],
        )?;

        if changed == 0 {
            return Ok(None);
        }
        self.find_admin(username)
    }

    /// Admins changed strictly after `cursor`, oldest change first
    pub fn admins_updated_after(
        &self,
        cursor: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<AdminUser>> {
        let sql = format!(
            "SELECT {ADMIN_COLUMNS} FROM admin_users
             WHERE updated_at > ?1 ORDER BY updated_at ASC LIMIT ?2"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let admins = stmt
            .query_map(params![to_millis(cursor), limit as i64], admin_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(admins)
    }

    // ========================================================================
    // Sessions
    // ========================================================================

    pub fn insert_session(
        &self,
        token_hash: &str,
        username: &str,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT INTO admin_sessions (token_hash, username, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![token_hash, username, to_millis(now), to_millis(expires_at)],
        )?;
        Ok(())
    }

    /// Live session for an active admin
    pub fn find_session(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<SessionRecord>> {
        Ok(self
            .conn
            .query_row(
                "SELECT s.username, a.name, s.expires_at
                 FROM admin_sessions s
                 JOIN admin_users a ON a.username = s.username
                 WHERE s.token_hash = ?1 AND s.expires_at > ?2 AND a.active = 1",
                params![token_hash, to_millis(now)],
                |row| {
                    Ok(SessionRecord {
                        username: row.get(0)?,
                        name: row.get(1)?,
                        expires_at: from_millis(row.get(2)?),
                    })
                },
            )
            .optional()?)
    }

    pub fn delete_session(&self, token_hash: &str) -> Result<bool> {
        let deleted = self.conn.execute(
            "DELETE FROM admin_sessions WHERE token_hash = ?1",
            params![token_hash],
        )?;
        Ok(deleted > 0)
    }

    pub fn prune_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64> {
        let deleted = self.conn.execute(
            "DELETE FROM admin_sessions WHERE expires_at <= ?1",
            params![to_millis(now)],
        )?;
        Ok(deleted as u64)
    }

    // ========================================================================
    // SLA policies
    // ========================================================================

    /// Insert a policy unless one already exists for its priority
    pub fn ensure_sla_policy(&self, policy: &SlaPolicy) -> Result<bool> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO sla_policies (priority, response_minutes, resolve_minutes, active)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                policy.priority.as_str(),
                policy.response_minutes,
                policy.resolve_minutes,
                policy.active
            ],
        )?;
        Ok(inserted > 0)
    }

    /// Active policy for `priority`, if one is configured
    pub fn sla_policy(&self, priority: TicketPriority) -> Result<Option<SlaPolicy>> {
        Ok(self
            .conn
            .query_row(
                "SELECT priority, response_minutes, resolve_minutes, active
                 FROM sla_policies WHERE priority = ?1 AND active = 1",
                params![priority.as_str()],
                policy_from_row,
            )
            .optional()?)
    }

    pub fn list_sla_policies(&self) -> Result<Vec<SlaPolicy>> {
        let mut stmt = self.conn.prepare(
            "SELECT priority, response_minutes, resolve_minutes, active
             FROM sla_policies ORDER BY response_minutes ASC",
        )?;
        let policies = stmt
            .query_map([], policy_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(policies)
    }

    // ========================================================================
    // Tickets
    // ========================================================================

    pub fn count_tickets(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM tickets", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Create a ticket with deadlines from the active policy for its priority,
    /// or the built-in policy when none is active.
    pub fn create_ticket(&self, new: &NewTicket, now: DateTime<Utc>) -> Result<Ticket> {
        let policy = self
            .sla_policy(new.priority)?
            .unwrap_or_else(|| SlaPolicy::default_for(new.priority));
        let (response_due_at, resolve_due_at) = policy.deadlines(now);

        let tx = self.conn.unchecked_transaction()?;
        let seq: i64 = tx.query_row("SELECT COALESCE(MAX(seq), 0) + 1 FROM tickets", [], |row| {
            row.get(0)
        })?;
        let id = Uuid::new_v4().to_string();

        tx.execute(
            "INSERT INTO tickets (id, seq, code, title, description, priority, category, status,
                                  response_due_at, resolve_due_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)",
            params![
                id,
                seq,
                ticket_code(seq as u64),
                new.title,
                new.description,
                new.priority.as_str(),
                new.category.as_str(),
                TicketStatus::Open.as_str(),
                to_millis(response_due_at),
                to_millis(resolve_due_at),
                to_millis(now)
            ],
        )?;
        tx.commit()?;

        self.find_ticket(&id)?
            .ok_or_else(|| anyhow::anyhow!("ticket {} vanished after insert", id))
    }

    /// Look a ticket up by id or by code
    pub fn find_ticket(&self, id_or_code: &str) -> Result<Option<Ticket>> {
        let sql = format!("SELECT {TICKET_COLUMNS} FROM tickets WHERE id = ?1 OR code = ?1");
        Ok(self
            .conn
            .query_row(&sql, params![id_or_code], ticket_from_row)
            .optional()?)
    }

    /// Newest first, optionally filtered by status
    pub fn list_tickets(&self, status: Option<TicketStatus>) -> Result<Vec<Ticket>> {
        let sql = format!(
            "SELECT {TICKET_COLUMNS} FROM tickets
             WHERE ?1 IS NULL OR status = ?1
             ORDER BY created_at DESC, seq DESC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let tickets = stmt
            .query_map(params![status.map(|s| s.as_str())], ticket_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tickets)
    }

    pub fn ticket_messages(&self, ticket_id: &str) -> Result<Vec<TicketMessage>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, ticket_id, sender, message, created_at
             FROM ticket_messages WHERE ticket_id = ?1
             ORDER BY created_at ASC, rowid ASC",
        )?;
        let messages = stmt
            .query_map(params![ticket_id], |row| {
                Ok(TicketMessage {
                    id: row.get(0)?,
                    ticket_id: row.get(1)?,
                    sender: row.get(2)?,
                    message: row.get(3)?,
                    created_at: from_millis(row.get(4)?),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(messages)
    }

    /// Append a message. The first admin reply stamps `first_reply_at` and
    /// moves the ticket to IN_PROGRESS.
    pub fn add_message(
        &self,
        id_or_code: &str,
        sender: &str,
        message: &str,
        now: DateTime<Utc>,
    ) -> Result<MessageOutcome> {
        let Some(ticket) = self.find_ticket(id_or_code)? else {
            return Ok(MessageOutcome::NotFound);
        };
        if ticket.is_closed() {
            return Ok(MessageOutcome::Closed);
        }

        let saved = TicketMessage {
            id: Uuid::new_v4().to_string(),
            ticket_id: ticket.id.clone(),
            sender: sender.to_string(),
            message: message.to_string(),
            created_at: now,
        };

        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO ticket_messages (id, ticket_id, sender, message, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                saved.id,
                saved.ticket_id,
                saved.sender,
                saved.message,
                to_millis(now)
            ],
        )?;

        if saved.is_admin_reply() {
            tx.execute(
                "UPDATE tickets SET first_reply_at = ?2, status = ?3, updated_at = ?2
                 WHERE id = ?1 AND first_reply_at IS NULL",
                params![ticket.id, to_millis(now), TicketStatus::InProgress.as_str()],
            )?;
        }
        tx.commit()?;

        Ok(MessageOutcome::Saved(saved))
    }

    /// Close a ticket. An already closed ticket is returned unchanged.
    pub fn close_ticket(&self, id_or_code: &str, now: DateTime<Utc>) -> Result<Option<Ticket>> {
        let Some(ticket) = self.find_ticket(id_or_code)? else {
            return Ok(None);
        };
        if ticket.is_closed() {
            return Ok(Some(ticket));
        }

        self.conn.execute(
            "UPDATE tickets SET status = ?2, closed_at = ?3, updated_at = ?3 WHERE id = ?1",
            params![ticket.id, TicketStatus::Closed.as_str(), to_millis(now)],
        )?;
        self.find_ticket(&ticket.id)
    }

    /// Record a one-time satisfaction rating on a closed ticket
    pub fn submit_feedback(
        &self,
        id_or_code: &str,
        rating: i64,
        now: DateTime<Utc>,
    ) -> Result<FeedbackOutcome> {
        let Some(ticket) = self.find_ticket(id_or_code)? else {
            return Ok(FeedbackOutcome::NotFound);
        };
        let rating = match u8::try_from(rating) {
            Ok(r) if FEEDBACK_RATING_RANGE.contains(&r) => r,
            _ => return Ok(FeedbackOutcome::InvalidRating),
        };
        if !ticket.is_closed() {
            return Ok(FeedbackOutcome::NotClosed);
        }
        if ticket.feedback_rating.is_some() {
            return Ok(FeedbackOutcome::AlreadySubmitted);
        }

        self.conn.execute(
            "UPDATE tickets SET feedback_rating = ?2, feedback_submitted_at = ?3, updated_at = ?3
             WHERE id = ?1",
            params![ticket.id, rating, to_millis(now)],
        )?;

        match self.find_ticket(&ticket.id)? {
            Some(updated) => Ok(FeedbackOutcome::Saved(updated)),
            None => Ok(FeedbackOutcome::NotFound),
        }
    }

    // ========================================================================
    // Seeding
    // ========================================================================

    /// Default SLA policies plus sample tickets on an empty ticket table
    pub fn seed_defaults(&self, now: DateTime<Utc>) -> Result<SeedReport> {
        let mut report = SeedReport::default();

        for priority in TicketPriority::ALL {
            if self.ensure_sla_policy(&SlaPolicy::default_for(priority))? {
                report.policies_created += 1;
            }
        }

        if self.count_tickets()? > 0 {
            return Ok(report);
        }

        let samples = [
            (
                NewTicket {
                    title: "PC will not power on".to_string(),
                    description: "The desktop died completely after the storm".to_string(),
                    priority: TicketPriority::High,
                    category: TicketCategory::Hardware,
                },
                vec![
                    ("user", "Please check it as soon as possible"),
                    ("agent", "Understood, a technician is on the way"),
                ],
            ),
            (
                NewTicket {
                    title: "Cannot sign in to email".to_string(),
                    description: "The password is always rejected".to_string(),
                    priority: TicketPriority::Medium,
                    category: TicketCategory::Account,
                },
                vec![("user", "Office email login keeps failing")],
            ),
        ];

        for (i, (ticket, messages)) in samples.iter().enumerate() {
            let created = self.create_ticket(ticket, now + Duration::milliseconds(i as i64))?;
            for (sender, text) in messages {
                self.add_message(&created.id, sender, text, now)?;
            }
            report.tickets_created += 1;
        }

        Ok(report)
    }
}

/// What `seed_defaults` inserted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub policies_created: u32,
    pub tickets_created: u32,
}

pub fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

pub fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

fn parse_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse::<T>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn optional_millis(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    Ok(row.get::<_, Option<i64>>(idx)?.map(from_millis))
}

fn admin_from_row(row: &Row<'_>) -> rusqlite::Result<AdminUser> {
    Ok(AdminUser {
        id: row.get(0)?,
        username: row.get(1)?,
        name: row.get(2)?,
        password: row.get(3)?,
        active: row.get(4)?,
        is_online: row.get(5)?,
        created_at: from_millis(row.get(6)?),
        updated_at: from_millis(row.get(7)?),
    })
}

fn policy_from_row(row: &Row<'_>) -> rusqlite::Result<SlaPolicy> {
    Ok(SlaPolicy {
        priority: parse_column(row, 0)?,
        response_minutes: row.get(1)?,
        resolve_minutes: row.get(2)?,
        active: row.get(3)?,
    })
}

fn ticket_from_row(row: &Row<'_>) -> rusqlite::Result<Ticket> {
    Ok(Ticket {
        id: row.get(0)?,
        code: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        priority: parse_column(row, 4)?,
        category: parse_column(row, 5)?,
        status: parse_column(row, 6)?,
        first_reply_at: optional_millis(row, 7)?,
        response_due_at: from_millis(row.get(8)?),
        resolve_due_at: from_millis(row.get(9)?),
        closed_at: optional_millis(row, 10)?,
        feedback_rating: row.get(11)?,
        feedback_submitted_at: optional_millis(row, 12)?,
        created_at: from_millis(row.get(13)?),
        updated_at: from_millis(row.get(14)?),
    })
}
