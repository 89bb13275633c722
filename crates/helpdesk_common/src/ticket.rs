//! Ticket types for the help desk workflow.
//!
//! An end user files a ticket, admins reply through ticket messages, and the
//! ticket is eventually closed. Deadlines come from the SLA policy for the
//! ticket's priority at creation time.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::HelpdeskError;
use crate::sla::{derive_sla_state, SlaInput, SlaSnapshot};

/// Prefix for human-readable ticket codes (TIC-0001)
pub const TICKET_CODE_PREFIX: &str = "TIC";

/// Sender name that counts as an admin reply for the response SLA
pub const ADMIN_SENDER: &str = "admin";

/// Lowest and highest feedback rating accepted on a closed ticket
pub const FEEDBACK_RATING_RANGE: std::ops::RangeInclusive<u8> = 1..=5;

/// Ticket status. Only `Closed` ends the SLA clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketStatus {
    #[default]
    Open,
    InProgress,
    Waiting,
    Closed,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::InProgress => "IN_PROGRESS",
            Self::Waiting => "WAITING",
            Self::Closed => "CLOSED",
        }
    }
}

impl std::fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TicketStatus {
    type Err = HelpdeskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "OPEN" => Ok(Self::Open),
            "IN_PROGRESS" => Ok(Self::InProgress),
            "WAITING" => Ok(Self::Waiting),
            "CLOSED" => Ok(Self::Closed),
            _ => Err(HelpdeskError::UnknownStatus(s.to_string())),
        }
    }
}

/// Ticket priority, which selects the SLA policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketPriority {
    Low,
    #[default]
    Medium,
    High,
}

impl TicketPriority {
    pub const ALL: [TicketPriority; 3] = [Self::Low, Self::Medium, Self::High];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
        }
    }
}

impl std::fmt::Display for TicketPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TicketPriority {
    type Err = HelpdeskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LOW" => Ok(Self::Low),
            "MEDIUM" => Ok(Self::Medium),
            "HIGH" => Ok(Self::High),
            _ => Err(HelpdeskError::UnknownPriority(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketCategory {
    Hardware,
    Software,
    Network,
    Account,
    Security,
    #[default]
    Other,
}

impl TicketCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hardware => "HARDWARE",
            Self::Software => "SOFTWARE",
            Self::Network => "NETWORK",
            Self::Account => "ACCOUNT",
            Self::Security => "SECURITY",
            Self::Other => "OTHER",
        }
    }
}

impl std::fmt::Display for TicketCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TicketCategory {
    type Err = HelpdeskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "HARDWARE" => Ok(Self::Hardware),
            "SOFTWARE" => Ok(Self::Software),
            "NETWORK" => Ok(Self::Network),
            "ACCOUNT" => Ok(Self::Account),
            "SECURITY" => Ok(Self::Security),
            "OTHER" => Ok(Self::Other),
            _ => Err(HelpdeskError::UnknownCategory(s.to_string())),
        }
    }
}

/// Response and resolve targets for one priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlaPolicy {
    pub priority: TicketPriority,
    pub response_minutes: i64,
    pub resolve_minutes: i64,
    pub active: bool,
}

impl SlaPolicy {
    /// Built-in targets, used for seeding and when no active policy exists
    pub fn default_for(priority: TicketPriority) -> Self {
        let (response_minutes, resolve_minutes) = match priority {
            TicketPriority::Low => (240, 1440),
            TicketPriority::Medium => (120, 720),
            TicketPriority::High => (30, 240),
        };
        Self {
            priority,
            response_minutes,
            resolve_minutes,
            active: true,
        }
    }

    /// Response and resolve deadlines for a ticket opened at `opened_at`
    pub fn deadlines(&self, opened_at: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        (
            opened_at + Duration::minutes(self.response_minutes),
            opened_at + Duration::minutes(self.resolve_minutes),
        )
    }
}

/// A persisted ticket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    pub id: String,
    pub code: String,
    pub title: String,
    pub description: String,
    pub priority: TicketPriority,
    pub category: TicketCategory,
    pub status: TicketStatus,
    pub first_reply_at: Option<DateTime<Utc>>,
    pub response_due_at: DateTime<Utc>,
    pub resolve_due_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub feedback_rating: Option<u8>,
    pub feedback_submitted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Ticket {
    pub fn sla_input(&self) -> SlaInput {
        SlaInput {
            status: self.status,
            first_reply_at: self.first_reply_at,
            response_due_at: self.response_due_at,
            resolve_due_at: self.resolve_due_at,
        }
    }

    pub fn sla(&self, now: DateTime<Utc>) -> SlaSnapshot {
        derive_sla_state(&self.sla_input(), now)
    }

    pub fn is_closed(&self) -> bool {
        self.status == TicketStatus::Closed
    }
}

/// Format the human-readable code for the nth ticket
pub fn ticket_code(sequence: u64) -> String {
    format!("{}-{:04}", TICKET_CODE_PREFIX, sequence)
}

/// A new ticket as submitted by an end user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTicket {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub priority: TicketPriority,
    #[serde(default)]
    pub category: TicketCategory,
}

/// One message in a ticket's conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketMessage {
    pub id: String,
    pub ticket_id: String,
    pub sender: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl TicketMessage {
    pub fn is_admin_reply(&self) -> bool {
        self.sender == ADMIN_SENDER
    }
}

/// Ticket as returned to clients, with its SLA snapshot derived at read time
#[derive(Debug, Clone, Serialize)]
pub struct TicketView {
    #[serde(flatten)]
    pub ticket: Ticket,
    #[serde(flatten)]
    pub sla: SlaSnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<TicketMessage>>,
}

impl TicketView {
    pub fn new(ticket: Ticket, now: DateTime<Utc>) -> Self {
        let sla = ticket.sla(now);
        Self {
            ticket,
            sla,
            messages: None,
        }
    }

    pub fn with_messages(mut self, messages: Vec<TicketMessage>) -> Self {
        self.messages = Some(messages);
        self
    }
}
