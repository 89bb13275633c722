//! Help desk common library - shared types and logic for helpdeskd.

pub mod admin;
pub mod config;
pub mod error;
pub mod password;
pub mod sla;
pub mod ticket;

pub use admin::{AdminSummary, AdminUser, AdminValidationError, NewAdmin, PresenceEvent, ADMIN_ROLE};
pub use config::HelpdeskConfig;
pub use error::{HelpdeskError, PasswordError};
pub use password::{
    hash_password, hash_password_with_cost, is_password_hashed, verify_password, ScryptCost,
    StoredPassword,
};
pub use sla::{derive_sla_state, derive_sla_state_now, SlaInput, SlaSnapshot, SlaState};
pub use ticket::{
    NewTicket, SlaPolicy, Ticket, TicketCategory, TicketMessage, TicketPriority, TicketStatus,
    TicketView,
};

/// Crate version, reported by the health endpoint
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
