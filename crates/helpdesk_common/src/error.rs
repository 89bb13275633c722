//! Error types for the help desk.

use thiserror::Error;

/// Failures while parsing or producing a stored password record.
///
/// `verify_password` never surfaces these; it maps every variant to `false`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PasswordError {
    #[error("unknown password algorithm tag: {0}")]
    UnknownAlgorithm(String),

    #[error("expected 6 fields in password record, found {0}")]
    FieldCount(usize),

    #[error("invalid cost parameter {name}: {value}")]
    InvalidCost { name: &'static str, value: String },

    #[error("cost parameters exceed the memory ceiling")]
    CostTooHigh,

    #[error("invalid base64 in {0}")]
    Encoding(&'static str),

    #[error("empty {0} in password record")]
    Empty(&'static str),

    #[error("key derivation failed: {0}")]
    Derivation(String),
}

/// Domain value parse failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HelpdeskError {
    #[error("Unknown ticket status: {0}")]
    UnknownStatus(String),

    #[error("Unknown ticket priority: {0}")]
    UnknownPriority(String),

    #[error("Unknown ticket category: {0}")]
    UnknownCategory(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ticket::{TicketCategory, TicketPriority, TicketStatus};

    #[test]
    fn test_parse_errors_name_the_value() {
        assert_eq!(
            "DONE".parse::<TicketStatus>(),
            Err(HelpdeskError::UnknownStatus("DONE".to_string()))
        );
        assert_eq!(
            "URGENT".parse::<TicketPriority>().unwrap_err().to_string(),
            "Unknown ticket priority: URGENT"
        );
        assert!(matches!(
            "PRINTER".parse::<TicketCategory>(),
            Err(HelpdeskError::UnknownCategory(_))
        ));
    }
}
