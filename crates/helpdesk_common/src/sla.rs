//! SLA state derivation for tickets.
//!
//! Every ticket carries a response deadline (first admin reply) and a resolve
//! deadline. The snapshot is derived on read from the persisted timestamps and
//! a reference time. It is never stored.
//!
//! A closed ticket is never breached or due soon, however late it was closed.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::ticket::TicketStatus;

/// Lookahead before a deadline during which a ticket is flagged as due soon
pub const DUE_SOON_MINUTES: i64 = 15;

/// Overall SLA classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SlaState {
    Breached,
    DueSoon,
    OnTrack,
}

impl std::fmt::Display for SlaState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Breached => write!(f, "BREACHED"),
            Self::DueSoon => write!(f, "DUE_SOON"),
            Self::OnTrack => write!(f, "ON_TRACK"),
        }
    }
}

/// The ticket fields the SLA depends on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlaInput {
    pub status: TicketStatus,
    pub first_reply_at: Option<DateTime<Utc>>,
    pub response_due_at: DateTime<Utc>,
    pub resolve_due_at: DateTime<Utc>,
}

/// Derived SLA flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlaSnapshot {
    pub is_response_breached: bool,
    pub is_resolve_breached: bool,
    pub is_sla_breached: bool,
    pub is_response_due_soon: bool,
    pub is_resolve_due_soon: bool,
    pub is_sla_due_soon: bool,
    pub sla_state: SlaState,
}

/// Derive the SLA snapshot for `input` as seen at `now`
pub fn derive_sla_state(input: &SlaInput, now: DateTime<Utc>) -> SlaSnapshot {
    let open = input.status != TicketStatus::Closed;
    let awaiting_reply = open && input.first_reply_at.is_none();

    let response_left = input.response_due_at - now;
    let resolve_left = input.resolve_due_at - now;

    let is_response_breached = awaiting_reply && response_left < Duration::zero();
    let is_resolve_breached = open && resolve_left < Duration::zero();

    let is_response_due_soon = awaiting_reply && within_due_soon_window(response_left);
    let is_resolve_due_soon = open && within_due_soon_window(resolve_left);

    let is_sla_breached = is_response_breached || is_resolve_breached;
    let is_sla_due_soon = !is_sla_breached && (is_response_due_soon || is_resolve_due_soon);

    let sla_state = if is_sla_breached {
        SlaState::Breached
    } else if is_sla_due_soon {
        SlaState::DueSoon
    } else {
        SlaState::OnTrack
    };

    SlaSnapshot {
        is_response_breached,
        is_resolve_breached,
        is_sla_breached,
        is_response_due_soon,
        is_resolve_due_soon,
        is_sla_due_soon,
        sla_state,
    }
}

/// Derive against the wall clock
pub fn derive_sla_state_now(input: &SlaInput) -> SlaSnapshot {
    derive_sla_state(input, Utc::now())
}

// Closed on both ends: exactly 0 and exactly the window length count as due soon
fn within_due_soon_window(left: Duration) -> bool {
    left >= Duration::zero() && left <= Duration::minutes(DUE_SOON_MINUTES)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap()
    }

    fn open_ticket(response_in: Duration, resolve_in: Duration) -> SlaInput {
        SlaInput {
            status: TicketStatus::Open,
            first_reply_at: None,
            response_due_at: now() + response_in,
            resolve_due_at: now() + resolve_in,
        }
    }

    #[test]
    fn test_closed_ticket_never_breached() {
        let input = SlaInput {
            status: TicketStatus::Closed,
            first_reply_at: None,
            response_due_at: now() - Duration::days(366),
            resolve_due_at: now() - Duration::days(365),
        };
        let snap = derive_sla_state(&input, now());

        assert!(!snap.is_response_breached);
        assert!(!snap.is_resolve_breached);
        assert!(!snap.is_sla_due_soon);
        assert_eq!(snap.sla_state, SlaState::OnTrack);
    }

    #[test]
    fn test_closed_ticket_never_due_soon() {
        let mut input = open_ticket(Duration::minutes(5), Duration::minutes(10));
        input.status = TicketStatus::Closed;
        let snap = derive_sla_state(&input, now());

        assert!(!snap.is_response_due_soon);
        assert!(!snap.is_resolve_due_soon);
        assert_eq!(snap.sla_state, SlaState::OnTrack);
    }

    #[test]
    fn test_response_breach_one_second_late() {
        let input = open_ticket(-Duration::seconds(1), Duration::hours(3));
        let snap = derive_sla_state(&input, now());

        assert!(snap.is_response_breached);
        assert!(!snap.is_resolve_breached);
        assert!(snap.is_sla_breached);
        assert_eq!(snap.sla_state, SlaState::Breached);
    }

    #[test]
    fn test_response_due_soon() {
        let input = open_ticket(Duration::minutes(10), Duration::hours(3));
        let snap = derive_sla_state(&input, now());

        assert!(snap.is_response_due_soon);
        assert!(!snap.is_resolve_due_soon);
        assert!(snap.is_sla_due_soon);
        assert_eq!(snap.sla_state, SlaState::DueSoon);
    }

    #[test]
    fn test_reply_satisfies_response_obligation() {
        let input = SlaInput {
            status: TicketStatus::InProgress,
            first_reply_at: Some(now() - Duration::hours(1)),
            response_due_at: now() - Duration::hours(2),
            resolve_due_at: now() + Duration::hours(4),
        };
        let snap = derive_sla_state(&input, now());

        assert!(!snap.is_response_breached);
        assert!(!snap.is_response_due_soon);
        assert_eq!(snap.sla_state, SlaState::OnTrack);
    }

    #[test]
    fn test_breach_beats_due_soon() {
        let input = open_ticket(-Duration::minutes(1), Duration::minutes(5));
        let snap = derive_sla_state(&input, now());

        assert!(snap.is_response_breached);
        assert!(snap.is_resolve_due_soon);
        assert!(!snap.is_sla_due_soon);
        assert_eq!(snap.sla_state, SlaState::Breached);
    }

    #[test]
    fn test_window_boundaries_inclusive() {
        let at_zero = open_ticket(Duration::zero(), Duration::hours(3));
        let snap = derive_sla_state(&at_zero, now());
        assert!(snap.is_response_due_soon);
        assert!(!snap.is_response_breached);

        let at_edge = open_ticket(Duration::milliseconds(900_000), Duration::hours(3));
        assert!(derive_sla_state(&at_edge, now()).is_response_due_soon);

        let past_edge = open_ticket(Duration::milliseconds(900_001), Duration::hours(3));
        let snap = derive_sla_state(&past_edge, now());
        assert!(!snap.is_response_due_soon);
        assert_eq!(snap.sla_state, SlaState::OnTrack);

        let just_late = open_ticket(-Duration::milliseconds(1), Duration::hours(3));
        let snap = derive_sla_state(&just_late, now());
        assert!(snap.is_response_breached);
        assert!(!snap.is_response_due_soon);
    }

    #[test]
    fn test_resolve_breach_after_reply() {
        let input = SlaInput {
            status: TicketStatus::Waiting,
            first_reply_at: Some(now() - Duration::hours(5)),
            response_due_at: now() - Duration::hours(4),
            resolve_due_at: now() - Duration::minutes(1),
        };
        let snap = derive_sla_state(&input, now());

        assert!(!snap.is_response_breached);
        assert!(snap.is_resolve_breached);
        assert_eq!(snap.sla_state, SlaState::Breached);
    }

    #[test]
    fn test_snapshot_json_shape() {
        let input = open_ticket(Duration::minutes(10), Duration::hours(3));
        let json = serde_json::to_value(derive_sla_state(&input, now())).unwrap();

        assert_eq!(json["isResponseDueSoon"], true);
        assert_eq!(json["isSlaBreached"], false);
        assert_eq!(json["slaState"], "DUE_SOON");
    }
}
