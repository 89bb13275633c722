//! Property checks for password verification and SLA derivation.
//!
//! Exercises the public API only, the way helpdeskd uses it.

use chrono::{DateTime, Duration, TimeZone, Utc};
use helpdesk_common::password::hash_password_with_cost;
use helpdesk_common::{
    derive_sla_state, is_password_hashed, verify_password, ScryptCost, SlaInput, SlaState,
    TicketStatus,
};

const FAST: ScryptCost = ScryptCost {
    log_n: 4,
    r: 8,
    p: 1,
};

fn reference_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
}

#[test]
fn test_hash_verifies_for_varied_secrets() {
    let secrets = ["a", "pässwörd", "with$dollar", "  spaced  ", "0123456789abcdef0123456789"];

    for secret in secrets {
        let stored = hash_password_with_cost(secret, FAST).unwrap();
        assert!(is_password_hashed(&stored));
        assert!(verify_password(secret, &stored), "round trip failed for {secret:?}");
    }
}

#[test]
fn test_distinct_secrets_do_not_cross_verify() {
    let secrets = ["alpha", "beta", "gamma", "alpha "];

    for (i, a) in secrets.iter().enumerate() {
        let stored = hash_password_with_cost(a, FAST).unwrap();
        for (j, b) in secrets.iter().enumerate() {
            assert_eq!(verify_password(b, &stored), i == j, "{a:?} vs {b:?}");
        }
    }
}

#[test]
fn test_untagged_records_use_plain_equality() {
    let records = ["", "hunter2", "scrypt", "SCRYPT$16384$8$1$a$b", "$scrypt$"];
    let candidates = ["", "hunter2", "scrypt", "other"];

    for record in records {
        for candidate in candidates {
            assert_eq!(verify_password(candidate, record), candidate == record);
        }
    }
}

#[test]
fn test_verify_never_panics_on_garbage() {
    let garbage = [
        "scrypt$",
        "scrypt$$",
        "scrypt$x$y$z$w$v",
        "scrypt$NaN$8$1$AAAA$AAAA",
        "scrypt$Infinity$8$1$AAAA$AAAA",
        "scrypt$16384$8$1$====$====",
        "scrypt$18446744073709551616$8$1$AAAA$AAAA",
        "scrypt$16384$4294967296$1$AAAA$AAAA",
        "scrypt$$$$$$$$$$$$",
    ];

    for record in garbage {
        assert!(!verify_password("anything", record), "accepted {record}");
    }
}

#[test]
fn test_sla_spec_scenarios() {
    let now = reference_now();

    let closed = SlaInput {
        status: TicketStatus::Closed,
        first_reply_at: None,
        response_due_at: now - Duration::days(365),
        resolve_due_at: now - Duration::days(365),
    };
    let snap = derive_sla_state(&closed, now);
    assert!(!snap.is_resolve_breached);
    assert_eq!(snap.sla_state, SlaState::OnTrack);

    let late_reply = SlaInput {
        status: TicketStatus::Open,
        first_reply_at: None,
        response_due_at: now - Duration::seconds(1),
        resolve_due_at: now + Duration::hours(3),
    };
    let snap = derive_sla_state(&late_reply, now);
    assert!(snap.is_response_breached);
    assert_eq!(snap.sla_state, SlaState::Breached);

    let due_soon = SlaInput {
        status: TicketStatus::Open,
        first_reply_at: None,
        response_due_at: now + Duration::minutes(10),
        resolve_due_at: now + Duration::hours(3),
    };
    let snap = derive_sla_state(&due_soon, now);
    assert!(snap.is_response_due_soon);
    assert_eq!(snap.sla_state, SlaState::DueSoon);

    let replied = SlaInput {
        status: TicketStatus::InProgress,
        first_reply_at: Some(now - Duration::hours(1)),
        response_due_at: now - Duration::hours(2),
        resolve_due_at: now + Duration::hours(3),
    };
    assert!(!derive_sla_state(&replied, now).is_response_breached);

    let mixed = SlaInput {
        status: TicketStatus::Open,
        first_reply_at: None,
        response_due_at: now - Duration::minutes(3),
        resolve_due_at: now + Duration::minutes(7),
    };
    let snap = derive_sla_state(&mixed, now);
    assert!(snap.is_resolve_due_soon);
    assert_eq!(snap.sla_state, SlaState::Breached);
}

#[test]
fn test_closed_flags_stay_false_across_offsets() {
    let now = reference_now();

    for minutes in [-100_000i64, -60, -15, -1, 0, 1, 14, 15, 16, 600] {
        let input = SlaInput {
            status: TicketStatus::Closed,
            first_reply_at: None,
            response_due_at: now + Duration::minutes(minutes),
            resolve_due_at: now + Duration::minutes(minutes),
        };
        let snap = derive_sla_state(&input, now);

        assert!(!snap.is_sla_breached && !snap.is_sla_due_soon);
        assert!(!snap.is_response_due_soon && !snap.is_resolve_due_soon);
    }
}

#[test]
fn test_sla_state_is_consistent_with_flags() {
    let now = reference_now();
    let statuses = [TicketStatus::Open, TicketStatus::InProgress, TicketStatus::Waiting];

    for status in statuses {
        for response in [-30i64, -1, 0, 10, 15, 16, 120] {
            for resolve in [-30i64, 0, 5, 15, 240] {
                for replied in [false, true] {
                    let input = SlaInput {
                        status,
                        first_reply_at: replied.then(|| now - Duration::minutes(1)),
                        response_due_at: now + Duration::minutes(response),
                        resolve_due_at: now + Duration::minutes(resolve),
                    };
                    let snap = derive_sla_state(&input, now);

                    let expected = if snap.is_response_breached || snap.is_resolve_breached {
                        SlaState::Breached
                    } else if snap.is_response_due_soon || snap.is_resolve_due_soon {
                        SlaState::DueSoon
                    } else {
                        SlaState::OnTrack
                    };
                    assert_eq!(snap.sla_state, expected);
                    assert!(!(snap.is_sla_breached && snap.is_sla_due_soon));
                    if replied {
                        assert!(!snap.is_response_breached && !snap.is_response_due_soon);
                    }
                }
            }
        }
    }
}
