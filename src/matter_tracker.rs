//! Matter tracker: pure invariant checks over `MatterRecord`, invoked by
//! `store.rs` — `next_last_seen`/`last_seen_may_advance` from
//! `upsert_matter_and_appearance` on every sync, `validate_terminal_transition`
//! from `set_matter_status` on a manual lifecycle correction. The actual
//! writes live in `store.rs`'s transactions; this module is the logic that
//! SQL is required to uphold, kept separately so it can be unit-tested
//! without a database.

use chrono::{DateTime, Utc};

use crate::domain::matter::MatterStatus;

/// Whether `last_seen` is permitted to advance for a matter currently in
/// `status`. Once a matter reaches a terminal status, further appearances
/// (e.g. a bill re-listed on a later agenda in error) no longer move
/// `last_seen` forward automatically — a human correction is required.
pub fn last_seen_may_advance(status: MatterStatus) -> bool {
    !status.is_terminal()
}

/// The invariant `first_seen <= last_seen` as a checked update: returns the
/// new `last_seen` to persist, or `None` if the candidate would violate the
/// invariant (caller should log and skip the update).
pub fn next_last_seen(
    first_seen: DateTime<Utc>,
    current_last_seen: DateTime<Utc>,
    status: MatterStatus,
    candidate: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    if !last_seen_may_advance(status) {
        return None;
    }
    if candidate < first_seen {
        return None;
    }
    Some(candidate.max(current_last_seen))
}

/// A terminal status transition is only valid when paired with a vote
/// date; this is enforced here so the store never writes a terminal status
/// with `final_vote_date = NULL`.
pub fn validate_terminal_transition(status: MatterStatus, final_vote_date: Option<DateTime<Utc>>) -> bool {
    !status.is_terminal() || final_vote_date.is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn date(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn last_seen_advances_for_non_terminal_status() {
        let first = date(2025, 1, 1);
        let current = date(2025, 2, 1);
        let candidate = date(2025, 3, 1);
        assert_eq!(next_last_seen(first, current, MatterStatus::Active, candidate), Some(candidate));
    }

    #[test]
    fn last_seen_frozen_once_terminal() {
        let first = date(2025, 1, 1);
        let current = date(2025, 2, 1);
        let candidate = date(2025, 3, 1);
        assert_eq!(next_last_seen(first, current, MatterStatus::Passed, candidate), None);
    }

    #[test]
    fn last_seen_never_precedes_first_seen() {
        let first = date(2025, 2, 1);
        let current = date(2025, 2, 1);
        let candidate = date(2025, 1, 1);
        assert_eq!(next_last_seen(first, current, MatterStatus::Active, candidate), None);
    }

    #[test]
    fn terminal_transition_requires_vote_date() {
        assert!(!validate_terminal_transition(MatterStatus::Passed, None));
        assert!(validate_terminal_transition(MatterStatus::Passed, Some(date(2025, 1, 1))));
        assert!(validate_terminal_transition(MatterStatus::Active, None));
    }
}
