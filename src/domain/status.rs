//! Domain lifecycle state machine.
//!
//! Mirrors the teacher's page-state pattern: a small closed enum with a
//! DB string round-trip and an explicit adjacency check, rather than
//! allowing ad-hoc status strings to flow through the store layer.

use std::fmt;

/// Lifecycle status of a domain in the crawl coordinator.
///
/// Transitions follow spec §4.2's adjacency table exactly:
///
/// ```text
/// pending      -> active | unreachable
/// active       -> active | exhausted | blocked | unreachable
/// exhausted    -> pending | active
/// blocked      -> pending | active
/// unreachable  -> pending | active
/// ```
///
/// `blocked` and `unreachable` can only be left by a subsequent crawl
/// attempt (usually operator-triggered, e.g. `domain-reset`), never by the
/// claim query itself, which only selects `pending`/`active` rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DomainStatus {
    /// Discovered but never crawled successfully.
    Pending,
    /// Partially crawled; more URLs remain.
    Active,
    /// Crawled until nothing more to follow under policy; may be reopened.
    Exhausted,
    /// Policy refused the domain (login wall, too many auth errors, robots).
    Blocked,
    /// Transport-level failure with no successful page.
    Unreachable,
}

impl DomainStatus {
    /// Returns `true` if `self -> to` is a legal transition per §4.2.
    pub fn can_transition_to(self, to: DomainStatus) -> bool {
        use DomainStatus::*;
        matches!(
            (self, to),
            (Pending, Active)
                | (Pending, Unreachable)
                | (Active, Active)
                | (Active, Exhausted)
                | (Active, Blocked)
                | (Active, Unreachable)
                | (Exhausted, Pending)
                | (Exhausted, Active)
                | (Blocked, Pending)
                | (Blocked, Active)
                | (Unreachable, Pending)
                | (Unreachable, Active)
        )
    }

    /// A domain is visible to a claim attempt only when `pending` or
    /// `active` (§3.1's invariant); the claim/expiry check is separate.
    pub fn is_claimable(self) -> bool {
        matches!(self, DomainStatus::Pending | DomainStatus::Active)
    }

    /// `blocked` and `unreachable` require a fresh crawl attempt (usually
    /// operator-driven) to leave; the claim query never selects them.
    pub fn is_terminal(self) -> bool {
        matches!(self, DomainStatus::Blocked | DomainStatus::Unreachable)
    }

    /// Stable lowercase string used as the Postgres column representation.
    pub fn to_db_string(self) -> &'static str {
        match self {
            DomainStatus::Pending => "pending",
            DomainStatus::Active => "active",
            DomainStatus::Exhausted => "exhausted",
            DomainStatus::Blocked => "blocked",
            DomainStatus::Unreachable => "unreachable",
        }
    }

    /// Parses the Postgres column representation back into a `DomainStatus`.
    pub fn from_db_string(s: &str) -> Option<DomainStatus> {
        match s {
            "pending" => Some(DomainStatus::Pending),
            "active" => Some(DomainStatus::Active),
            "exhausted" => Some(DomainStatus::Exhausted),
            "blocked" => Some(DomainStatus::Blocked),
            "unreachable" => Some(DomainStatus::Unreachable),
            _ => None,
        }
    }

    /// All variants, in the order they appear in the state machine diagram.
    pub fn all() -> &'static [DomainStatus] {
        use DomainStatus::*;
        &[Pending, Active, Exhausted, Blocked, Unreachable]
    }
}

impl fmt::Display for DomainStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db_string())
    }
}
