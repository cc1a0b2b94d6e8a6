//! Sync session state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Coordinator state machine: `Idle -> Attempting -> {Succeeded, Failed} -> Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncPhase {
    Idle,
    Attempting,
    Succeeded,
    Failed,
}

/// How an attempt was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncTrigger {
    /// Delivered by the deferred-trigger scheduler.
    Deferred,
    /// Run in the foreground by the caller.
    Immediate,
}

impl fmt::Display for SyncTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncTrigger::Deferred => f.write_str("deferred"),
            SyncTrigger::Immediate => f.write_str("immediate"),
        }
    }
}

/// One sync attempt. Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSession {
    pub id: Uuid,
    pub trigger: SyncTrigger,
    pub phase: SyncPhase,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Items acknowledged by the remote in this attempt.
    pub synced: usize,
    pub last_error: Option<String>,
}

impl SyncSession {
    pub fn start(trigger: SyncTrigger) -> Self {
        Self {
            id: Uuid::new_v4(),
            trigger,
            phase: SyncPhase::Attempting,
            started_at: Utc::now(),
            finished_at: None,
            synced: 0,
            last_error: None,
        }
    }

    pub fn succeed(&mut self, synced: usize) {
        self.phase = SyncPhase::Succeeded;
        self.synced = synced;
        self.finished_at = Some(Utc::now());
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.phase = SyncPhase::Failed;
        self.last_error = Some(error.into());
        self.finished_at = Some(Utc::now());
    }
}

/// What a sync request led to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The remote accepted `count` items and they were cleared.
    Synced { count: usize },
    /// Nothing was queued; counts as success.
    Empty,
    /// Another attempt was in flight; this trigger was dropped.
    Coalesced,
    /// Registered with the deferred-trigger scheduler.
    Deferred,
    /// Not attempted while offline.
    Offline,
}

impl SyncOutcome {
    /// Items synced by this request, zero unless it ran to success.
    pub fn synced(&self) -> usize {
        match self {
            SyncOutcome::Synced { count } => *count,
            _ => 0,
        }
    }
}

impl fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncOutcome::Synced { count } => write!(f, "synced {} items", count),
            SyncOutcome::Empty => f.write_str("nothing to sync"),
            SyncOutcome::Coalesced => f.write_str("already syncing"),
            SyncOutcome::Deferred => f.write_str("deferred until connectivity"),
            SyncOutcome::Offline => f.write_str("offline, not attempted"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_transitions() {
        let mut session = SyncSession::start(SyncTrigger::Immediate);
        assert_eq!(session.phase, SyncPhase::Attempting);
        assert!(session.finished_at.is_none());

        session.fail("remote returned 500");
        assert_eq!(session.phase, SyncPhase::Failed);
        assert_eq!(session.last_error.as_deref(), Some("remote returned 500"));
        assert!(session.finished_at.is_some());
    }

    #[test]
    fn test_outcome_counts() {
        assert_eq!(SyncOutcome::Synced { count: 3 }.synced(), 3);
        assert_eq!(SyncOutcome::Coalesced.synced(), 0);
        assert_eq!(SyncOutcome::Empty.to_string(), "nothing to sync");
    }
}
