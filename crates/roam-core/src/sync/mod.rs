//! Offline-first sync engine.
//!
//! Every write lands in the local database first, flagged unsynced, and
//! the app keeps working off that copy whether or not the network ever
//! comes back. Replication runs in the background: a push phase drains
//! unsynced records to the remote document store through upserts keyed by
//! record id, and a pull phase (for entities that want one) folds recent
//! remote documents back in. Uploads are at-least-once; redelivery lands
//! on the same document key, so duplicates collapse.

mod connectivity;
mod record;
mod replicator;
mod scheduler;
mod service;

pub use connectivity::ConnectivityHandle;
pub use record::{EntityKind, SyncRecord};
pub use replicator::{Replicate, Replicator, SyncGateway, SyncStore};
pub use scheduler::{RetryPolicy, SyncScheduler};
pub use service::{PendingCounts, RemoteCounts, SyncService};

/// Result of one phase (push or pull) of a sync cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseOutcome {
    /// Nothing to do
    Skipped,
    /// Phase finished and moved `records` records
    Completed { records: usize },
    /// Phase failed; local flags are untouched
    Failed { reason: String },
}

impl PhaseOutcome {
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// Records moved by this phase, zero unless it completed
    #[must_use]
    pub const fn records(&self) -> usize {
        match self {
            Self::Completed { records } => *records,
            Self::Skipped | Self::Failed { .. } => 0,
        }
    }
}

/// Result of one full sync cycle for one entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOutcome {
    pub entity: EntityKind,
    pub push: PhaseOutcome,
    /// `None` for push-only entities
    pub pull: Option<PhaseOutcome>,
}

impl SyncOutcome {
    /// True when no phase failed
    #[must_use]
    pub fn is_success(&self) -> bool {
        !self.push.is_failure() && !self.pull.as_ref().is_some_and(PhaseOutcome::is_failure)
    }
}
