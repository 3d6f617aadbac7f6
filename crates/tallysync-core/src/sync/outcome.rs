use crate::api::ErrorClass;

/// What triggered a refresh. Only user-initiated refreshes announce success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshCause {
    Mount,
    User,
    Filters,
    Page,
    Invalidated,
    /// Re-read after a failed mutation or a bulk import.
    Resync,
}

impl RefreshCause {
    pub fn label(&self) -> &'static str {
        match self {
            RefreshCause::Mount => "mount",
            RefreshCause::User => "user",
            RefreshCause::Filters => "filters",
            RefreshCause::Page => "page",
            RefreshCause::Invalidated => "invalidated",
            RefreshCause::Resync => "resync",
        }
    }
}

/// Result of one refresh attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Fetched and applied `count` items.
    Fetched { count: usize },
    /// Skipped: the query was fetched within its TTL.
    Fresh,
    /// Skipped: another fetch for the resource is in flight.
    InFlight,
    Failed(ErrorClass),
    /// The page was not mounted, or unmounted before the response arrived.
    Unmounted,
}

impl LoadOutcome {
    pub fn fetched(&self) -> bool {
        matches!(self, LoadOutcome::Fetched { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationOutcome {
    /// Server accepted the change; `affected` items were touched locally.
    Applied { affected: usize },
    /// Server rejected the change; the collection was refetched.
    Failed(ErrorClass),
    Unmounted,
}

impl MutationOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, MutationOutcome::Applied { .. })
    }
}

/// What a collection page is currently showing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageStatus {
    /// Nothing fetched or restored yet.
    Empty,
    /// Showing the persisted snapshot; no fetch has completed.
    Restored,
    Ready,
    /// The last fetch failed; prior items are still shown.
    Stale(String),
    /// The session was rejected and all local data was dropped.
    AuthRequired,
}
