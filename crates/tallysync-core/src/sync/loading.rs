use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Idle,
    Loading,
}

/// How the last load of a resource ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadResult {
    Succeeded,
    Failed(String),
}

impl LoadResult {
    pub fn is_success(&self) -> bool {
        matches!(self, LoadResult::Succeeded)
    }
}

#[derive(Debug, Default)]
struct ResourceLoad {
    loading: bool,
    last_result: Option<LoadResult>,
}

/// Per-resource gate allowing at most one in-flight load.
///
/// `begin_load` is the mutual exclusion point: a mount-time fetch and a
/// user refresh racing in the same tick both call it, and only one wins.
#[derive(Debug, Default)]
pub struct LoadingCoordinator {
    resources: Mutex<HashMap<String, ResourceLoad>>,
}

/// Ends a load that was dropped before completing, so a cancelled fetch
/// cannot leave its resource stuck in `Loading`.
struct LoadGuard<'a> {
    coordinator: &'a LoadingCoordinator,
    resource: &'a str,
    finished: bool,
}

impl Drop for LoadGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.coordinator
                .end_load(self.resource, LoadResult::Failed("cancelled".to_string()));
        }
    }
}

impl LoadingCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    fn resources(&self) -> MutexGuard<'_, HashMap<String, ResourceLoad>> {
        self.resources.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Move `resource` to loading. Returns false, changing nothing, if it
    /// is already loading.
    pub fn begin_load(&self, resource: &str) -> bool {
        let mut resources = self.resources();
        let entry = resources.entry(resource.to_string()).or_default();
        if entry.loading {
            debug!(resource = resource, "Load already in flight");
            return false;
        }
        entry.loading = true;
        true
    }

    /// Return `resource` to idle whatever the outcome, and hand the
    /// outcome back for branching.
    pub fn end_load(&self, resource: &str, result: LoadResult) -> LoadResult {
        let mut resources = self.resources();
        let entry = resources.entry(resource.to_string()).or_default();
        entry.loading = false;
        entry.last_result = Some(result.clone());
        result
    }

    pub fn state(&self, resource: &str) -> LoadState {
        match self.resources().get(resource) {
            Some(entry) if entry.loading => LoadState::Loading,
            _ => LoadState::Idle,
        }
    }

    pub fn is_loading(&self, resource: &str) -> bool {
        self.state(resource) == LoadState::Loading
    }

    pub fn last_result(&self, resource: &str) -> Option<LoadResult> {
        self.resources().get(resource).and_then(|e| e.last_result.clone())
    }

    /// Run `load` between `begin_load` and `end_load`.
    ///
    /// Returns `None` without polling `load` when `resource` is already
    /// loading.
    pub async fn run<T, E, F>(&self, resource: &str, load: F) -> Option<Result<T, E>>
    where
        F: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        if !self.begin_load(resource) {
            return None;
        }
        let mut guard = LoadGuard {
            coordinator: self,
            resource,
            finished: false,
        };

        let outcome = load.await;
        let result = match &outcome {
            Ok(_) => LoadResult::Succeeded,
            Err(e) => LoadResult::Failed(e.to_string()),
        };
        guard.finished = true;
        self.end_load(resource, result);
        Some(outcome)
    }

    /// Run a primary load, then a secondary one.
    ///
    /// The secondary future is not polled until the primary load has been
    /// ended, so primary content can render first, and it runs whether or
    /// not the primary load succeeded.
    pub async fn run_sequenced<A, B, E, PF, SF>(
        &self,
        primary: (&str, PF),
        secondary: (&str, SF),
    ) -> (Option<Result<A, E>>, Option<Result<B, E>>)
    where
        PF: Future<Output = Result<A, E>>,
        SF: Future<Output = Result<B, E>>,
        E: fmt::Display,
    {
        let (primary_name, primary_load) = primary;
        let (secondary_name, secondary_load) = secondary;

        let first = self.run(primary_name, primary_load).await;
        let second = self.run(secondary_name, secondary_load).await;
        (first, second)
    }
}
