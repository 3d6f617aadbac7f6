//! Page-level synchronization: the fetch / persist / mutate / invalidate
//! loop each mounted page runs.

mod context;
mod dashboard;
mod debounce;
mod loading;
mod outcome;
mod page;
pub mod reconcile;

pub use context::{SyncContext, AUTH_REQUIRED_KEY};
pub use dashboard::{DashboardOutcome, DashboardPage, DashboardState};
pub use debounce::Debouncer;
pub use loading::{LoadResult, LoadState, LoadingCoordinator};
pub use outcome::{LoadOutcome, MutationOutcome, PageStatus, RefreshCause};
pub use page::{CollectionPage, Record};
pub use reconcile::Selection;
