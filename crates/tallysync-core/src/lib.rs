//! Client-side data synchronization for the tallysync dashboard.
//!
//! The dashboard pages (summary, clients, transactions) are thin views over
//! REST collections. This crate owns everything between the view and the
//! network:
//!
//! - [`cache::RequestCache`]: per-query TTL gate that skips redundant fetches
//! - [`cache::PersistentStore`]: on-disk snapshots used to bootstrap a page
//! - [`sync::LoadingCoordinator`]: one in-flight fetch per resource, primary before secondary
//! - [`sync::reconcile`]: optimistic create/update/delete against an in-memory collection
//! - [`bus::InvalidationBus`]: "resource changed" fan-out between mounted pages
//! - [`notify::UniqueNotifier`]: deduplicated, self-dismissing status messages
//!
//! [`sync::CollectionPage`] and [`sync::DashboardPage`] wire these together
//! into the fetch / persist / mutate / invalidate loop a page runs while mounted.

pub mod api;
pub mod auth;
pub mod bus;
pub mod cache;
pub mod config;
pub mod models;
pub mod notify;
pub mod sync;

#[cfg(test)]
mod tests;

pub use api::{ApiError, ApiResponse, ErrorClass, HttpApiClient, ResourceApi};
pub use bus::{Action, InvalidationBus, InvalidationEvent, OriginId, Subscription};
pub use cache::{PersistentStore, QueryKey, RequestCache};
pub use config::SyncConfig;
pub use models::{FilterSnapshot, Identified, Pagination, ResourceCollection, ResourceKind};
pub use notify::{Notification, NotificationKind, UniqueNotifier};
pub use sync::{CollectionPage, DashboardPage, LoadingCoordinator, SyncContext};
