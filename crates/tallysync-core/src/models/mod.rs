//! Data models for the dashboard's REST resources.
//!
//! This module contains:
//!
//! - `ResourceCollection`, `Pagination`, `FilterSnapshot`: the in-memory shape of a fetched list
//! - `ResourceKind`: the resources the data layer knows how to fetch and cache
//! - `Client`, `Transaction`: list entities keyed by their primary identifier
//! - `DashboardSummary`, `DashboardAnalytics`: primary and secondary dashboard payloads

pub mod client;
pub mod collection;
pub mod dashboard;
pub mod transaction;

pub use client::Client;
pub use collection::{FilterSnapshot, Identified, Pagination, ResourceCollection, ResourceKind};
pub use dashboard::{ClientTotal, DashboardAnalytics, DashboardSummary, MonthlyTotal};
pub use transaction::{Transaction, TransactionKind};
