//! Fetch gating and offline snapshots.
//!
//! - `RequestCache` remembers when each query was last fetched and answers
//!   whether a new fetch is due under the resource's TTL.
//! - `PersistentStore` mirrors fetched collections to disk as JSON so a page
//!   can render its last known data before the first response arrives.

pub mod request;
pub mod store;

pub use request::{QueryKey, QueryKeyBuilder, RequestCache};
pub use store::{storage_key, CachedData, PersistentStore};
