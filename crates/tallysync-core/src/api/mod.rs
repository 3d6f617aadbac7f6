//! REST API client module.
//!
//! The data layer only needs three verbs from the server: `get` for list and
//! summary endpoints, `post` for creates, updates and bulk operations, and
//! `delete`. `ResourceApi` is that narrow seam; `HttpApiClient` implements
//! it over reqwest with bearer token authentication.

pub mod client;
pub mod error;
pub mod response;

pub use client::{HttpApiClient, ResourceApi};
pub use error::{ApiError, ErrorClass};
pub use response::{ApiResponse, ListEnvelope, MutationEnvelope, PageInfo};
