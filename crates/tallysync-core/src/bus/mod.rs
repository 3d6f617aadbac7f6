//! "Resource changed" notifications between independently mounted pages.
//!
//! The bus is an explicit object, constructed once (see
//! [`crate::sync::SyncContext`]) and handed to every page, rather than an
//! ambient global. Events carry the publishing page's [`OriginId`]; each
//! subscriber decides for itself whether an event is its own echo.

mod event;
mod invalidation;

pub use event::{Action, InvalidationEvent, OriginId};
pub use invalidation::{Handler, InvalidationBus, Subscription};
