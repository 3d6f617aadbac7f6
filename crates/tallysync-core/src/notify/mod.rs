//! User-facing status messages.
//!
//! `UniqueNotifier` keeps at most one live notification per logical key
//! ("dashboard-refresh", "auth-required", ...). Notifying an existing key
//! replaces it and restarts its dismiss timer instead of stacking a second
//! toast. Front ends render from `live()` or from the `subscribe()` stream.

mod notifier;

pub use notifier::{
    progress_at, DismissReason, Notification, NotificationAction, NotificationKind, NotifierEvent,
    NotifyOptions, UniqueNotifier, PROGRESS_POLL_INTERVAL,
};
