use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{info, warn};

use crate::api::ResourceApi;
use crate::auth::Session;
use crate::bus::InvalidationBus;
use crate::cache::{storage_key, PersistentStore};
use crate::config::SyncConfig;
use crate::models::ResourceKind;
use crate::notify::{NotificationAction, NotificationKind, NotifyOptions, UniqueNotifier};

/// Notification key shared by every page that loses its session.
pub const AUTH_REQUIRED_KEY: &str = "auth-required";

/// Services shared by every page of one signed-in session.
#[derive(Clone)]
pub struct SyncContext {
    pub api: Arc<dyn ResourceApi>,
    pub store: Arc<PersistentStore>,
    pub bus: InvalidationBus,
    pub notifier: UniqueNotifier,
    pub config: Arc<SyncConfig>,
}

impl SyncContext {
    pub fn new(api: Arc<dyn ResourceApi>, store: PersistentStore, config: SyncConfig) -> Self {
        Self {
            api,
            store: Arc::new(store),
            bus: InvalidationBus::new(),
            notifier: UniqueNotifier::new(),
            config: Arc::new(config),
        }
    }

    pub fn storage_key(&self, kind: ResourceKind) -> String {
        storage_key(&self.config.storage_prefix, kind)
    }

    pub fn ttl(&self, kind: ResourceKind) -> Duration {
        self.config.ttl(kind)
    }

    /// Drop every persisted snapshot. Failures are logged, never surfaced.
    pub fn clear_user_data(&self) {
        if let Err(e) = self.store.clear_all() {
            warn!(error = %e, "Failed to clear persisted snapshots");
        }
    }

    /// The server rejected the session: drop local data and ask for a login.
    pub fn handle_auth_lost(&self) {
        warn!("Session rejected by server, clearing local data");
        self.clear_user_data();
        self.notifier.notify_with(
            AUTH_REQUIRED_KEY,
            NotificationKind::Error,
            "Your session has expired. Please log in again.",
            NotifyOptions::persistent().with_action(NotificationAction::Login),
        );
    }

    /// Sign out: forget the session, the snapshots and any live notifications.
    pub fn logout(&self, session: &mut Session) -> Result<()> {
        session.clear()?;
        self.clear_user_data();
        self.notifier.dismiss_all();
        info!("Logged out");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ApiError, ApiResponse};
    use crate::auth::SessionData;
    use async_trait::async_trait;
    use serde_json::Value;
    use tempfile::TempDir;

    struct Offline;

    #[async_trait]
    impl ResourceApi for Offline {
        async fn get(&self, _: &str, _: &[(String, String)]) -> Result<ApiResponse, ApiError> {
            Err(ApiError::Transport("offline".into()))
        }
        async fn post(&self, _: &str, _: &Value) -> Result<ApiResponse, ApiError> {
            Err(ApiError::Transport("offline".into()))
        }
        async fn put(&self, _: &str, _: &Value) -> Result<ApiResponse, ApiError> {
            Err(ApiError::Transport("offline".into()))
        }
        async fn delete(&self, _: &str) -> Result<ApiResponse, ApiError> {
            Err(ApiError::Transport("offline".into()))
        }
    }

    fn context(dir: &TempDir) -> SyncContext {
        let store = PersistentStore::new(dir.path().join("cache")).unwrap();
        SyncContext::new(Arc::new(Offline), store, SyncConfig::default())
    }

    #[tokio::test]
    async fn test_auth_lost_clears_snapshots_and_pins_login_prompt() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);
        let key = ctx.storage_key(ResourceKind::Clients);
        ctx.store.save(&key, &[1, 2, 3]).unwrap();

        ctx.handle_auth_lost();

        assert!(ctx.store.load::<u32>(&key).is_empty());
        let prompt = ctx.notifier.get(AUTH_REQUIRED_KEY).unwrap();
        assert!(prompt.persistent);
        assert_eq!(prompt.action, Some(NotificationAction::Login));
    }

    #[tokio::test]
    async fn test_logout_clears_session_and_notifications() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);
        let mut session = Session::new(dir.path().join("session"));
        session.update(SessionData::new("token", "user-1"));
        session.save().unwrap();
        ctx.notifier.notify("clients-load", NotificationKind::Error, "offline");

        ctx.logout(&mut session).unwrap();

        assert!(!session.is_authenticated());
        assert!(ctx.notifier.live().is_empty());
    }
}
