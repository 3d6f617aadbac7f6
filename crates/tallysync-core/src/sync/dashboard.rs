use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use chrono::Utc;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use super::context::SyncContext;
use super::loading::LoadingCoordinator;
use super::outcome::{LoadOutcome, RefreshCause};
use crate::api::{ApiError, ErrorClass};
use crate::bus::{InvalidationEvent, OriginId, Subscription};
use crate::cache::{QueryKey, RequestCache};
use crate::models::{DashboardAnalytics, DashboardSummary, ResourceKind};
use crate::notify::{NotificationAction, NotificationKind, NotifyOptions};

const SUMMARY_KEY: &str = "dashboard-summary";
const ANALYTICS_KEY: &str = "dashboard-analytics";
const REFRESH_KEY: &str = "dashboard-refresh";

/// What the dashboard currently shows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DashboardState {
    pub summary: Option<DashboardSummary>,
    pub analytics: Option<DashboardAnalytics>,
    pub summary_error: Option<String>,
    pub analytics_error: Option<String>,
    pub auth_required: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DashboardOutcome {
    pub summary: LoadOutcome,
    pub analytics: LoadOutcome,
}

impl DashboardOutcome {
    fn both(outcome: LoadOutcome) -> Self {
        Self {
            summary: outcome.clone(),
            analytics: outcome,
        }
    }
}

/// At most one refresh runs; requests arriving meanwhile collapse into
/// `rerun`, which the running refresh picks up when it ends.
#[derive(Default)]
struct RefreshSlot {
    running: bool,
    rerun: Option<(bool, RefreshCause)>,
}

struct DashboardInner {
    origin: OriginId,
    ctx: SyncContext,
    cache: RequestCache,
    loading: LoadingCoordinator,
    state: Mutex<DashboardState>,
    refresh: Mutex<RefreshSlot>,
    mounted: AtomicBool,
    subscription: Mutex<Option<Subscription>>,
}

/// Frees the refresh slot if the running refresh is dropped.
struct RefreshClaim<'a> {
    inner: &'a DashboardInner,
    armed: bool,
}

impl Drop for RefreshClaim<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.inner.refresh().running = false;
        }
    }
}

impl DashboardInner {
    fn state(&self) -> MutexGuard<'_, DashboardState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn refresh(&self) -> MutexGuard<'_, RefreshSlot> {
        self.refresh.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_mounted(&self) -> bool {
        self.mounted.load(Ordering::SeqCst)
    }
}

/// Summary figures plus analytics charts.
///
/// The summary is primary: it is fetched first and rendered on its own.
/// Analytics are fetched after the summary load has ended, whatever its
/// outcome, and a failure there only produces a warning. Both are cached
/// per calendar day (UTC) and go stale on any transactions invalidation.
#[derive(Clone)]
pub struct DashboardPage {
    inner: Arc<DashboardInner>,
}

impl DashboardPage {
    pub fn new(ctx: SyncContext) -> Self {
        let inner = DashboardInner {
            origin: OriginId::new(),
            cache: RequestCache::new(ctx.config.max_cache_entries),
            loading: LoadingCoordinator::new(),
            state: Mutex::new(DashboardState::default()),
            refresh: Mutex::new(RefreshSlot::default()),
            mounted: AtomicBool::new(false),
            subscription: Mutex::new(None),
            ctx,
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    pub async fn mount(&self) -> DashboardOutcome {
        if !self.inner.mounted.swap(true, Ordering::SeqCst) {
            self.restore_snapshot();
            self.listen();
        }
        self.refresh_with(false, RefreshCause::Mount).await
    }

    pub fn unmount(&self) {
        if !self.inner.mounted.swap(false, Ordering::SeqCst) {
            return;
        }
        let subscription = self
            .inner
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        drop(subscription);
        debug!("Dashboard unmounted");
    }

    fn restore_snapshot(&self) {
        let ctx = &self.inner.ctx;
        let summary = ctx
            .store
            .load::<DashboardSummary>(&ctx.storage_key(ResourceKind::DashboardSummary))
            .into_iter()
            .next();
        let analytics = ctx
            .store
            .load::<DashboardAnalytics>(&ctx.storage_key(ResourceKind::DashboardAnalytics))
            .into_iter()
            .next();

        let mut state = self.inner.state();
        if state.summary.is_none() {
            state.summary = summary;
        }
        if state.analytics.is_none() {
            state.analytics = analytics;
        }
    }

    fn listen(&self) {
        let weak: Weak<DashboardInner> = Arc::downgrade(&self.inner);
        let origin = self.inner.origin.clone();
        let topic = ResourceKind::DashboardSummary.topic();

        let subscription = self.inner.ctx.bus.subscribe(topic, move |event: &InvalidationEvent| {
            if event.should_skip(&origin) {
                return;
            }
            let Some(inner) = weak.upgrade() else {
                return;
            };
            if !inner.is_mounted() {
                return;
            }
            let Ok(runtime) = tokio::runtime::Handle::try_current() else {
                warn!("Invalidation outside a runtime, dashboard refetch skipped");
                return;
            };
            inner.cache.clear();
            debug!(action = event.action.label(), from = %event.origin_id, "Dashboard invalidated");
            let page = DashboardPage { inner };
            runtime.spawn(async move {
                page.refresh_with(true, RefreshCause::Invalidated).await;
            });
        });

        *self
            .inner
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(subscription);
    }

    pub async fn refresh(&self) -> DashboardOutcome {
        self.refresh_with(true, RefreshCause::User).await
    }

    /// Refresh summary then analytics. A call made while another refresh
    /// is running returns `InFlight` for both and is run, forced if any
    /// queued call was, once the running one finishes.
    pub async fn refresh_with(&self, force: bool, cause: RefreshCause) -> DashboardOutcome {
        let inner = &self.inner;
        if !inner.is_mounted() {
            return DashboardOutcome::both(LoadOutcome::Unmounted);
        }
        {
            let mut slot = inner.refresh();
            if slot.running {
                let already_forced = slot.rerun.map(|(f, _)| f).unwrap_or(false);
                slot.rerun = Some((already_forced || force, cause));
                debug!(cause = cause.label(), "Dashboard refresh in flight, queued");
                return DashboardOutcome::both(LoadOutcome::InFlight);
            }
            slot.running = true;
        }
        let mut claim = RefreshClaim {
            inner: &**inner,
            armed: true,
        };

        let mut force = force;
        let mut cause = cause;
        loop {
            let outcome = self.refresh_once(force, cause).await;
            let rerun = {
                let mut slot = inner.refresh();
                let rerun = slot.rerun.take();
                if rerun.is_none() {
                    slot.running = false;
                    claim.armed = false;
                }
                rerun
            };
            match rerun {
                Some((next_force, next_cause)) => {
                    debug!(cause = next_cause.label(), "Running deferred dashboard refresh");
                    force = next_force;
                    cause = next_cause;
                }
                None => return outcome,
            }
        }
    }

    async fn refresh_once(&self, force: bool, cause: RefreshCause) -> DashboardOutcome {
        let inner = &self.inner;
        if !inner.is_mounted() {
            return DashboardOutcome::both(LoadOutcome::Unmounted);
        }

        let day = Utc::now().date_naive().to_string();
        let summary_key = QueryKey::builder(ResourceKind::DashboardSummary.name())
            .bucket(day.as_str())
            .build();
        let analytics_key = QueryKey::builder(ResourceKind::DashboardAnalytics.name())
            .bucket(day.as_str())
            .build();

        // Each key is claimed when its own load starts.
        let primary = async {
            let ttl = inner.ctx.ttl(ResourceKind::DashboardSummary);
            if !inner.cache.should_fetch(&summary_key, ttl, force) {
                return Ok(LoadOutcome::Fresh);
            }
            match self.fetch::<DashboardSummary>(ResourceKind::DashboardSummary).await {
                Ok(summary) => Ok(self.apply_summary(&summary_key, summary, cause)),
                Err(e) => Err(self.summary_failed(&summary_key, e)),
            }
        };

        let secondary = async {
            if inner.state().auth_required {
                return Err(ApiError::Unauthorized);
            }
            let ttl = inner.ctx.ttl(ResourceKind::DashboardAnalytics);
            if !inner.cache.should_fetch(&analytics_key, ttl, force) {
                return Ok(LoadOutcome::Fresh);
            }
            match self.fetch::<DashboardAnalytics>(ResourceKind::DashboardAnalytics).await {
                Ok(analytics) => Ok(self.apply_analytics(&analytics_key, analytics)),
                Err(e) => Err(self.analytics_failed(&analytics_key, e)),
            }
        };

        let (summary, analytics) = inner
            .loading
            .run_sequenced(
                (ResourceKind::DashboardSummary.name(), primary),
                (ResourceKind::DashboardAnalytics.name(), secondary),
            )
            .await;

        let outcome = DashboardOutcome {
            summary: match summary {
                None => LoadOutcome::InFlight,
                Some(Ok(outcome)) => outcome,
                Some(Err(e)) => LoadOutcome::Failed(e.class()),
            },
            analytics: match analytics {
                None => LoadOutcome::InFlight,
                Some(Ok(outcome)) => outcome,
                Some(Err(e)) if e.is_unauthorized() => LoadOutcome::Failed(ErrorClass::Auth),
                Some(Err(_)) => LoadOutcome::Failed(ErrorClass::Secondary),
            },
        };

        if cause == RefreshCause::User && outcome.summary.fetched() {
            inner
                .ctx
                .notifier
                .notify(REFRESH_KEY, NotificationKind::Success, "Dashboard refreshed");
        }
        outcome
    }

    async fn fetch<D: DeserializeOwned>(&self, kind: ResourceKind) -> Result<D, ApiError> {
        let response = self.inner.ctx.api.get(kind.path(), &[]).await?;
        response.json::<D>()
    }

    fn apply_summary(&self, key: &QueryKey, summary: DashboardSummary, cause: RefreshCause) -> LoadOutcome {
        let inner = &self.inner;
        if !inner.is_mounted() {
            return LoadOutcome::Unmounted;
        }
        inner.cache.record_fetch(key);
        {
            let mut state = inner.state();
            state.summary = Some(summary.clone());
            state.summary_error = None;
        }
        let storage_key = inner.ctx.storage_key(ResourceKind::DashboardSummary);
        if let Err(e) = inner.ctx.store.save(&storage_key, &[summary]) {
            warn!(error = %e, "Failed to save dashboard summary");
        }
        inner.ctx.notifier.dismiss(SUMMARY_KEY);
        info!(cause = cause.label(), "Dashboard summary loaded");
        LoadOutcome::Fetched { count: 1 }
    }

    fn apply_analytics(&self, key: &QueryKey, analytics: DashboardAnalytics) -> LoadOutcome {
        let inner = &self.inner;
        if !inner.is_mounted() {
            return LoadOutcome::Unmounted;
        }
        inner.cache.record_fetch(key);
        {
            let mut state = inner.state();
            state.analytics = Some(analytics.clone());
            state.analytics_error = None;
        }
        let storage_key = inner.ctx.storage_key(ResourceKind::DashboardAnalytics);
        if let Err(e) = inner.ctx.store.save(&storage_key, &[analytics]) {
            warn!(error = %e, "Failed to save dashboard analytics");
        }
        inner.ctx.notifier.dismiss(ANALYTICS_KEY);
        LoadOutcome::Fetched { count: 1 }
    }

    fn summary_failed(&self, key: &QueryKey, error: ApiError) -> ApiError {
        let inner = &self.inner;
        inner.cache.forget(key);
        if !inner.is_mounted() {
            return error;
        }
        if error.is_unauthorized() {
            self.auth_lost();
            return error;
        }

        warn!(error = %error, "Dashboard summary failed");
        inner.state().summary_error = Some(error.to_string());
        inner.ctx.notifier.notify_with(
            SUMMARY_KEY,
            NotificationKind::Error,
            format!("Failed to load dashboard: {}", error),
            NotifyOptions::default().with_action(NotificationAction::Retry),
        );
        error
    }

    /// Analytics are enrichment: a failure leaves the summary alone and is
    /// reported as a warning.
    fn analytics_failed(&self, key: &QueryKey, error: ApiError) -> ApiError {
        let inner = &self.inner;
        inner.cache.forget(key);
        if !inner.is_mounted() {
            return error;
        }
        if error.is_unauthorized() {
            self.auth_lost();
            return error;
        }

        warn!(error = %error, "Dashboard analytics failed");
        inner.state().analytics_error = Some(error.to_string());
        inner.ctx.notifier.notify(
            ANALYTICS_KEY,
            NotificationKind::Warning,
            format!("Analytics unavailable: {}", error),
        );
        error
    }

    fn auth_lost(&self) {
        {
            let mut state = self.inner.state();
            *state = DashboardState {
                auth_required: true,
                ..DashboardState::default()
            };
        }
        self.inner.cache.clear();
        self.inner.ctx.handle_auth_lost();
    }

    pub fn state(&self) -> DashboardState {
        self.inner.state().clone()
    }

    pub fn summary(&self) -> Option<DashboardSummary> {
        self.inner.state().summary.clone()
    }

    pub fn analytics(&self) -> Option<DashboardAnalytics> {
        self.inner.state().analytics.clone()
    }

    pub fn origin(&self) -> &OriginId {
        &self.inner.origin
    }

    pub fn is_mounted(&self) -> bool {
        self.inner.is_mounted()
    }
}
