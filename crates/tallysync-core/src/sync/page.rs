//! A mounted list page: clients or transactions.
//!
//! Lifecycle of a `CollectionPage`:
//!
//! 1. `mount` restores the persisted snapshot so something renders at once,
//!    subscribes to the resource's invalidation topic and issues the first
//!    fetch through the request cache.
//! 2. Filter edits are debounced; page changes and user refreshes are not.
//! 3. Mutations edit the collection optimistically, call the API, persist
//!    and publish an invalidation that every other mounted page reacts to.
//! 4. `unmount` drops the subscription and any pending debounced fetch, and
//!    responses that arrive afterwards are discarded.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::context::SyncContext;
use super::debounce::Debouncer;
use super::loading::LoadingCoordinator;
use super::outcome::{LoadOutcome, MutationOutcome, PageStatus, RefreshCause};
use super::reconcile::{self, Selection};
use crate::api::{ApiError, ErrorClass, ListEnvelope};
use crate::bus::{Action, InvalidationEvent, OriginId, Subscription};
use crate::cache::{QueryKey, RequestCache};
use crate::models::{FilterSnapshot, Identified, Pagination, ResourceCollection, ResourceKind};
use crate::notify::{NotificationAction, NotificationKind, NotifyOptions};

/// An entity a `CollectionPage` can hold.
pub trait Record: Identified + Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> Record for T where T: Identified + Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

struct PageState<T> {
    collection: ResourceCollection<T>,
    selection: Selection,
    /// Filters the next fetch will use; `collection.filters` is what the
    /// current items were fetched with.
    filters: FilterSnapshot,
    page: u32,
    status: PageStatus,
    /// Query the current items were fetched for.
    loaded: Option<QueryKey>,
    in_flight: Option<QueryKey>,
    /// A refresh that arrived while a fetch was in flight and must run
    /// once it ends: (force, cause).
    rerun: Option<(bool, RefreshCause)>,
}

struct PageInner<T> {
    kind: ResourceKind,
    origin: OriginId,
    ctx: SyncContext,
    cache: RequestCache,
    loading: LoadingCoordinator,
    debouncer: Debouncer,
    state: Mutex<PageState<T>>,
    mounted: AtomicBool,
    subscription: Mutex<Option<Subscription>>,
}

/// Releases a fetch's cache claim and in-flight marker if the fetch is
/// dropped before it settles.
struct FetchClaim<'a, T> {
    inner: &'a PageInner<T>,
    key: &'a QueryKey,
    settled: bool,
}

impl<T> Drop for FetchClaim<'_, T> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        self.inner.cache.forget(self.key);
        let mut state = self.inner.state();
        if state.in_flight.as_ref() == Some(self.key) {
            state.in_flight = None;
        }
    }
}

impl<T> PageInner<T> {
    fn state(&self) -> MutexGuard<'_, PageState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn subscription(&self) -> MutexGuard<'_, Option<Subscription>> {
        self.subscription.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_mounted(&self) -> bool {
        self.mounted.load(Ordering::SeqCst)
    }
}

/// Cheap to clone; clones share one page.
pub struct CollectionPage<T> {
    inner: Arc<PageInner<T>>,
}

impl<T> Clone for CollectionPage<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

fn query_key(kind: ResourceKind, filters: &FilterSnapshot, page: u32, page_size: u32) -> QueryKey {
    QueryKey::builder(kind.name())
        .filters(filters)
        .page(page, page_size)
        .build()
}

fn query_params(filters: &FilterSnapshot, page: u32, page_size: u32) -> Vec<(String, String)> {
    let mut params = vec![
        ("page".to_string(), page.to_string()),
        ("limit".to_string(), page_size.to_string()),
    ];
    params.extend(filters.iter().map(|(k, v)| (k.to_string(), v.to_string())));
    params
}

impl<T: Record> CollectionPage<T> {
    pub fn new(kind: ResourceKind, ctx: SyncContext) -> Self {
        let page_size = ctx.config.page_size;
        let inner = PageInner {
            kind,
            origin: OriginId::new(),
            cache: RequestCache::new(ctx.config.max_cache_entries),
            loading: LoadingCoordinator::new(),
            debouncer: Debouncer::new(ctx.config.debounce()),
            state: Mutex::new(PageState {
                collection: ResourceCollection::new(page_size),
                selection: Selection::new(),
                filters: FilterSnapshot::new(),
                page: 1,
                status: PageStatus::Empty,
                loaded: None,
                in_flight: None,
                rerun: None,
            }),
            mounted: AtomicBool::new(false),
            subscription: Mutex::new(None),
            ctx,
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Start from `filters` and `page` instead of the defaults. Meant for
    /// use before `mount`; nothing is fetched or debounced.
    pub fn with_query(self, filters: FilterSnapshot, page: u32) -> Self {
        {
            let mut state = self.inner.state();
            state.filters = filters;
            state.page = page.max(1);
        }
        self
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Restore the snapshot, start listening for invalidations and run the
    /// first fetch.
    pub async fn mount(&self) -> LoadOutcome {
        if !self.inner.mounted.swap(true, Ordering::SeqCst) {
            self.restore_snapshot();
            self.listen();
            debug!(resource = %self.inner.kind, origin = %self.inner.origin, "Page mounted");
        }
        self.refresh_with(false, RefreshCause::Mount).await
    }

    /// Stop reacting to anything. In-flight responses are discarded when
    /// they arrive.
    pub fn unmount(&self) {
        if !self.inner.mounted.swap(false, Ordering::SeqCst) {
            return;
        }
        self.inner.debouncer.cancel();
        let subscription = self.inner.subscription().take();
        if let Some(subscription) = subscription {
            subscription.unsubscribe();
        }
        debug!(resource = %self.inner.kind, origin = %self.inner.origin, "Page unmounted");
    }

    fn restore_snapshot(&self) {
        let inner = &self.inner;
        let key = inner.ctx.storage_key(inner.kind);
        let snapshot: Vec<T> = inner.ctx.store.load(&key);
        if snapshot.is_empty() {
            return;
        }

        let count = snapshot.len();
        let mut state = inner.state();
        if !state.collection.is_empty() {
            return;
        }
        let pagination = Pagination {
            page: 1,
            page_size: state.collection.pagination.page_size,
            total_items: count as u64,
            total_pages: 1,
        };
        let filters = state.filters.clone();
        state.collection.replace(snapshot, pagination, filters);
        state.status = PageStatus::Restored;
        info!(resource = %inner.kind, count = count, "Restored persisted snapshot");
    }

    fn listen(&self) {
        let weak: Weak<PageInner<T>> = Arc::downgrade(&self.inner);
        let origin = self.inner.origin.clone();
        let kind = self.inner.kind;

        let subscription = self.inner.ctx.bus.subscribe(kind.topic(), move |event: &InvalidationEvent| {
            if event.should_skip(&origin) {
                debug!(resource = %kind, action = event.action.label(), "Ignoring own invalidation");
                return;
            }
            let Some(inner) = weak.upgrade() else {
                return;
            };
            if !inner.is_mounted() {
                return;
            }
            let Ok(runtime) = tokio::runtime::Handle::try_current() else {
                warn!(resource = %kind, "Invalidation outside a runtime, refetch skipped");
                return;
            };

            inner.cache.invalidate_resource(kind.name());
            debug!(
                resource = %kind,
                action = event.action.label(),
                from = %event.origin_id,
                "Invalidated, refetching"
            );
            let page = CollectionPage { inner };
            runtime.spawn(async move {
                page.refresh_with(true, RefreshCause::Invalidated).await;
            });
        });

        *self.inner.subscription() = Some(subscription);
    }

    // ------------------------------------------------------------------
    // Fetching
    // ------------------------------------------------------------------

    /// User-initiated refresh: bypasses the TTL and announces success.
    pub async fn refresh(&self) -> LoadOutcome {
        self.refresh_with(true, RefreshCause::User).await
    }

    pub async fn refresh_with(&self, force: bool, cause: RefreshCause) -> LoadOutcome {
        let mut force = force;
        let mut cause = cause;
        loop {
            let outcome = self.fetch_once(force, cause).await;
            if outcome == LoadOutcome::InFlight {
                return outcome;
            }
            let rerun = self.inner.state().rerun.take();
            match rerun {
                Some((next_force, next_cause)) => {
                    debug!(resource = %self.inner.kind, cause = next_cause.label(), "Running deferred refresh");
                    force = next_force;
                    cause = next_cause;
                }
                None => return outcome,
            }
        }
    }

    async fn fetch_once(&self, force: bool, cause: RefreshCause) -> LoadOutcome {
        let inner = &self.inner;
        if !inner.is_mounted() {
            return LoadOutcome::Unmounted;
        }

        let kind = inner.kind;
        let (filters, page, page_size, key, showing) = {
            let state = inner.state();
            let page_size = state.collection.pagination.page_size;
            let key = query_key(kind, &state.filters, state.page, page_size);
            let showing = state.loaded.as_ref() == Some(&key);
            (state.filters.clone(), state.page, page_size, key, showing)
        };

        // The page holds one collection, so a fresh entry for another query
        // says nothing about what is on screen.
        if !inner.cache.should_fetch(&key, inner.ctx.ttl(kind), force || !showing) {
            return LoadOutcome::Fresh;
        }
        let mut claim = FetchClaim {
            inner: &**inner,
            key: &key,
            settled: false,
        };

        let params = query_params(&filters, page, page_size);
        let fetch = async {
            inner.state().in_flight = Some(key.clone());
            let response = inner.ctx.api.get(kind.path(), &params).await?;
            let envelope = response.json::<ListEnvelope<T>>()?;
            Ok::<_, ApiError>(envelope)
        };

        let result = inner.loading.run(kind.name(), fetch).await;
        claim.settled = true;
        drop(claim);
        let Some(result) = result else {
            self.defer(&key, force, cause);
            return LoadOutcome::InFlight;
        };
        inner.state().in_flight = None;

        match result {
            Ok(envelope) => {
                let pagination = envelope.pagination(page, page_size);
                self.apply_fetch(&key, envelope.items, pagination, filters, cause)
            }
            Err(e) => self.fetch_failed(&key, e),
        }
    }

    /// Another fetch holds the gate. A duplicate of it is dropped; a
    /// different query, or an invalidation, runs when it ends.
    fn defer(&self, key: &QueryKey, force: bool, cause: RefreshCause) {
        let mut state = self.inner.state();
        let duplicate = state.in_flight.as_ref() == Some(key);
        if duplicate && cause != RefreshCause::Invalidated {
            debug!(resource = %self.inner.kind, key = %key, "Same query in flight, dropping refresh");
            return;
        }
        let already_forced = state.rerun.map(|(f, _)| f).unwrap_or(false);
        state.rerun = Some((already_forced || force, cause));
        drop(state);
        self.inner.cache.forget(key);
    }

    fn apply_fetch(
        &self,
        key: &QueryKey,
        items: Vec<T>,
        pagination: Pagination,
        filters: FilterSnapshot,
        cause: RefreshCause,
    ) -> LoadOutcome {
        let inner = &self.inner;
        if !inner.is_mounted() {
            debug!(resource = %inner.kind, "Discarding response for unmounted page");
            return LoadOutcome::Unmounted;
        }

        let count = items.len();
        inner.cache.record_fetch(key);
        {
            let mut state = inner.state();
            let state = &mut *state;
            state.collection.replace(items, pagination, filters);
            state.selection.retain_present(&state.collection);
            state.status = PageStatus::Ready;
            state.loaded = Some(key.clone());
        }
        self.persist();

        let notifier = &inner.ctx.notifier;
        notifier.dismiss(&self.load_error_key());
        if cause == RefreshCause::User {
            notifier.notify(
                &self.refresh_key(),
                NotificationKind::Success,
                format!("{} refreshed", inner.kind.label()),
            );
        }

        info!(
            resource = %inner.kind,
            count = count,
            total = pagination.total_items,
            page = pagination.page,
            cause = cause.label(),
            "Fetched collection"
        );
        LoadOutcome::Fetched { count }
    }

    fn fetch_failed(&self, key: &QueryKey, error: ApiError) -> LoadOutcome {
        let inner = &self.inner;
        inner.cache.forget(key);
        if !inner.is_mounted() {
            return LoadOutcome::Unmounted;
        }

        let class = error.class();
        if class == ErrorClass::Auth {
            self.auth_lost();
            return LoadOutcome::Failed(class);
        }

        warn!(resource = %inner.kind, error = %error, "Fetch failed, keeping current items");
        inner.state().status = PageStatus::Stale(error.to_string());
        inner.ctx.notifier.notify_with(
            &self.load_error_key(),
            NotificationKind::Error,
            format!("Failed to load {}: {}", inner.kind.name(), error),
            NotifyOptions::default().with_action(NotificationAction::Retry),
        );
        LoadOutcome::Failed(class)
    }

    fn auth_lost(&self) {
        let inner = &self.inner;
        {
            let mut state = inner.state();
            let page_size = state.collection.pagination.page_size;
            state.collection = ResourceCollection::new(page_size);
            state.selection.clear();
            state.status = PageStatus::AuthRequired;
            state.loaded = None;
        }
        inner.cache.clear();
        inner.ctx.handle_auth_lost();
    }

    fn persist(&self) {
        let inner = &self.inner;
        let items = inner.state().collection.items.clone();
        let key = inner.ctx.storage_key(inner.kind);
        match inner.ctx.store.save(&key, &items) {
            Ok(true) => debug!(resource = %inner.kind, count = items.len(), "Snapshot saved"),
            Ok(false) => debug!(resource = %inner.kind, "Empty collection, previous snapshot kept"),
            Err(e) => warn!(resource = %inner.kind, error = %e, "Failed to save snapshot"),
        }
    }

    // ------------------------------------------------------------------
    // Query state
    // ------------------------------------------------------------------

    /// Replace the filters; the fetch runs after the debounce delay.
    pub fn set_filters(&self, filters: FilterSnapshot) {
        {
            let mut state = self.inner.state();
            if state.filters == filters {
                return;
            }
            state.filters = filters;
            state.page = 1;
        }
        self.schedule_refresh();
    }

    /// Set one filter field. An empty value clears it.
    pub fn set_filter(&self, field: &str, value: &str) {
        {
            let mut state = self.inner.state();
            let before = state.filters.clone();
            state.filters.set(field, value);
            if state.filters == before {
                return;
            }
            state.page = 1;
        }
        self.schedule_refresh();
    }

    fn schedule_refresh(&self) {
        let weak = Arc::downgrade(&self.inner);
        self.inner.debouncer.call(async move {
            if let Some(inner) = weak.upgrade() {
                let page = CollectionPage { inner };
                page.refresh_with(false, RefreshCause::Filters).await;
            }
        });
    }

    pub async fn set_page(&self, page: u32) -> LoadOutcome {
        self.inner.state().page = page.max(1);
        self.refresh_with(false, RefreshCause::Page).await
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    pub async fn create(&self, item: T) -> MutationOutcome {
        if !self.inner.is_mounted() {
            return MutationOutcome::Unmounted;
        }
        let body = match serde_json::to_value(&item) {
            Ok(body) => body,
            Err(e) => return self.reject(Action::Create, e),
        };

        let result = self
            .inner
            .ctx
            .api
            .post(self.inner.kind.path(), &body)
            .await
            .and_then(|response| response.mutation::<T>());

        match result {
            Ok(created) => {
                let created = created.unwrap_or(item);
                let id = created.id().to_string();
                reconcile::apply_create(&mut self.inner.state().collection, created);
                self.mutation_applied(Action::Create, Some(id), 1)
            }
            Err(e) => self.mutation_failed(Action::Create, e).await,
        }
    }

    pub async fn update(&self, item: T) -> MutationOutcome {
        if !self.inner.is_mounted() {
            return MutationOutcome::Unmounted;
        }
        let body = match serde_json::to_value(&item) {
            Ok(body) => body,
            Err(e) => return self.reject(Action::Update, e),
        };
        let id = item.id().to_string();
        let applied = reconcile::apply_update(&mut self.inner.state().collection, item);

        let result = self
            .inner
            .ctx
            .api
            .put(&self.inner.kind.item_path(&id), &body)
            .await
            .and_then(|response| response.mutation::<T>());

        match result {
            Ok(saved) => {
                if let Some(saved) = saved {
                    reconcile::apply_update(&mut self.inner.state().collection, saved);
                }
                self.mutation_applied(Action::Update, Some(id), usize::from(applied))
            }
            Err(e) => self.mutation_failed(Action::Update, e).await,
        }
    }

    pub async fn delete(&self, id: &str) -> MutationOutcome {
        if !self.inner.is_mounted() {
            return MutationOutcome::Unmounted;
        }
        let removed = {
            let mut state = self.inner.state();
            let state = &mut *state;
            reconcile::apply_delete(&mut state.collection, id, Some(&mut state.selection))
        };

        let result = self
            .inner
            .ctx
            .api
            .delete(&self.inner.kind.item_path(id))
            .await
            .and_then(|response| response.mutation::<Value>());

        match result {
            Ok(_) => self.mutation_applied(Action::Delete, Some(id.to_string()), usize::from(removed)),
            Err(e) => self.mutation_failed(Action::Delete, e).await,
        }
    }

    /// Delete every selected item in one request.
    pub async fn bulk_delete(&self) -> MutationOutcome {
        if !self.inner.is_mounted() {
            return MutationOutcome::Unmounted;
        }
        let (ids, removed) = {
            let mut state = self.inner.state();
            let state = &mut *state;
            let ids = state.selection.ids();
            let removed = reconcile::apply_bulk_delete(&mut state.collection, &ids, Some(&mut state.selection));
            (ids, removed)
        };
        if ids.is_empty() {
            return MutationOutcome::Applied { affected: 0 };
        }

        let path = format!("{}/bulk-delete", self.inner.kind.path());
        let result = self
            .inner
            .ctx
            .api
            .post(&path, &json!({ "ids": ids }))
            .await
            .and_then(|response| response.mutation::<Value>());

        match result {
            Ok(_) => self.mutation_applied(Action::BulkDelete, None, removed),
            Err(e) => self.mutation_failed(Action::BulkDelete, e).await,
        }
    }

    /// Import raw rows. The server decides what each row becomes, so the
    /// page refetches instead of applying anything locally.
    pub async fn bulk_import(&self, rows: Vec<Value>) -> MutationOutcome {
        if !self.inner.is_mounted() {
            return MutationOutcome::Unmounted;
        }
        let count = rows.len();
        let path = format!("{}/import", self.inner.kind.path());
        let result = self
            .inner
            .ctx
            .api
            .post(&path, &json!({ "items": rows }))
            .await
            .and_then(|response| response.mutation::<Value>());

        match result {
            Ok(_) => {
                let outcome = self.mutation_applied(Action::BulkImport, None, count);
                self.refresh_with(true, RefreshCause::Resync).await;
                outcome
            }
            Err(e) => self.mutation_failed(Action::BulkImport, e).await,
        }
    }

    fn mutation_applied(&self, action: Action, item_id: Option<String>, affected: usize) -> MutationOutcome {
        let inner = &self.inner;
        inner.cache.invalidate_resource(inner.kind.name());
        self.persist();

        inner.ctx.notifier.notify(
            &self.mutation_key(),
            NotificationKind::Success,
            format!("{} {} succeeded", inner.kind.label(), action.label()),
        );

        let mut event = InvalidationEvent::new(inner.kind.topic(), action, inner.origin.clone());
        if let Some(id) = item_id {
            event = event.with_item(id);
        }
        let reached = inner.ctx.bus.publish(&event);
        info!(
            resource = %inner.kind,
            action = action.label(),
            affected = affected,
            subscribers = reached,
            "Mutation applied"
        );
        MutationOutcome::Applied { affected }
    }

    /// The server refused the change: report it and re-read the collection
    /// so any optimistic edit is undone.
    async fn mutation_failed(&self, action: Action, error: ApiError) -> MutationOutcome {
        let inner = &self.inner;
        let class = error.class();
        if class == ErrorClass::Auth {
            self.auth_lost();
            return MutationOutcome::Failed(class);
        }

        warn!(resource = %inner.kind, action = action.label(), error = %error, "Mutation failed");
        inner.ctx.notifier.notify_with(
            &self.mutation_key(),
            NotificationKind::Error,
            format!("{} {} failed: {}", inner.kind.label(), action.label(), error),
            NotifyOptions::default().with_action(NotificationAction::Retry),
        );
        self.refresh_with(true, RefreshCause::Resync).await;
        MutationOutcome::Failed(class)
    }

    /// The item could not be encoded; nothing was sent.
    fn reject(&self, action: Action, error: serde_json::Error) -> MutationOutcome {
        warn!(resource = %self.inner.kind, action = action.label(), error = %error, "Could not encode item");
        self.inner.ctx.notifier.notify(
            &self.mutation_key(),
            NotificationKind::Error,
            format!("{} {} failed: {}", self.inner.kind.label(), action.label(), error),
        );
        MutationOutcome::Failed(ErrorClass::Validation)
    }

    // ------------------------------------------------------------------
    // Selection
    // ------------------------------------------------------------------

    /// Select `id` if it is on the page. Returns whether it was newly selected.
    pub fn select(&self, id: &str) -> bool {
        let mut state = self.inner.state();
        state.collection.contains(id) && state.selection.select(id)
    }

    pub fn deselect(&self, id: &str) -> bool {
        self.inner.state().selection.deselect(id)
    }

    pub fn toggle(&self, id: &str) -> bool {
        self.inner.state().selection.toggle(id)
    }

    pub fn select_all(&self) {
        let mut state = self.inner.state();
        let state = &mut *state;
        for item in &state.collection.items {
            state.selection.select(item.id());
        }
    }

    pub fn clear_selection(&self) {
        self.inner.state().selection.clear();
    }

    pub fn selected(&self) -> Vec<String> {
        self.inner.state().selection.ids()
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn kind(&self) -> ResourceKind {
        self.inner.kind
    }

    pub fn origin(&self) -> &OriginId {
        &self.inner.origin
    }

    pub fn is_mounted(&self) -> bool {
        self.inner.is_mounted()
    }

    pub fn is_loading(&self) -> bool {
        self.inner.loading.is_loading(self.inner.kind.name())
    }

    pub fn items(&self) -> Vec<T> {
        self.inner.state().collection.items.clone()
    }

    pub fn collection(&self) -> ResourceCollection<T> {
        self.inner.state().collection.clone()
    }

    pub fn pagination(&self) -> Pagination {
        self.inner.state().collection.pagination
    }

    /// Filters the next fetch will use.
    pub fn filters(&self) -> FilterSnapshot {
        self.inner.state().filters.clone()
    }

    pub fn status(&self) -> PageStatus {
        self.inner.state().status.clone()
    }

    /// Persist the tab this page shows, so the next mount reopens it.
    pub fn set_active_tab(&self, tab: &str) {
        if let Err(e) = self.inner.ctx.store.save_active_tab(self.inner.kind.name(), tab) {
            warn!(resource = %self.inner.kind, error = %e, "Failed to save active tab");
        }
    }

    pub fn active_tab(&self) -> Option<String> {
        self.inner.ctx.store.load_active_tab(self.inner.kind.name())
    }

    fn load_error_key(&self) -> String {
        format!("{}-load", self.inner.kind.name())
    }

    fn refresh_key(&self) -> String {
        format!("{}-refresh", self.inner.kind.name())
    }

    fn mutation_key(&self) -> String {
        format!("{}-mutation", self.inner.kind.name())
    }
}
