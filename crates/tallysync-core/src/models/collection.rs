use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Resources the data layer fetches, caches and invalidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Clients,
    Transactions,
    DashboardSummary,
    DashboardAnalytics,
}

impl ResourceKind {
    /// Stable name used in query keys, storage keys and invalidation topics.
    pub fn name(&self) -> &'static str {
        match self {
            ResourceKind::Clients => "clients",
            ResourceKind::Transactions => "transactions",
            ResourceKind::DashboardSummary => "dashboard_summary",
            ResourceKind::DashboardAnalytics => "dashboard_analytics",
        }
    }

    /// Human-readable name for messages.
    pub fn label(&self) -> &'static str {
        match self {
            ResourceKind::Clients => "Clients",
            ResourceKind::Transactions => "Transactions",
            ResourceKind::DashboardSummary => "Dashboard summary",
            ResourceKind::DashboardAnalytics => "Dashboard analytics",
        }
    }

    /// REST path of the resource, relative to the API base URL.
    pub fn path(&self) -> &'static str {
        match self {
            ResourceKind::Clients => "/clients",
            ResourceKind::Transactions => "/transactions",
            ResourceKind::DashboardSummary => "/dashboard/summary",
            ResourceKind::DashboardAnalytics => "/dashboard/analytics",
        }
    }

    /// Path of a single entity of this resource.
    pub fn item_path(&self, id: &str) -> String {
        format!("{}/{}", self.path(), id)
    }

    /// The invalidation topic whose events make this resource stale.
    ///
    /// Dashboard figures are derived from transactions, so both dashboard
    /// resources listen on the transactions topic.
    pub fn topic(&self) -> &'static str {
        match self {
            ResourceKind::Clients => "clients",
            ResourceKind::Transactions
            | ResourceKind::DashboardSummary
            | ResourceKind::DashboardAnalytics => "transactions",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "clients" => Some(ResourceKind::Clients),
            "transactions" => Some(ResourceKind::Transactions),
            "dashboard_summary" => Some(ResourceKind::DashboardSummary),
            "dashboard_analytics" => Some(ResourceKind::DashboardAnalytics),
            _ => None,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Entities that can be reconciled in place by their primary identifier.
pub trait Identified {
    fn id(&self) -> &str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub page_size: u32,
    pub total_items: u64,
    pub total_pages: u32,
}

impl Pagination {
    pub fn first(page_size: u32) -> Self {
        Self {
            page: 1,
            page_size,
            total_items: 0,
            total_pages: 0,
        }
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self::first(20)
    }
}

/// Filter and sort state that produced a collection.
///
/// Backed by a sorted map so that two snapshots with the same entries always
/// render the same query parameters and query key, whatever order the
/// fields were edited in. Setting a field to an empty value removes it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FilterSnapshot(BTreeMap<String, String>);

impl FilterSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(field, value);
        self
    }

    pub fn set(&mut self, field: impl Into<String>, value: impl Into<String>) {
        let field = field.into();
        let value = value.into();
        if value.trim().is_empty() {
            self.0.remove(&field);
        } else {
            self.0.insert(field, value);
        }
    }

    pub fn remove(&mut self, field: &str) {
        self.0.remove(field);
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Render as `field=value` pairs joined with `&`, in key order.
    pub fn canonical(&self) -> String {
        self.iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&")
    }
}

/// The in-memory view of one fetched list.
///
/// `items` always reflects the last successful fetch for `filters`, edited
/// in place by optimistic mutations. `pagination.total_items` is only ever
/// written by a fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceCollection<T> {
    pub items: Vec<T>,
    pub pagination: Pagination,
    pub filters: FilterSnapshot,
}

impl<T> Default for ResourceCollection<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            pagination: Pagination::default(),
            filters: FilterSnapshot::default(),
        }
    }
}

impl<T> ResourceCollection<T> {
    pub fn new(page_size: u32) -> Self {
        Self {
            items: Vec::new(),
            pagination: Pagination::first(page_size),
            filters: FilterSnapshot::default(),
        }
    }

    /// Replace the contents with an authoritative fetch result.
    pub fn replace(&mut self, items: Vec<T>, pagination: Pagination, filters: FilterSnapshot) {
        self.items = items;
        self.pagination = pagination;
        self.filters = filters;
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T: Identified> ResourceCollection<T> {
    pub fn position(&self, id: &str) -> Option<usize> {
        self.items.iter().position(|item| item.id() == id)
    }

    pub fn get(&self, id: &str) -> Option<&T> {
        self.items.iter().find(|item| item.id() == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.position(id).is_some()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.items.iter().map(Identified::id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_snapshot_is_order_independent() {
        let a = FilterSnapshot::new().with("status", "paid").with("search", "acme");
        let b = FilterSnapshot::new().with("search", "acme").with("status", "paid");
        assert_eq!(a, b);
        assert_eq!(a.canonical(), "search=acme&status=paid");
    }

    #[test]
    fn test_filter_snapshot_empty_value_clears_field() {
        let mut filters = FilterSnapshot::new().with("search", "acme");
        filters.set("search", "  ");
        assert!(filters.is_empty());
        assert_eq!(filters.get("search"), None);
    }

    #[test]
    fn test_resource_kind_round_trips_through_name() {
        for kind in [
            ResourceKind::Clients,
            ResourceKind::Transactions,
            ResourceKind::DashboardSummary,
            ResourceKind::DashboardAnalytics,
        ] {
            assert_eq!(ResourceKind::parse(kind.name()), Some(kind));
        }
        assert_eq!(ResourceKind::parse("invoices"), None);
    }

    #[test]
    fn test_dashboard_listens_on_transactions_topic() {
        assert_eq!(ResourceKind::DashboardSummary.topic(), "transactions");
        assert_eq!(ResourceKind::Clients.topic(), "clients");
        assert_eq!(ResourceKind::Transactions.item_path("7"), "/transactions/7");
    }
}
