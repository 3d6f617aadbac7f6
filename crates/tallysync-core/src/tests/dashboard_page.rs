use std::time::Duration;

use serde_json::json;

use super::support::*;
use crate::api::ErrorClass;
use crate::models::{ResourceKind, Transaction};
use crate::notify::NotificationKind;
use crate::sync::{CollectionPage, DashboardPage, LoadOutcome, RefreshCause, AUTH_REQUIRED_KEY};

fn summary_body() -> serde_json::Value {
    json!({
        "totalIncome": 1200.0,
        "totalExpenses": 200.0,
        "netBalance": 1000.0,
        "transactionCount": 3,
        "clientCount": 2
    })
}

fn analytics_body() -> serde_json::Value {
    json!({
        "monthly": [{ "month": "2024-03", "income": 1200.0, "expenses": 200.0 }],
        "topClients": []
    })
}

#[tokio::test(start_paused = true)]
async fn test_summary_then_analytics() {
    let h = Harness::new();
    h.api.respond("GET", "/dashboard/summary", 200, summary_body());
    h.api.respond("GET", "/dashboard/analytics", 200, analytics_body());
    let dashboard = DashboardPage::new(h.ctx.clone());

    let outcome = dashboard.mount().await;

    assert_eq!(outcome.summary, LoadOutcome::Fetched { count: 1 });
    assert_eq!(outcome.analytics, LoadOutcome::Fetched { count: 1 });
    assert_eq!(dashboard.summary().unwrap().net_balance, 1000.0);
    assert_eq!(dashboard.analytics().unwrap().monthly.len(), 1);

    // Within the 60s window nothing is refetched.
    let again = dashboard.refresh_with(false, RefreshCause::Mount).await;
    assert_eq!(again.summary, LoadOutcome::Fresh);
    assert_eq!(h.api.count("GET", "/dashboard/summary"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_analytics_failure_keeps_summary() {
    let h = Harness::new();
    h.api.respond("GET", "/dashboard/summary", 200, summary_body());
    h.api.go_offline("GET", "/dashboard/analytics");
    let dashboard = DashboardPage::new(h.ctx.clone());

    let outcome = dashboard.mount().await;

    assert!(outcome.summary.fetched());
    assert_eq!(outcome.analytics, LoadOutcome::Failed(ErrorClass::Secondary));
    let state = dashboard.state();
    assert!(state.summary.is_some());
    assert!(state.summary_error.is_none());
    assert!(state.analytics_error.is_some());
    assert_eq!(
        h.ctx.notifier.get("dashboard-analytics").map(|n| n.kind),
        Some(NotificationKind::Warning)
    );
    assert!(!h.ctx.notifier.is_live("dashboard-summary"));
}

#[tokio::test(start_paused = true)]
async fn test_summary_failure_still_loads_analytics() {
    let h = Harness::new();
    h.api.respond("GET", "/dashboard/summary", 503, json!("maintenance"));
    h.api.respond("GET", "/dashboard/analytics", 200, analytics_body());
    let dashboard = DashboardPage::new(h.ctx.clone());

    let outcome = dashboard.mount().await;

    assert_eq!(outcome.summary, LoadOutcome::Failed(ErrorClass::Network));
    assert!(outcome.analytics.fetched());
    assert_eq!(
        h.ctx.notifier.get("dashboard-summary").map(|n| n.kind),
        Some(NotificationKind::Error)
    );
}

#[tokio::test(start_paused = true)]
async fn test_unauthorized_summary_skips_analytics() {
    let h = Harness::new();
    h.api.respond("GET", "/dashboard/summary", 401, json!("jwt expired"));
    h.api.respond("GET", "/dashboard/analytics", 200, analytics_body());
    let dashboard = DashboardPage::new(h.ctx.clone());

    let outcome = dashboard.mount().await;

    assert_eq!(outcome.summary, LoadOutcome::Failed(ErrorClass::Auth));
    assert_eq!(outcome.analytics, LoadOutcome::Failed(ErrorClass::Auth));
    assert_eq!(h.api.count("GET", "/dashboard/analytics"), 0);
    assert!(dashboard.state().auth_required);
    assert!(h.ctx.notifier.get(AUTH_REQUIRED_KEY).unwrap().persistent);
}

#[tokio::test(start_paused = true)]
async fn test_transaction_change_refreshes_dashboard() {
    let h = Harness::new();
    h.api.respond("GET", "/dashboard/summary", 200, summary_body());
    h.api.respond("GET", "/dashboard/analytics", 200, analytics_body());
    h.api.respond("GET", "/transactions", 200, list_body(&transactions(&["1"])));
    h.api.respond("POST", "/transactions", 201, json!({ "success": true, "data": tx("2", 10.0) }));

    let dashboard = DashboardPage::new(h.ctx.clone());
    let ledger: CollectionPage<Transaction> = CollectionPage::new(ResourceKind::Transactions, h.ctx.clone());
    dashboard.mount().await;
    ledger.mount().await;

    ledger.create(tx("draft", 10.0)).await;
    settle().await;

    assert_eq!(h.api.count("GET", "/dashboard/summary"), 2);
    assert_eq!(h.api.count("GET", "/dashboard/analytics"), 2);
}

#[tokio::test(start_paused = true)]
async fn test_refetch_once_ttl_expires() {
    let h = Harness::new();
    h.api.respond("GET", "/dashboard/summary", 200, summary_body());
    h.api.respond("GET", "/dashboard/analytics", 200, analytics_body());
    let dashboard = DashboardPage::new(h.ctx.clone());
    dashboard.mount().await;

    tokio::time::sleep(Duration::from_secs(61)).await;
    let outcome = dashboard.refresh_with(false, RefreshCause::Mount).await;
    assert!(outcome.summary.fetched());
    assert_eq!(h.api.count("GET", "/dashboard/summary"), 2);
}

#[tokio::test(start_paused = true)]
async fn test_refresh_during_summary_fetch_runs_after_it() {
    let h = Harness::new();
    h.api.respond("GET", "/dashboard/summary", 200, summary_body());
    h.api.respond("GET", "/dashboard/analytics", 200, analytics_body());
    h.api.set_latency(Duration::from_millis(100));
    let dashboard = DashboardPage::new(h.ctx.clone());

    let (first, (second, analytics_gets)) = futures::join!(dashboard.mount(), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        let outcome = dashboard.refresh_with(true, RefreshCause::Invalidated).await;
        (outcome, h.api.count("GET", "/dashboard/analytics"))
    });

    assert_eq!(second.summary, LoadOutcome::InFlight);
    assert_eq!(second.analytics, LoadOutcome::InFlight);
    assert_eq!(analytics_gets, 0);

    // The queued refresh ran once the first finished, summary first again.
    assert!(first.summary.fetched());
    assert!(first.analytics.fetched());
    assert_eq!(h.api.count("GET", "/dashboard/summary"), 2);
    assert_eq!(h.api.count("GET", "/dashboard/analytics"), 2);

    let again = dashboard.refresh_with(false, RefreshCause::Mount).await;
    assert_eq!(again.summary, LoadOutcome::Fresh);
}
