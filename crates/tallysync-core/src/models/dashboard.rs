use serde::{Deserialize, Serialize};

/// Headline totals rendered at the top of the dashboard (primary data).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DashboardSummary {
    #[serde(rename = "totalIncome", default)]
    pub total_income: f64,
    #[serde(rename = "totalExpenses", default)]
    pub total_expenses: f64,
    #[serde(rename = "netBalance", default)]
    pub net_balance: f64,
    #[serde(rename = "transactionCount", default)]
    pub transaction_count: u64,
    #[serde(rename = "clientCount", default)]
    pub client_count: u64,
}

/// Enrichment shown below the summary (secondary data).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DashboardAnalytics {
    #[serde(default)]
    pub monthly: Vec<MonthlyTotal>,
    #[serde(rename = "topClients", default)]
    pub top_clients: Vec<ClientTotal>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyTotal {
    pub month: String,
    #[serde(default)]
    pub income: f64,
    #[serde(default)]
    pub expenses: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientTotal {
    #[serde(rename = "clientId")]
    pub client_id: String,
    pub name: Option<String>,
    #[serde(default)]
    pub total: f64,
}
