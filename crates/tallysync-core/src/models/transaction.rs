use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::Identified;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Income,
    Expense,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(alias = "_id")]
    pub id: String,
    #[serde(rename = "clientId")]
    pub client_id: Option<String>,
    pub description: String,
    pub amount: f64,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub date: NaiveDate,
    pub category: Option<String>,
}

fn default_currency() -> String {
    "USD".to_string()
}

impl Transaction {
    /// Amount with the sign of its direction: expenses are negative.
    pub fn signed_amount(&self) -> f64 {
        match self.kind {
            TransactionKind::Income => self.amount,
            TransactionKind::Expense => -self.amount,
        }
    }
}

impl Identified for Transaction {
    fn id(&self) -> &str {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_transaction() {
        let json = r#"{"id": "7", "clientId": "c-1", "description": "Invoice 12", "amount": 250.0, "type": "expense", "date": "2024-03-01"}"#;
        let tx: Transaction = serde_json::from_str(json).expect("Failed to parse transaction test JSON");
        assert_eq!(tx.id(), "7");
        assert_eq!(tx.currency, "USD");
        assert_eq!(tx.kind, TransactionKind::Expense);
        assert_eq!(tx.signed_amount(), -250.0);
        assert_eq!(tx.date, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
    }
}
