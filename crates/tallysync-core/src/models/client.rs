use serde::{Deserialize, Serialize};

use super::Identified;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Client {
    #[serde(alias = "_id")]
    pub id: String,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub company: Option<String>,
    #[serde(default)]
    pub balance: f64,
    #[serde(rename = "createdAt")]
    pub created_at: Option<String>,
}

impl Client {
    pub fn display_name(&self) -> String {
        match self.company.as_deref() {
            Some(company) if !company.is_empty() => format!("{} ({})", self.name, company),
            _ => self.name.clone(),
        }
    }
}

impl Identified for Client {
    fn id(&self) -> &str {
        &self.id
    }
}
