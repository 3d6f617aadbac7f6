use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use super::ApiError;
use crate::models::Pagination;

/// Raw response from the API: status code plus the decoded JSON body.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// The body of a 2xx response, or the error its status maps to.
    pub fn into_body(self) -> Result<Value, ApiError> {
        if self.ok() {
            Ok(self.body)
        } else {
            let body = match &self.body {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            Err(ApiError::from_status(self.status, &body))
        }
    }

    /// Decode a 2xx body into `T`; a body of the wrong shape is an `InvalidResponse`.
    pub fn json<T: DeserializeOwned>(self) -> Result<T, ApiError> {
        let body = self.into_body()?;
        serde_json::from_value(body).map_err(|e| ApiError::InvalidResponse(e.to_string()))
    }

    /// Decode a mutation response. An empty 2xx body (e.g. 204) is a
    /// success without data.
    pub fn mutation<T: DeserializeOwned>(self) -> Result<Option<T>, ApiError> {
        let body = self.into_body()?;
        if body.is_null() {
            return Ok(None);
        }
        let envelope: MutationEnvelope<T> = serde_json::from_value(body)
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))?;
        envelope.into_result()
    }
}

/// Pagination block as the server sends it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PageInfo {
    pub page: u32,
    pub pages: u32,
    pub total: u64,
}

/// List endpoint body: `{ items | transactions | clients: T[], pagination? }`.
#[derive(Debug, Clone, Deserialize)]
pub struct ListEnvelope<T> {
    #[serde(alias = "transactions", alias = "clients")]
    pub items: Vec<T>,
    #[serde(default)]
    pub pagination: Option<PageInfo>,
}

impl<T> ListEnvelope<T> {
    /// Pagination for this page of results. Without a pagination block the
    /// whole result set is taken to be a single page.
    pub fn pagination(&self, requested_page: u32, page_size: u32) -> Pagination {
        match self.pagination {
            Some(info) => Pagination {
                page: info.page,
                page_size,
                total_items: info.total,
                total_pages: info.pages,
            },
            None => Pagination {
                page: requested_page,
                page_size,
                total_items: self.items.len() as u64,
                total_pages: if self.items.is_empty() { 0 } else { 1 },
            },
        }
    }
}

/// Mutation endpoint body: `{ success, data?, error? }`.
#[derive(Debug, Clone, Deserialize)]
pub struct MutationEnvelope<T> {
    pub success: bool,
    pub data: Option<T>,
    #[serde(default)]
    pub error: Option<String>,
}

impl<T> MutationEnvelope<T> {
    /// `data` of a successful mutation; `success: false` becomes an error
    /// carrying the server's message.
    pub fn into_result(self) -> Result<Option<T>, ApiError> {
        if self.success {
            Ok(self.data)
        } else {
            Err(ApiError::InvalidResponse(
                self.error.unwrap_or_else(|| "mutation rejected".to_string()),
            ))
        }
    }
}
