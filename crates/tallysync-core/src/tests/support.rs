use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::{json, Value};
use tempfile::TempDir;

use crate::api::{ApiError, ApiResponse, ResourceApi};
use crate::cache::PersistentStore;
use crate::config::SyncConfig;
use crate::models::{Transaction, TransactionKind};
use crate::sync::SyncContext;

#[derive(Debug, Clone)]
pub enum Reply {
    Json(u16, Value),
    Offline,
}

#[derive(Debug, Clone)]
pub struct Call {
    pub method: &'static str,
    pub path: String,
    pub params: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl Call {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// A reply used only when the request carries `param = value`.
#[derive(Debug, Clone)]
struct ParamReply {
    method: &'static str,
    path: String,
    param: (String, String),
    reply: Reply,
}

/// Scripted `ResourceApi`: one reply per method and path, optionally
/// narrowed by a query parameter, every call recorded.
#[derive(Default)]
pub struct MockApi {
    replies: Mutex<HashMap<(&'static str, String), Reply>>,
    param_replies: Mutex<Vec<ParamReply>>,
    calls: Mutex<Vec<Call>>,
    latency: Mutex<Option<Duration>>,
}

impl MockApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, method: &'static str, path: &str, status: u16, body: Value) {
        self.replies
            .lock()
            .unwrap()
            .insert((method, path.to_string()), Reply::Json(status, body));
    }

    /// Reply with `body` to requests whose `name` parameter equals `value`.
    /// Takes precedence over `respond` for the same method and path.
    pub fn respond_when(
        &self,
        method: &'static str,
        path: &str,
        (name, value): (&str, &str),
        status: u16,
        body: Value,
    ) {
        self.param_replies.lock().unwrap().push(ParamReply {
            method,
            path: path.to_string(),
            param: (name.to_string(), value.to_string()),
            reply: Reply::Json(status, body),
        });
    }

    pub fn go_offline(&self, method: &'static str, path: &str) {
        self.replies
            .lock()
            .unwrap()
            .insert((method, path.to_string()), Reply::Offline);
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = Some(latency);
    }

    pub fn calls(&self, method: &str, path: &str) -> Vec<Call> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.method == method && c.path == path)
            .cloned()
            .collect()
    }

    pub fn count(&self, method: &str, path: &str) -> usize {
        self.calls(method, path).len()
    }

    async fn reply(
        &self,
        method: &'static str,
        path: &str,
        params: &[(String, String)],
        body: Option<&Value>,
    ) -> Result<ApiResponse, ApiError> {
        self.calls.lock().unwrap().push(Call {
            method,
            path: path.to_string(),
            params: params.to_vec(),
            body: body.cloned(),
        });

        let latency = *self.latency.lock().unwrap();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let narrowed = self
            .param_replies
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|r| r.method == method && r.path == path && params.contains(&r.param))
            .map(|r| r.reply.clone());
        let reply = narrowed.or_else(|| {
            self.replies
                .lock()
                .unwrap()
                .get(&(method, path.to_string()))
                .cloned()
        });
        match reply {
            Some(Reply::Json(status, body)) => Ok(ApiResponse::new(status, body)),
            Some(Reply::Offline) => Err(ApiError::Transport("connection refused".to_string())),
            None => Ok(ApiResponse::new(404, json!(format!("no route for {} {}", method, path)))),
        }
    }
}

#[async_trait]
impl ResourceApi for MockApi {
    async fn get(&self, path: &str, params: &[(String, String)]) -> Result<ApiResponse, ApiError> {
        self.reply("GET", path, params, None).await
    }

    async fn post(&self, path: &str, body: &Value) -> Result<ApiResponse, ApiError> {
        self.reply("POST", path, &[], Some(body)).await
    }

    async fn put(&self, path: &str, body: &Value) -> Result<ApiResponse, ApiError> {
        self.reply("PUT", path, &[], Some(body)).await
    }

    async fn delete(&self, path: &str) -> Result<ApiResponse, ApiError> {
        self.reply("DELETE", path, &[], None).await
    }
}

/// A temp cache directory plus a context wired to a `MockApi`.
pub struct Harness {
    pub dir: TempDir,
    pub api: Arc<MockApi>,
    pub ctx: SyncContext,
}

impl Harness {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let api = MockApi::new();
        let ctx = context_in(&dir, Arc::clone(&api));
        Self { dir, api, ctx }
    }

    /// A fresh session over the same cache directory, as after a restart.
    pub fn restart(&self, api: Arc<MockApi>) -> SyncContext {
        context_in(&self.dir, api)
    }
}

fn context_in(dir: &TempDir, api: Arc<MockApi>) -> SyncContext {
    let store = PersistentStore::new(dir.path().to_path_buf()).unwrap();
    SyncContext::new(api, store, SyncConfig::default())
}

pub fn tx(id: &str, amount: f64) -> Transaction {
    Transaction {
        id: id.to_string(),
        client_id: Some("c-1".to_string()),
        description: format!("Invoice {}", id),
        amount,
        currency: "USD".to_string(),
        kind: TransactionKind::Income,
        date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
        category: None,
    }
}

pub fn transactions(ids: &[&str]) -> Vec<Transaction> {
    ids.iter().map(|id| tx(id, 100.0)).collect()
}

pub fn list_body(items: &[Transaction]) -> Value {
    json!({
        "transactions": items,
        "pagination": { "page": 1, "pages": 1, "total": items.len() }
    })
}

/// A list body for page `page` of `pages`.
pub fn page_body(items: &[Transaction], page: u32, pages: u32) -> Value {
    json!({
        "transactions": items,
        "pagination": { "page": page, "pages": pages, "total": items.len() as u32 * pages }
    })
}

pub fn ids(items: &[Transaction]) -> Vec<&str> {
    items.iter().map(|t| t.id.as_str()).collect()
}

/// Let spawned invalidation refetches run.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}
