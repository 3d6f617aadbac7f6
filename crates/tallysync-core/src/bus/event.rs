use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifies one mounted page instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OriginId(String);

impl OriginId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for OriginId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OriginId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Action {
    Create,
    Update,
    Delete,
    BulkImport,
    BulkDelete,
}

impl Action {
    pub fn label(&self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Update => "update",
            Action::Delete => "delete",
            Action::BulkImport => "bulkImport",
            Action::BulkDelete => "bulkDelete",
        }
    }
}

/// Fire-and-forget signal that a resource changed on the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidationEvent {
    pub resource_type: String,
    pub action: Action,
    pub origin_id: OriginId,
    /// When set, the page identified by `origin_id` must not react.
    pub skip_origin: bool,
    pub item_id: Option<String>,
}

impl InvalidationEvent {
    pub fn new(resource_type: impl Into<String>, action: Action, origin_id: OriginId) -> Self {
        Self {
            resource_type: resource_type.into(),
            action,
            origin_id,
            skip_origin: true,
            item_id: None,
        }
    }

    pub fn with_item(mut self, id: impl Into<String>) -> Self {
        self.item_id = Some(id.into());
        self
    }

    /// Ask the origin to react as well, e.g. after a bulk import whose
    /// result only the server knows.
    pub fn include_origin(mut self) -> Self {
        self.skip_origin = false;
        self
    }

    /// Whether a subscriber identified by `own` should ignore this event.
    pub fn should_skip(&self, own: &OriginId) -> bool {
        self.skip_origin && &self.origin_id == own
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_skip_only_for_origin() {
        let page_a = OriginId::named("pageA");
        let page_b = OriginId::named("pageB");
        let event = InvalidationEvent::new("transactions", Action::Delete, page_a.clone()).with_item("7");

        assert!(event.should_skip(&page_a));
        assert!(!event.should_skip(&page_b));
        assert!(!event.clone().include_origin().should_skip(&page_a));
    }

    #[test]
    fn test_origin_ids_are_unique() {
        assert_ne!(OriginId::new(), OriginId::new());
    }

    #[test]
    fn test_action_serializes_camel_case() {
        assert_eq!(serde_json::to_string(&Action::BulkImport).unwrap(), "\"bulkImport\"");
        assert_eq!(Action::BulkDelete.label(), "bulkDelete");
    }
}
