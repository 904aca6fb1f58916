pub mod memory;
pub mod records;

use std::fmt;

use async_trait::async_trait;
use serde_json::{Map, Value};

/// Abstract record store the board is persisted to.
/// Implementations: MemoryStore (in-process), RestStore (backend, HTTP).
///
/// Records are JSON objects with camelCase keys. Ids of cards, notes,
/// history entries and files are generated by the caller, so records can be
/// created optimistically before the store confirms them.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// All records of a collection matching `filter`.
    async fn list(&self, collection: Collection, filter: &Filter) -> Result<Vec<Value>, StorageError>;

    /// One record by id; `Ok(None)` when it does not exist.
    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Value>, StorageError>;

    /// Create a record and return it as stored.
    async fn create(&self, collection: Collection, record: Value) -> Result<Value, StorageError>;

    /// Overwrite the given fields of an existing record.
    async fn update(
        &self,
        collection: Collection,
        id: &str,
        fields: Map<String, Value>,
    ) -> Result<(), StorageError>;

    async fn delete(&self, collection: Collection, id: &str) -> Result<(), StorageError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Pipelines,
    Stages,
    Sections,
    Cards,
    Notes,
    History,
    Files,
    TeamMembers,
    Notifications,
    SubscriptionTiers,
    ActivityPhases,
}

impl Collection {
    pub fn name(self) -> &'static str {
        match self {
            Collection::Pipelines => "pipelines",
            Collection::Stages => "stages",
            Collection::Sections => "sections",
            Collection::Cards => "cards",
            Collection::Notes => "notes",
            Collection::History => "history",
            Collection::Files => "files",
            Collection::TeamMembers => "team_members",
            Collection::Notifications => "notifications",
            Collection::SubscriptionTiers => "subscription_tiers",
            Collection::ActivityPhases => "activity_phases",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Conjunction of field equality clauses.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    clauses: Vec<(String, Value)>,
}

impl Filter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::all().and(field, value)
    }

    pub fn pipeline(pipeline_id: &str) -> Self {
        Self::eq("pipelineId", pipeline_id)
    }

    pub fn and(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.clauses.push((field.into(), value.into()));
        self
    }

    pub fn clauses(&self) -> &[(String, Value)] {
        &self.clauses
    }

    pub fn matches(&self, record: &Value) -> bool {
        self.clauses
            .iter()
            .all(|(field, expected)| record.get(field) == Some(expected))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Record not found: {collection}/{id}")]
    NotFound { collection: Collection, id: String },

    #[error("Store rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Could not decode record: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_filter_matches_all_clauses() {
        let filter = Filter::pipeline("p1").and("read", false);
        assert!(filter.matches(&json!({ "pipelineId": "p1", "read": false, "x": 1 })));
        assert!(!filter.matches(&json!({ "pipelineId": "p1", "read": true })));
        assert!(!filter.matches(&json!({ "read": false })));
        assert!(Filter::all().matches(&json!({})));
    }
}
