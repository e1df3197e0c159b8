pub mod memory_store;
pub mod neo4j_store;

pub use memory_store::MemoryGraphStore;
pub use neo4j_store::{Neo4jConfig, Neo4jGraphStore};

use async_trait::async_trait;
use extract::{Entity, Relationship};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::LazyLock;

/// Deepest neighborhood traversal a store will run
pub const MAX_NEIGHBORHOOD_DEPTH: u32 = 5;

static RELATIONSHIP_TYPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Z_][A-Z0-9_]*$").expect("relationship type pattern is valid")
});

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GraphStoreError {
    #[error("graph store connection failed: {0}")]
    Connection(String),

    #[error("graph query `{operation}` failed: {message}")]
    Query {
        operation: &'static str,
        message: String,
    },

    #[error("invalid graph parameter: {0}")]
    InvalidParameter(String),

    #[error("graph store is closed")]
    Closed,
}

/// How `upsert_entity` treats an id that is already stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WriteMode {
    /// Every call creates a new node, so a repeated id yields duplicate records
    #[default]
    CreateOnly,
    /// Merge on id; a repeated id updates the existing node
    Upsert,
}

impl std::str::FromStr for WriteMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "create" | "create-only" => Ok(WriteMode::CreateOnly),
            "upsert" | "merge" => Ok(WriteMode::Upsert),
            other => Err(format!("unknown graph write mode: {other}")),
        }
    }
}

/// Read-back view of the store. Nodes are unique by id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub nodes: Vec<Entity>,
    pub links: Vec<Relationship>,
}

impl GraphSnapshot {
    pub fn node_ids(&self, limit: usize) -> Vec<&str> {
        self.nodes.iter().take(limit).map(|n| n.id.as_str()).collect()
    }

    /// Keep the first node seen for each id
    pub(crate) fn push_node(&mut self, seen: &mut HashSet<String>, node: Entity) {
        if seen.insert(node.id.clone()) {
            self.nodes.push(node);
        }
    }
}

#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Write an entity node. Create-only unless the store runs in `WriteMode::Upsert`.
    async fn upsert_entity(&self, entity: &Entity) -> Result<(), GraphStoreError>;

    /// Append a directed edge. Both endpoint ids must already be stored.
    async fn upsert_relationship(&self, relationship: &Relationship) -> Result<(), GraphStoreError>;

    async fn read_all(&self) -> Result<GraphSnapshot, GraphStoreError>;

    /// Everything within `depth` hops of `entity_id`, `1..=MAX_NEIGHBORHOOD_DEPTH`
    async fn read_neighborhood(
        &self,
        entity_id: &str,
        depth: u32,
    ) -> Result<GraphSnapshot, GraphStoreError>;

    /// Cheap liveness check used by health endpoints
    async fn ping(&self) -> Result<(), GraphStoreError>;

    /// Release the connection. Later calls fail with `GraphStoreError::Closed`.
    async fn close(&self) -> Result<(), GraphStoreError>;
}

pub fn check_depth(depth: u32) -> Result<u32, GraphStoreError> {
    if (1..=MAX_NEIGHBORHOOD_DEPTH).contains(&depth) {
        Ok(depth)
    } else {
        Err(GraphStoreError::InvalidParameter(format!(
            "neighborhood depth must be between 1 and {MAX_NEIGHBORHOOD_DEPTH}, got {depth}"
        )))
    }
}

/// Relationship types are spliced into queries, so only `[A-Z_][A-Z0-9_]*`
/// (after uppercasing) is accepted.
pub fn relationship_type(raw: &str) -> Result<String, GraphStoreError> {
    let normalized = raw.trim().to_uppercase();
    if RELATIONSHIP_TYPE.is_match(&normalized) {
        Ok(normalized)
    } else {
        Err(GraphStoreError::InvalidParameter(format!(
            "relationship type {raw:?} is not a valid identifier"
        )))
    }
}
