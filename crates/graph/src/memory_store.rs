use async_trait::async_trait;
use extract::{Entity, Relationship};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use std::collections::{HashMap, HashSet, VecDeque};
use tokio::sync::Mutex;

use crate::{check_depth, relationship_type, GraphSnapshot, GraphStore, GraphStoreError, WriteMode};

#[derive(Default)]
struct MemoryState {
    graph: DiGraph<Entity, Relationship>,
    closed: bool,
}

impl MemoryState {
    fn open(&mut self) -> Result<&mut Self, GraphStoreError> {
        if self.closed {
            Err(GraphStoreError::Closed)
        } else {
            Ok(self)
        }
    }

    fn indices_of(&self, id: &str) -> Vec<NodeIndex> {
        self.graph
            .node_indices()
            .filter(|&idx| self.graph[idx].id == id)
            .collect()
    }
}

/// Process-local graph store with the same write semantics as the Neo4j
/// store: create-only entities duplicate on repeated ids, and an edge is
/// added between every stored copy of its endpoints.
#[derive(Default)]
pub struct MemoryGraphStore {
    state: Mutex<MemoryState>,
    write_mode: WriteMode,
}

impl MemoryGraphStore {
    pub fn new(write_mode: WriteMode) -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            write_mode,
        }
    }

    /// Stored node records for `id`, duplicates included
    pub async fn record_count(&self, id: &str) -> usize {
        self.state.lock().await.indices_of(id).len()
    }

    pub async fn is_closed(&self) -> bool {
        self.state.lock().await.closed
    }
}

#[async_trait]
impl GraphStore for MemoryGraphStore {
    async fn upsert_entity(&self, entity: &Entity) -> Result<(), GraphStoreError> {
        let mut guard = self.state.lock().await;
        let state = guard.open()?;

        match self.write_mode {
            WriteMode::CreateOnly => {
                state.graph.add_node(entity.clone());
            }
            WriteMode::Upsert => match state.indices_of(&entity.id).first() {
                Some(&idx) => {
                    let stored = &mut state.graph[idx];
                    stored.label = entity.label.clone();
                    stored.entity_type = entity.entity_type;
                    stored.properties.extend(entity.properties.clone());
                }
                None => {
                    state.graph.add_node(entity.clone());
                }
            },
        }
        Ok(())
    }

    async fn upsert_relationship(
        &self,
        relationship: &Relationship,
    ) -> Result<(), GraphStoreError> {
        let rel_type = relationship_type(&relationship.rel_type)?;

        let mut guard = self.state.lock().await;
        let state = guard.open()?;

        let sources = state.indices_of(&relationship.source);
        let targets = state.indices_of(&relationship.target);
        if sources.is_empty() || targets.is_empty() {
            return Err(GraphStoreError::InvalidParameter(format!(
                "no stored entity for edge {} -> {}",
                relationship.source, relationship.target
            )));
        }

        let mut stored = relationship.clone();
        stored.rel_type = rel_type;
        for &source in &sources {
            for &target in &targets {
                state.graph.add_edge(source, target, stored.clone());
            }
        }
        Ok(())
    }

    async fn read_all(&self) -> Result<GraphSnapshot, GraphStoreError> {
        let mut guard = self.state.lock().await;
        let state = guard.open()?;

        let mut snapshot = GraphSnapshot::default();
        let mut seen = HashSet::new();
        for node in state.graph.node_weights() {
            snapshot.push_node(&mut seen, node.clone());
        }
        snapshot.links = state.graph.edge_weights().cloned().collect();

        Ok(snapshot)
    }

    async fn read_neighborhood(
        &self,
        entity_id: &str,
        depth: u32,
    ) -> Result<GraphSnapshot, GraphStoreError> {
        let depth = check_depth(depth)?;

        let mut guard = self.state.lock().await;
        let state = guard.open()?;
        let graph = &state.graph;

        // Breadth-first over both edge directions, recording hop distance
        let mut distance: HashMap<NodeIndex, u32> = HashMap::new();
        let mut queue = VecDeque::new();
        for start in state.indices_of(entity_id) {
            distance.insert(start, 0);
            queue.push_back(start);
        }
        while let Some(idx) = queue.pop_front() {
            let hops = distance[&idx];
            if hops == depth {
                continue;
            }
            for neighbor in graph.neighbors_undirected(idx) {
                if !distance.contains_key(&neighbor) {
                    distance.insert(neighbor, hops + 1);
                    queue.push_back(neighbor);
                }
            }
        }

        let mut snapshot = GraphSnapshot::default();
        let mut seen = HashSet::new();
        for idx in graph.node_indices().filter(|idx| distance.contains_key(idx)) {
            snapshot.push_node(&mut seen, graph[idx].clone());
        }

        // An edge lies on a path of at most `depth` hops when its nearer
        // endpoint is closer than `depth`
        snapshot.links = graph
            .edge_references()
            .filter(|edge| match (distance.get(&edge.source()), distance.get(&edge.target())) {
                (Some(&a), Some(&b)) => a.min(b) < depth,
                _ => false,
            })
            .map(|edge| edge.weight().clone())
            .collect();

        Ok(snapshot)
    }

    async fn ping(&self) -> Result<(), GraphStoreError> {
        self.state.lock().await.open().map(|_| ())
    }

    async fn close(&self) -> Result<(), GraphStoreError> {
        self.state.lock().await.closed = true;
        Ok(())
    }
}
