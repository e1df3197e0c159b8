use async_trait::async_trait;
use extract::{Entity, EntityType, Relationship};
use neo4rs::{BoltMap, BoltString, BoltType, Graph, Query, Row};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::{check_depth, relationship_type, GraphSnapshot, GraphStore, GraphStoreError, WriteMode};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Neo4jConfig {
    pub uri: String,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub write_mode: WriteMode,
}

/// Graph store backed by Neo4j. Nodes carry the `Entity` label plus one
/// label per `EntityType`.
pub struct Neo4jGraphStore {
    graph: RwLock<Option<Graph>>,
    write_mode: WriteMode,
}

impl Neo4jGraphStore {
    pub fn new(graph: Graph, write_mode: WriteMode) -> Self {
        Self {
            graph: RwLock::new(Some(graph)),
            write_mode,
        }
    }

    pub async fn connect(config: &Neo4jConfig) -> Result<Self, GraphStoreError> {
        let graph = Graph::new(&config.uri, &config.username, &config.password)
            .await
            .map_err(|e| GraphStoreError::Connection(e.to_string()))?;

        info!(uri = %config.uri, write_mode = ?config.write_mode, "Connected to Neo4j");
        Ok(Self::new(graph, config.write_mode))
    }

    /// Create the lookup index on Entity.id
    pub async fn init_schema(&self) -> Result<(), GraphStoreError> {
        let query = Query::new(
            "CREATE INDEX entity_id_index IF NOT EXISTS FOR (e:Entity) ON (e.id)".to_string()
        );
        self.run("init_schema", query).await?;

        debug!("Neo4j schema ready");
        Ok(())
    }

    async fn graph(&self) -> Result<Graph, GraphStoreError> {
        self.graph.read().await.clone().ok_or(GraphStoreError::Closed)
    }

    async fn run(&self, operation: &'static str, query: Query) -> Result<(), GraphStoreError> {
        self.graph()
            .await?
            .run(query)
            .await
            .map_err(|e| query_error(operation, e))
    }

    async fn fetch_rows(
        &self,
        operation: &'static str,
        query: Query,
    ) -> Result<Vec<Row>, GraphStoreError> {
        let mut stream = self
            .graph()
            .await?
            .execute(query)
            .await
            .map_err(|e| query_error(operation, e))?;

        let mut rows = Vec::new();
        while let Some(row) = stream.next().await.map_err(|e| query_error(operation, e))? {
            rows.push(row);
        }
        Ok(rows)
    }

    async fn fetch_nodes(&self, ids: Vec<String>) -> Result<Vec<Entity>, GraphStoreError> {
        let query = Query::new(
            r#"
            MATCH (n:Entity)
            WHERE n.id IN $ids
            RETURN n.id AS id, n.label AS label, n.type AS type, n.relevance AS relevance
            "#.to_string()
        )
        .param("ids", ids);

        self.fetch_rows("fetch_nodes", query)
            .await?
            .iter()
            .map(node_from_row)
            .collect()
    }
}

#[async_trait]
impl GraphStore for Neo4jGraphStore {
    async fn upsert_entity(&self, entity: &Entity) -> Result<(), GraphStoreError> {
        let label = entity.entity_type.label();
        let statement = match self.write_mode {
            WriteMode::CreateOnly => format!(
                "CREATE (n:Entity:{label} {{id: $id}}) \
                 SET n.label = $label, n.type = $type, n += $props"
            ),
            WriteMode::Upsert => format!(
                "MERGE (n:Entity {{id: $id}}) \
                 SET n:{label}, n.label = $label, n.type = $type, n += $props"
            ),
        };

        let query = Query::new(statement)
            .param("id", entity.id.clone())
            .param("label", entity.label.clone())
            .param("type", entity.entity_type.as_str())
            .param("props", bolt_map(bolt_properties(&entity.properties)));

        self.run("upsert_entity", query).await
    }

    async fn upsert_relationship(
        &self,
        relationship: &Relationship,
    ) -> Result<(), GraphStoreError> {
        let rel_type = relationship_type(&relationship.rel_type)?;

        let query = Query::new(format!(
            r#"
            MATCH (source:Entity {{id: $source_id}})
            MATCH (target:Entity {{id: $target_id}})
            CREATE (source)-[r:{rel_type}]->(target)
            SET r += $props
            RETURN count(r) AS created
            "#
        ))
        .param("source_id", relationship.source.clone())
        .param("target_id", relationship.target.clone())
        .param("props", bolt_map(bolt_properties(&relationship.properties)));

        let rows = self.fetch_rows("upsert_relationship", query).await?;
        let created = rows
            .first()
            .and_then(|row| row.get::<i64>("created").ok())
            .unwrap_or(0);

        if created == 0 {
            return Err(GraphStoreError::InvalidParameter(format!(
                "no stored entity for edge {} -> {}",
                relationship.source, relationship.target
            )));
        }
        Ok(())
    }

    async fn read_all(&self) -> Result<GraphSnapshot, GraphStoreError> {
        let mut snapshot = GraphSnapshot::default();
        let mut seen = HashSet::new();

        let node_query = Query::new(
            "MATCH (n:Entity) \
             RETURN n.id AS id, n.label AS label, n.type AS type, n.relevance AS relevance"
                .to_string()
        );
        for row in self.fetch_rows("read_nodes", node_query).await? {
            snapshot.push_node(&mut seen, node_from_row(&row)?);
        }

        let link_query = Query::new(
            r#"
            MATCH (source:Entity)-[r]->(target:Entity)
            RETURN source.id AS source, target.id AS target, type(r) AS type,
                   r.confidence AS confidence, r.source_url AS source_url
            "#.to_string()
        );
        for row in self.fetch_rows("read_links", link_query).await? {
            snapshot.links.push(link_from_row(&row)?);
        }

        Ok(snapshot)
    }

    async fn read_neighborhood(
        &self,
        entity_id: &str,
        depth: u32,
    ) -> Result<GraphSnapshot, GraphStoreError> {
        let depth = check_depth(depth)?;

        let query = Query::new(format!(
            r#"
            MATCH path = (start:Entity {{id: $id}})-[*1..{depth}]-(:Entity)
            UNWIND relationships(path) AS r
            WITH DISTINCT r
            RETURN startNode(r).id AS source, endNode(r).id AS target, type(r) AS type,
                   r.confidence AS confidence, r.source_url AS source_url
            "#
        ))
        .param("id", entity_id.to_string());

        let links = self
            .fetch_rows("read_neighborhood", query)
            .await?
            .iter()
            .map(link_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        let mut ids = vec![entity_id.to_string()];
        for link in &links {
            ids.push(link.source.clone());
            ids.push(link.target.clone());
        }
        ids.sort();
        ids.dedup();

        let mut snapshot = GraphSnapshot::default();
        let mut seen = HashSet::new();
        for node in self.fetch_nodes(ids).await? {
            snapshot.push_node(&mut seen, node);
        }
        snapshot.links = links;

        Ok(snapshot)
    }

    async fn ping(&self) -> Result<(), GraphStoreError> {
        self.run("ping", neo4rs::query("RETURN 1")).await
    }

    async fn close(&self) -> Result<(), GraphStoreError> {
        // Dropping the last handle shuts the connection pool down
        if self.graph.write().await.take().is_some() {
            debug!("Neo4j connection released");
        }
        Ok(())
    }
}

fn query_error(operation: &'static str, error: neo4rs::Error) -> GraphStoreError {
    GraphStoreError::Query {
        operation,
        message: error.to_string(),
    }
}

fn decode_error(operation: &'static str, error: impl std::fmt::Display) -> GraphStoreError {
    GraphStoreError::Query {
        operation,
        message: error.to_string(),
    }
}

fn node_from_row(row: &Row) -> Result<Entity, GraphStoreError> {
    let id: String = row.get("id").map_err(|e| decode_error("decode_node", e))?;
    let label = row.get::<String>("label").unwrap_or_else(|_| id.clone());
    let entity_type = row
        .get::<String>("type")
        .map(|t| EntityType::from_tag(&t))
        .unwrap_or(EntityType::Unknown);
    let relevance = row.get::<f64>("relevance").unwrap_or(0.0);

    let mut entity = Entity::new(id, entity_type, relevance);
    entity.label = label;
    Ok(entity)
}

fn link_from_row(row: &Row) -> Result<Relationship, GraphStoreError> {
    let decode = |e| decode_error("decode_link", e);

    let source: String = row.get("source").map_err(decode)?;
    let target: String = row.get("target").map_err(decode)?;
    let rel_type: String = row.get("type").map_err(decode)?;
    let confidence = row.get::<f64>("confidence").unwrap_or(0.0);

    let mut relationship = Relationship::new(source, target, rel_type, confidence);
    if let Ok(url) = row.get::<String>("source_url") {
        relationship = relationship.with_property("source_url", url);
    }
    Ok(relationship)
}

/// Neo4j properties must be scalars or homogeneous lists; nested objects are
/// stored as JSON text and nulls are dropped.
fn bolt_properties(properties: &Map<String, Value>) -> HashMap<String, BoltType> {
    properties
        .iter()
        .filter_map(|(key, value)| bolt_value(value).map(|v| (key.clone(), v)))
        .collect()
}

fn bolt_map(properties: HashMap<String, BoltType>) -> BoltType {
    let mut map = BoltMap::new();
    for (key, value) in properties {
        map.put(BoltString::from(key), value);
    }
    BoltType::Map(map)
}

fn bolt_value(value: &Value) -> Option<BoltType> {
    match value {
        Value::Null => None,
        Value::Bool(b) => Some(BoltType::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Some(BoltType::from(i)),
            None => n.as_f64().map(BoltType::from),
        },
        Value::String(s) => Some(BoltType::from(s.clone())),
        Value::Array(items) if items.iter().all(Value::is_string) => Some(BoltType::from(
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect::<Vec<String>>(),
        )),
        other => Some(BoltType::from(other.to_string())),
    }
}
