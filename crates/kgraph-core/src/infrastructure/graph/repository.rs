//! SQLite implementation of the GraphRepository
//!
//! Batches are written in a single transaction. Traversal uses a recursive
//! CTE over outgoing edges with path tracking to avoid cycles; id lists are
//! passed as JSON arrays and expanded with `json_each`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use tracing::{debug, info};

use crate::domain::graph::{
    Connectivity, Edge, EdgeType, GraphRepository, Node, NodeQuery, NodeType, StoreCounts,
    TraversalRow,
};
use crate::error::{Error, Result};
use crate::storage::migrations::run_migrations;

/// SQLite implementation of the graph repository
#[derive(Clone)]
pub struct SqliteGraphRepository {
    pool: SqlitePool,
}

impl SqliteGraphRepository {
    /// Create a new SQLite graph repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get the underlying connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl GraphRepository for SqliteGraphRepository {
    async fn ensure_schema(&self) -> Result<()> {
        run_migrations(&self.pool).await
    }

    // ========== Writes ==========

    async fn upsert_nodes(&self, nodes: &[Node]) -> Result<()> {
        if nodes.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for node in nodes {
            let attributes = serde_json::to_string(&node.attributes)?;
            let context_relevance = serde_json::to_string(&node.context_relevance)?;
            let embedding = node.embedding.as_deref().map(encode_embedding);

            sqlx::query(
                r#"
                INSERT INTO nodes (
                    id, name, node_type, attributes, importance, context_relevance,
                    access_count, last_accessed, version, embedding, name_lower,
                    search_terms, created_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    attributes = excluded.attributes,
                    importance = excluded.importance,
                    context_relevance = excluded.context_relevance,
                    access_count = excluded.access_count,
                    last_accessed = excluded.last_accessed,
                    version = excluded.version,
                    embedding = COALESCE(excluded.embedding, nodes.embedding),
                    search_terms = excluded.search_terms
                "#,
            )
            .bind(&node.id)
            .bind(&node.name)
            .bind(node.node_type.as_str())
            .bind(&attributes)
            .bind(node.importance)
            .bind(&context_relevance)
            .bind(node.access_count as i64)
            .bind(node.last_accessed.to_rfc3339())
            .bind(node.version as i64)
            .bind(embedding)
            .bind(&node.name_lower)
            .bind(&node.search_terms)
            .bind(node.created_at.to_rfc3339())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        debug!(count = nodes.len(), "Nodes upserted");
        Ok(())
    }

    async fn upsert_edges(&self, edges: &[Edge]) -> Result<()> {
        if edges.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for edge in edges {
            let attributes = serde_json::to_string(&edge.attributes)?;

            sqlx::query(
                r#"
                INSERT INTO edges (
                    id, source_id, target_id, edge_type, weight, confidence,
                    attributes, reinforcement_count, last_reinforced, decay_rate, created_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    weight = excluded.weight,
                    confidence = excluded.confidence,
                    attributes = excluded.attributes,
                    reinforcement_count = excluded.reinforcement_count,
                    last_reinforced = excluded.last_reinforced,
                    decay_rate = excluded.decay_rate
                "#,
            )
            .bind(&edge.id)
            .bind(&edge.source_id)
            .bind(&edge.target_id)
            .bind(edge.edge_type.as_str())
            .bind(edge.weight)
            .bind(edge.confidence)
            .bind(&attributes)
            .bind(edge.reinforcement_count as i64)
            .bind(edge.last_reinforced.to_rfc3339())
            .bind(edge.decay_rate)
            .bind(edge.created_at.to_rfc3339())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        debug!(count = edges.len(), "Edges upserted");
        Ok(())
    }

    async fn update_importance(&self, updates: &[(String, f64)]) -> Result<()> {
        if updates.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for (id, importance) in updates {
            sqlx::query("UPDATE nodes SET importance = ? WHERE id = ?")
                .bind(importance)
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        info!(count = updates.len(), "Importance written back");
        Ok(())
    }

    // ========== Point queries ==========

    async fn get_node(&self, id: &str) -> Result<Option<Node>> {
        let row: Option<NodeRow> = sqlx::query_as("SELECT * FROM nodes WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| r.into_node()).transpose()
    }

    async fn get_nodes(&self, ids: &[String]) -> Result<Vec<Node>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows: Vec<NodeRow> = sqlx::query_as(
            "SELECT * FROM nodes WHERE id IN (SELECT value FROM json_each(?))",
        )
        .bind(serde_json::to_string(ids)?)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.into_node()).collect()
    }

    async fn get_edge(&self, id: &str) -> Result<Option<Edge>> {
        let row: Option<EdgeRow> = sqlx::query_as("SELECT * FROM edges WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| r.into_edge()).transpose()
    }

    async fn get_edges(&self, ids: &[String]) -> Result<Vec<Edge>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows: Vec<EdgeRow> = sqlx::query_as(
            "SELECT * FROM edges WHERE id IN (SELECT value FROM json_each(?))",
        )
        .bind(serde_json::to_string(ids)?)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.into_edge()).collect()
    }

    async fn existing_node_ids(&self, ids: &[String]) -> Result<Vec<String>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT id FROM nodes WHERE id IN (SELECT value FROM json_each(?))",
        )
        .bind(serde_json::to_string(ids)?)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    // ========== Range queries ==========

    async fn query_nodes(&self, query: &NodeQuery) -> Result<Vec<Node>> {
        let types: Vec<&str> = query.node_types.iter().map(NodeType::as_str).collect();
        let prefix = query
            .name_prefix
            .as_deref()
            .map(|p| format!("{}%", escape_like(&crate::domain::graph::ids::canonical_name(p))));
        let limit = query.limit.map(|l| l as i64).unwrap_or(-1);

        let rows: Vec<NodeRow> = sqlx::query_as(
            r#"
            SELECT * FROM nodes
            WHERE (? = 0 OR node_type IN (SELECT value FROM json_each(?)))
              AND importance >= ?
              AND (? IS NULL OR name_lower LIKE ? ESCAPE '\')
            ORDER BY importance DESC, access_count DESC, id
            LIMIT ?
            "#,
        )
        .bind(types.len() as i64)
        .bind(serde_json::to_string(&types)?)
        .bind(query.min_importance)
        .bind(prefix.as_deref())
        .bind(prefix.as_deref())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.into_node()).collect()
    }

    async fn load_top_nodes(&self, limit: usize) -> Result<Vec<Node>> {
        let rows: Vec<NodeRow> = sqlx::query_as(
            "SELECT * FROM nodes ORDER BY importance DESC, access_count DESC, id LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.into_node()).collect()
    }

    async fn load_edges_among_top(&self, limit: usize) -> Result<Vec<Edge>> {
        let rows: Vec<EdgeRow> = sqlx::query_as(
            r#"
            WITH top AS (
                SELECT id FROM nodes
                ORDER BY importance DESC, access_count DESC, id
                LIMIT ?
            )
            SELECT e.* FROM edges e
            WHERE e.source_id IN (SELECT id FROM top)
              AND e.target_id IN (SELECT id FROM top)
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.into_edge()).collect()
    }

    async fn edges_among(
        &self,
        ids: &[String],
        edge_types: Option<&[EdgeType]>,
        min_weight: f64,
    ) -> Result<Vec<Edge>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let types: Vec<&str> = edge_types
            .unwrap_or_default()
            .iter()
            .map(EdgeType::as_str)
            .collect();
        let ids_json = serde_json::to_string(ids)?;

        let rows: Vec<EdgeRow> = sqlx::query_as(
            r#"
            SELECT * FROM edges
            WHERE source_id IN (SELECT value FROM json_each(?))
              AND target_id IN (SELECT value FROM json_each(?))
              AND weight >= ?
              AND (? = 0 OR edge_type IN (SELECT value FROM json_each(?)))
            "#,
        )
        .bind(&ids_json)
        .bind(&ids_json)
        .bind(min_weight)
        .bind(types.len() as i64)
        .bind(serde_json::to_string(&types)?)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.into_edge()).collect()
    }

    // ========== Traversal ==========

    async fn traverse(
        &self,
        start_id: &str,
        max_depth: u32,
        edge_types: Option<&[EdgeType]>,
        min_weight: f64,
    ) -> Result<Vec<TraversalRow>> {
        if max_depth == 0 {
            return Ok(Vec::new());
        }

        let types: Vec<&str> = edge_types
            .unwrap_or_default()
            .iter()
            .map(EdgeType::as_str)
            .collect();

        // Paths are stored as ",a,b,c," so membership is a substring test.
        // SQLite returns the bare `path` column from the MIN(depth) row.
        let rows: Vec<(String, i64, String)> = sqlx::query_as(
            r#"
            WITH RECURSIVE reachable(node_id, depth, path) AS (
                SELECT ?, 0, ',' || ? || ','

                UNION ALL

                SELECT
                    e.target_id,
                    r.depth + 1,
                    r.path || e.target_id || ','
                FROM reachable r
                JOIN edges e ON e.source_id = r.node_id
                WHERE r.depth < ?
                    AND e.weight >= ?
                    AND (? = 0 OR e.edge_type IN (SELECT value FROM json_each(?)))
                    AND instr(r.path, ',' || e.target_id || ',') = 0
            )
            SELECT node_id, MIN(depth) AS min_depth, path
            FROM reachable
            WHERE depth > 0
            GROUP BY node_id
            ORDER BY min_depth, node_id
            "#,
        )
        .bind(start_id)
        .bind(start_id)
        .bind(max_depth as i64)
        .bind(min_weight)
        .bind(types.len() as i64)
        .bind(serde_json::to_string(&types)?)
        .fetch_all(&self.pool)
        .await?;

        debug!(start = %start_id, max_depth, reached = rows.len(), "Store traversal");

        Ok(rows
            .into_iter()
            .map(|(node_id, depth, path)| TraversalRow {
                node_id,
                depth: depth as u32,
                path: path
                    .split(',')
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect(),
            })
            .collect())
    }

    // ========== Connectivity & stats ==========

    async fn connectivity(&self, id: &str) -> Result<Option<Connectivity>> {
        let row: Option<ConnectivityRow> =
            sqlx::query_as("SELECT * FROM node_connectivity WHERE node_id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(ConnectivityRow::into_connectivity))
    }

    async fn connectivity_all(&self) -> Result<Vec<Connectivity>> {
        let rows: Vec<ConnectivityRow> =
            sqlx::query_as("SELECT * FROM node_connectivity ORDER BY node_id")
                .fetch_all(&self.pool)
                .await?;

        Ok(rows.into_iter().map(ConnectivityRow::into_connectivity).collect())
    }

    async fn counts(&self) -> Result<StoreCounts> {
        let (nodes,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM nodes")
            .fetch_one(&self.pool)
            .await?;
        let (edges,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM edges")
            .fetch_one(&self.pool)
            .await?;

        Ok(StoreCounts {
            nodes: nodes as u64,
            edges: edges as u64,
        })
    }

    async fn health_check(&self) -> Result<()> {
        if self.pool.is_closed() {
            return Err(Error::StoreUnavailable("connection pool is closed".to_string()));
        }
        sqlx::query("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

// ========== Row types ==========

#[derive(Debug, FromRow)]
struct NodeRow {
    id: String,
    name: String,
    node_type: String,
    attributes: String,
    importance: f64,
    context_relevance: String,
    access_count: i64,
    last_accessed: String,
    version: i64,
    embedding: Option<Vec<u8>>,
    name_lower: String,
    search_terms: String,
    created_at: String,
}

impl NodeRow {
    fn into_node(self) -> Result<Node> {
        let node_type = NodeType::parse(&self.node_type)
            .ok_or_else(|| Error::Other(format!("Invalid node type: {}", self.node_type)))?;

        Ok(Node {
            id: self.id,
            name: self.name,
            node_type,
            attributes: serde_json::from_str(&self.attributes)?,
            importance: self.importance,
            activation: 0.0,
            context_relevance: serde_json::from_str(&self.context_relevance)?,
            access_count: self.access_count.max(0) as u64,
            last_accessed: parse_timestamp(&self.last_accessed),
            version: self.version.max(0) as u64,
            embedding: self.embedding.as_deref().map(decode_embedding),
            name_lower: self.name_lower,
            search_terms: self.search_terms,
            created_at: parse_timestamp(&self.created_at),
        })
    }
}

#[derive(Debug, FromRow)]
struct EdgeRow {
    id: String,
    source_id: String,
    target_id: String,
    edge_type: String,
    weight: f64,
    confidence: f64,
    attributes: String,
    reinforcement_count: i64,
    last_reinforced: String,
    decay_rate: f64,
    created_at: String,
}

impl EdgeRow {
    fn into_edge(self) -> Result<Edge> {
        let edge_type = EdgeType::parse(&self.edge_type)
            .ok_or_else(|| Error::Other(format!("Invalid edge type: {}", self.edge_type)))?;

        Ok(Edge {
            id: self.id,
            source_id: self.source_id,
            target_id: self.target_id,
            edge_type,
            weight: self.weight,
            confidence: self.confidence,
            attributes: serde_json::from_str(&self.attributes)?,
            reinforcement_count: self.reinforcement_count.max(0) as u64,
            last_reinforced: parse_timestamp(&self.last_reinforced),
            decay_rate: self.decay_rate,
            created_at: parse_timestamp(&self.created_at),
        })
    }
}

#[derive(Debug, FromRow)]
struct ConnectivityRow {
    node_id: String,
    in_degree: i64,
    out_degree: i64,
    avg_weight: f64,
}

impl ConnectivityRow {
    fn into_connectivity(self) -> Connectivity {
        Connectivity {
            node_id: self.node_id,
            in_degree: self.in_degree.max(0) as u64,
            out_degree: self.out_degree.max(0) as u64,
            avg_weight: self.avg_weight,
        }
    }
}

fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn decode_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

fn escape_like(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::graph::{EdgeType, NodeType};
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup_test_db() -> SqliteGraphRepository {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create test pool");

        let repo = SqliteGraphRepository::new(pool);
        repo.ensure_schema().await.expect("Failed to run migrations");
        repo
    }

    fn node(name: &str, importance: f64) -> Node {
        Node::new(name, NodeType::Concept).with_importance(importance)
    }

    fn edge(source: &Node, target: &Node, edge_type: EdgeType, weight: f64) -> Edge {
        Edge::new(&source.id, &target.id, edge_type).with_weight(weight)
    }

    /// a -> b -> c -> a (cycle), b -> d (weak), a -> e (part_of)
    async fn seed_graph(repo: &SqliteGraphRepository) -> Vec<Node> {
        let nodes: Vec<Node> = ["a", "b", "c", "d", "e"]
            .iter()
            .enumerate()
            .map(|(i, n)| node(n, 0.9 - i as f64 * 0.1))
            .collect();
        repo.upsert_nodes(&nodes).await.unwrap();

        let edges = vec![
            edge(&nodes[0], &nodes[1], EdgeType::Uses, 0.8),
            edge(&nodes[1], &nodes[2], EdgeType::Uses, 0.7),
            edge(&nodes[2], &nodes[0], EdgeType::Uses, 0.6),
            edge(&nodes[1], &nodes[3], EdgeType::Uses, 0.1),
            edge(&nodes[0], &nodes[4], EdgeType::PartOf, 0.9),
        ];
        repo.upsert_edges(&edges).await.unwrap();
        nodes
    }

    #[tokio::test]
    async fn test_upsert_and_get_node() {
        let repo = setup_test_db().await;

        let mut original = Node::new("Tokio", NodeType::Technology)
            .with_importance(0.8)
            .with_embedding(vec![0.25, -1.5, 3.0]);
        original.attributes.insert("kind".into(), "runtime".into());
        original.context_relevance.insert("async".into(), 0.9);
        repo.upsert_nodes(std::slice::from_ref(&original)).await.unwrap();

        let stored = repo.get_node(&original.id).await.unwrap().unwrap();
        assert_eq!(stored.name, "Tokio");
        assert_eq!(stored.node_type, NodeType::Technology);
        assert_eq!(stored.importance, 0.8);
        assert_eq!(stored.attributes["kind"].as_str(), Some("runtime"));
        assert_eq!(stored.context_relevance["async"], 0.9);
        assert_eq!(stored.embedding, Some(vec![0.25, -1.5, 3.0]));

        assert!(repo.get_node("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let repo = setup_test_db().await;

        let mut n = node("rust", 0.4);
        repo.upsert_nodes(std::slice::from_ref(&n)).await.unwrap();
        n.reinforce(&node("rust", 0.7));
        repo.upsert_nodes(std::slice::from_ref(&n)).await.unwrap();

        let counts = repo.counts().await.unwrap();
        assert_eq!(counts.nodes, 1);

        let stored = repo.get_node(&n.id).await.unwrap().unwrap();
        assert_eq!(stored.importance, 0.7);
        assert_eq!(stored.access_count, 2);
        assert_eq!(stored.version, 2);
    }

    #[tokio::test]
    async fn test_dangling_edge_rolls_back_batch() {
        let repo = setup_test_db().await;
        let a = node("a", 0.5);
        let b = node("b", 0.5);
        repo.upsert_nodes(std::slice::from_ref(&a)).await.unwrap();

        let good = Edge::new(&a.id, &a.id, EdgeType::RelatesTo);
        let dangling = Edge::new(&a.id, &b.id, EdgeType::Uses);
        let result = repo.upsert_edges(&[good, dangling]).await;

        assert!(result.is_err());
        assert_eq!(repo.counts().await.unwrap().edges, 0);
    }

    #[tokio::test]
    async fn test_get_nodes_and_existing_ids() {
        let repo = setup_test_db().await;
        let nodes = seed_graph(&repo).await;

        let wanted = vec![nodes[0].id.clone(), nodes[2].id.clone(), "ghost".to_string()];
        let fetched = repo.get_nodes(&wanted).await.unwrap();
        assert_eq!(fetched.len(), 2);

        let mut existing = repo.existing_node_ids(&wanted).await.unwrap();
        existing.sort();
        let mut expected = vec![nodes[0].id.clone(), nodes[2].id.clone()];
        expected.sort();
        assert_eq!(existing, expected);
    }

    #[tokio::test]
    async fn test_get_edges_by_id() {
        let repo = setup_test_db().await;
        let nodes = seed_graph(&repo).await;

        let known = Edge::new(&nodes[0].id, &nodes[1].id, EdgeType::Uses);
        let fetched = repo
            .get_edges(&[known.id.clone(), "ghost".to_string()])
            .await
            .unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].weight, 0.8);

        assert!(repo.get_edges(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_query_nodes_filters_and_orders() {
        let repo = setup_test_db().await;
        let tool = Node::new("cargo", NodeType::Tool).with_importance(0.95);
        let low = Node::new("cargo-make", NodeType::Tool).with_importance(0.2);
        let concept = Node::new("ownership", NodeType::Concept).with_importance(0.6);
        repo.upsert_nodes(&[low.clone(), concept.clone(), tool.clone()])
            .await
            .unwrap();

        let tools = repo
            .query_nodes(&NodeQuery::new().with_types(vec![NodeType::Tool]))
            .await
            .unwrap();
        assert_eq!(
            tools.iter().map(|n| n.name.as_str()).collect::<Vec<_>>(),
            vec!["cargo", "cargo-make"]
        );

        let important = repo
            .query_nodes(&NodeQuery::new().with_min_importance(0.5).with_limit(1))
            .await
            .unwrap();
        assert_eq!(important.len(), 1);
        assert_eq!(important[0].id, tool.id);

        let prefixed = repo
            .query_nodes(&NodeQuery::new().with_name_prefix("Cargo-"))
            .await
            .unwrap();
        assert_eq!(prefixed.len(), 1);
        assert_eq!(prefixed[0].id, low.id);
    }

    #[tokio::test]
    async fn test_traverse_depth_and_cycles() {
        let repo = setup_test_db().await;
        let nodes = seed_graph(&repo).await;

        let rows = repo.traverse(&nodes[0].id, 3, None, 0.0).await.unwrap();
        let reached: Vec<&str> = rows.iter().map(|r| r.node_id.as_str()).collect();

        // start node is never returned even though c -> a closes a cycle
        assert!(!reached.contains(&nodes[0].id.as_str()));
        assert_eq!(rows.len(), 4);

        let c = rows.iter().find(|r| r.node_id == nodes[2].id).unwrap();
        assert_eq!(c.depth, 2);
        assert_eq!(c.path, vec![nodes[0].id.clone(), nodes[1].id.clone(), nodes[2].id.clone()]);

        for row in &rows {
            let mut unique = row.path.clone();
            unique.sort();
            unique.dedup();
            assert_eq!(unique.len(), row.path.len(), "path revisits a node");
        }
    }

    #[tokio::test]
    async fn test_traverse_filters() {
        let repo = setup_test_db().await;
        let nodes = seed_graph(&repo).await;

        let rows = repo.traverse(&nodes[0].id, 1, None, 0.0).await.unwrap();
        assert_eq!(rows.len(), 2);

        let rows = repo
            .traverse(&nodes[0].id, 3, Some(&[EdgeType::Uses]), 0.5)
            .await
            .unwrap();
        let reached: Vec<&str> = rows.iter().map(|r| r.node_id.as_str()).collect();
        assert_eq!(reached.len(), 2);
        assert!(reached.contains(&nodes[1].id.as_str()));
        assert!(reached.contains(&nodes[2].id.as_str()));

        assert!(repo.traverse("ghost", 3, None, 0.0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_edges_among() {
        let repo = setup_test_db().await;
        let nodes = seed_graph(&repo).await;

        let ids = vec![nodes[0].id.clone(), nodes[1].id.clone(), nodes[4].id.clone()];
        let all = repo.edges_among(&ids, None, 0.0).await.unwrap();
        assert_eq!(all.len(), 2);

        let uses = repo
            .edges_among(&ids, Some(&[EdgeType::Uses]), 0.0)
            .await
            .unwrap();
        assert_eq!(uses.len(), 1);
        assert_eq!(uses[0].edge_type, EdgeType::Uses);
    }

    #[tokio::test]
    async fn test_load_top_nodes_and_edges() {
        let repo = setup_test_db().await;
        let nodes = seed_graph(&repo).await;

        let top = repo.load_top_nodes(3).await.unwrap();
        assert_eq!(
            top.iter().map(|n| n.id.clone()).collect::<Vec<_>>(),
            vec![nodes[0].id.clone(), nodes[1].id.clone(), nodes[2].id.clone()]
        );

        // a->b, b->c, c->a survive; b->d and a->e leave the top three
        let edges = repo.load_edges_among_top(3).await.unwrap();
        assert_eq!(edges.len(), 3);
    }

    #[tokio::test]
    async fn test_connectivity_view() {
        let repo = setup_test_db().await;
        let nodes = seed_graph(&repo).await;

        let a = repo.connectivity(&nodes[0].id).await.unwrap().unwrap();
        assert_eq!(a.out_degree, 2);
        assert_eq!(a.in_degree, 1);
        assert!((a.avg_weight - (0.8 + 0.6 + 0.9) / 3.0).abs() < 1e-9);

        let all = repo.connectivity_all().await.unwrap();
        assert_eq!(all.len(), 5);
        assert!(repo.connectivity("ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_importance() {
        let repo = setup_test_db().await;
        let nodes = seed_graph(&repo).await;

        repo.update_importance(&[(nodes[3].id.clone(), 0.99)])
            .await
            .unwrap();
        let stored = repo.get_node(&nodes[3].id).await.unwrap().unwrap();
        assert_eq!(stored.importance, 0.99);
    }

    #[tokio::test]
    async fn test_closed_pool_is_unavailable() {
        let repo = setup_test_db().await;
        repo.close().await;

        let err = repo.health_check().await.unwrap_err();
        assert!(err.is_store_unavailable());
        let err = repo.counts().await.unwrap_err();
        assert!(err.is_store_unavailable());
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("50%_off"), "50\\%\\_off");
    }
}
