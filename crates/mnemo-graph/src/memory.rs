//! In-process property graph with merge semantics and an optional JSONL
//! snapshot.

use crate::query::ReadQuery;
use crate::snapshot::{self, SnapshotError, SnapshotLine};
use crate::statement::{NodeMatch, Property, Statement, StatementOp};
use crate::store::{GraphStore, GraphStoreError, Row};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphNode {
    pub labels: Vec<String>,
    pub properties: Map<String, Value>,
}

/// A directed relation between two nodes, by node position.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphRelation {
    pub rel_type: String,
    pub source: usize,
    pub target: usize,
    pub properties: Map<String, Value>,
}

/// Plain graph state. Nodes are never removed, so positions are stable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphData {
    nodes: Vec<GraphNode>,
    relations: Vec<GraphRelation>,
}

impl GraphData {
    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    pub fn relations(&self) -> &[GraphRelation] {
        &self.relations
    }

    /// Apply one statement. Relation statements whose endpoints match no
    /// node change nothing.
    pub fn apply(&mut self, op: &StatementOp) {
        match op {
            StatementOp::MergeNode { label, key, set } => {
                let index = match self.nodes.iter().position(|node| {
                    node.labels.contains(label) && has_properties(&node.properties, key)
                }) {
                    Some(index) => index,
                    None => {
                        self.nodes.push(GraphNode {
                            labels: vec![label.clone()],
                            properties: to_map(key),
                        });
                        self.nodes.len() - 1
                    }
                };
                self.nodes[index].properties.extend(to_map(set));
            }
            StatementOp::MergeRelation {
                source,
                target,
                rel_type,
                key,
                set,
            } => {
                let sources = self.find(source);
                let targets = self.find(target);
                for &s in &sources {
                    for &t in &targets {
                        self.merge_relation(s, t, rel_type, key, set);
                    }
                }
            }
            StatementOp::DeleteRelations { source, rel_type } => {
                let sources = self.find(source);
                self.relations
                    .retain(|rel| !(rel.rel_type == *rel_type && sources.contains(&rel.source)));
            }
        }
    }

    fn merge_relation(
        &mut self,
        source: usize,
        target: usize,
        rel_type: &str,
        key: &[Property],
        set: &[Property],
    ) {
        let existing = self.relations.iter().position(|rel| {
            rel.source == source
                && rel.target == target
                && rel.rel_type == rel_type
                && has_properties(&rel.properties, key)
        });
        let index = match existing {
            Some(index) => index,
            None => {
                self.relations.push(GraphRelation {
                    rel_type: rel_type.to_string(),
                    source,
                    target,
                    properties: to_map(key),
                });
                self.relations.len() - 1
            }
        };
        self.relations[index].properties.extend(to_map(set));
    }

    fn find(&self, pattern: &NodeMatch) -> Vec<usize> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| {
                pattern
                    .label
                    .as_ref()
                    .is_none_or(|label| node.labels.contains(label))
                    && node.properties.get("id").and_then(Value::as_str) == Some(pattern.id.as_str())
            })
            .map(|(index, _)| index)
            .collect()
    }

    fn to_lines(&self) -> Vec<SnapshotLine> {
        let nodes = self.nodes.iter().map(|node| SnapshotLine::Node {
            labels: node.labels.clone(),
            properties: node.properties.clone(),
        });
        let relations = self.relations.iter().map(|rel| SnapshotLine::Relation {
            rel_type: rel.rel_type.clone(),
            source: rel.source,
            target: rel.target,
            properties: rel.properties.clone(),
        });
        nodes.chain(relations).collect()
    }

    fn from_lines(lines: Vec<SnapshotLine>) -> Result<Self, SnapshotError> {
        let mut data = Self::default();
        let mut relations = Vec::new();
        for (line_no, line) in lines.into_iter().enumerate() {
            match line {
                SnapshotLine::Node { labels, properties } => {
                    data.nodes.push(GraphNode { labels, properties })
                }
                SnapshotLine::Relation {
                    rel_type,
                    source,
                    target,
                    properties,
                } => relations.push((
                    line_no + 1,
                    GraphRelation {
                        rel_type,
                        source,
                        target,
                        properties,
                    },
                )),
            }
        }
        for (line, relation) in relations {
            for index in [relation.source, relation.target] {
                if index >= data.nodes.len() {
                    return Err(SnapshotError::DanglingRelation { line, index });
                }
            }
            data.relations.push(relation);
        }
        Ok(data)
    }
}

fn has_properties(properties: &Map<String, Value>, wanted: &[Property]) -> bool {
    wanted
        .iter()
        .all(|(name, value)| properties.get(name) == Some(&value.to_json()))
}

fn to_map(props: &[Property]) -> Map<String, Value> {
    props
        .iter()
        .map(|(name, value)| (name.clone(), value.to_json()))
        .collect()
}

/// [`GraphStore`] backed by process memory.
///
/// With a snapshot, every applied statement clones the graph and rewrites the
/// whole file before the change is committed, so a batch of N statements costs
/// O(N * graph size). Suited to session-memory graphs, not bulk loads.
#[derive(Debug, Default)]
pub struct MemoryGraph {
    data: RwLock<GraphData>,
    snapshot: Option<PathBuf>,
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load `path` if it exists and persist every mutation back to it.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, SnapshotError> {
        let path = path.into();
        let data = GraphData::from_lines(snapshot::read_from_path(&path)?)?;
        tracing::debug!(
            path = %path.display(),
            nodes = data.nodes.len(),
            relations = data.relations.len(),
            "loaded graph snapshot"
        );
        Ok(Self {
            data: RwLock::new(data),
            snapshot: Some(path),
        })
    }

    pub fn snapshot_path(&self) -> Option<&Path> {
        self.snapshot.as_deref()
    }

    /// A copy of the current graph state.
    pub async fn data(&self) -> GraphData {
        self.data.read().await.clone()
    }
}

#[async_trait]
impl GraphStore for MemoryGraph {
    async fn ping(&self) -> Result<(), GraphStoreError> {
        Ok(())
    }

    async fn apply(&self, statement: &Statement) -> Result<Vec<Row>, GraphStoreError> {
        let mut guard = self.data.write().await;
        let Some(path) = self.snapshot.clone() else {
            guard.apply(statement.op());
            return Ok(Vec::new());
        };

        // Commit in memory only once the snapshot is on disk.
        let mut next = guard.clone();
        next.apply(statement.op());
        let lines = next.to_lines();
        tokio::task::spawn_blocking(move || snapshot::write_to_path(&path, &lines))
            .await
            .map_err(|e| GraphStoreError::Rejected(format!("snapshot writer failed: {e}")))?
            .map_err(|e| GraphStoreError::Rejected(format!("snapshot write failed: {e}")))?;
        *guard = next;
        Ok(Vec::new())
    }

    async fn query(&self, text: &str) -> Result<Vec<Row>, GraphStoreError> {
        let query =
            ReadQuery::parse(text).map_err(|e| GraphStoreError::UnsupportedQuery(e.to_string()))?;
        let guard = self.data.read().await;
        query
            .evaluate(&guard)
            .map_err(|e| GraphStoreError::UnsupportedQuery(e.to_string()))
    }
}
