//! Typed mutation requests and their compilation into ordered statements.
//!
//! Compilation is pure and deterministic. Statement order is part of the
//! contract: chronology and node merges always precede the relation
//! statements that match on them.

use crate::literal::{Literal, literal_text};
use crate::statement::{NodeMatch, Property, Statement};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Node type that never receives a `HAPPENED_AT` anchor.
pub const ENTITY_NODE_TYPE: &str = "Entity";
pub const SESSION_LABEL: &str = "Session";
pub const YEAR_LABEL: &str = "Year";
pub const DAY_LABEL: &str = "Day";
pub const REL_MONTH: &str = "MONTH";
pub const REL_HAPPENED_AT: &str = "HAPPENED_AT";
pub const REL_LAST_EVENT: &str = "LAST_EVENT";
pub const REL_NEXT: &str = "NEXT";
pub const SESSION_STATUS_ACTIVE: &str = "active";

/// Errors raised while compiling a request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompileError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("invalid date `{0}` (expected YYYY-MM-DD)")]
    InvalidDate(String),
}

/// Open (or re-open) a session and its chronology.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenSession {
    pub session_id: String,
    pub name: String,
    pub topic: String,
    pub trigger: String,
    /// `YYYY-MM-DD`.
    pub date: String,
    pub year: i64,
}

/// Year and day nodes plus the `MONTH` edge between them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chronology {
    pub year: i64,
    pub date: String,
    pub day_id: String,
}

/// Day node and time a node is anchored to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemporalAnchor {
    pub day_id: String,
    pub time: String,
}

/// One outgoing relation declared alongside a node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelationSpec {
    #[serde(rename = "type", default)]
    pub rel_type: Option<String>,
    #[serde(default)]
    pub target_id: Option<String>,
    #[serde(default)]
    pub props: Option<Map<String, Value>>,
}

/// Merge one node by id and label, with its anchor and relations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddNode {
    pub node_type: String,
    /// Must carry `id`; every other key becomes a property.
    pub properties: Map<String, Value>,
    #[serde(default)]
    pub anchor: Option<TemporalAnchor>,
    #[serde(default)]
    pub relations: Vec<RelationSpec>,
}

/// Merge one typed relation between two existing nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkNodes {
    pub source_id: String,
    pub target_id: String,
    pub rel_type: String,
    #[serde(default)]
    pub props: Option<Map<String, Value>>,
}

/// Move a session's `LAST_EVENT` pointer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateLastPointer {
    pub session_id: String,
    pub event_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MutationRequest {
    OpenSession(OpenSession),
    AddNode(AddNode),
    LinkNodes(LinkNodes),
    UpdateLastPointer(UpdateLastPointer),
    BatchAddNodes { nodes: Vec<AddNode> },
    BatchLinkNodes { links: Vec<LinkNodes> },
}

impl MutationRequest {
    pub fn compile(&self) -> Result<Vec<Statement>, CompileError> {
        match self {
            Self::OpenSession(request) => request.compile(),
            Self::AddNode(request) => request.compile(),
            Self::LinkNodes(request) => request.compile().map(|stmt| vec![stmt]),
            Self::UpdateLastPointer(request) => request.compile(),
            Self::BatchAddNodes { nodes } => Ok(compile_node_batch(nodes)),
            Self::BatchLinkNodes { links } => Ok(compile_link_batch(links)),
        }
    }
}

impl OpenSession {
    pub fn chronology(&self) -> Result<Chronology, CompileError> {
        Ok(Chronology {
            year: self.year,
            date: self.date.clone(),
            day_id: day_id_for(&self.date)?,
        })
    }

    /// Session merge, then year, day, and the month edge.
    pub fn compile(&self) -> Result<Vec<Statement>, CompileError> {
        let session_id = required(&self.session_id, "session_id")?;
        let chronology = self.chronology()?;

        let mut statements = vec![Statement::merge_node(
            SESSION_LABEL,
            vec![id_property(session_id)],
            vec![
                ("name".to_string(), Literal::from(self.name.as_str())),
                ("topic".to_string(), Literal::from(self.topic.as_str())),
                ("status".to_string(), Literal::from(SESSION_STATUS_ACTIVE)),
                ("trigger".to_string(), Literal::from(self.trigger.as_str())),
            ],
        )];
        statements.extend(chronology.compile()?);
        Ok(statements)
    }
}

impl Chronology {
    pub fn year_id(&self) -> String {
        year_id_for(self.year)
    }

    pub fn compile(&self) -> Result<Vec<Statement>, CompileError> {
        let day_id = required(&self.day_id, "day_id")?;
        let month = month_of(&self.date)?;
        let year_id = self.year_id();

        Ok(vec![
            Statement::merge_node(
                YEAR_LABEL,
                vec![
                    ("value".to_string(), Literal::Int(self.year)),
                    id_property(&year_id),
                    ("name".to_string(), Literal::Text(self.year.to_string())),
                ],
                vec![],
            ),
            Statement::merge_node(
                DAY_LABEL,
                vec![
                    ("date".to_string(), Literal::from(self.date.as_str())),
                    id_property(day_id),
                    ("name".to_string(), Literal::from(self.date.as_str())),
                ],
                vec![],
            ),
            Statement::merge_relation(
                NodeMatch::labeled(YEAR_LABEL, year_id),
                REL_MONTH,
                NodeMatch::labeled(DAY_LABEL, day_id),
                vec![("number".to_string(), Literal::Int(i64::from(month)))],
                vec![],
            ),
        ])
    }
}

impl AddNode {
    pub fn id(&self) -> Option<String> {
        let id = literal_text(self.properties.get("id"));
        (!id.trim().is_empty()).then_some(id)
    }

    /// Node merge, then the day anchor, then each declared relation.
    pub fn compile(&self) -> Result<Vec<Statement>, CompileError> {
        let node_type = required(&self.node_type, "node_type")?;
        let id = self.id().ok_or(CompileError::MissingField("id"))?;

        let mut statements = vec![Statement::merge_node(
            node_type,
            vec![id_property(&id)],
            properties_of(&self.properties, Some("id")),
        )];

        if let Some(anchor) = &self.anchor
            && !anchor.day_id.is_empty()
            && !anchor.time.is_empty()
            && node_type != ENTITY_NODE_TYPE
        {
            statements.push(Statement::merge_relation(
                NodeMatch::any(&id),
                REL_HAPPENED_AT,
                NodeMatch::labeled(DAY_LABEL, &anchor.day_id),
                vec![("time".to_string(), Literal::from(anchor.time.as_str()))],
                vec![],
            ));
        }

        for relation in &self.relations {
            let (Some(rel_type), Some(target_id)) = (
                non_empty(relation.rel_type.as_deref()),
                non_empty(relation.target_id.as_deref()),
            ) else {
                tracing::debug!(node_id = %id, "skipping relation without type or target");
                continue;
            };
            statements.push(Statement::merge_relation(
                NodeMatch::any(&id),
                rel_type,
                NodeMatch::any(target_id),
                vec![],
                relation
                    .props
                    .as_ref()
                    .map(|props| properties_of(props, None))
                    .unwrap_or_default(),
            ));
        }

        Ok(statements)
    }
}

impl LinkNodes {
    pub fn compile(&self) -> Result<Statement, CompileError> {
        let source_id = required(&self.source_id, "source_id")?;
        let target_id = required(&self.target_id, "target_id")?;
        let rel_type = required(&self.rel_type, "rel_type")?;
        Ok(Statement::merge_relation(
            NodeMatch::any(source_id),
            rel_type,
            NodeMatch::any(target_id),
            vec![],
            self.props
                .as_ref()
                .map(|props| properties_of(props, None))
                .unwrap_or_default(),
        ))
    }
}

impl UpdateLastPointer {
    /// Drop the old pointer, then merge the new one.
    pub fn compile(&self) -> Result<Vec<Statement>, CompileError> {
        let session_id = required(&self.session_id, "session_id")?;
        let event_id = required(&self.event_id, "event_id")?;
        Ok(vec![
            Statement::delete_relations(
                NodeMatch::labeled(SESSION_LABEL, session_id),
                REL_LAST_EVENT,
            ),
            Statement::merge_relation(
                NodeMatch::labeled(SESSION_LABEL, session_id),
                REL_LAST_EVENT,
                NodeMatch::any(event_id),
                vec![],
                vec![],
            ),
        ])
    }
}

/// Compile nodes in input order, skipping any that cannot compile.
pub fn compile_node_batch(nodes: &[AddNode]) -> Vec<Statement> {
    let mut statements = Vec::new();
    for (index, node) in nodes.iter().enumerate() {
        match node.compile() {
            Ok(compiled) => statements.extend(compiled),
            Err(e) => tracing::debug!(index, error = %e, "skipping batch node"),
        }
    }
    statements
}

/// Compile links in input order, skipping any that cannot compile.
pub fn compile_link_batch(links: &[LinkNodes]) -> Vec<Statement> {
    let mut statements = Vec::new();
    for (index, link) in links.iter().enumerate() {
        match link.compile() {
            Ok(compiled) => statements.push(compiled),
            Err(e) => tracing::debug!(index, error = %e, "skipping batch link"),
        }
    }
    statements
}

pub fn year_id_for(year: i64) -> String {
    format!("year_{year}")
}

/// `2024-03-15` → `d_2024_03_15`.
pub fn day_id_for(date: &str) -> Result<String, CompileError> {
    parse_date(date)?;
    Ok(format!("d_{}", date.replace('-', "_")))
}

pub fn day_id_of(date: NaiveDate) -> String {
    date.format("d_%Y_%m_%d").to_string()
}

fn month_of(date: &str) -> Result<u32, CompileError> {
    parse_date(date).map(|date| date.month())
}

fn parse_date(date: &str) -> Result<NaiveDate, CompileError> {
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map_err(|_| CompileError::InvalidDate(date.to_string()))
}

fn id_property(id: &str) -> Property {
    ("id".to_string(), Literal::from(id))
}

/// Text properties sorted by key, optionally excluding one key.
fn properties_of(map: &Map<String, Value>, exclude: Option<&str>) -> Vec<Property> {
    let mut props = map
        .iter()
        .filter(|(name, _)| Some(name.as_str()) != exclude)
        .map(|(name, value)| (name.clone(), Literal::from_json(Some(value))))
        .collect::<Vec<_>>();
    props.sort_by(|a, b| a.0.cmp(&b.0));
    props
}

fn required<'a>(value: &'a str, field: &'static str) -> Result<&'a str, CompileError> {
    non_empty(Some(value)).ok_or(CompileError::MissingField(field))
}

/// Blank values count as missing; others pass through untouched.
fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statement::StatementOp;
    use serde_json::json;

    fn node(node_type: &str, data: Value) -> AddNode {
        AddNode {
            node_type: node_type.to_string(),
            properties: data.as_object().cloned().unwrap_or_default(),
            anchor: None,
            relations: Vec::new(),
        }
    }

    fn inline(statements: &[Statement]) -> Vec<String> {
        statements.iter().map(Statement::to_inline).collect()
    }

    #[test]
    fn open_session_compiles_session_then_chronology() {
        let request = OpenSession {
            session_id: "s1".to_string(),
            name: "A".to_string(),
            topic: "topic".to_string(),
            trigger: "/db".to_string(),
            date: "2024-03-15".to_string(),
            year: 2024,
        };
        assert_eq!(
            inline(&request.compile().expect("session should compile")),
            vec![
                r#"MERGE (n:Session {id: "s1"}) SET n += {name: "A", topic: "topic", status: "active", trigger: "/db"}"#,
                r#"MERGE (n:Year {value: 2024, id: "year_2024", name: "2024"})"#,
                r#"MERGE (n:Day {date: "2024-03-15", id: "d_2024_03_15", name: "2024-03-15"})"#,
                r#"MATCH (s:Year {id: "year_2024"}), (t:Day {id: "d_2024_03_15"}) MERGE (s)-[:MONTH {number: 3}]->(t)"#,
            ]
        );
    }

    #[test]
    fn open_session_rejects_malformed_date() {
        let request = OpenSession {
            session_id: "s1".to_string(),
            name: "A".to_string(),
            topic: "t".to_string(),
            trigger: "/db".to_string(),
            date: "2024/03/15".to_string(),
            year: 2024,
        };
        assert_eq!(
            request.compile(),
            Err(CompileError::InvalidDate("2024/03/15".to_string()))
        );
    }

    #[test]
    fn add_node_orders_merge_anchor_relations() {
        let mut request = node("Request", json!({"id": "r1", "text": "hi", "author": "user"}));
        request.anchor = Some(TemporalAnchor {
            day_id: "d_2024_03_15".to_string(),
            time: "10:00:00".to_string(),
        });
        request.relations = vec![
            RelationSpec {
                rel_type: Some("PART_OF".to_string()),
                target_id: Some("s1".to_string()),
                props: None,
            },
            RelationSpec {
                rel_type: None,
                target_id: Some("ignored".to_string()),
                props: None,
            },
            RelationSpec {
                rel_type: Some("MENTIONS".to_string()),
                target_id: Some("e1".to_string()),
                props: json!({"weight": 2}).as_object().cloned(),
            },
        ];

        assert_eq!(
            inline(&request.compile().expect("node should compile")),
            vec![
                r#"MERGE (n:Request {id: "r1"}) SET n += {author: "user", text: "hi"}"#,
                r#"MATCH (s {id: "r1"}), (t:Day {id: "d_2024_03_15"}) MERGE (s)-[:HAPPENED_AT {time: "10:00:00"}]->(t)"#,
                r#"MATCH (s {id: "r1"}), (t {id: "s1"}) MERGE (s)-[:PART_OF]->(t)"#,
                r#"MATCH (s {id: "r1"}), (t {id: "e1"}) MERGE (s)-[r:MENTIONS]->(t) SET r += {weight: "2"}"#,
            ]
        );
    }

    #[test]
    fn entity_nodes_are_never_anchored() {
        let mut request = node("Entity", json!({"id": "rust", "type": "Technology"}));
        request.anchor = Some(TemporalAnchor {
            day_id: "d_2024_03_15".to_string(),
            time: "10:00:00".to_string(),
        });
        let compiled = request.compile().expect("entity should compile");
        assert_eq!(compiled.len(), 1);
    }

    #[test]
    fn anchor_needs_both_day_and_time() {
        let mut request = node("Feedback", json!({"id": "f1"}));
        request.anchor = Some(TemporalAnchor {
            day_id: "d_2024_03_15".to_string(),
            time: String::new(),
        });
        assert_eq!(request.compile().expect("node should compile").len(), 1);
    }

    #[test]
    fn add_node_requires_id() {
        let request = node("Request", json!({"text": "no id"}));
        assert_eq!(request.compile(), Err(CompileError::MissingField("id")));
        let empty = node("Request", json!({"id": ""}));
        assert_eq!(empty.compile(), Err(CompileError::MissingField("id")));
        let blank = node("Request", json!({"id": "   "}));
        assert_eq!(blank.compile(), Err(CompileError::MissingField("id")));
    }

    #[test]
    fn identifiers_are_compiled_untrimmed() {
        let link = LinkNodes {
            source_id: " a".to_string(),
            target_id: "b ".to_string(),
            rel_type: "NEXT".to_string(),
            props: None,
        };
        assert_eq!(
            link.compile().map(|stmt| stmt.to_inline()),
            Ok(r#"MATCH (s {id: " a"}), (t {id: "b "}) MERGE (s)-[:NEXT]->(t)"#.to_string())
        );
        let blank = LinkNodes {
            source_id: "  ".to_string(),
            ..link
        };
        assert_eq!(blank.compile(), Err(CompileError::MissingField("source_id")));
    }

    #[test]
    fn null_property_compiles_to_empty_literal() {
        let request = node("Response", json!({"id": "x", "summary": null}));
        let compiled = request.compile().expect("node should compile");
        assert_eq!(
            compiled[0].to_inline(),
            r#"MERGE (n:Response {id: "x"}) SET n += {summary: ""}"#
        );
    }

    #[test]
    fn update_last_pointer_deletes_before_merge() {
        let compiled = UpdateLastPointer {
            session_id: "s1".to_string(),
            event_id: "e9".to_string(),
        }
        .compile()
        .expect("pointer should compile");
        assert!(matches!(
            compiled[0].op(),
            StatementOp::DeleteRelations { .. }
        ));
        assert!(matches!(compiled[1].op(), StatementOp::MergeRelation { .. }));
    }

    #[test]
    fn batches_skip_incomplete_items_in_order() {
        let nodes = vec![
            node("Request", json!({"id": "a"})),
            node("Request", json!({"text": "missing id"})),
            node("", json!({"id": "no-type"})),
            node("Response", json!({"id": "b"})),
        ];
        let compiled = MutationRequest::BatchAddNodes { nodes }
            .compile()
            .expect("batch never fails");
        assert_eq!(
            inline(&compiled),
            vec![
                r#"MERGE (n:Request {id: "a"})"#,
                r#"MERGE (n:Response {id: "b"})"#,
            ]
        );

        let links = vec![
            LinkNodes {
                source_id: "a".to_string(),
                target_id: "b".to_string(),
                rel_type: "NEXT".to_string(),
                props: None,
            },
            LinkNodes {
                source_id: "a".to_string(),
                target_id: String::new(),
                rel_type: "NEXT".to_string(),
                props: None,
            },
        ];
        let compiled = MutationRequest::BatchLinkNodes { links }
            .compile()
            .expect("batch never fails");
        assert_eq!(compiled.len(), 1);
    }

    #[test]
    fn compilation_is_deterministic() {
        let request = MutationRequest::AddNode(node(
            "Analysis",
            json!({"id": "an1", "verdict": "correct", "lessons": "x", "errors": ""}),
        ));
        assert_eq!(request.compile(), request.compile());
    }
}
