//! Compiled mutation statements.
//!
//! A [`Statement`] is structured first and rendered second. The inline form
//! is the escaped-literal text older graph backends accept; the
//! parameterized form keeps every caller value out of the statement text.

use crate::literal::{Literal, quote_identifier, quote_text};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One named property in a pattern or a `SET +=` map.
pub type Property = (String, Literal);

/// A node pattern matched by identifier, optionally narrowed by label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeMatch {
    pub label: Option<String>,
    pub id: String,
}

impl NodeMatch {
    pub fn any(id: impl Into<String>) -> Self {
        Self {
            label: None,
            id: id.into(),
        }
    }

    pub fn labeled(label: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
            id: id.into(),
        }
    }

    fn render(&self, var: &str) -> String {
        match &self.label {
            Some(label) => format!(
                "({var}:{} {{id: {}}})",
                quote_identifier(label),
                quote_text(&self.id)
            ),
            None => format!("({var} {{id: {}}})", quote_text(&self.id)),
        }
    }

    fn render_param(&self, var: &str, param: &str) -> String {
        match &self.label {
            Some(label) => format!("({var}:{} {{id: ${param}}})", quote_identifier(label)),
            None => format!("({var} {{id: ${param}}})"),
        }
    }
}

/// The structured form of one statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum StatementOp {
    /// Create-or-match a node on `label` + every `key` property, then
    /// overwrite `set`.
    MergeNode {
        label: String,
        key: Vec<Property>,
        set: Vec<Property>,
    },
    /// Create-or-match `(source)-[rel_type key]->(target)`, then overwrite
    /// `set` on the relation.
    MergeRelation {
        source: NodeMatch,
        target: NodeMatch,
        rel_type: String,
        key: Vec<Property>,
        set: Vec<Property>,
    },
    /// Remove every outgoing `rel_type` relation of `source`.
    DeleteRelations { source: NodeMatch, rel_type: String },
}

/// Parameterized rendering of a statement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterizedStatement {
    pub text: String,
    pub params: Map<String, Value>,
}

/// One ordered, idempotent unit of graph mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statement {
    op: StatementOp,
}

impl Statement {
    pub fn new(op: StatementOp) -> Self {
        Self { op }
    }

    pub fn merge_node(label: impl Into<String>, key: Vec<Property>, set: Vec<Property>) -> Self {
        Self::new(StatementOp::MergeNode {
            label: label.into(),
            key,
            set,
        })
    }

    pub fn merge_relation(
        source: NodeMatch,
        rel_type: impl Into<String>,
        target: NodeMatch,
        key: Vec<Property>,
        set: Vec<Property>,
    ) -> Self {
        Self::new(StatementOp::MergeRelation {
            source,
            target,
            rel_type: rel_type.into(),
            key,
            set,
        })
    }

    pub fn delete_relations(source: NodeMatch, rel_type: impl Into<String>) -> Self {
        Self::new(StatementOp::DeleteRelations {
            source,
            rel_type: rel_type.into(),
        })
    }

    pub fn op(&self) -> &StatementOp {
        &self.op
    }

    /// Escaped-literal statement text.
    pub fn to_inline(&self) -> String {
        match &self.op {
            StatementOp::MergeNode { label, key, set } => {
                let mut text = format!(
                    "MERGE (n:{} {})",
                    quote_identifier(label),
                    inline_map(key)
                );
                if !set.is_empty() {
                    text.push_str(&format!(" SET n += {}", inline_map(set)));
                }
                text
            }
            StatementOp::MergeRelation {
                source,
                target,
                rel_type,
                key,
                set,
            } => {
                let key_part = if key.is_empty() {
                    String::new()
                } else {
                    format!(" {}", inline_map(key))
                };
                let var = if set.is_empty() { "" } else { "r" };
                let mut text = format!(
                    "MATCH {}, {} MERGE (s)-[{var}:{}{key_part}]->(t)",
                    source.render("s"),
                    target.render("t"),
                    quote_identifier(rel_type),
                );
                if !set.is_empty() {
                    text.push_str(&format!(" SET r += {}", inline_map(set)));
                }
                text
            }
            StatementOp::DeleteRelations { source, rel_type } => format!(
                "MATCH {}-[r:{}]->() DELETE r",
                source.render("s"),
                quote_identifier(rel_type)
            ),
        }
    }

    /// Statement text with `$name` placeholders and the matching parameters.
    ///
    /// Labels, relation types and property keys cannot be parameters; they
    /// go through identifier quoting instead.
    pub fn to_parameterized(&self) -> ParameterizedStatement {
        let mut params = Map::new();
        let text = match &self.op {
            StatementOp::MergeNode { label, key, set } => {
                let mut text = format!(
                    "MERGE (n:{} {})",
                    quote_identifier(label),
                    param_map(key, "key_", &mut params)
                );
                if !set.is_empty() {
                    params.insert("props".to_string(), json_map(set));
                    text.push_str(" SET n += $props");
                }
                text
            }
            StatementOp::MergeRelation {
                source,
                target,
                rel_type,
                key,
                set,
            } => {
                params.insert("source_id".to_string(), Value::String(source.id.clone()));
                params.insert("target_id".to_string(), Value::String(target.id.clone()));
                let key_part = if key.is_empty() {
                    String::new()
                } else {
                    format!(" {}", param_map(key, "key_", &mut params))
                };
                let var = if set.is_empty() { "" } else { "r" };
                let mut text = format!(
                    "MATCH {}, {} MERGE (s)-[{var}:{}{key_part}]->(t)",
                    source.render_param("s", "source_id"),
                    target.render_param("t", "target_id"),
                    quote_identifier(rel_type),
                );
                if !set.is_empty() {
                    params.insert("props".to_string(), json_map(set));
                    text.push_str(" SET r += $props");
                }
                text
            }
            StatementOp::DeleteRelations { source, rel_type } => {
                params.insert("source_id".to_string(), Value::String(source.id.clone()));
                format!(
                    "MATCH {}-[r:{}]->() DELETE r",
                    source.render_param("s", "source_id"),
                    quote_identifier(rel_type)
                )
            }
        };
        ParameterizedStatement { text, params }
    }
}

fn inline_map(props: &[Property]) -> String {
    let body = props
        .iter()
        .map(|(name, value)| format!("{}: {}", quote_identifier(name), value.render()))
        .collect::<Vec<_>>()
        .join(", ");
    format!("{{{body}}}")
}

fn param_map(props: &[Property], prefix: &str, params: &mut Map<String, Value>) -> String {
    let body = props
        .iter()
        .enumerate()
        .map(|(index, (name, value))| {
            let param = format!("{prefix}{index}");
            params.insert(param.clone(), value.to_json());
            format!("{}: ${param}", quote_identifier(name))
        })
        .collect::<Vec<_>>()
        .join(", ");
    format!("{{{body}}}")
}

fn json_map(props: &[Property]) -> Value {
    Value::Object(
        props
            .iter()
            .map(|(name, value)| (name.clone(), value.to_json()))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_merge_without_props_omits_set() {
        let stmt = Statement::merge_node("Entity", vec![("id".into(), "e1".into())], vec![]);
        assert_eq!(stmt.to_inline(), r#"MERGE (n:Entity {id: "e1"})"#);
    }

    #[test]
    fn relation_with_props_binds_variable() {
        let stmt = Statement::merge_relation(
            NodeMatch::any("a"),
            "PART_OF",
            NodeMatch::any("b"),
            vec![],
            vec![("weight".into(), "high".into())],
        );
        assert_eq!(
            stmt.to_inline(),
            r#"MATCH (s {id: "a"}), (t {id: "b"}) MERGE (s)-[r:PART_OF]->(t) SET r += {weight: "high"}"#
        );
    }

    #[test]
    fn parameterized_form_keeps_values_out_of_text() {
        let stmt = Statement::merge_node(
            "Request",
            vec![("id".into(), "r\" }) DETACH DELETE n //".into())],
            vec![("text".into(), "hello".into())],
        );
        let rendered = stmt.to_parameterized();
        assert_eq!(rendered.text, "MERGE (n:Request {id: $key_0}) SET n += $props");
        assert_eq!(rendered.params["key_0"], "r\" }) DETACH DELETE n //");
        assert_eq!(rendered.params["props"]["text"], "hello");
    }

    #[test]
    fn delete_relations_renders_both_forms() {
        let stmt = Statement::delete_relations(NodeMatch::labeled("Session", "s1"), "LAST_EVENT");
        assert_eq!(
            stmt.to_inline(),
            r#"MATCH (s:Session {id: "s1"})-[r:LAST_EVENT]->() DELETE r"#
        );
        let rendered = stmt.to_parameterized();
        assert_eq!(
            rendered.text,
            "MATCH (s:Session {id: $source_id})-[r:LAST_EVENT]->() DELETE r"
        );
        assert_eq!(rendered.params["source_id"], "s1");
    }
}
