//! Memory-bridge payloads: one JSON document describing a whole exchange.
//!
//! ```text
//! { "session":    { "id": ..., <props> },
//!   "chronology": { "day_id", "date", "year", "time", "next_links", "last_event_id" },
//!   "nodes":      [ { "type", "data": { "id", ... }, "relations": [...] } ] }
//! ```
//!
//! Compiles to: session, chronology, nodes (+anchors, relations), `NEXT`
//! links, then the `LAST_EVENT` pointer.

use crate::literal::{Literal, literal_text};
use crate::mutation::{
    AddNode, Chronology, CompileError, REL_NEXT, RelationSpec, SESSION_LABEL, TemporalAnchor,
    UpdateLastPointer,
};
use crate::statement::{NodeMatch, Statement};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Errors raised while reading a bridge payload.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("no input data provided")]
    Empty,

    #[error("invalid JSON: {0}")]
    Json(String),

    #[error(transparent)]
    Compile(#[from] CompileError),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BridgePayload {
    #[serde(default)]
    pub session: Option<Map<String, Value>>,
    #[serde(default)]
    pub chronology: Option<BridgeChronology>,
    #[serde(default)]
    pub nodes: Vec<BridgeNode>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BridgeChronology {
    #[serde(default)]
    pub day_id: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub year: Option<i64>,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub next_links: Vec<BridgeLink>,
    #[serde(default)]
    pub last_event_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BridgeLink {
    #[serde(default)]
    pub source_id: Option<String>,
    #[serde(default)]
    pub target_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BridgeNode {
    #[serde(rename = "type", default)]
    pub node_type: Option<String>,
    #[serde(default)]
    pub data: Map<String, Value>,
    #[serde(default)]
    pub relations: Vec<RelationSpec>,
}

impl BridgePayload {
    /// Parse raw stdin text, tolerating a leading UTF-8 BOM.
    pub fn parse(input: &str) -> Result<Self, BridgeError> {
        let input = input.strip_prefix('\u{feff}').unwrap_or(input);
        if input.trim().is_empty() {
            return Err(BridgeError::Empty);
        }
        serde_json::from_str(input).map_err(|e| BridgeError::Json(e.to_string()))
    }

    fn session_id(&self) -> Option<String> {
        let session = self.session.as_ref()?;
        let id = literal_text(session.get("id"));
        (!id.trim().is_empty()).then_some(id)
    }

    pub fn compile(&self) -> Result<Vec<Statement>, BridgeError> {
        let mut statements = Vec::new();
        let session_id = self.session_id();

        if let (Some(session), Some(id)) = (&self.session, &session_id) {
            let mut props = session
                .iter()
                .filter(|(name, _)| name.as_str() != "id")
                .map(|(name, value)| (name.clone(), Literal::from_json(Some(value))))
                .collect::<Vec<_>>();
            props.sort_by(|a, b| a.0.cmp(&b.0));
            statements.push(Statement::merge_node(
                SESSION_LABEL,
                vec![("id".to_string(), Literal::from(id.as_str()))],
                props,
            ));
        }

        let chronology = self.chronology.as_ref();
        if let Some(c) = chronology
            && let (Some(day_id), Some(date), Some(year)) = (&c.day_id, &c.date, c.year)
            && !day_id.is_empty()
            && !date.is_empty()
        {
            statements.extend(
                Chronology {
                    year,
                    date: date.clone(),
                    day_id: day_id.clone(),
                }
                .compile()?,
            );
        }

        let anchor = chronology.and_then(|c| match (&c.day_id, &c.time) {
            (Some(day_id), Some(time)) => Some(TemporalAnchor {
                day_id: day_id.clone(),
                time: time.clone(),
            }),
            _ => None,
        });

        for (index, node) in self.nodes.iter().enumerate() {
            let request = AddNode {
                node_type: node.node_type.clone().unwrap_or_default(),
                properties: node.data.clone(),
                anchor: anchor.clone(),
                relations: node.relations.clone(),
            };
            match request.compile() {
                Ok(compiled) => statements.extend(compiled),
                Err(e) => tracing::debug!(index, error = %e, "skipping bridge node"),
            }
        }

        if let Some(c) = chronology {
            for link in &c.next_links {
                let (Some(source), Some(target)) = (&link.source_id, &link.target_id) else {
                    continue;
                };
                if source.trim().is_empty() || target.trim().is_empty() {
                    continue;
                }
                statements.push(Statement::merge_relation(
                    NodeMatch::any(source),
                    REL_NEXT,
                    NodeMatch::any(target),
                    vec![],
                    vec![],
                ));
            }

            if let (Some(event_id), Some(session_id)) = (&c.last_event_id, &session_id)
                && !event_id.trim().is_empty()
            {
                statements.extend(
                    UpdateLastPointer {
                        session_id: session_id.clone(),
                        event_id: event_id.clone(),
                    }
                    .compile()?,
                );
            }
        }

        Ok(statements)
    }
}
