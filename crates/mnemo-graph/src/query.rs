//! Read queries over the in-memory graph.
//!
//! Supported shape:
//!
//! ```text
//! MATCH (a[:Label] [{k: v, ...}]) [-[r[:TYPE] [{...}]]-> (b[:Label] [{...}])]
//! RETURN item[, item ...] [LIMIT n]
//! ```
//!
//! where an item is `var`, `var.prop` or a lone `count(var)` / `count(*)`,
//! each optionally followed by `AS alias`.

use crate::literal::unquote_literal;
use crate::memory::GraphData;
use crate::store::Row;
use serde_json::{Value, json};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    #[error("syntax error: {0}")]
    Syntax(String),

    #[error("unknown variable `{0}` in RETURN")]
    UnknownVariable(String),

    #[error("{0}")]
    Unsupported(String),
}

#[derive(Debug, Clone, PartialEq)]
struct NodePattern {
    var: Option<String>,
    label: Option<String>,
    props: Vec<(String, Value)>,
}

#[derive(Debug, Clone, PartialEq)]
struct RelPattern {
    var: Option<String>,
    rel_type: Option<String>,
    props: Vec<(String, Value)>,
}

#[derive(Debug, Clone, PartialEq)]
enum Pattern {
    Node(NodePattern),
    Path(NodePattern, RelPattern, NodePattern),
}

#[derive(Debug, Clone, PartialEq)]
enum Projection {
    Var(String),
    Prop(String, String),
    Count(Option<String>),
}

#[derive(Debug, Clone, PartialEq)]
struct ReturnItem {
    projection: Projection,
    column: String,
}

/// A parsed read query.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadQuery {
    pattern: Pattern,
    items: Vec<ReturnItem>,
    limit: Option<usize>,
}

#[derive(Debug, Clone, Copy)]
enum Bound {
    Node(usize),
    Relation(usize),
}

type Binding = BTreeMap<String, Bound>;

impl ReadQuery {
    pub fn parse(text: &str) -> Result<Self, QueryError> {
        Parser::new(tokenize(text)?).query()
    }

    pub fn evaluate(&self, graph: &GraphData) -> Result<Vec<Row>, QueryError> {
        self.check_variables()?;
        let bindings = self.bindings(graph);

        if let [
            ReturnItem {
                projection: Projection::Count(_),
                column,
            },
        ] = self.items.as_slice()
        {
            let mut row = Row::new();
            row.insert(column.clone(), Value::from(bindings.len()));
            return Ok(vec![row]);
        }

        let limit = self.limit.unwrap_or(usize::MAX);
        Ok(bindings
            .iter()
            .take(limit)
            .map(|binding| {
                self.items
                    .iter()
                    .map(|item| (item.column.clone(), project(graph, binding, &item.projection)))
                    .collect()
            })
            .collect())
    }

    fn variables(&self) -> Vec<&str> {
        let vars = match &self.pattern {
            Pattern::Node(node) => vec![&node.var],
            Pattern::Path(source, rel, target) => vec![&source.var, &rel.var, &target.var],
        };
        vars.into_iter().flatten().map(String::as_str).collect()
    }

    fn check_variables(&self) -> Result<(), QueryError> {
        let known = self.variables();
        for item in &self.items {
            let var = match &item.projection {
                Projection::Var(var) | Projection::Prop(var, _) => Some(var),
                Projection::Count(var) => var.as_ref(),
            };
            if let Some(var) = var
                && !known.contains(&var.as_str())
            {
                return Err(QueryError::UnknownVariable(var.clone()));
            }
        }
        Ok(())
    }

    fn bindings(&self, graph: &GraphData) -> Vec<Binding> {
        match &self.pattern {
            Pattern::Node(pattern) => graph
                .nodes()
                .iter()
                .enumerate()
                .filter(|(_, node)| node_matches(pattern, &node.labels, &node.properties))
                .map(|(index, _)| bind(&[(&pattern.var, Bound::Node(index))]))
                .collect(),
            Pattern::Path(source, rel, target) => graph
                .relations()
                .iter()
                .enumerate()
                .filter(|(_, relation)| {
                    rel.rel_type
                        .as_ref()
                        .is_none_or(|t| *t == relation.rel_type)
                        && props_match(&rel.props, &relation.properties)
                        && graph.nodes().get(relation.source).is_some_and(|node| {
                            node_matches(source, &node.labels, &node.properties)
                        })
                        && graph.nodes().get(relation.target).is_some_and(|node| {
                            node_matches(target, &node.labels, &node.properties)
                        })
                })
                .map(|(index, relation)| {
                    bind(&[
                        (&source.var, Bound::Node(relation.source)),
                        (&rel.var, Bound::Relation(index)),
                        (&target.var, Bound::Node(relation.target)),
                    ])
                })
                .collect(),
        }
    }
}

fn bind(entries: &[(&Option<String>, Bound)]) -> Binding {
    entries
        .iter()
        .filter_map(|(var, bound)| var.as_ref().map(|var| (var.clone(), *bound)))
        .collect()
}

fn node_matches(
    pattern: &NodePattern,
    labels: &[String],
    properties: &serde_json::Map<String, Value>,
) -> bool {
    pattern
        .label
        .as_ref()
        .is_none_or(|label| labels.contains(label))
        && props_match(&pattern.props, properties)
}

fn props_match(wanted: &[(String, Value)], properties: &serde_json::Map<String, Value>) -> bool {
    wanted
        .iter()
        .all(|(key, value)| properties.get(key) == Some(value))
}

fn project(graph: &GraphData, binding: &Binding, projection: &Projection) -> Value {
    let bound = |var: &str| binding.get(var).copied();
    match projection {
        Projection::Var(var) => match bound(var) {
            Some(Bound::Node(index)) => graph.nodes().get(index).map_or(Value::Null, |node| {
                json!({"labels": node.labels, "properties": node.properties})
            }),
            Some(Bound::Relation(index)) => {
                graph.relations().get(index).map_or(Value::Null, |rel| {
                    json!({"type": rel.rel_type, "properties": rel.properties})
                })
            }
            None => Value::Null,
        },
        Projection::Prop(var, key) => {
            let properties = match bound(var) {
                Some(Bound::Node(index)) => graph.nodes().get(index).map(|n| &n.properties),
                Some(Bound::Relation(index)) => {
                    graph.relations().get(index).map(|r| &r.properties)
                }
                None => None,
            };
            properties
                .and_then(|props| props.get(key))
                .cloned()
                .unwrap_or(Value::Null)
        }
        Projection::Count(_) => Value::Null,
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(String),
    Quoted(String),
    Text(String),
    Int(i64),
    Punct(char),
}

fn tokenize(text: &str) -> Result<Vec<Token>, QueryError> {
    let chars = text.chars().collect::<Vec<_>>();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if c.is_ascii_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            tokens.push(Token::Word(chars[start..i].iter().collect()));
        } else if c.is_ascii_digit() {
            let start = i;
            while i < chars.len() && chars[i].is_ascii_digit() {
                i += 1;
            }
            let digits = chars[start..i].iter().collect::<String>();
            let value = digits
                .parse()
                .map_err(|_| QueryError::Syntax(format!("integer out of range: {digits}")))?;
            tokens.push(Token::Int(value));
        } else if c == '"' || c == '\'' {
            let start = i;
            i += 1;
            while i < chars.len() && chars[i] != c {
                i += if chars[i] == '\\' { 2 } else { 1 };
            }
            if i >= chars.len() {
                return Err(QueryError::Syntax("unterminated string literal".to_string()));
            }
            i += 1;
            let raw = chars[start..i].iter().collect::<String>();
            let value = unquote_literal(&raw)
                .ok_or_else(|| QueryError::Syntax(format!("malformed string literal {raw}")))?;
            tokens.push(Token::Text(value));
        } else if c == '`' {
            let mut name = String::new();
            i += 1;
            loop {
                match (chars.get(i), chars.get(i + 1)) {
                    (Some('`'), Some('`')) => {
                        name.push('`');
                        i += 2;
                    }
                    (Some('`'), _) => {
                        i += 1;
                        break;
                    }
                    (Some(ch), _) => {
                        name.push(*ch);
                        i += 1;
                    }
                    (None, _) => {
                        return Err(QueryError::Syntax("unterminated identifier".to_string()));
                    }
                }
            }
            tokens.push(Token::Quoted(name));
        } else if "()[]{}:,.->*;".contains(c) {
            tokens.push(Token::Punct(c));
            i += 1;
        } else {
            return Err(QueryError::Syntax(format!("unexpected character `{c}`")));
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn at_punct(&self, c: char) -> bool {
        self.peek() == Some(&Token::Punct(c))
    }

    fn at_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Word(w)) if w.eq_ignore_ascii_case(keyword))
    }

    fn expect_punct(&mut self, c: char) -> Result<(), QueryError> {
        match self.next() {
            Some(Token::Punct(p)) if p == c => Ok(()),
            other => Err(QueryError::Syntax(format!("expected `{c}`, found {other:?}"))),
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<(), QueryError> {
        if self.at_keyword(keyword) {
            self.pos += 1;
            return Ok(());
        }
        match self.peek() {
            Some(Token::Word(word)) => Err(QueryError::Unsupported(format!(
                "only MATCH ... RETURN read queries are supported (found `{word}`)"
            ))),
            other => Err(QueryError::Syntax(format!(
                "expected {keyword}, found {other:?}"
            ))),
        }
    }

    fn name(&mut self) -> Result<String, QueryError> {
        match self.next() {
            Some(Token::Word(name)) | Some(Token::Quoted(name)) => Ok(name),
            other => Err(QueryError::Syntax(format!("expected a name, found {other:?}"))),
        }
    }

    fn optional_name(&mut self) -> Option<String> {
        match self.peek() {
            Some(Token::Word(_)) | Some(Token::Quoted(_)) => self.name().ok(),
            _ => None,
        }
    }

    fn query(mut self) -> Result<ReadQuery, QueryError> {
        self.expect_keyword("MATCH")?;
        let source = self.node()?;
        let pattern = if self.at_punct('-') {
            self.expect_punct('-')?;
            let rel = self.relation()?;
            self.expect_punct('-')?;
            self.expect_punct('>')?;
            Pattern::Path(source, rel, self.node()?)
        } else {
            Pattern::Node(source)
        };

        self.expect_keyword("RETURN")?;
        let mut items = vec![self.item()?];
        while self.at_punct(',') {
            self.pos += 1;
            items.push(self.item()?);
        }
        if items.len() > 1
            && items
                .iter()
                .any(|item| matches!(item.projection, Projection::Count(_)))
        {
            return Err(QueryError::Unsupported(
                "count() cannot be combined with other return items".to_string(),
            ));
        }

        let limit = if self.at_keyword("LIMIT") {
            self.pos += 1;
            match self.next() {
                Some(Token::Int(n)) => Some(usize::try_from(n).unwrap_or(usize::MAX)),
                other => {
                    return Err(QueryError::Syntax(format!(
                        "expected LIMIT count, found {other:?}"
                    )));
                }
            }
        } else {
            None
        };

        if self.at_punct(';') {
            self.pos += 1;
        }
        if let Some(token) = self.peek() {
            return Err(QueryError::Unsupported(format!(
                "unexpected trailing input at {token:?}"
            )));
        }

        Ok(ReadQuery {
            pattern,
            items,
            limit,
        })
    }

    fn node(&mut self) -> Result<NodePattern, QueryError> {
        self.expect_punct('(')?;
        let var = self.optional_name();
        let label = if self.at_punct(':') {
            self.pos += 1;
            Some(self.name()?)
        } else {
            None
        };
        let props = self.props()?;
        self.expect_punct(')')?;
        Ok(NodePattern { var, label, props })
    }

    fn relation(&mut self) -> Result<RelPattern, QueryError> {
        self.expect_punct('[')?;
        let var = self.optional_name();
        let rel_type = if self.at_punct(':') {
            self.pos += 1;
            Some(self.name()?)
        } else {
            None
        };
        let props = self.props()?;
        self.expect_punct(']')?;
        Ok(RelPattern {
            var,
            rel_type,
            props,
        })
    }

    fn props(&mut self) -> Result<Vec<(String, Value)>, QueryError> {
        let mut props = Vec::new();
        if !self.at_punct('{') {
            return Ok(props);
        }
        self.pos += 1;
        if self.at_punct('}') {
            self.pos += 1;
            return Ok(props);
        }
        loop {
            let key = self.name()?;
            self.expect_punct(':')?;
            let value = match self.next() {
                Some(Token::Text(text)) => Value::String(text),
                Some(Token::Int(n)) => Value::from(n),
                Some(Token::Punct('-')) => match self.next() {
                    Some(Token::Int(n)) => Value::from(-n),
                    other => {
                        return Err(QueryError::Syntax(format!(
                            "expected integer after `-`, found {other:?}"
                        )));
                    }
                },
                other => {
                    return Err(QueryError::Syntax(format!(
                        "expected a literal for `{key}`, found {other:?}"
                    )));
                }
            };
            props.push((key, value));
            match self.next() {
                Some(Token::Punct(',')) => continue,
                Some(Token::Punct('}')) => return Ok(props),
                other => {
                    return Err(QueryError::Syntax(format!(
                        "expected `,` or `}}`, found {other:?}"
                    )));
                }
            }
        }
    }

    fn item(&mut self) -> Result<ReturnItem, QueryError> {
        let name = self.name()?;
        let (projection, column) = if name.eq_ignore_ascii_case("count") && self.at_punct('(') {
            self.pos += 1;
            let var = if self.at_punct('*') {
                self.pos += 1;
                None
            } else {
                Some(self.name()?)
            };
            self.expect_punct(')')?;
            let column = format!("count({})", var.as_deref().unwrap_or("*"));
            (Projection::Count(var), column)
        } else if self.at_punct('.') {
            self.pos += 1;
            let key = self.name()?;
            let column = format!("{name}.{key}");
            (Projection::Prop(name, key), column)
        } else {
            (Projection::Var(name.clone()), name)
        };

        let column = if self.at_keyword("AS") {
            self.pos += 1;
            self.name()?
        } else {
            column
        };
        Ok(ReturnItem { projection, column })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutation::OpenSession;
    use crate::statement::{NodeMatch, Statement};

    fn session_graph() -> GraphData {
        let mut graph = GraphData::default();
        let statements = OpenSession {
            session_id: "s1".to_string(),
            name: "A".to_string(),
            topic: "topic".to_string(),
            trigger: "/db".to_string(),
            date: "2024-03-15".to_string(),
            year: 2024,
        }
        .compile()
        .expect("session should compile");
        for statement in &statements {
            graph.apply(statement.op());
        }
        graph
    }

    fn run(graph: &GraphData, text: &str) -> Vec<Row> {
        ReadQuery::parse(text)
            .expect("query should parse")
            .evaluate(graph)
            .expect("query should evaluate")
    }

    #[test]
    fn node_pattern_returns_whole_node() {
        let rows = run(&session_graph(), "MATCH (y:Year) RETURN y");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["y"]["labels"], json!(["Year"]));
        assert_eq!(rows[0]["y"]["properties"]["value"], json!(2024));
    }

    #[test]
    fn path_pattern_projects_properties_with_alias() {
        let rows = run(
            &session_graph(),
            "match (y:Year {id: 'year_2024'})-[m:MONTH]->(d:Day) return d.date AS day, m.number",
        );
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["day"], "2024-03-15");
        assert_eq!(rows[0]["m.number"], 3);
    }

    #[test]
    fn count_and_limit() {
        let graph = session_graph();
        let rows = run(&graph, "MATCH (n) RETURN count(n)");
        assert_eq!(rows[0]["count(n)"], 3);
        assert_eq!(run(&graph, "MATCH (n) RETURN n.id LIMIT 2").len(), 2);
    }

    #[test]
    fn escaped_literals_match_stored_values() {
        let mut graph = GraphData::default();
        let raw = r#"say "hi" \ bye"#;
        graph.apply(
            Statement::merge_node(
                "Request",
                vec![("id".into(), "r1".into())],
                vec![("text".into(), raw.into())],
            )
            .op(),
        );
        let query = format!(
            "MATCH (r:Request {{text: {}}}) RETURN r.text",
            crate::literal::quote_text(raw)
        );
        assert_eq!(run(&graph, &query)[0]["r.text"], raw);
    }

    #[test]
    fn relation_to_missing_node_is_not_returned() {
        let mut graph = session_graph();
        graph.apply(
            Statement::merge_relation(
                NodeMatch::any("s1"),
                "PART_OF",
                NodeMatch::any("nowhere"),
                vec![],
                vec![],
            )
            .op(),
        );
        assert!(run(&graph, "MATCH (a)-[r:PART_OF]->(b) RETURN r").is_empty());
    }

    #[test]
    fn writes_and_unknown_variables_are_rejected() {
        assert!(matches!(
            ReadQuery::parse("MERGE (n:Year {id: 'x'})"),
            Err(QueryError::Unsupported(_))
        ));
        assert!(matches!(
            ReadQuery::parse("MATCH (n) DETACH DELETE n"),
            Err(QueryError::Unsupported(_))
        ));
        let query = ReadQuery::parse("MATCH (n) RETURN m").expect("query should parse");
        assert_eq!(
            query.evaluate(&GraphData::default()),
            Err(QueryError::UnknownVariable("m".to_string()))
        );
    }
}
