//! Predicate tree and its wire-level parser
//!
//! # Grammar
//!
//! A filter is a JSON object. Sibling keys are implicitly AND-ed:
//!
//! ```text
//! {"status": "active"}                        equality
//! {"age": {"$gte": 18, "$lt": 65}}            operators (AND-ed)
//! {"$or": [{"a": 1}, {"b": {"$exists": true}}]}
//! {"tags": {"$elemMatch": {"name": "rust"}}}  array of objects
//! {"meta.words": {"$gt": 100}}                dotted paths into sub-schemas
//! ```
//!
//! Parsing is schema-aware: every field must be declared, operators must be
//! legal for the field kind, and (for client filters) the leaf field must be
//! filterable. Operand values go through the field validator so they are
//! normalized exactly like stored values.

use crate::core::error::{GraphError, GraphResult, QueryError};
use crate::core::field::{Field, FieldKind};
use crate::core::schema::Schema;
use chrono::DateTime;
use regex::Regex;
use serde_json::{Map, Value, json};
use std::collections::BTreeSet;
use std::fmt;

/// Operators accepted inside a field operator object
pub const FIELD_OPERATORS: &[&str] = &[
    "$in",
    "$nin",
    "$lt",
    "$lte",
    "$gt",
    "$gte",
    "$exists",
    "$regex",
    "$elemMatch",
];

/// Ordering comparisons
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Lower,
    LowerOrEqual,
    Greater,
    GreaterOrEqual,
}

impl Comparison {
    pub fn operator(self) -> &'static str {
        match self {
            Comparison::Lower => "$lt",
            Comparison::LowerOrEqual => "$lte",
            Comparison::Greater => "$gt",
            Comparison::GreaterOrEqual => "$gte",
        }
    }

    fn from_operator(op: &str) -> Option<Self> {
        match op {
            "$lt" => Some(Comparison::Lower),
            "$lte" => Some(Comparison::LowerOrEqual),
            "$gt" => Some(Comparison::Greater),
            "$gte" => Some(Comparison::GreaterOrEqual),
            _ => None,
        }
    }

    /// Whether `field <op> operand` holds given `field.cmp(operand)`
    pub fn holds(self, ordering: std::cmp::Ordering) -> bool {
        use std::cmp::Ordering::*;
        match self {
            Comparison::Lower => ordering == Less,
            Comparison::LowerOrEqual => ordering != Greater,
            Comparison::Greater => ordering == Greater,
            Comparison::GreaterOrEqual => ordering != Less,
        }
    }
}

/// A parsed, immutable boolean filter expression
#[derive(Debug, Clone)]
pub enum Predicate {
    Equal { field: String, value: Value },
    In { field: String, values: Vec<Value> },
    NotIn { field: String, values: Vec<Value> },
    Compare {
        field: String,
        op: Comparison,
        value: Value,
    },
    Exists { field: String, exists: bool },
    /// Compiled once at parse time
    Regex { field: String, regex: Regex },
    ElemMatch {
        field: String,
        predicate: Box<Predicate>,
    },
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
}

impl Predicate {
    /// Predicate matching every item
    pub fn all() -> Self {
        Predicate::And(Vec::new())
    }

    /// Whether this predicate matches everything without evaluation
    pub fn is_empty(&self) -> bool {
        matches!(self, Predicate::And(items) if items.iter().all(Predicate::is_empty))
    }

    /// Conjunction of two predicates, flattening nested ANDs
    pub fn and(self, other: Predicate) -> Predicate {
        let mut items = Vec::new();
        for p in [self, other] {
            match p {
                Predicate::And(inner) => items.extend(inner),
                p => items.push(p),
            }
        }
        if items.len() == 1 {
            items.pop().unwrap_or_else(Predicate::all)
        } else {
            Predicate::And(items)
        }
    }

    /// Parse a client filter against a schema
    pub fn parse(filter: &Value, schema: &Schema) -> GraphResult<Self> {
        Parser { strict: true }.parse_document(schema, filter)
    }

    /// Parse a client filter given as a JSON string
    pub fn parse_str(filter: &str, schema: &Schema) -> GraphResult<Self> {
        let value: Value = serde_json::from_str(filter)
            .map_err(|e| GraphError::query_parse(None, format!("invalid filter JSON: {}", e)))?;
        Self::parse(&value, schema)
    }

    /// Parse without the filterable check (schema dependencies)
    pub(crate) fn parse_lenient(filter: &Value, schema: &Schema) -> GraphResult<Self> {
        Parser { strict: false }.parse_document(schema, filter)
    }

    /// Operators used by this predicate, for backends to reject what they lack
    pub fn operators(&self) -> BTreeSet<&'static str> {
        let mut ops = BTreeSet::new();
        self.collect_operators(&mut ops);
        ops
    }

    fn collect_operators(&self, ops: &mut BTreeSet<&'static str>) {
        match self {
            Predicate::Equal { .. } => {}
            Predicate::In { .. } => {
                ops.insert("$in");
            }
            Predicate::NotIn { .. } => {
                ops.insert("$nin");
            }
            Predicate::Compare { op, .. } => {
                ops.insert(op.operator());
            }
            Predicate::Exists { .. } => {
                ops.insert("$exists");
            }
            Predicate::Regex { .. } => {
                ops.insert("$regex");
            }
            Predicate::ElemMatch { predicate, .. } => {
                ops.insert("$elemMatch");
                predicate.collect_operators(ops);
            }
            Predicate::And(items) => items.iter().for_each(|p| p.collect_operators(ops)),
            Predicate::Or(items) => {
                ops.insert("$or");
                items.iter().for_each(|p| p.collect_operators(ops));
            }
        }
    }

    /// Render back to the wire format
    pub fn to_value(&self) -> Value {
        match self {
            Predicate::Equal { field, value } => json!({ field: value }),
            Predicate::In { field, values } => json!({ field: { "$in": values } }),
            Predicate::NotIn { field, values } => json!({ field: { "$nin": values } }),
            Predicate::Compare { field, op, value } => json!({ field: { op.operator(): value } }),
            Predicate::Exists { field, exists } => json!({ field: { "$exists": exists } }),
            Predicate::Regex { field, regex } => json!({ field: { "$regex": regex.as_str() } }),
            Predicate::ElemMatch { field, predicate } => {
                json!({ field: { "$elemMatch": predicate.to_value() } })
            }
            Predicate::And(items) => {
                json!({ "$and": items.iter().map(Predicate::to_value).collect::<Vec<_>>() })
            }
            Predicate::Or(items) => {
                json!({ "$or": items.iter().map(Predicate::to_value).collect::<Vec<_>>() })
            }
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_value())
    }
}

struct Parser {
    strict: bool,
}

impl Parser {
    fn parse_document(&self, schema: &Schema, value: &Value) -> GraphResult<Predicate> {
        let Value::Object(map) = value else {
            return Err(GraphError::query_parse(None, "filter must be an object"));
        };
        let mut items = Vec::new();
        for (key, value) in map {
            match key.as_str() {
                "$and" | "$or" => {
                    let Value::Array(subs) = value else {
                        return Err(GraphError::query_parse(
                            None,
                            format!("{} expects an array", key),
                        ));
                    };
                    if subs.is_empty() {
                        return Err(GraphError::query_parse(
                            None,
                            format!("{} expects at least one expression", key),
                        ));
                    }
                    let subs = subs
                        .iter()
                        .map(|s| self.parse_document(schema, s))
                        .collect::<GraphResult<Vec<_>>>()?;
                    items.push(if key == "$and" {
                        Predicate::And(subs)
                    } else {
                        Predicate::Or(subs)
                    });
                }
                op if op.starts_with('$') => {
                    return Err(GraphError::query_parse(
                        None,
                        format!("unknown operator {}", op),
                    ));
                }
                path => items.extend(self.parse_field(schema, path, value)?),
            }
        }
        Ok(if items.len() == 1 {
            items.pop().unwrap_or_else(Predicate::all)
        } else {
            Predicate::And(items)
        })
    }

    fn parse_field(&self, schema: &Schema, path: &str, value: &Value) -> GraphResult<Vec<Predicate>> {
        let field = schema
            .get_field(path)
            .ok_or_else(|| GraphError::query_parse(Some(path), "unknown field"))?;
        if self.strict && !field.filterable {
            return Err(QueryError::FieldNotFilterable {
                field: path.to_string(),
            }
            .into());
        }
        match value {
            Value::Object(ops) if ops.keys().any(|k| k.starts_with('$')) => {
                if !ops.keys().all(|k| k.starts_with('$')) {
                    return Err(GraphError::query_parse(
                        Some(path),
                        "cannot mix operators and fields",
                    ));
                }
                ops.iter()
                    .map(|(op, arg)| self.parse_operator(schema, path, field, op, arg))
                    .collect()
            }
            _ => Ok(vec![Predicate::Equal {
                field: path.to_string(),
                value: operand(path, field, value)?,
            }]),
        }
    }

    fn parse_operator(
        &self,
        _schema: &Schema,
        path: &str,
        field: &Field,
        op: &str,
        arg: &Value,
    ) -> GraphResult<Predicate> {
        let kind = field.kind();
        match op {
            "$in" | "$nin" => {
                let Value::Array(items) = arg else {
                    return Err(GraphError::query_parse(
                        Some(path),
                        format!("{} expects an array", op),
                    ));
                };
                let values = items
                    .iter()
                    .map(|v| operand(path, field, v))
                    .collect::<GraphResult<Vec<_>>>()?;
                let field = path.to_string();
                Ok(if op == "$in" {
                    Predicate::In { field, values }
                } else {
                    Predicate::NotIn { field, values }
                })
            }
            "$lt" | "$lte" | "$gt" | "$gte" => {
                if !kind.is_comparable() {
                    return Err(illegal(path, op, kind));
                }
                let value = operand(path, field, arg)?;
                let comparable = match &value {
                    Value::Number(_) => true,
                    Value::String(s) => {
                        matches!(kind, FieldKind::Time | FieldKind::Any)
                            && DateTime::parse_from_rfc3339(s).is_ok()
                    }
                    _ => false,
                };
                if !comparable {
                    return Err(GraphError::query_parse(
                        Some(path),
                        format!("{} expects a number or a time", op),
                    ));
                }
                Ok(Predicate::Compare {
                    field: path.to_string(),
                    op: Comparison::from_operator(op).unwrap_or(Comparison::Lower),
                    value,
                })
            }
            "$exists" => {
                let Value::Bool(exists) = arg else {
                    return Err(GraphError::query_parse(
                        Some(path),
                        "$exists expects a boolean",
                    ));
                };
                Ok(Predicate::Exists {
                    field: path.to_string(),
                    exists: *exists,
                })
            }
            "$regex" => {
                if !kind.accepts_regex() {
                    return Err(illegal(path, op, kind));
                }
                let Value::String(pattern) = arg else {
                    return Err(GraphError::query_parse(
                        Some(path),
                        "$regex expects a string",
                    ));
                };
                let regex = Regex::new(pattern).map_err(|e| {
                    GraphError::query_parse(Some(path), format!("invalid regex: {}", e))
                })?;
                Ok(Predicate::Regex {
                    field: path.to_string(),
                    regex,
                })
            }
            "$elemMatch" => {
                let element_schema = field
                    .element()
                    .and_then(Field::sub_schema)
                    .ok_or_else(|| illegal(path, op, kind))?;
                if !arg.is_object() {
                    return Err(GraphError::query_parse(
                        Some(path),
                        "$elemMatch expects an object",
                    ));
                }
                let predicate = self.parse_document(element_schema, arg)?;
                Ok(Predicate::ElemMatch {
                    field: path.to_string(),
                    predicate: Box::new(predicate),
                })
            }
            other => Err(GraphError::query_parse(
                Some(path),
                format!("unknown operator {}", other),
            )),
        }
    }
}

fn illegal(path: &str, op: &str, kind: FieldKind) -> GraphError {
    GraphError::query_parse(
        Some(path),
        format!("operator {} not allowed on {:?} field", op, kind),
    )
}

/// Run an operand through the field validator; null is kept as is
fn operand(path: &str, field: &Field, value: &Value) -> GraphResult<Value> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    match &field.validator {
        Some(v) => v.validate(value.clone()).map_err(|msg| {
            GraphError::query_parse(Some(path), format!("invalid value: {}", msg))
        }),
        None => Ok(value.clone()),
    }
}

/// Value at a dotted path in a document
pub fn lookup<'a>(doc: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    match path.split_once('.') {
        None => doc.get(path),
        Some((head, rest)) => match doc.get(head)? {
            Value::Object(inner) => lookup(inner, rest),
            _ => None,
        },
    }
}
