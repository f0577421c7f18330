//! Backend-agnostic descriptions of reads and writes.
//!
//! A [`TableQuery`] is what `from(table).select(..).eq(..)` builds up; a
//! [`Mutation`] is an insert, update, or delete. Backends translate these
//! into their own protocol. [`TableQuery::matches`] and
//! [`TableQuery::project`] give in-memory backends the same semantics.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::Row;

/// Comparison operator of a [`Filter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl FilterOp {
    /// PostgREST operator token.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Neq => "neq",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::Lt => "lt",
            Self::Lte => "lte",
        }
    }
}

/// Column predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub column: String,
    pub op: FilterOp,
    pub value: Value,
}

impl Filter {
    /// Evaluates the predicate against `row`. A missing column never matches.
    #[must_use]
    pub fn matches(&self, row: &Row) -> bool {
        let Some(actual) = row.get(&self.column) else {
            return false;
        };
        let ordering = compare_values(actual, &self.value);
        match self.op {
            FilterOp::Eq => ordering == Some(Ordering::Equal),
            FilterOp::Neq => ordering != Some(Ordering::Equal),
            FilterOp::Gt => ordering == Some(Ordering::Greater),
            FilterOp::Gte => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
            FilterOp::Lt => ordering == Some(Ordering::Less),
            FilterOp::Lte => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
        }
    }
}

/// Compares two JSON scalars. Numbers compare numerically, RFC 3339 strings
/// chronologically, other strings lexicographically. Mixed or composite
/// types are incomparable unless structurally equal.
fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => {
            match (
                DateTime::parse_from_rfc3339(x),
                DateTime::parse_from_rfc3339(y),
            ) {
                (Ok(x), Ok(y)) => Some(x.with_timezone(&Utc).cmp(&y.with_timezone(&Utc))),
                _ => Some(x.cmp(y)),
            }
        }
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (x, y) if x == y => Some(Ordering::Equal),
        _ => None,
    }
}

/// Sort position of a JSON value within one column.
enum SortKey<'a> {
    Null,
    Bool(bool),
    Number(f64),
    Timestamp(DateTime<Utc>, &'a str),
    Text(&'a str),
    Array,
    Object,
}

impl<'a> SortKey<'a> {
    fn of(value: &'a Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(*b),
            Value::Number(n) => Self::Number(n.as_f64().unwrap_or(f64::NAN)),
            Value::String(s) => match DateTime::parse_from_rfc3339(s) {
                Ok(at) => Self::Timestamp(at.with_timezone(&Utc), s),
                Err(_) => Self::Text(s),
            },
            Value::Array(_) => Self::Array,
            Value::Object(_) => Self::Object,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Null => 0,
            Self::Bool(_) => 1,
            Self::Number(_) => 2,
            Self::Timestamp(..) => 3,
            Self::Text(_) => 4,
            Self::Array => 5,
            Self::Object => 6,
        }
    }
}

/// Total order for sorting. Kinds order as null, bool, number, RFC 3339
/// timestamp, other string, array, object; values of one kind compare by
/// value. Arrays and objects all tie.
fn sort_order(a: &Value, b: &Value) -> Ordering {
    let (a, b) = (SortKey::of(a), SortKey::of(b));
    match (&a, &b) {
        (SortKey::Bool(x), SortKey::Bool(y)) => x.cmp(y),
        (SortKey::Number(x), SortKey::Number(y)) => x.total_cmp(y),
        (SortKey::Timestamp(x, xs), SortKey::Timestamp(y, ys)) => {
            x.cmp(y).then_with(|| xs.cmp(ys))
        }
        (SortKey::Text(x), SortKey::Text(y)) => x.cmp(y),
        _ => a.rank().cmp(&b.rank()),
    }
}

/// Result ordering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    pub column: String,
    pub ascending: bool,
}

/// A read against one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableQuery {
    pub table: String,
    /// Projected columns; `None` selects all.
    pub columns: Option<Vec<String>>,
    pub filters: Vec<Filter>,
    pub order: Option<OrderBy>,
    pub limit: Option<usize>,
}

impl TableQuery {
    /// Query selecting all columns of `table`.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: None,
            filters: Vec::new(),
            order: None,
            limit: None,
        }
    }

    /// Restricts the projection to a comma-separated column list. `"*"`
    /// selects everything.
    #[must_use]
    pub fn select(mut self, columns: &str) -> Self {
        let cols: Vec<String> = columns
            .split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect();
        self.columns = if cols.is_empty() || cols.iter().any(|c| c == "*") {
            None
        } else {
            Some(cols)
        };
        self
    }

    /// Adds a filter with an arbitrary operator.
    #[must_use]
    pub fn filter(mut self, column: &str, op: FilterOp, value: impl Into<Value>) -> Self {
        self.filters.push(Filter {
            column: column.to_string(),
            op,
            value: value.into(),
        });
        self
    }

    #[must_use]
    pub fn eq(self, column: &str, value: impl Into<Value>) -> Self {
        self.filter(column, FilterOp::Eq, value)
    }

    #[must_use]
    pub fn neq(self, column: &str, value: impl Into<Value>) -> Self {
        self.filter(column, FilterOp::Neq, value)
    }

    #[must_use]
    pub fn gte(self, column: &str, value: impl Into<Value>) -> Self {
        self.filter(column, FilterOp::Gte, value)
    }

    #[must_use]
    pub fn lte(self, column: &str, value: impl Into<Value>) -> Self {
        self.filter(column, FilterOp::Lte, value)
    }

    #[must_use]
    pub fn lt(self, column: &str, value: impl Into<Value>) -> Self {
        self.filter(column, FilterOp::Lt, value)
    }

    #[must_use]
    pub fn order(mut self, column: &str, ascending: bool) -> Self {
        self.order = Some(OrderBy {
            column: column.to_string(),
            ascending,
        });
        self
    }

    #[must_use]
    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    /// Whether `row` satisfies every filter.
    #[must_use]
    pub fn matches(&self, row: &Row) -> bool {
        self.filters.iter().all(|f| f.matches(row))
    }

    /// Applies the column projection to `row`.
    #[must_use]
    pub fn project(&self, row: &Row) -> Row {
        match &self.columns {
            None => row.clone(),
            Some(cols) => cols
                .iter()
                .filter_map(|c| row.get(c).map(|v| (c.clone(), v.clone())))
                .collect(),
        }
    }

    /// Projection in PostgREST form (`*` or `a,b,c`).
    #[must_use]
    pub fn column_list(&self) -> String {
        match &self.columns {
            None => "*".to_string(),
            Some(cols) => cols.join(","),
        }
    }

    /// Sorts `rows` by the configured order, if any.
    pub fn sort(&self, rows: &mut [Row]) {
        if let Some(order) = &self.order {
            rows.sort_by(|a, b| {
                let ord = match (a.get(&order.column), b.get(&order.column)) {
                    (Some(x), Some(y)) => sort_order(x, y),
                    (Some(_), None) => Ordering::Less,
                    (None, Some(_)) => Ordering::Greater,
                    (None, None) => Ordering::Equal,
                };
                if order.ascending {
                    ord
                } else {
                    ord.reverse()
                }
            });
        }
    }
}

/// A write against one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Mutation {
    Insert {
        table: String,
        rows: Vec<Row>,
    },
    Update {
        table: String,
        filters: Vec<Filter>,
        patch: Row,
    },
    Delete {
        table: String,
        filters: Vec<Filter>,
    },
}

impl Mutation {
    /// Target table.
    #[must_use]
    pub fn table(&self) -> &str {
        match self {
            Self::Insert { table, .. } | Self::Update { table, .. } | Self::Delete { table, .. } => {
                table
            }
        }
    }

    /// Lowercase verb, used in logs.
    #[must_use]
    pub fn verb(&self) -> &'static str {
        match self {
            Self::Insert { .. } => "insert",
            Self::Update { .. } => "update",
            Self::Delete { .. } => "delete",
        }
    }
}
