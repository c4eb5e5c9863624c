//! Column comparisons used in WHERE clauses, join conditions and SET lists.

use std::fmt;
use std::str::FromStr;

use crate::column::Column;
use crate::error::{Error, Result};
use crate::literal::{format_literal, LiteralFormat};
use crate::types::Value;

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    /// `col IN (..)`
    In,
    /// `NOT col IN (..)`
    NotIn,
    /// `col > v`
    More,
    /// `col < v`
    Less,
    /// `col >= v`
    MoreEqual,
    /// `col <= v`
    LessEqual,
    /// `col = v`
    Equal,
    /// `NOT col = v`
    NotEqual,
    /// `col BETWEEN a AND b`
    Between,
    /// `NOT col BETWEEN a AND b`
    NotBetween,
    /// `col LIKE v`
    Like,
    /// `NOT col LIKE v`
    NotLike,
}

impl Operator {
    /// All operators, in declaration order
    pub const ALL: [Operator; 12] = [
        Self::In,
        Self::NotIn,
        Self::More,
        Self::Less,
        Self::MoreEqual,
        Self::LessEqual,
        Self::Equal,
        Self::NotEqual,
        Self::Between,
        Self::NotBetween,
        Self::Like,
        Self::NotLike,
    ];

    /// SQL token
    pub const fn token(self) -> &'static str {
        match self {
            Self::In | Self::NotIn => "IN",
            Self::More => ">",
            Self::Less => "<",
            Self::MoreEqual => ">=",
            Self::LessEqual => "<=",
            Self::Equal | Self::NotEqual => "=",
            Self::Between | Self::NotBetween => "BETWEEN",
            Self::Like | Self::NotLike => "LIKE",
        }
    }

    /// Negation prefix rendered before the column (`NOT ` or empty)
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::NotIn | Self::NotEqual | Self::NotBetween | Self::NotLike => "NOT ",
            _ => "",
        }
    }

    /// Operator name as used in filter parameters
    pub const fn name(self) -> &'static str {
        match self {
            Self::In => "IN",
            Self::NotIn => "NOT_IN",
            Self::More => "MORE",
            Self::Less => "LESS",
            Self::MoreEqual => "MORE_EQUAL",
            Self::LessEqual => "LESS_EQUAL",
            Self::Equal => "EQUAL",
            Self::NotEqual => "NOT_EQUAL",
            Self::Between => "BETWEEN",
            Self::NotBetween => "NOT_BETWEEN",
            Self::Like => "LIKE",
            Self::NotLike => "NOT_LIKE",
        }
    }

    /// IN and NOT IN take a value list
    pub const fn is_set(self) -> bool {
        matches!(self, Self::In | Self::NotIn)
    }

    /// BETWEEN and NOT BETWEEN take a range
    pub const fn is_range(self) -> bool {
        matches!(self, Self::Between | Self::NotBetween)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Operator {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|op| op.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::statement(format!("unknown comparison operator: {}", s)))
    }
}

/// Logical delimiter between comparisons and WHERE blocks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Delimiter {
    /// No delimiter; joins like AND
    #[default]
    None,
    /// AND
    And,
    /// OR
    Or,
}

impl Delimiter {
    /// Keyword surrounded by spaces, used between items
    pub const fn separator(self) -> &'static str {
        match self {
            Self::None | Self::And => " AND ",
            Self::Or => " OR ",
        }
    }
}

/// A single comparison or SET pair
#[derive(Debug, Clone, PartialEq)]
pub enum Comparison {
    /// Column compared with literal values
    Values {
        /// Left-hand column
        column: Column,
        /// Operator
        operator: Operator,
        /// Right-hand values
        values: Vec<Value>,
    },
    /// Column compared with another column
    Columns {
        /// Left-hand column
        left: Column,
        /// Operator
        operator: Operator,
        /// Right-hand column
        right: Column,
    },
    /// `col = v` inside an UPDATE SET list
    Set {
        /// Target column
        column: Column,
        /// New value
        value: Value,
    },
}

fn is_null_literal(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.eq_ignore_ascii_case("null"),
        _ => false,
    }
}

impl Comparison {
    /// Left-hand column
    pub fn column(&self) -> &Column {
        match self {
            Self::Values { column, .. } | Self::Set { column, .. } => column,
            Self::Columns { left, .. } => left,
        }
    }

    /// Render to SQL with the given literal format and list delimiter
    pub fn render(&self, format: &LiteralFormat, delimiter: &str) -> String {
        match self {
            Self::Set { column, value } => {
                format!("{} = {}", column, format_literal(value, format))
            }
            Self::Columns {
                left,
                operator,
                right,
            } => format!("{}{} {} {}", operator.prefix(), left, operator.token(), right),
            Self::Values {
                column,
                operator,
                values,
            } => {
                let literals: Vec<String> = values
                    .iter()
                    .filter(|v| !is_null_literal(v))
                    .map(|v| format_literal(v, format))
                    .collect();
                let (first, last) = match (literals.first(), literals.last()) {
                    (Some(first), Some(last)) => (first, last),
                    _ => return format!("{}{} IS NULL", operator.prefix(), column),
                };
                let rhs = if operator.is_set() {
                    format!("({})", literals.join(delimiter))
                } else if operator.is_range() {
                    format!("{} AND {}", first, last)
                } else {
                    first.clone()
                };
                format!("{}{} {} {}", operator.prefix(), column, operator.token(), rhs)
            }
        }
    }
}

impl Column {
    /// `col OP values`
    pub fn is<I, V>(&self, operator: Operator, values: I) -> Comparison
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Comparison::Values {
            column: self.clone(),
            operator,
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// `col = v`
    pub fn eq(&self, value: impl Into<Value>) -> Comparison {
        self.is(Operator::Equal, [value.into()])
    }

    /// `NOT col = v`
    pub fn ne(&self, value: impl Into<Value>) -> Comparison {
        self.is(Operator::NotEqual, [value.into()])
    }

    /// `col IN (..)`
    pub fn in_<I, V>(&self, values: I) -> Comparison
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.is(Operator::In, values)
    }

    /// `NOT col IN (..)`
    pub fn not_in<I, V>(&self, values: I) -> Comparison
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.is(Operator::NotIn, values)
    }

    /// `col > v`
    pub fn more(&self, value: impl Into<Value>) -> Comparison {
        self.is(Operator::More, [value.into()])
    }

    /// `col < v`
    pub fn less(&self, value: impl Into<Value>) -> Comparison {
        self.is(Operator::Less, [value.into()])
    }

    /// `col >= v`
    pub fn more_eq(&self, value: impl Into<Value>) -> Comparison {
        self.is(Operator::MoreEqual, [value.into()])
    }

    /// `col <= v`
    pub fn less_eq(&self, value: impl Into<Value>) -> Comparison {
        self.is(Operator::LessEqual, [value.into()])
    }

    /// `col BETWEEN low AND high`
    pub fn between(&self, low: impl Into<Value>, high: impl Into<Value>) -> Comparison {
        self.is(Operator::Between, [low.into(), high.into()])
    }

    /// `NOT col BETWEEN low AND high`
    pub fn not_between(&self, low: impl Into<Value>, high: impl Into<Value>) -> Comparison {
        self.is(Operator::NotBetween, [low.into(), high.into()])
    }

    /// `col LIKE pattern`
    pub fn like(&self, pattern: impl Into<Value>) -> Comparison {
        self.is(Operator::Like, [pattern.into()])
    }

    /// `NOT col LIKE pattern`
    pub fn not_like(&self, pattern: impl Into<Value>) -> Comparison {
        self.is(Operator::NotLike, [pattern.into()])
    }

    /// `col OP other`
    ///
    /// Set and range operators need literal lists and are rejected.
    pub fn is_column(&self, operator: Operator, other: &Column) -> Result<Comparison> {
        if operator.is_set() || operator.is_range() {
            return Err(Error::statement(format!(
                "operator {} cannot compare two columns",
                operator
            )));
        }
        Ok(Comparison::Columns {
            left: self.clone(),
            operator,
            right: other.clone(),
        })
    }

    /// SET pair `col = v`
    pub fn set(&self, value: impl Into<Value>) -> Comparison {
        Comparison::Set {
            column: self.clone(),
            value: value.into(),
        }
    }
}
