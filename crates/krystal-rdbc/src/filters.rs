//! Request-parameter filters.
//!
//! Query strings map onto comparisons with a small grammar:
//!
//! | parameter                     | meaning                                   |
//! |-------------------------------|-------------------------------------------|
//! | `name=v`                      | `name = v`                                |
//! | `name$OP=v[,v...]`            | `name OP v...`, `OP` is an operator name  |
//! | `_col$OP=v`                   | raw column, no field mapping              |
//! | `$limit=n`                    | at most `n` rows                          |
//! | `$orderBy[$asc\|desc]=a,b`    | ORDER BY, ascending by default            |
//! | `$memorized=false`            | skip the cache in `find_all`              |
//! | `$condition=or`               | OR the field comparisons instead of AND   |
//!
//! `IN`, `NOT_IN` and `BETWEEN` values are comma-split; quote a value
//! (`'a,b'` or `"a,b"`) to keep its commas.

use chrono::{NaiveDate, NaiveDateTime};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::str::FromStr;
use uuid::Uuid;

use crate::column::Column;
use crate::comparison::{Comparison, Delimiter, Operator};
use crate::entity::{ColumnMapping, Entity};
use crate::error::Result;
use crate::security::validate_column_reference;
use crate::statement::{Direction, Select, Statement};
use crate::types::Value;

const DATETIME_FORMATS: [&str; 3] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
];

/// Request parameters: name to one or more raw values
pub type Params = BTreeMap<String, Vec<String>>;

/// Split `$orderBy$desc` style keys into the setting and its argument
fn setting(key: &str) -> Option<(&str, Option<&str>)> {
    let rest = key.strip_prefix('$')?;
    let mut parts = rest.splitn(2, '$');
    let name = parts.next()?;
    Some((name, parts.next()))
}

/// Split `name$OP` into the name and its operator, EQUAL when absent or unknown
fn name_and_operator(key: &str) -> (&str, Operator) {
    match key.split_once('$') {
        Some((name, op)) => (name, Operator::from_str(op).unwrap_or(Operator::Equal)),
        None => (key, Operator::Equal),
    }
}

fn dequote(s: &str) -> &str {
    for quote in ['\'', '"'] {
        if s.len() >= 2 && s.starts_with(quote) && s.ends_with(quote) {
            return &s[1..s.len() - 1];
        }
    }
    s
}

/// Comma-split, keeping quoted segments whole, then trim, dequote and drop blanks
fn split_values(raw: &[String]) -> Vec<String> {
    let mut out = Vec::new();
    for s in raw {
        let mut quote: Option<char> = None;
        let mut current = String::new();
        for c in s.chars() {
            match (quote, c) {
                (None, ',') => out.push(std::mem::take(&mut current)),
                (None, '\'' | '"') => {
                    quote = Some(c);
                    current.push(c);
                }
                (Some(q), c) if c == q => {
                    quote = None;
                    current.push(c);
                }
                _ => current.push(c),
            }
        }
        out.push(current);
    }
    out.iter()
        .map(|s| dequote(s.trim()).to_string())
        .filter(|s| !s.trim().is_empty())
        .collect()
}

fn values_for(operator: Operator, raw: &[String]) -> Vec<String> {
    match operator {
        Operator::In | Operator::NotIn | Operator::Between => split_values(raw),
        _ => raw.to_vec(),
    }
}

fn condition_of(raw: &[String]) -> Delimiter {
    match raw.first() {
        Some(v) if v.trim().eq_ignore_ascii_case("or") => Delimiter::Or,
        _ => Delimiter::And,
    }
}

fn order_names(raw: &[String]) -> Vec<String> {
    raw.iter()
        .flat_map(|s| s.split(','))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Column for a parameter name.
///
/// A leading `_` takes the rest as a raw column; otherwise the field mapping
/// is tried first. Raw names must be valid column references.
fn column_for(param: &str, mapping: Option<&dyn ColumnMapping>) -> Result<Column> {
    if let Some(raw) = param.strip_prefix('_') {
        validate_column_reference(raw)?;
        return Ok(Column::new(raw));
    }
    let name = dequote(param);
    match mapping.and_then(|m| m.column_of(name)) {
        Some(column) => Ok(column),
        None => {
            validate_column_reference(name)?;
            Ok(Column::new(name))
        }
    }
}

/// WHERE, row limit and ORDER BY applied on top of an entity's base query
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatementModifiers {
    /// Row limit; zero or `None` means unlimited
    pub limit: Option<u64>,
    /// Comparisons added to the WHERE clause as one block
    pub where_: Vec<Comparison>,
    /// How the comparisons of the block combine; `None` joins with AND
    pub condition: Delimiter,
    /// ORDER BY groups
    pub order_by: Vec<(Direction, Vec<Column>)>,
}

impl StatementModifiers {
    /// Parse request parameters, mapping names through `mapping` when given
    pub fn from_params(params: &Params, mapping: Option<&dyn ColumnMapping>) -> Result<Self> {
        let mut modifiers = Self::default();
        for (key, raw) in params {
            match setting(key) {
                Some((name, arg)) => {
                    if name.eq_ignore_ascii_case("limit") {
                        modifiers.limit = raw.first().and_then(|v| v.trim().parse().ok());
                    } else if name.eq_ignore_ascii_case("orderBy") {
                        let direction = arg
                            .and_then(|d| Direction::from_str(d).ok())
                            .unwrap_or_default();
                        let columns = order_names(raw)
                            .iter()
                            .map(|c| column_for(c, mapping))
                            .collect::<Result<Vec<_>>>()?;
                        if !columns.is_empty() {
                            modifiers.order_by.push((direction, columns));
                        }
                    } else if name.eq_ignore_ascii_case("condition") {
                        modifiers.condition = condition_of(raw);
                    }
                }
                None => {
                    let (name, operator) = name_and_operator(key);
                    let column = column_for(name, mapping)?;
                    modifiers.where_.push(column.is(operator, values_for(operator, raw)));
                }
            }
        }
        Ok(modifiers)
    }

    /// Set the row limit
    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Add a comparison
    pub fn with_where(mut self, comparison: Comparison) -> Self {
        self.where_.push(comparison);
        self
    }

    /// Combine the comparisons with OR instead of AND
    pub fn with_condition(mut self, condition: Delimiter) -> Self {
        self.condition = condition;
        self
    }

    /// Add an ORDER BY group
    pub fn with_order_by(mut self, direction: Direction, columns: &[Column]) -> Self {
        self.order_by.push((direction, columns.to_vec()));
        self
    }

    /// Apply the row limit to a base query
    pub fn limit_select(&self, select: Select) -> Select {
        match self.limit {
            Some(n) if n > 0 => select.limit(n),
            _ => select,
        }
    }

    /// AND the comparison block onto the statement, then add ORDER BY
    pub fn apply(&self, statement: Statement) -> Statement {
        let mut statement = statement;
        if !self.where_.is_empty() {
            statement = statement.and_where_all(self.condition, self.where_.clone());
        }
        if !self.order_by.is_empty() {
            statement = statement.order_by_all(self.order_by.clone());
        }
        statement
    }
}

/// Wildcard match with `%` and `_`, backtracking only to the last `%`
fn like_match(text: &[char], pattern: &[char]) -> bool {
    let (mut t, mut p) = (0, 0);
    let mut star: Option<(usize, usize)> = None;
    while t < text.len() {
        match pattern.get(p) {
            Some('%') => {
                star = Some((p, t));
                p += 1;
            }
            Some('_') => {
                t += 1;
                p += 1;
            }
            Some(c) if *c == text[t] => {
                t += 1;
                p += 1;
            }
            _ => match star {
                Some((sp, st)) => {
                    p = sp + 1;
                    t = st + 1;
                    star = Some((sp, st + 1));
                }
                None => return false,
            },
        }
    }
    pattern[p..].iter().all(|c| *c == '%')
}

/// SQL LIKE with `%` and `_`, ignoring ASCII case
fn like(value: &Value, pattern: &Value) -> bool {
    let text: Vec<char> = value.to_string().to_ascii_lowercase().chars().collect();
    let pattern: Vec<char> = pattern.to_string().to_ascii_lowercase().chars().collect();
    like_match(&text, &pattern)
}

/// Parse a textual operand as the type of `like`; unparsable text stays text
fn coerce(operand: &Value, like: &Value) -> Value {
    let Value::String(text) = operand else {
        return operand.clone();
    };
    let text = text.trim();
    let parsed = match like {
        Value::Bool(_) => match text.to_ascii_lowercase().as_str() {
            "true" | "1" => Some(Value::Bool(true)),
            "false" | "0" => Some(Value::Bool(false)),
            _ => None,
        },
        Value::Date(_) => NaiveDate::parse_from_str(text, "%Y-%m-%d")
            .ok()
            .map(Value::Date),
        Value::DateTime(_) | Value::DateTimeTz(_) => DATETIME_FORMATS
            .iter()
            .find_map(|f| NaiveDateTime::parse_from_str(text, f).ok())
            .map(Value::DateTime),
        Value::Uuid(_) => Uuid::parse_str(text).ok().map(Value::Uuid),
        other if other.sql_type().is_numeric() => text.parse().ok().map(Value::Float64),
        _ => None,
    };
    parsed.unwrap_or_else(|| operand.clone())
}

/// In-memory test of one field against filter values
#[derive(Debug, Clone, PartialEq)]
pub struct ValuesFilter {
    /// Operator
    pub operator: Operator,
    /// Operands
    pub values: Vec<Value>,
}

impl ValuesFilter {
    /// `field OP values`
    pub fn are<I, V>(operator: Operator, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self {
            operator,
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// NOT_EQUAL for one value, NOT_IN for several
    pub fn are_not<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        let operator = if values.len() == 1 {
            Operator::NotEqual
        } else {
            Operator::NotIn
        };
        Self { operator, values }
    }

    /// Operands coerced to the type of `value`, NULLs dropped
    fn operands(&self, value: &Value) -> Vec<Value> {
        self.values
            .iter()
            .filter(|v| !v.is_null())
            .map(|v| coerce(v, value))
            .collect()
    }

    fn equals_any(operands: &[Value], value: &Value) -> bool {
        operands
            .iter()
            .any(|v| value.compare(v) == Some(Ordering::Equal))
    }

    fn all(operands: &[Value], value: &Value, accept: fn(Ordering) -> bool) -> bool {
        !operands.is_empty()
            && operands
                .iter()
                .all(|v| value.compare(v).is_some_and(accept))
    }

    fn within_range(operands: &[Value], value: &Value) -> bool {
        let Some(first) = operands.first() else {
            return false;
        };
        let (low, high) = operands.iter().fold((first, first), |(low, high), v| {
            let low = if v.compare(low) == Some(Ordering::Less) { v } else { low };
            let high = if v.compare(high) == Some(Ordering::Greater) { v } else { high };
            (low, high)
        });
        value.compare(low).is_some_and(|o| o != Ordering::Less)
            && value.compare(high).is_some_and(|o| o != Ordering::Greater)
    }

    /// Whether `value` passes
    pub fn test(&self, value: &Value) -> bool {
        if self.values.is_empty() {
            return false;
        }
        let operands = self.operands(value);
        match self.operator {
            Operator::Equal | Operator::In => Self::equals_any(&operands, value),
            Operator::NotEqual | Operator::NotIn => !Self::equals_any(&operands, value),
            Operator::More => Self::all(&operands, value, |o| o == Ordering::Greater),
            Operator::Less => Self::all(&operands, value, |o| o == Ordering::Less),
            Operator::MoreEqual => Self::all(&operands, value, |o| o != Ordering::Less),
            Operator::LessEqual => Self::all(&operands, value, |o| o != Ordering::Greater),
            Operator::Between => Self::within_range(&operands, value),
            Operator::NotBetween => !Self::within_range(&operands, value),
            Operator::Like => self.values.iter().any(|p| like(value, p)),
            Operator::NotLike => !self.values.iter().any(|p| like(value, p)),
        }
    }
}

/// In-memory sort key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValuesOrder {
    /// Direction
    pub direction: Direction,
    /// Field name
    pub name: String,
}

impl ValuesOrder {
    /// Ascending by `name`
    pub fn asc(name: impl Into<String>) -> Self {
        Self {
            direction: Direction::Asc,
            name: name.into(),
        }
    }

    /// Descending by `name`
    pub fn desc(name: impl Into<String>) -> Self {
        Self {
            direction: Direction::Desc,
            name: name.into(),
        }
    }
}

/// Filters usable both in memory and as SQL
#[derive(Debug, Clone, PartialEq)]
pub struct PersistenceFilters {
    /// Field name to filter
    pub values: BTreeMap<String, ValuesFilter>,
    /// Row limit
    pub limit: Option<u64>,
    /// Sort keys, most significant first
    pub order_by: Vec<ValuesOrder>,
    /// Whether `find_all` may answer from the cache
    pub memorized: bool,
    /// How field filters combine in memory
    pub condition: Delimiter,
}

impl Default for PersistenceFilters {
    fn default() -> Self {
        Self {
            values: BTreeMap::new(),
            limit: None,
            order_by: Vec::new(),
            memorized: true,
            condition: Delimiter::And,
        }
    }
}

impl PersistenceFilters {
    /// Parse request parameters
    pub fn from_params(params: &Params) -> Self {
        let mut filters = Self::default();
        for (key, raw) in params {
            match setting(key) {
                Some((name, arg)) => {
                    if name.eq_ignore_ascii_case("limit") {
                        filters.limit = raw.first().and_then(|v| v.trim().parse().ok());
                    } else if name.eq_ignore_ascii_case("orderBy") {
                        let direction = arg
                            .and_then(|d| Direction::from_str(d).ok())
                            .unwrap_or_default();
                        filters.order_by.extend(order_names(raw).into_iter().map(|name| {
                            ValuesOrder { direction, name }
                        }));
                    } else if name.eq_ignore_ascii_case("memorized") {
                        filters.memorized = raw
                            .first()
                            .is_some_and(|v| v.trim().eq_ignore_ascii_case("true"));
                    } else if name.eq_ignore_ascii_case("condition") {
                        filters.condition = condition_of(raw);
                    }
                }
                None => {
                    let (name, operator) = name_and_operator(key);
                    filters.values.insert(
                        name.to_string(),
                        ValuesFilter::are(operator, values_for(operator, raw)),
                    );
                }
            }
        }
        filters
    }

    /// Add a field filter
    pub fn with_value(mut self, name: impl Into<String>, filter: ValuesFilter) -> Self {
        self.values.insert(name.into(), filter);
        self
    }

    /// Add a sort key
    pub fn with_order(mut self, order: ValuesOrder) -> Self {
        self.order_by.push(order);
        self
    }

    /// Set the row limit
    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Allow or forbid answering from the cache
    pub fn with_memorized(mut self, memorized: bool) -> Self {
        self.memorized = memorized;
        self
    }

    /// Combine field filters with AND or OR
    pub fn with_condition(mut self, condition: Delimiter) -> Self {
        self.condition = condition;
        self
    }

    /// SQL form, mapping field names through `mapping` when given
    pub fn to_statement_modifiers(
        &self,
        mapping: Option<&dyn ColumnMapping>,
    ) -> Result<StatementModifiers> {
        let mut where_ = Vec::with_capacity(self.values.len());
        for (name, filter) in &self.values {
            let column = column_for(name, mapping)?;
            where_.push(column.is(filter.operator, filter.values.clone()));
        }
        let mut order_by: Vec<(Direction, Vec<Column>)> = Vec::new();
        for order in &self.order_by {
            let column = column_for(&order.name, mapping)?;
            match order_by.last_mut() {
                Some((direction, columns)) if *direction == order.direction => columns.push(column),
                _ => order_by.push((order.direction, vec![column])),
            }
        }
        Ok(StatementModifiers {
            limit: self.limit,
            where_,
            condition: self.condition,
            order_by,
        })
    }

    /// Whether an entity passes the field filters
    pub fn test<T: Entity>(&self, entity: &T) -> bool {
        let descriptor = T::descriptor();
        let matching = self
            .values
            .iter()
            .filter(|(name, filter)| {
                descriptor
                    .field(name)
                    .is_some_and(|field| filter.test(&field.get(entity)))
            })
            .count();
        match self.condition {
            Delimiter::Or => matching > 0,
            Delimiter::And | Delimiter::None => matching == self.values.len(),
        }
    }

    /// Sort entities by the sort keys; NULLs first
    pub fn sort<T: Entity>(&self, mut entities: Vec<T>) -> Vec<T> {
        if self.order_by.is_empty() {
            return entities;
        }
        let descriptor = T::descriptor();
        entities.sort_by(|a, b| {
            for order in &self.order_by {
                let Some(field) = descriptor.field(&order.name) else {
                    continue;
                };
                let (av, bv) = (field.get(a), field.get(b));
                let ordering = match (av.is_null(), bv.is_null()) {
                    (true, true) => Ordering::Equal,
                    (true, false) => Ordering::Less,
                    (false, true) => Ordering::Greater,
                    (false, false) => av.compare(&bv).unwrap_or(Ordering::Equal),
                };
                let ordering = match order.direction {
                    Direction::Asc => ordering,
                    Direction::Desc => ordering.reverse(),
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            Ordering::Equal
        });
        entities
    }
}
