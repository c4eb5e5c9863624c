//! Column and table references.
//!
//! References are immutable names. Every composition (alias, qualification,
//! function wrap, join) builds a new reference and leaves the original
//! untouched, so one `Column` can be reused across many statements.

use std::fmt;
use std::sync::Arc;

/// Aggregate and scalar functions that can wrap a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Function {
    /// SUM
    Sum,
    /// MIN
    Min,
    /// MAX
    Max,
    /// AVG
    Avg,
    /// COUNT
    Count,
    /// TRIM
    Trim,
}

impl Function {
    /// SQL keyword
    pub const fn keyword(self) -> &'static str {
        match self {
            Self::Sum => "SUM",
            Self::Min => "MIN",
            Self::Max => "MAX",
            Self::Avg => "AVG",
            Self::Count => "COUNT",
            Self::Trim => "TRIM",
        }
    }
}

/// A column reference
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Column {
    name: Arc<str>,
}

impl Column {
    /// Reference a column by name
    pub fn new(name: impl AsRef<str>) -> Self {
        Self {
            name: Arc::from(name.as_ref()),
        }
    }

    /// The `*` projection
    pub fn all() -> Self {
        Self::new("*")
    }

    /// Rendered name
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `name alias`
    pub fn alias(&self, alias: &str) -> Self {
        Self::new(format!("{} {}", self.name, alias))
    }

    /// `table.name`
    pub fn from(&self, table_alias: &str) -> Self {
        Self::new(format!("{}.{}", table_alias, self.name))
    }

    /// `DISTINCT name`
    pub fn distinct(&self) -> Self {
        Self::new(format!("DISTINCT {}", self.name))
    }

    /// `F(name) alias`
    pub fn fun(&self, function: Function, alias: &str) -> Self {
        Self::new(format!("{}({}) {}", function.keyword(), self.name, alias))
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl From<&str> for Column {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for Column {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

/// Join kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinType {
    /// LEFT JOIN
    Left,
    /// RIGHT JOIN
    Right,
    /// INNER JOIN
    Inner,
    /// FULL JOIN
    Full,
}

impl JoinType {
    /// SQL keyword pair
    pub const fn keyword(self) -> &'static str {
        match self {
            Self::Left => "LEFT JOIN",
            Self::Right => "RIGHT JOIN",
            Self::Inner => "INNER JOIN",
            Self::Full => "FULL JOIN",
        }
    }
}

/// A table reference
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Table {
    name: Arc<str>,
}

impl Table {
    /// Reference a table by name
    pub fn new(name: impl AsRef<str>) -> Self {
        Self {
            name: Arc::from(name.as_ref()),
        }
    }

    /// Rendered name
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `name alias`
    pub fn alias(&self, alias: &str) -> Self {
        Self::new(format!("{} {}", self.name, alias))
    }

    /// `self JOIN other ON 1=1 AND a = b ...`
    ///
    /// The leading `1=1` keeps the fragment valid when `on` is empty.
    pub fn join(&self, join: JoinType, other: &Table, on: &[(Column, Column)]) -> Self {
        let mut name = format!("{} {} {} ON 1=1", self.name, join.keyword(), other.name);
        for (left, right) in on {
            name.push_str(&format!(" AND {} = {}", left, right));
        }
        Self::new(name)
    }

    /// `T a1, T a2, ...` for self-joins filtered in WHERE
    pub fn join_self(&self, aliases: &[&str]) -> Self {
        let parts: Vec<String> = aliases
            .iter()
            .map(|alias| format!("{} {}", self.name, alias))
            .collect();
        Self::new(parts.join(", "))
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl From<&str> for Table {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_compositions_are_new_references() {
        let linia = Column::new("linia");
        assert_eq!(linia.alias("l").name(), "linia l");
        assert_eq!(linia.from("m").name(), "m.linia");
        assert_eq!(linia.distinct().name(), "DISTINCT linia");
        assert_eq!(linia.fun(Function::Max, "top").name(), "MAX(linia) top");
        assert_eq!(linia.name(), "linia");
    }

    #[test]
    fn test_table_join() {
        let m = Table::new("MASZYNY").alias("m");
        let p = Table::new("PRODUKCJA").alias("p");
        let joined = m.join(
            JoinType::Left,
            &p,
            &[(Column::new("linia").from("m"), Column::new("linia").from("p"))],
        );
        assert_eq!(
            joined.name(),
            "MASZYNY m LEFT JOIN PRODUKCJA p ON 1=1 AND m.linia = p.linia"
        );
    }

    #[test]
    fn test_join_self() {
        let t = Table::new("MASZYNY");
        assert_eq!(t.join_self(&["a", "b"]).name(), "MASZYNY a, MASZYNY b");
    }
}
