//! SQL dialects: how compiled subqueries are stitched together.

mod bigquery;
mod standard;

pub use bigquery::BigQueryDialect;
pub use standard::StandardDialect;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TagError;

/// Set-operation vocabulary of one SQL dialect.
///
/// Implementations are pure string functions with no state.
pub trait SqlDialect: Send + Sync {
    /// Rows present in every query. One query is returned as-is, none is `""`.
    fn intersect(&self, queries: &[String]) -> String;

    /// Rows present in any query. One query is returned as-is, none is `""`.
    fn union(&self, queries: &[String]) -> String;

    /// Rows of the first query absent from the rest. Fewer than two is `""`.
    fn except(&self, queries: &[String]) -> String;

    /// Wrap one query so it can be an operand of a set operation.
    fn parentheses(&self, query: &str) -> String {
        format!("({query})")
    }
}

/// Join queries with an N-ary set operator.
pub(crate) fn join_set(queries: &[String], operator: &str) -> String {
    match queries {
        [] => String::new(),
        [only] => only.clone(),
        _ => queries.join(&format!(" {operator} ")),
    }
}

pub(crate) fn join_except(queries: &[String], operator: &str) -> String {
    if queries.len() < 2 {
        return String::new();
    }
    queries.join(&format!(" {operator} "))
}

/// Supported dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[default]
    BigQuery,
    Postgres,
    MySql,
    Snowflake,
}

impl Dialect {
    pub const ALL: [Dialect; 4] = [
        Dialect::BigQuery,
        Dialect::Postgres,
        Dialect::MySql,
        Dialect::Snowflake,
    ];

    pub fn sql_dialect(&self) -> Box<dyn SqlDialect> {
        match self {
            Dialect::BigQuery => Box::new(BigQueryDialect),
            Dialect::Postgres | Dialect::MySql | Dialect::Snowflake => Box::new(StandardDialect),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Dialect::BigQuery => "bigquery",
            Dialect::Postgres => "postgres",
            Dialect::MySql => "mysql",
            Dialect::Snowflake => "snowflake",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dialect {
    type Err = TagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        Dialect::ALL
            .into_iter()
            .find(|d| d.as_str() == lower)
            .ok_or_else(|| TagError::Config(format!("unknown dialect: {s:?}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_dialect_from_str() {
        assert_eq!("BigQuery".parse::<Dialect>().unwrap(), Dialect::BigQuery);
        assert_eq!("mysql".parse::<Dialect>().unwrap(), Dialect::MySql);
        assert!("oracle".parse::<Dialect>().is_err());
        assert_eq!(Dialect::default(), Dialect::BigQuery);
    }

    #[test]
    fn test_standard_keywords() {
        let d = Dialect::Postgres.sql_dialect();
        assert_eq!(d.intersect(&q(&["(a)", "(b)"])), "(a) INTERSECT (b)");
        assert_eq!(d.union(&q(&["(a)", "(b)", "(c)"])), "(a) UNION (b) UNION (c)");
        assert_eq!(d.except(&q(&["(a)", "(b)"])), "(a) EXCEPT (b)");
        assert_eq!(d.except(&q(&["(a)"])), "");
        assert_eq!(d.parentheses("a"), "(a)");
    }
}
