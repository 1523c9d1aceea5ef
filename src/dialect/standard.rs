use super::{SqlDialect, join_except, join_set};

/// ANSI set operators. `INTERSECT`, `UNION` and `EXCEPT` are distinct by
/// default in Postgres, MySQL and Snowflake.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardDialect;

impl SqlDialect for StandardDialect {
    fn intersect(&self, queries: &[String]) -> String {
        join_set(queries, "INTERSECT")
    }

    fn union(&self, queries: &[String]) -> String {
        join_set(queries, "UNION")
    }

    fn except(&self, queries: &[String]) -> String {
        join_except(queries, "EXCEPT")
    }
}
