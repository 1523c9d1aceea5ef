use super::{SqlDialect, join_except, join_set};

/// BigQuery requires an explicit `DISTINCT` on every set operator.
#[derive(Debug, Clone, Copy, Default)]
pub struct BigQueryDialect;

impl SqlDialect for BigQueryDialect {
    fn intersect(&self, queries: &[String]) -> String {
        join_set(queries, "INTERSECT DISTINCT")
    }

    fn union(&self, queries: &[String]) -> String {
        join_set(queries, "UNION DISTINCT")
    }

    fn except(&self, queries: &[String]) -> String {
        join_except(queries, "EXCEPT DISTINCT")
    }
}
