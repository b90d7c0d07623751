//! Ordered execution of named warehouse statements.
//!
//! Each entry is executed and committed on its own. The first failure stops
//! the batch; entries committed before it stay committed.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;
use tracing::{error, info};

use crate::config::NamedQueries;
use crate::error::{EtlError, Result};
use crate::warehouse::{parse_integer, Warehouse};

/// The stage a batch of named statements belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadStage {
    Drop,
    Create,
    Staging,
    Target,
}

impl LoadStage {
    /// Whether the stage fills tables (and so reports row counts).
    pub fn counts_rows(&self) -> bool {
        matches!(self, LoadStage::Staging | LoadStage::Target)
    }
}

impl fmt::Display for LoadStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadStage::Drop => write!(f, "drop"),
            LoadStage::Create => write!(f, "create"),
            LoadStage::Staging => write!(f, "load staging"),
            LoadStage::Target => write!(f, "load target"),
        }
    }
}

/// Outcome of one table in a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableLoad {
    pub table: String,
    /// Rows in the table after the statement; None for DDL stages.
    pub row_count: Option<i64>,
}

/// Outcome of a whole batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadReport {
    pub stage: LoadStage,
    pub tables: Vec<TableLoad>,
    pub duration_ms: u64,
}

impl LoadReport {
    /// Sum of row counts across the batch.
    pub fn total_rows(&self) -> i64 {
        self.tables.iter().filter_map(|t| t.row_count).sum()
    }
}

/// Applies named statements to a warehouse connection.
pub struct Loader<'a, W: Warehouse + ?Sized> {
    warehouse: &'a W,
}

impl<'a, W: Warehouse + ?Sized> Loader<'a, W> {
    pub fn new(warehouse: &'a W) -> Self {
        Self { warehouse }
    }

    /// Run every statement of `queries` in order for `stage`.
    ///
    /// For filling stages, `SELECT COUNT(*) FROM <table>` follows each commit
    /// and the count is logged and reported.
    pub async fn run(&self, stage: LoadStage, queries: &NamedQueries) -> Result<LoadReport> {
        let start = Instant::now();
        info!("Starting stage: {} ({} tables)", stage, queries.len());

        let mut tables = Vec::with_capacity(queries.len());
        for (table, statement) in queries {
            match self.run_one(stage, table, statement).await {
                Ok(row_count) => tables.push(TableLoad {
                    table: table.clone(),
                    row_count,
                }),
                Err(e) => {
                    error!("Error: {} table {}: {}", stage, table, e);
                    return Err(EtlError::load(stage, table, e));
                }
            }
        }

        info!("Finished stage: {} successfully", stage);
        Ok(LoadReport {
            stage,
            tables,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    async fn run_one(&self, stage: LoadStage, table: &str, statement: &str) -> Result<Option<i64>> {
        info!("{}: {}", stage, table);
        self.warehouse.execute(statement).await?;
        self.warehouse.commit().await?;

        if !stage.counts_rows() {
            info!("{}: {} done", stage, table);
            return Ok(None);
        }

        info!("Counting records loaded into table: {}", table);
        let count_query = format!("SELECT COUNT(*) FROM {};", table);
        let row_count = match self.warehouse.query_scalar(&count_query).await? {
            Some(text) => parse_integer(&text).ok_or_else(|| {
                EtlError::Query(format!("row count for {} is not an integer: '{}'", table, text))
            })?,
            None => {
                return Err(EtlError::Query(format!(
                    "row count query for {} returned no value",
                    table
                )))
            }
        };

        info!("Loaded: {} records into table: {}", row_count, table);
        Ok(Some(row_count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::warehouse::testing::{FakeWarehouse, Reply};
    use indexmap::IndexMap;

    fn batch(entries: &[(&str, &str)]) -> NamedQueries {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<IndexMap<_, _>>()
    }

    #[tokio::test]
    async fn test_staging_load_executes_commits_and_counts_in_order() {
        let wh = FakeWarehouse::new()
            .scalar("SELECT COUNT(*) FROM staging_airport;", 55_075)
            .scalar("SELECT COUNT(*) FROM staging_visa;", 8);
        let queries = batch(&[
            ("staging_airport", "COPY staging_airport"),
            ("staging_visa", "COPY staging_visa"),
        ]);

        let report = Loader::new(&wh)
            .run(LoadStage::Staging, &queries)
            .await
            .unwrap();

        assert_eq!(
            wh.calls(),
            vec![
                "execute:COPY staging_airport",
                "commit",
                "query:SELECT COUNT(*) FROM staging_airport;",
                "execute:COPY staging_visa",
                "commit",
                "query:SELECT COUNT(*) FROM staging_visa;",
            ]
        );
        assert_eq!(report.stage, LoadStage::Staging);
        assert_eq!(report.tables[0].row_count, Some(55_075));
        assert_eq!(report.tables[1].row_count, Some(8));
        assert_eq!(report.total_rows(), 55_083);
    }

    #[tokio::test]
    async fn test_first_failure_halts_batch() {
        let wh = FakeWarehouse::new()
            .scalar("SELECT COUNT(*) FROM dim_a;", 1)
            .reply("INSERT b", Reply::Fail("permission denied".into()));
        let queries = batch(&[
            ("dim_a", "INSERT a"),
            ("dim_b", "INSERT b"),
            ("dim_c", "INSERT c"),
        ]);

        let err = Loader::new(&wh)
            .run(LoadStage::Target, &queries)
            .await
            .unwrap_err();

        match &err {
            EtlError::Load { stage, table, source } => {
                assert_eq!(*stage, LoadStage::Target);
                assert_eq!(table, "dim_b");
                assert!(source.to_string().contains("permission denied"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        let calls = wh.calls();
        assert!(!calls.iter().any(|c| c.contains("INSERT c")));
        assert!(!calls.iter().any(|c| c.contains("dim_b;")));
        // dim_a stays committed
        assert_eq!(calls[1], "commit");
    }

    #[tokio::test]
    async fn test_ddl_stage_skips_row_count() {
        let wh = FakeWarehouse::new();
        let queries = batch(&[("dim_a", "DROP TABLE IF EXISTS dim_a")]);

        let report = Loader::new(&wh).run(LoadStage::Drop, &queries).await.unwrap();

        assert_eq!(wh.calls(), vec!["execute:DROP TABLE IF EXISTS dim_a", "commit"]);
        assert_eq!(report.tables[0].row_count, None);
        assert_eq!(report.total_rows(), 0);
    }

    #[tokio::test]
    async fn test_missing_row_count_is_load_error() {
        let wh = FakeWarehouse::new();
        let queries = batch(&[("staging_a", "COPY a")]);

        let err = Loader::new(&wh)
            .run(LoadStage::Staging, &queries)
            .await
            .unwrap_err();

        assert!(matches!(err, EtlError::Load { .. }));
        assert!(err.format_detailed().contains("returned no value"));
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(LoadStage::Staging.to_string(), "load staging");
        assert_eq!(LoadStage::Create.to_string(), "create");
    }
}
