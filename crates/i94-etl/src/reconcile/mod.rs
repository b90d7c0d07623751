//! Post-load data-quality reconciliation.
//!
//! Each check joins the fact table to one dimension and returns a single
//! total. If the fact table has no orphaned keys, every join yields the same
//! total. Totals are captured first, then compared pairwise in check order;
//! since equality is transitive, adjacent comparison is enough to detect any
//! disagreement.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{error, info};

use crate::config::NamedQueries;
use crate::error::{EtlError, Result};
use crate::warehouse::{parse_integer, Warehouse};

/// Check name to captured total, in check order.
pub type ReconciliationResult = IndexMap<String, i64>;

/// Successful reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationReport {
    /// Total every check agreed on.
    pub common_total: i64,
    pub totals: ReconciliationResult,
    pub duration_ms: u64,
}

/// Runs quality checks against a loaded warehouse.
pub struct Reconciler<'a, W: Warehouse + ?Sized> {
    warehouse: &'a W,
}

impl<'a, W: Warehouse + ?Sized> Reconciler<'a, W> {
    pub fn new(warehouse: &'a W) -> Self {
        Self { warehouse }
    }

    /// Execute every check in order and confirm all totals match.
    pub async fn reconcile(&self, checks: &NamedQueries) -> Result<ReconciliationReport> {
        let start = Instant::now();
        if checks.is_empty() {
            return Err(EtlError::Config(
                "no data quality checks configured".to_string(),
            ));
        }

        info!("Retrieving fact joined to dimension table totals");
        let totals = self.collect(checks).await?;

        info!("Confirming all totals match");
        let common_total = compare_adjacent(&totals)?;

        info!("Successfully confirmed all totals: {} match", common_total);
        Ok(ReconciliationReport {
            common_total,
            totals,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    async fn collect(&self, checks: &NamedQueries) -> Result<ReconciliationResult> {
        let mut totals = ReconciliationResult::with_capacity(checks.len());

        for (check, query) in checks {
            info!("Retrieving: {}", check);
            let scalar = self.warehouse.query_scalar(query).await.map_err(|e| {
                error!("Error: retrieving {}: {}", check, e);
                EtlError::check(check, e)
            })?;

            let total = match scalar {
                Some(text) => parse_integer(&text).ok_or_else(|| EtlError::InvalidResult {
                    check: check.clone(),
                    value: text.clone(),
                })?,
                None => {
                    return Err(EtlError::MissingResult {
                        check: check.clone(),
                    })
                }
            };

            info!("{} is: {}", check, total);
            totals.insert(check.clone(), total);
        }

        Ok(totals)
    }
}

/// Compare each total with the one before it; return the common total.
///
/// Fails on the first adjacent pair that differs.
pub fn compare_adjacent(totals: &ReconciliationResult) -> Result<i64> {
    let mut entries = totals.iter();
    let Some((mut previous, mut previous_total)) = entries.next() else {
        return Err(EtlError::Config(
            "no data quality checks configured".to_string(),
        ));
    };

    for (current, current_total) in entries {
        if current_total != previous_total {
            error!(
                "Data quality check failed: {} ({}) and {} ({}) totals are not equal",
                previous, previous_total, current, current_total
            );
            return Err(EtlError::Mismatch {
                previous: previous.clone(),
                previous_total: *previous_total,
                current: current.clone(),
                current_total: *current_total,
            });
        }
        previous = current;
        previous_total = current_total;
    }

    Ok(*previous_total)
}
