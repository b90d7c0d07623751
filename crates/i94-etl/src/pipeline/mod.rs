//! Stage sequencing for a full warehouse refresh.
//!
//! A run moves through six stages in a fixed order:
//!
//! 1. clean the raw immigration extracts
//! 2. upload the reference data and cleaned extracts
//! 3. drop and recreate the warehouse tables
//! 4. copy the uploaded files into staging tables
//! 5. populate the fact and dimension tables from staging
//! 6. reconcile the fact table against every dimension
//!
//! The first failing stage ends the run. Nothing is retried.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;
use tracing::info;

use crate::clean::{CleanSummary, Cleaner};
use crate::config::{Config, StorageConfig};
use crate::error::{EtlError, Result};
use crate::load::{LoadReport, LoadStage, Loader};
use crate::reconcile::{ReconciliationReport, Reconciler};
use crate::storage::{ArtifactUploader, UploadReport};
use crate::warehouse::Warehouse;

/// The two upload destinations.
#[derive(Debug)]
pub struct Uploaders {
    pub misc: ArtifactUploader,
    pub immigration: ArtifactUploader,
}

impl Uploaders {
    /// S3 uploaders for both configured buckets.
    pub fn s3(config: &StorageConfig) -> Result<Self> {
        Ok(Self {
            misc: ArtifactUploader::s3(config, &config.misc_data_bucket)?,
            immigration: ArtifactUploader::s3(config, &config.immigration_data_bucket)?,
        })
    }
}

/// Result of a health check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub healthy: bool,
    pub latency_ms: u64,
    pub error: Option<String>,
}

/// What a run (or a single command) did.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    /// Unique run identifier.
    pub run_id: String,

    /// Final status.
    pub status: String,

    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub clean: Option<CleanSummary>,

    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub uploads: Vec<UploadReport>,

    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub loads: Vec<LoadReport>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reconciliation: Option<ReconciliationReport>,
}

impl RunSummary {
    /// Start a new summary stamped with a fresh run id.
    pub fn begin() -> Self {
        let run_id = uuid::Uuid::new_v4().to_string();
        info!("Starting run: {}", run_id);
        Self {
            run_id,
            status: "running".to_string(),
            started_at: Utc::now(),
            completed_at: None,
            duration_seconds: 0.0,
            clean: None,
            uploads: Vec::new(),
            loads: Vec::new(),
            reconciliation: None,
        }
    }

    /// Stamp completion time and duration.
    pub fn finish(mut self) -> Self {
        let completed_at = Utc::now();
        self.duration_seconds =
            (completed_at - self.started_at).num_milliseconds().max(0) as f64 / 1000.0;
        self.completed_at = Some(completed_at);
        self.status = "completed".to_string();
        info!(
            "Run {} completed in {:.2}s",
            self.run_id, self.duration_seconds
        );
        self
    }

    /// Rows reported by the staging and target loads.
    pub fn rows_loaded(&self) -> i64 {
        self.loads.iter().map(LoadReport::total_rows).sum()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Run ID: {}", self.run_id)?;
        writeln!(f, "Status: {}", self.status)?;
        writeln!(f, "Duration: {:.2}s", self.duration_seconds)?;

        if let Some(clean) = &self.clean {
            writeln!(
                f,
                "Cleaned: {} files, {} rows ({} skipped)",
                clean.files.len(),
                clean.total_rows(),
                clean.skipped.len()
            )?;
        }

        for upload in &self.uploads {
            writeln!(
                f,
                "Uploaded: {} files, {} bytes to {}",
                upload.objects.len(),
                upload.total_bytes(),
                upload.bucket
            )?;
        }

        for load in &self.loads {
            writeln!(f, "Stage {}: {} tables", load.stage, load.tables.len())?;
            for table in &load.tables {
                match table.row_count {
                    Some(rows) => writeln!(f, "  {}: {} rows", table.table, rows)?,
                    None => writeln!(f, "  {}", table.table)?,
                }
            }
        }

        if let Some(recon) = &self.reconciliation {
            writeln!(f, "Quality checks:")?;
            for (check, total) in &recon.totals {
                writeln!(f, "  {}: {}", check, total)?;
            }
            writeln!(f, "All totals match: {}", recon.common_total)?;
        }

        Ok(())
    }
}

/// Runs pipeline stages from one configuration.
pub struct Pipeline {
    config: Config,
}

impl Pipeline {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Clean the raw immigration extracts into the upload directory.
    pub async fn clean(&self) -> Result<CleanSummary> {
        let clean = self.config.clean.clone();
        let raw_dir = self.config.source.immigration_raw_dir.clone();
        let clean_dir = self.config.source.immigration_clean_dir.clone();

        tokio::task::spawn_blocking(move || Cleaner::new(clean).clean_dir(&raw_dir, &clean_dir))
            .await
            .map_err(|e| EtlError::Io(std::io::Error::other(e)))?
    }

    /// Upload reference data, then the cleaned immigration extracts.
    pub async fn upload(&self, uploaders: &Uploaders) -> Result<Vec<UploadReport>> {
        let misc = uploaders
            .misc
            .upload_dir(&self.config.source.misc_data_dir)
            .await?;
        let immigration = uploaders
            .immigration
            .upload_dir(&self.config.source.immigration_clean_dir)
            .await?;
        Ok(vec![misc, immigration])
    }

    /// Drop then create every warehouse table.
    pub async fn create_tables<W: Warehouse + ?Sized>(
        &self,
        warehouse: &W,
    ) -> Result<Vec<LoadReport>> {
        let loader = Loader::new(warehouse);
        let queries = &self.config.queries;
        Ok(vec![
            loader.run(LoadStage::Drop, &queries.drop_tables).await?,
            loader.run(LoadStage::Create, &queries.create_tables).await?,
        ])
    }

    /// Load staging tables, then target tables.
    pub async fn load<W: Warehouse + ?Sized>(&self, warehouse: &W) -> Result<Vec<LoadReport>> {
        let loader = Loader::new(warehouse);
        let queries = &self.config.queries;
        Ok(vec![
            loader.run(LoadStage::Staging, &queries.load_staging).await?,
            loader.run(LoadStage::Target, &queries.load_target).await?,
        ])
    }

    /// Run the data-quality reconciliation.
    pub async fn reconcile<W: Warehouse + ?Sized>(
        &self,
        warehouse: &W,
    ) -> Result<ReconciliationReport> {
        Reconciler::new(warehouse)
            .reconcile(&self.config.queries.quality_checks)
            .await
    }

    /// Load then reconcile, recording both in `summary`.
    pub async fn load_and_check<W: Warehouse + ?Sized>(
        &self,
        warehouse: &W,
        summary: &mut RunSummary,
    ) -> Result<()> {
        summary.loads.extend(self.load(warehouse).await?);
        summary.reconciliation = Some(self.reconcile(warehouse).await?);
        Ok(())
    }

    /// Every stage in order.
    pub async fn run<W: Warehouse + ?Sized>(
        &self,
        warehouse: &W,
        uploaders: &Uploaders,
    ) -> Result<RunSummary> {
        let mut summary = RunSummary::begin();
        self.run_into(warehouse, uploaders, &mut summary).await?;
        Ok(summary.finish())
    }

    /// Every stage in order, recording each report in `summary`.
    pub async fn run_into<W: Warehouse + ?Sized>(
        &self,
        warehouse: &W,
        uploaders: &Uploaders,
        summary: &mut RunSummary,
    ) -> Result<()> {
        info!("Stage 1: Cleaning immigration extracts");
        summary.clean = Some(self.clean().await?);

        info!("Stage 2: Uploading data files");
        summary.uploads = self.upload(uploaders).await?;

        info!("Stage 3: Creating warehouse tables");
        summary.loads = self.create_tables(warehouse).await?;

        info!("Stage 4: Loading and reconciling");
        self.load_and_check(warehouse, summary).await
    }

    /// Probe the warehouse with `SELECT 1`.
    pub async fn health_check<W: Warehouse + ?Sized>(warehouse: &W) -> HealthCheckResult {
        let start = Instant::now();
        let result = warehouse.health_check().await;
        let latency_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(()) => HealthCheckResult {
                healthy: true,
                latency_ms,
                error: None,
            },
            Err(e) => HealthCheckResult {
                healthy: false,
                latency_ms,
                error: Some(e.to_string()),
            },
        }
    }
}
