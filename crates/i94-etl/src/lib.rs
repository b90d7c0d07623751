//! # i94-etl
//!
//! Batch loader for an immigration analytics warehouse.
//!
//! The library turns raw I-94 arrival extracts and reference CSVs into a
//! star schema on a PostgreSQL-protocol warehouse such as Redshift:
//!
//! - **Cleaning** of raw extracts into gzip-compressed CSV
//! - **Upload** of data files to S3-compatible object storage
//! - **Ordered loading** of staging and target tables from named statements
//! - **Reconciliation** of the fact table against every dimension
//!
//! ## Example
//!
//! ```rust,no_run
//! use i94_etl::{Config, PgWarehouse, Pipeline, Uploaders};
//!
//! #[tokio::main]
//! async fn main() -> i94_etl::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let warehouse = PgWarehouse::connect(&config.warehouse).await?;
//!     let uploaders = Uploaders::s3(&config.storage)?;
//!     let summary = Pipeline::new(config).run(&warehouse, &uploaders).await?;
//!     println!("Loaded {} rows", summary.rows_loaded());
//!     Ok(())
//! }
//! ```

pub mod clean;
pub mod config;
pub mod error;
pub mod load;
pub mod pipeline;
pub mod reconcile;
pub mod storage;
pub mod warehouse;

// Re-exports for convenient access
pub use clean::{CleanReport, CleanSummary, Cleaner, DelimitedReader, ExtractReader};
pub use config::{Config, NamedQueries, QueryCatalog};
pub use error::{EtlError, Result};
pub use load::{LoadReport, LoadStage, Loader, TableLoad};
pub use pipeline::{HealthCheckResult, Pipeline, RunSummary, Uploaders};
pub use reconcile::{ReconciliationReport, ReconciliationResult, Reconciler};
pub use storage::{ArtifactUploader, UploadReport};
pub use warehouse::{PgWarehouse, SslMode, Warehouse};
