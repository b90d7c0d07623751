//! Immigration extract cleaning.
//!
//! Raw extracts are read through an [`ExtractReader`], reshaped by a
//! [`CleanPlan`] and written as gzip-compressed CSV with a header row, one
//! output file per input file.

mod reader;
mod transform;

pub use reader::{DelimitedReader, Extract, ExtractReader, Record};
pub use transform::{offset_to_date, sanitize, to_integer, CleanPlan};

use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};

use crate::config::CleanConfig;
use crate::error::{EtlError, Result};

/// Outcome of cleaning one extract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanReport {
    pub source: PathBuf,
    pub output: PathBuf,
    pub rows: u64,
}

/// Outcome of cleaning a directory of extracts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CleanSummary {
    pub files: Vec<CleanReport>,
    pub skipped: Vec<PathBuf>,
    pub duration_ms: u64,
}

impl CleanSummary {
    pub fn total_rows(&self) -> u64 {
        self.files.iter().map(|f| f.rows).sum()
    }
}

/// Cleans raw immigration extracts into the upload directory.
pub struct Cleaner {
    config: CleanConfig,
    reader: Box<dyn ExtractReader>,
}

impl Cleaner {
    /// Cleaner reading delimited extracts with the configured extensions and
    /// delimiter. The delimiter is ASCII once the config is validated.
    pub fn new(config: CleanConfig) -> Self {
        let reader = DelimitedReader::new(config.extensions.clone())
            .with_delimiter(config.delimiter as u8);
        Self::with_reader(config, Box::new(reader))
    }

    pub fn with_reader(config: CleanConfig, reader: Box<dyn ExtractReader>) -> Self {
        Self { config, reader }
    }

    /// Clean every accepted file in `raw_dir`, in file name order.
    pub fn clean_dir(&self, raw_dir: &Path, clean_dir: &Path) -> Result<CleanSummary> {
        let start = Instant::now();
        info!("Cleaning extracts in {}", raw_dir.display());

        let mut inputs = Vec::new();
        for entry in fs::read_dir(raw_dir)? {
            let path = entry?.path();
            if path.is_file() {
                inputs.push(path);
            }
        }
        inputs.sort();

        fs::create_dir_all(clean_dir)?;

        let mut summary = CleanSummary::default();
        for path in inputs {
            if !self.reader.accepts(&path) {
                warn!("Skipping unsupported file: {}", path.display());
                summary.skipped.push(path);
                continue;
            }
            summary.files.push(self.clean_file(&path, clean_dir)?);
        }

        summary.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            "Cleaned {} files ({} rows) into {}",
            summary.files.len(),
            summary.total_rows(),
            clean_dir.display()
        );
        Ok(summary)
    }

    /// Clean one extract into `<clean_dir>/<stem>.csv.gz`.
    pub fn clean_file(&self, path: &Path, clean_dir: &Path) -> Result<CleanReport> {
        let name = path.display().to_string();
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| EtlError::clean(&name, "file name is not valid UTF-8"))?;

        let output = clean_dir.join(format!("{}.csv.gz", stem));
        let partial = clean_dir.join(format!("{}.csv.gz.tmp", stem));

        info!("Cleaning: {}", name);
        let extract = self.reader.open(path)?;
        let plan = CleanPlan::new(&self.config, &extract.columns)
            .map_err(|msg| EtlError::clean(&name, msg))?;

        let rows = match write_gzip_csv(&partial, &plan, extract.records, &name) {
            Ok(rows) => rows,
            Err(e) => {
                let _ = fs::remove_file(&partial);
                return Err(e);
            }
        };
        fs::rename(&partial, &output)?;

        info!("Cleaned: {} rows from {} into {}", rows, name, output.display());
        Ok(CleanReport {
            source: path.to_path_buf(),
            output,
            rows,
        })
    }
}

fn write_gzip_csv(
    path: &Path,
    plan: &CleanPlan,
    records: impl Iterator<Item = Result<Record>>,
    name: &str,
) -> Result<u64> {
    let encoder = GzEncoder::new(BufWriter::new(File::create(path)?), Compression::default());
    let mut writer = csv::Writer::from_writer(encoder);
    writer.write_record(plan.columns())?;

    let mut rows = 0u64;
    for record in records {
        let record = record?;
        let fields = plan
            .apply(&record)
            .map_err(|msg| EtlError::clean(name, format!("row {}: {}", rows + 1, msg)))?;
        writer.write_record(&fields)?;
        rows += 1;
    }

    let encoder = writer
        .into_inner()
        .map_err(|e| EtlError::Io(e.into_error()))?;
    encoder.finish()?.flush()?;
    Ok(rows)
}
