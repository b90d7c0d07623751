//! Configuration type definitions.

use chrono::NaiveDate;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Ordered mapping of name to statement text. Iteration order is the order
/// the entries appear in the configuration file.
pub type NamedQueries = IndexMap<String, String>;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Warehouse connection parameters.
    pub warehouse: WarehouseConfig,

    /// Local data directories.
    pub source: SourceConfig,

    /// Object-storage destination.
    pub storage: StorageConfig,

    /// Extract cleaning rules.
    #[serde(default)]
    pub clean: CleanConfig,

    /// Warehouse statements, grouped by stage.
    pub queries: QueryCatalog,
}

/// Warehouse connection configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct WarehouseConfig {
    /// Cluster endpoint.
    pub host: String,

    /// Port (default: 5439).
    #[serde(default = "default_warehouse_port")]
    pub port: u16,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password.
    pub password: String,

    /// SSL mode (default: "require").
    #[serde(default = "default_require")]
    pub ssl_mode: String,
}

impl fmt::Debug for WarehouseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WarehouseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("ssl_mode", &self.ssl_mode)
            .finish()
    }
}

/// Local directories used by the cleaning and upload stages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Directory holding the raw immigration extracts.
    pub immigration_raw_dir: PathBuf,

    /// Directory the cleaned, compressed immigration files are written to.
    pub immigration_clean_dir: PathBuf,

    /// Directory holding the supporting (dimension) data files.
    pub misc_data_dir: PathBuf,
}

/// Object-storage configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// AWS region.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    /// Custom endpoint (S3-compatible stores, local testing).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Access key. Falls back to the standard AWS environment when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_key_id: Option<String>,

    /// Secret key. Falls back to the standard AWS environment when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_access_key: Option<String>,

    /// Bucket receiving the supporting data files.
    pub misc_data_bucket: String,

    /// Bucket receiving the cleaned immigration files.
    pub immigration_data_bucket: String,
}

impl fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageConfig")
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .field("access_key_id", &self.access_key_id)
            .field(
                "secret_access_key",
                &self.secret_access_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("misc_data_bucket", &self.misc_data_bucket)
            .field("immigration_data_bucket", &self.immigration_data_bucket)
            .finish()
    }
}

/// Rules applied to every immigration extract by the cleaner.
///
/// The defaults reproduce the cleaning of the I-94 arrival extracts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanConfig {
    /// Columns removed when present.
    #[serde(default = "default_drop_columns")]
    pub drop_columns: Vec<String>,

    /// Value written when a column is null.
    #[serde(default = "default_fill_nulls")]
    pub fill_nulls: IndexMap<String, String>,

    /// Exact-match value substitutions.
    #[serde(default = "default_replacements")]
    pub replacements: Vec<Replacement>,

    /// Day-offset columns converted to calendar dates.
    #[serde(default = "default_date_columns")]
    pub date_columns: Vec<DateColumn>,

    /// Day zero for the day-offset columns.
    #[serde(default = "default_date_epoch")]
    pub date_epoch: NaiveDate,

    /// Columns that must hold whole numbers.
    #[serde(default = "default_integer_columns")]
    pub integer_columns: Vec<String>,

    /// File extensions the extract reader accepts.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Field delimiter of the raw extracts.
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
}

impl Default for CleanConfig {
    fn default() -> Self {
        Self {
            drop_columns: default_drop_columns(),
            fill_nulls: default_fill_nulls(),
            replacements: default_replacements(),
            date_columns: default_date_columns(),
            date_epoch: default_date_epoch(),
            integer_columns: default_integer_columns(),
            extensions: default_extensions(),
            delimiter: default_delimiter(),
        }
    }
}

/// Replace `from` with `to` wherever `column` equals `from` exactly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Replacement {
    pub column: String,
    pub from: String,
    pub to: String,
}

/// Convert the day offset in `source` into a date written to `target`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateColumn {
    pub source: String,
    pub target: String,
}

/// Warehouse statements grouped by the stage that executes them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryCatalog {
    /// Table name to DROP statement.
    #[serde(default)]
    pub drop_tables: NamedQueries,

    /// Table name to CREATE statement.
    #[serde(default)]
    pub create_tables: NamedQueries,

    /// Staging table name to COPY statement.
    #[serde(default)]
    pub load_staging: NamedQueries,

    /// Target table name to INSERT ... SELECT statement.
    #[serde(default)]
    pub load_target: NamedQueries,

    /// Check name to fact-joined-to-dimension count query.
    #[serde(default)]
    pub quality_checks: NamedQueries,
}

// Default value functions for serde
fn default_warehouse_port() -> u16 {
    5439
}

fn default_require() -> String {
    "require".to_string()
}

fn default_drop_columns() -> Vec<String> {
    [
        "dtadfile",
        "entdepa",
        "entdepd",
        "entdepu",
        "matflag",
        "insnum",
        "admnum",
        "fltno",
        "delete_dup",
        "delete_visa",
        "validres",
        "delete_recdup",
        "delete_days",
        "delete_mexl",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_fill_nulls() -> IndexMap<String, String> {
    // 9 = mode not reported
    IndexMap::from([("i94mode".to_string(), "9".to_string())])
}

fn default_replacements() -> Vec<Replacement> {
    vec![Replacement {
        column: "dtaddto".to_string(),
        from: "D/S".to_string(),
        to: "12319999".to_string(),
    }]
}

fn default_date_columns() -> Vec<DateColumn> {
    vec![
        DateColumn {
            source: "arrdate".to_string(),
            target: "arrl_date".to_string(),
        },
        DateColumn {
            source: "depdate".to_string(),
            target: "dep_date".to_string(),
        },
    ]
}

fn default_date_epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1960, 1, 1).unwrap_or_default()
}

fn default_integer_columns() -> Vec<String> {
    // Country codes join to dim_country as whole numbers
    [
        "cicid", "i94yr", "i94mon", "i94cit", "i94res", "i94visa", "count",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_extensions() -> Vec<String> {
    vec!["csv".to_string()]
}

fn default_delimiter() -> char {
    ','
}
