//! Configuration validation.

use super::{Config, NamedQueries};
use crate::error::{EtlError, Result};
use crate::warehouse::SslMode;
use regex::Regex;
use std::sync::LazyLock;

/// Plain or schema-qualified identifier, safe to splice into a COUNT query.
static TABLE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)?$")
        .expect("Invalid regex pattern")
});

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    // Warehouse validation
    if config.warehouse.host.is_empty() {
        return Err(EtlError::Config("warehouse.host is required".into()));
    }
    if config.warehouse.database.is_empty() {
        return Err(EtlError::Config("warehouse.database is required".into()));
    }
    if config.warehouse.user.is_empty() {
        return Err(EtlError::Config("warehouse.user is required".into()));
    }
    SslMode::parse(&config.warehouse.ssl_mode)?;

    // Storage validation
    if config.storage.misc_data_bucket.is_empty() {
        return Err(EtlError::Config("storage.misc_data_bucket is required".into()));
    }
    if config.storage.immigration_data_bucket.is_empty() {
        return Err(EtlError::Config(
            "storage.immigration_data_bucket is required".into(),
        ));
    }
    if config.storage.access_key_id.is_some() != config.storage.secret_access_key.is_some() {
        return Err(EtlError::Config(
            "storage.access_key_id and storage.secret_access_key must be set together".into(),
        ));
    }

    // Source validation
    if config.source.immigration_raw_dir.as_os_str().is_empty() {
        return Err(EtlError::Config(
            "source.immigration_raw_dir is required".into(),
        ));
    }
    if config.source.immigration_clean_dir.as_os_str().is_empty() {
        return Err(EtlError::Config(
            "source.immigration_clean_dir is required".into(),
        ));
    }
    if config.source.immigration_raw_dir == config.source.immigration_clean_dir {
        return Err(EtlError::Config(
            "source.immigration_raw_dir and source.immigration_clean_dir must differ".into(),
        ));
    }

    // Clean rule validation
    for date in &config.clean.date_columns {
        if config.clean.drop_columns.contains(&date.target) {
            return Err(EtlError::Config(format!(
                "clean.date_columns target '{}' is also listed in clean.drop_columns",
                date.target
            )));
        }
    }

    if !config.clean.delimiter.is_ascii() || config.clean.delimiter == '"' {
        return Err(EtlError::Config(format!(
            "clean.delimiter '{}' must be a single ASCII character other than '\"'",
            config.clean.delimiter
        )));
    }

    // Query validation
    let queries = &config.queries;
    validate_queries("queries.drop_tables", &queries.drop_tables, true)?;
    validate_queries("queries.create_tables", &queries.create_tables, true)?;
    validate_queries("queries.load_staging", &queries.load_staging, true)?;
    validate_queries("queries.load_target", &queries.load_target, true)?;
    validate_queries("queries.quality_checks", &queries.quality_checks, false)?;

    if queries.load_staging.is_empty() {
        return Err(EtlError::Config(
            "queries.load_staging must contain at least one table".into(),
        ));
    }
    if queries.load_target.is_empty() {
        return Err(EtlError::Config(
            "queries.load_target must contain at least one table".into(),
        ));
    }
    if queries.quality_checks.is_empty() {
        return Err(EtlError::Config(
            "queries.quality_checks must contain at least one check".into(),
        ));
    }

    Ok(())
}

fn validate_queries(section: &str, queries: &NamedQueries, keyed_by_table: bool) -> Result<()> {
    for (name, sql) in queries {
        if name.trim().is_empty() {
            return Err(EtlError::Config(format!("{} has an entry with an empty name", section)));
        }
        if keyed_by_table && !TABLE_NAME.is_match(name) {
            return Err(EtlError::Config(format!(
                "{}: '{}' is not a valid table name",
                section, name
            )));
        }
        if sql.trim().is_empty() {
            return Err(EtlError::Config(format!("{}.{} has an empty statement", section, name)));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        CleanConfig, QueryCatalog, SourceConfig, StorageConfig, WarehouseConfig,
    };
    use indexmap::IndexMap;

    fn queries(entries: &[(&str, &str)]) -> NamedQueries {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<IndexMap<_, _>>()
    }

    fn valid_config() -> Config {
        Config {
            warehouse: WarehouseConfig {
                host: "dwh.example.com".to_string(),
                port: 5439,
                database: "immigration".to_string(),
                user: "etl".to_string(),
                password: "password".to_string(),
                ssl_mode: "require".to_string(),
            },
            source: SourceConfig {
                immigration_raw_dir: "data/raw".into(),
                immigration_clean_dir: "data/clean".into(),
                misc_data_dir: "data/misc".into(),
            },
            storage: StorageConfig {
                region: Some("us-west-2".to_string()),
                endpoint: None,
                access_key_id: Some("AKIA".to_string()),
                secret_access_key: Some("secret".to_string()),
                misc_data_bucket: "misc".to_string(),
                immigration_data_bucket: "imgrtn".to_string(),
            },
            clean: CleanConfig::default(),
            queries: QueryCatalog {
                drop_tables: queries(&[("staging_airport", "DROP TABLE IF EXISTS staging_airport")]),
                create_tables: queries(&[("staging_airport", "CREATE TABLE staging_airport (x int)")]),
                load_staging: queries(&[("staging_airport", "COPY staging_airport FROM 's3://x'")]),
                load_target: queries(&[("public.dim_airport", "INSERT INTO dim_airport SELECT 1")]),
                quality_checks: queries(&[("fact_dim_airport", "SELECT COUNT(*) FROM f JOIN d USING (id)")]),
            },
        }
    }

    #[test]
    fn test_valid_config() {
        let config = valid_config();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_missing_warehouse_host() {
        let mut config = valid_config();
        config.warehouse.host = "".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_invalid_ssl_mode() {
        let mut config = valid_config();
        config.warehouse.ssl_mode = "sometimes".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_half_configured_credentials_rejected() {
        let mut config = valid_config();
        config.storage.secret_access_key = None;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_table_name_must_be_identifier() {
        let mut config = valid_config();
        config
            .queries
            .load_staging
            .insert("staging; DROP TABLE x".to_string(), "COPY ...".to_string());
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("not a valid table name"));
    }

    #[test]
    fn test_check_names_need_not_be_identifiers() {
        let mut config = valid_config();
        config
            .queries
            .quality_checks
            .insert("fact joined to visa".to_string(), "SELECT 1".to_string());
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_empty_quality_checks_rejected() {
        let mut config = valid_config();
        config.queries.quality_checks.clear();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_empty_statement_rejected() {
        let mut config = valid_config();
        config
            .queries
            .load_target
            .insert("dim_visa".to_string(), "   ".to_string());
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_non_ascii_delimiter_rejected() {
        let mut config = valid_config();
        config.clean.delimiter = '\u{a7}';
        assert!(validate(&config).unwrap_err().to_string().contains("clean.delimiter"));

        config.clean.delimiter = '|';
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_warehouse_config_debug_redacts_password() {
        let mut config = valid_config();
        config.warehouse.password = "super_secret_password_123".to_string();
        let debug_output = format!("{:?}", config.warehouse);
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("super_secret_password_123"));
    }

    #[test]
    fn test_storage_config_debug_redacts_secret() {
        let config = valid_config();
        let debug_output = format!("{:?}", config.storage);
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("\"secret\""));
    }
}
