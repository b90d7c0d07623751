//! Environment variable interpolation for config files.
//!
//! - `${VAR}` substitutes the variable and fails if it is unset
//! - `${VAR:-default}` uses `default` when the variable is unset or empty
//! - `$$` is a literal `$`

use regex::{Captures, Regex};
use std::env;
use std::sync::LazyLock;

static ENV_VAR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\$|\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
        .expect("Invalid regex pattern")
});

/// Interpolate environment variables in `input`.
///
/// Every missing variable is collected so they can be reported together.
pub fn interpolate(input: &str) -> Result<String, Vec<String>> {
    interpolate_with(input, |name| env::var(name).ok())
}

/// Interpolate using `lookup` instead of the process environment.
pub fn interpolate_with<F>(input: &str, lookup: F) -> Result<String, Vec<String>>
where
    F: Fn(&str) -> Option<String>,
{
    let mut missing = Vec::new();

    let text = ENV_VAR_PATTERN.replace_all(input, |caps: &Captures| {
        let Some(name) = caps.get(1).map(|m| m.as_str()) else {
            return "$".to_string();
        };
        let default = caps.get(2).map(|m| m.as_str());

        match (lookup(name), default) {
            (Some(value), Some(default)) if value.is_empty() => default.to_string(),
            (Some(value), _) => value,
            (None, Some(default)) => default.to_string(),
            (None, None) => {
                missing.push(format!("environment variable '{}' is not set", name));
                String::new()
            }
        }
    });

    if missing.is_empty() {
        Ok(text.into_owned())
    } else {
        Err(missing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(name: &str) -> Option<String> {
        match name {
            "DWH_PASSWORD" => Some("s3cret".to_string()),
            "EMPTY" => Some(String::new()),
            _ => None,
        }
    }

    #[test]
    fn test_braced_variable() {
        let out = interpolate_with("password: ${DWH_PASSWORD}", lookup).unwrap();
        assert_eq!(out, "password: s3cret");
    }

    #[test]
    fn test_default_used_when_unset_or_empty() {
        assert_eq!(
            interpolate_with("${UNSET:-5439}", lookup).unwrap(),
            "5439"
        );
        assert_eq!(
            interpolate_with("${EMPTY:-fallback}", lookup).unwrap(),
            "fallback"
        );
    }

    #[test]
    fn test_escaped_dollar() {
        assert_eq!(interpolate_with("cost: $$5", lookup).unwrap(), "cost: $5");
    }

    #[test]
    fn test_dollar_quoted_sql_needs_doubling() {
        let sql = "SELECT $$$$a$$$$ AS x";
        assert_eq!(interpolate_with(sql, lookup).unwrap(), "SELECT $$a$$ AS x");
        assert_eq!(interpolate_with("SELECT $$a$$", lookup).unwrap(), "SELECT $a$");
    }

    #[test]
    fn test_all_missing_variables_reported() {
        let errors = interpolate_with("${A} and ${B}", lookup).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors[0].contains("'A'"));
        assert!(errors[1].contains("'B'"));
    }

    #[test]
    fn test_plain_text_untouched() {
        let sql = "SELECT COUNT(*) FROM fact_immigration;";
        assert_eq!(interpolate_with(sql, lookup).unwrap(), sql);
    }
}
