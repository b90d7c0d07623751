//! Column plan and per-record transforms for immigration extracts.

use chrono::{NaiveDate, TimeDelta};
use indexmap::IndexMap;

use super::reader::Record;
use crate::config::CleanConfig;

/// How one output column is produced from an input record.
#[derive(Debug, Clone)]
enum Cell {
    /// Copy of an input column with optional fill, replacement and retype.
    Column {
        index: usize,
        fill: Option<String>,
        replacements: Vec<(String, String)>,
        integer: bool,
    },
    /// Day offset in an input column converted to a date.
    Date { index: usize },
}

/// Output layout for one extract, resolved against its header.
#[derive(Debug, Clone)]
pub struct CleanPlan {
    columns: Vec<String>,
    cells: Vec<Cell>,
    epoch: NaiveDate,
}

impl CleanPlan {
    /// Resolve the cleaning rules against the input `columns`.
    ///
    /// Dropped columns that are absent are ignored. Every other column a rule
    /// names must exist.
    pub fn new(config: &CleanConfig, columns: &[String]) -> Result<Self, String> {
        let position: IndexMap<&str, usize> = columns
            .iter()
            .enumerate()
            .map(|(i, c)| (c.as_str(), i))
            .collect();

        let require = |name: &str| -> Result<usize, String> {
            position
                .get(name)
                .copied()
                .ok_or_else(|| format!("column '{}' not found", name))
        };

        for name in config
            .fill_nulls
            .keys()
            .chain(config.replacements.iter().map(|r| &r.column))
            .chain(config.integer_columns.iter())
        {
            require(name)?;
        }

        let date_sources: Vec<&str> = config
            .date_columns
            .iter()
            .map(|d| d.source.as_str())
            .collect();

        let mut out_columns = Vec::new();
        let mut cells = Vec::new();

        for (index, name) in columns.iter().enumerate() {
            if config.drop_columns.contains(name) || date_sources.contains(&name.as_str()) {
                continue;
            }
            out_columns.push(name.clone());
            cells.push(Cell::Column {
                index,
                fill: config.fill_nulls.get(name).cloned(),
                replacements: config
                    .replacements
                    .iter()
                    .filter(|r| &r.column == name)
                    .map(|r| (r.from.clone(), r.to.clone()))
                    .collect(),
                integer: config.integer_columns.contains(name),
            });
        }

        for date in &config.date_columns {
            let index = require(&date.source)?;
            out_columns.push(date.target.clone());
            cells.push(Cell::Date { index });
        }

        Ok(Self {
            columns: out_columns,
            cells,
            epoch: config.date_epoch,
        })
    }

    /// Output header.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Transform one input record into output fields; null becomes "".
    pub fn apply(&self, record: &Record) -> Result<Vec<String>, String> {
        self.cells
            .iter()
            .zip(&self.columns)
            .map(|(cell, name)| match cell {
                Cell::Column {
                    index,
                    fill,
                    replacements,
                    integer,
                } => {
                    let mut value = record.get(*index).cloned().flatten();
                    if value.is_none() {
                        value = fill.clone();
                    }
                    if let Some(v) = value.as_mut() {
                        if let Some((_, to)) = replacements.iter().find(|(from, _)| *from == *v) {
                            *v = to.clone();
                        }
                    }
                    if *integer {
                        let raw = value
                            .as_deref()
                            .ok_or_else(|| format!("column '{}' is null", name))?;
                        let whole = to_integer(raw).ok_or_else(|| {
                            format!("column '{}' value '{}' is not a whole number", name, raw)
                        })?;
                        return Ok(whole.to_string());
                    }
                    Ok(value.map(|v| sanitize(&v)).unwrap_or_default())
                }
                Cell::Date { index } => Ok(record
                    .get(*index)
                    .cloned()
                    .flatten()
                    .and_then(|v| offset_to_date(self.epoch, &v))
                    .map(|d| d.format("%Y-%m-%d").to_string())
                    .unwrap_or_default()),
            })
            .collect()
    }
}

/// Parse integer text, or float text with no fractional part ("5748517.0").
pub fn to_integer(text: &str) -> Option<i64> {
    let text = text.trim();
    if let Ok(n) = text.parse::<i64>() {
        return Some(n);
    }
    let f = text.parse::<f64>().ok()?;
    if !f.is_finite() || f.fract() != 0.0 || f.abs() >= i64::MAX as f64 {
        return None;
    }
    Some(f as i64)
}

/// Convert a day offset from `epoch` to a date. Non-numeric input yields None.
pub fn offset_to_date(epoch: NaiveDate, text: &str) -> Option<NaiveDate> {
    let days = text.trim().parse::<f64>().ok()?;
    if !days.is_finite() {
        return None;
    }
    let delta = TimeDelta::try_days(days.floor() as i64)?;
    epoch.checked_add_signed(delta)
}

/// Remove every character outside `[A-Za-z0-9.-]`.
pub fn sanitize(value: &str) -> String {
    value
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '.' || *c == '-')
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn record(values: &[Option<&str>]) -> Record {
        values.iter().map(|v| v.map(String::from)).collect()
    }

    fn i94_header() -> Vec<String> {
        header(&[
            "cicid", "i94yr", "i94mon", "i94cit", "i94res", "i94port", "arrdate", "i94mode",
            "depdate", "i94visa", "count", "dtadfile", "dtaddto", "gender", "admnum", "visatype",
        ])
    }

    #[test]
    fn test_plan_drops_columns_and_appends_dates() {
        let plan = CleanPlan::new(&CleanConfig::default(), &i94_header()).unwrap();
        assert_eq!(
            plan.columns(),
            [
                "cicid", "i94yr", "i94mon", "i94cit", "i94res", "i94port", "i94mode", "i94visa",
                "count", "dtaddto", "gender", "visatype", "arrl_date", "dep_date",
            ]
        );
    }

    #[test]
    fn test_apply_full_record() {
        let plan = CleanPlan::new(&CleanConfig::default(), &i94_header()).unwrap();
        let row = record(&[
            Some("5748517.0"),
            Some("2016.0"),
            Some("4.0"),
            Some("245.0"),
            Some("438.0"),
            Some("LOS"),
            Some("20574.0"),
            None,
            Some("20582.0"),
            Some("1.0"),
            Some("1.0"),
            Some("20160430"),
            Some("D/S"),
            Some("F"),
            Some("94953870030.0"),
            Some("B1"),
        ]);

        let out = plan.apply(&row).unwrap();
        assert_eq!(
            out,
            [
                "5748517", "2016", "4", "245", "438", "LOS", "9", "1", "1", "12319999", "F",
                "B1", "2016-04-30", "2016-05-08",
            ]
        );
    }

    #[test]
    fn test_missing_dates_stay_empty() {
        let plan = CleanPlan::new(&CleanConfig::default(), &i94_header()).unwrap();
        let mut row = record(&[Some("1"); 16]);
        row[6] = None;
        row[8] = Some("not a number".into());
        let out = plan.apply(&row).unwrap();
        assert_eq!(out[12], "");
        assert_eq!(out[13], "");
    }

    #[test]
    fn test_null_integer_is_error() {
        let plan = CleanPlan::new(&CleanConfig::default(), &i94_header()).unwrap();
        let mut row = record(&[Some("1"); 16]);
        row[0] = None;
        let err = plan.apply(&row).unwrap_err();
        assert!(err.contains("cicid"));
    }

    #[test]
    fn test_fractional_integer_is_error() {
        let plan = CleanPlan::new(&CleanConfig::default(), &i94_header()).unwrap();
        let mut row = record(&[Some("1"); 16]);
        row[10] = Some("1.5".into());
        assert!(plan.apply(&row).unwrap_err().contains("count"));
    }

    #[test]
    fn test_country_codes_are_whole_numbers() {
        let plan = CleanPlan::new(&CleanConfig::default(), &i94_header()).unwrap();
        let mut row = record(&[Some("1.0"); 16]);
        row[3] = Some("245.0".into());
        row[4] = Some("582.0".into());
        let out = plan.apply(&row).unwrap();
        assert_eq!(out[3], "245");
        assert_eq!(out[4], "582");
    }

    #[test]
    fn test_plan_requires_rule_columns() {
        let err =
            CleanPlan::new(&CleanConfig::default(), &header(&["cicid", "i94yr"])).unwrap_err();
        assert!(err.contains("not found"));
    }

    #[test]
    fn test_sanitize_strips_disallowed_characters() {
        assert_eq!(sanitize("LOS ANGELES, CA"), "LOSANGELESCA");
        assert_eq!(sanitize("\"B-1\"_x.y"), "B-1x.y");
        assert_eq!(sanitize("S\u{e3}o"), "So");
    }

    #[test]
    fn test_to_integer() {
        assert_eq!(to_integer("5748517.0"), Some(5_748_517));
        assert_eq!(to_integer("42"), Some(42));
        assert_eq!(to_integer("-3.0"), Some(-3));
        assert_eq!(to_integer("1.25"), None);
        assert_eq!(to_integer("NaN"), None);
        assert_eq!(to_integer("9223372036854775808.0"), None);
        assert_eq!(to_integer(""), None);
    }

    #[test]
    fn test_offset_to_date() {
        let epoch = NaiveDate::from_ymd_opt(1960, 1, 1).unwrap();
        assert_eq!(
            offset_to_date(epoch, "20545.0"),
            NaiveDate::from_ymd_opt(2016, 4, 1)
        );
        assert_eq!(offset_to_date(epoch, "0"), Some(epoch));
        assert_eq!(
            offset_to_date(epoch, "-1"),
            NaiveDate::from_ymd_opt(1959, 12, 31)
        );
        assert_eq!(offset_to_date(epoch, "inf"), None);
    }
}
