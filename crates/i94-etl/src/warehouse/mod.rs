//! Warehouse connection abstraction.
//!
//! The loader and reconciler only need three operations from a connection:
//! run a statement, commit, and read back one scalar. [`PgWarehouse`] provides
//! them over the PostgreSQL wire protocol, which Redshift speaks.

mod postgres;
mod tls;

pub use postgres::PgWarehouse;
pub use tls::{SslMode, TlsBuilder};

use async_trait::async_trait;

use crate::error::Result;

/// An open warehouse connection.
///
/// Statements are issued one at a time; callers await each before sending
/// the next.
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Execute a statement, returning the number of affected rows.
    async fn execute(&self, statement: &str) -> Result<u64>;

    /// Commit the work issued so far.
    async fn commit(&self) -> Result<()>;

    /// Run a query and return the first column of the first row as text.
    ///
    /// Returns `None` when the query yields no rows or the value is NULL.
    async fn query_scalar(&self, query: &str) -> Result<Option<String>>;

    /// Round-trip a trivial query to prove the connection is usable.
    async fn health_check(&self) -> Result<()> {
        self.query_scalar("SELECT 1").await.map(|_| ())
    }
}

/// Parse a scalar returned as text into a whole number.
///
/// Accepts integer text and numeric text with an all-zero fraction
/// (`"100"`, `"100.00"`), since SUM over integer columns comes back as NUMERIC
/// on some warehouses.
pub fn parse_integer(text: &str) -> Option<i64> {
    let text = text.trim();
    if let Ok(n) = text.parse::<i64>() {
        return Some(n);
    }
    let (whole, fraction) = text.split_once('.')?;
    if fraction.is_empty() || !fraction.bytes().all(|b| b == b'0') {
        return None;
    }
    whole.parse::<i64>().ok()
}


#[cfg(test)]
mod tests {
    use super::testing::{FakeWarehouse, Reply};
    use super::*;

    #[test]
    fn test_parse_integer() {
        assert_eq!(parse_integer("100"), Some(100));
        assert_eq!(parse_integer(" -7 "), Some(-7));
        assert_eq!(parse_integer("100.000"), Some(100));
        assert_eq!(parse_integer("100.5"), None);
        assert_eq!(parse_integer("100."), None);
        assert_eq!(parse_integer("abc"), None);
        assert_eq!(parse_integer(""), None);
    }

    #[tokio::test]
    async fn test_health_check_uses_select_one() {
        let wh = FakeWarehouse::new().reply("SELECT 1", Reply::Scalar(Some("1".into())));
        wh.health_check().await.unwrap();
        assert_eq!(wh.calls(), vec!["query:SELECT 1".to_string()]);
    }

    #[tokio::test]
    async fn test_health_check_surfaces_failure() {
        let wh = FakeWarehouse::new().reply("SELECT 1", Reply::Fail("connection reset".into()));
        assert!(wh.health_check().await.is_err());
    }
}
