//! Extract readers.
//!
//! A reader turns one raw extract file into column names plus a stream of
//! records. Null cells are `None`.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::error::Result;

/// One record: a cell per column, `None` for null.
pub type Record = Vec<Option<String>>;

/// An opened extract.
pub struct Extract {
    pub columns: Vec<String>,
    pub records: Box<dyn Iterator<Item = Result<Record>> + Send>,
}

/// Reads raw extract files.
pub trait ExtractReader: Send + Sync {
    /// Whether `path` is a file this reader understands.
    fn accepts(&self, path: &Path) -> bool;

    /// Open `path` for streaming.
    fn open(&self, path: &Path) -> Result<Extract>;
}

/// Reads delimited text extracts with a header row.
///
/// Bytes are decoded as ISO-8859-1, which is how the extracts are encoded;
/// every byte maps to exactly one character so decoding cannot fail.
#[derive(Debug, Clone)]
pub struct DelimitedReader {
    extensions: Vec<String>,
    delimiter: u8,
}

impl DelimitedReader {
    pub fn new(extensions: Vec<String>) -> Self {
        Self {
            extensions: extensions
                .into_iter()
                .map(|e| e.trim_start_matches('.').to_lowercase())
                .collect(),
            delimiter: b',',
        }
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }
}

impl ExtractReader for DelimitedReader {
    fn accepts(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| self.extensions.iter().any(|x| x.eq_ignore_ascii_case(e)))
            .unwrap_or(false)
    }

    fn open(&self, path: &Path) -> Result<Extract> {
        let file = File::open(path)?;
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(true)
            .from_reader(BufReader::new(file));

        let columns = reader.byte_headers()?.iter().map(decode_latin1).collect();

        let records = reader.into_byte_records().map(|record| -> Result<Record> {
            let record = record?;
            Ok(record
                .iter()
                .map(|cell| {
                    if cell.is_empty() {
                        None
                    } else {
                        Some(decode_latin1(cell))
                    }
                })
                .collect())
        });

        Ok(Extract {
            columns,
            records: Box::new(records),
        })
    }
}

fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}
