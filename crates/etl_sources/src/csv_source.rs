//! CSV/TSV row source: peek-first-line delimiter detection, optional
//! gzip/brotli unwrapping, BOM stripping, and tolerant delimited parsing.
//!
//! Grounded on `casparian`'s preview command (`csv::ReaderBuilder::new()
//! .delimiter(...).flexible(true)`), generalised from a one-shot preview
//! into a resumable, cancellable streaming source.

use crate::compression::{open_decompressed, Compression};
use async_trait::async_trait;
use etl_protocol::{CancellationToken, EtlError, Record};
use std::io::{BufRead, BufReader, Read};
use std::path::PathBuf;

const BOM: [u8; 3] = [0xEF, 0xBB, 0xBF];

#[derive(Debug, Clone)]
pub struct CsvSourceOptions {
    pub path: PathBuf,
    /// Explicit delimiter override; when absent, detected from the first line.
    pub delimiter: Option<u8>,
    pub compression: Compression,
    pub skip_rows: u64,
}

impl CsvSourceOptions {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let compression = Compression::sniff_extension(&path);
        Self { path, delimiter: None, compression, skip_rows: 0 }
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = Some(delimiter);
        self
    }

    pub fn with_skip_rows(mut self, skip_rows: u64) -> Self {
        self.skip_rows = skip_rows;
        self
    }
}

pub struct CsvSource {
    reader: csv::Reader<Box<dyn Read + Send>>,
    headers: Vec<String>,
    cancellation: CancellationToken,
    row_index: u64,
}

impl CsvSource {
    pub fn open(options: CsvSourceOptions, cancellation: CancellationToken) -> Result<Self, EtlError> {
        let raw = open_decompressed(&options.path, options.compression)
            .map_err(|e| EtlError::SourceFormat(format!("failed to open {}: {e}", options.path.display())))?;

        let mut buffered = BufReader::new(raw);
        let mut first_line = Vec::new();
        buffered
            .read_until(b'\n', &mut first_line)
            .map_err(|e| EtlError::SourceFormat(format!("failed to read header line: {e}")))?;
        strip_bom(&mut first_line);

        let delimiter = options.delimiter.unwrap_or_else(|| detect_delimiter(&first_line));

        let rejoined: Box<dyn Read + Send> = Box::new(std::io::Cursor::new(first_line).chain(buffered));

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(rejoined);

        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| EtlError::SourceFormat(format!("failed to read CSV header: {e}")))?
            .iter()
            .map(etl_protocol::normalize_header)
            .collect();

        let mut source = Self { reader, headers, cancellation, row_index: 0 };
        for _ in 0..options.skip_rows {
            if source.read_raw_record()?.is_none() {
                break;
            }
        }
        Ok(source)
    }

    fn read_raw_record(&mut self) -> Result<Option<csv::StringRecord>, EtlError> {
        let mut record = csv::StringRecord::new();
        let more = self
            .reader
            .read_record(&mut record)
            .map_err(|e| EtlError::SourceFormat(format!("CSV parse error at row {}: {e}", self.row_index + 1)))?;
        if more {
            self.row_index += 1;
            Ok(Some(record))
        } else {
            Ok(None)
        }
    }
}

#[async_trait]
impl crate::RowSource for CsvSource {
    async fn next_record(&mut self) -> Result<Option<Record>, EtlError> {
        if self.cancellation.is_cancelled() {
            return Err(EtlError::cancelled("cancellation requested"));
        }

        let Some(raw) = self.read_raw_record()? else {
            return Ok(None);
        };
        if raw.iter().all(|field| field.is_empty()) {
            return self.next_record().await;
        }

        let pairs: Vec<(String, String)> =
            self.headers.iter().zip(raw.iter()).map(|(h, v)| (h.clone(), v.to_string())).collect();
        Ok(Some(Record::from_raw_pairs(pairs)))
    }
}

fn strip_bom(buf: &mut Vec<u8>) {
    if buf.starts_with(&BOM) {
        buf.drain(0..3);
    }
}

/// Count `;` vs `,` on the header line; semicolons win ties.
fn detect_delimiter(line: &[u8]) -> u8 {
    let semicolons = line.iter().filter(|&&b| b == b';').count();
    let commas = line.iter().filter(|&&b| b == b',').count();
    if semicolons >= commas {
        b';'
    } else {
        b','
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RowSource;
    use std::io::Write;

    fn write_temp(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn detects_semicolon_delimiter_on_tie() {
        assert_eq!(detect_delimiter(b"a;b,c;d"), b';');
    }

    #[test]
    fn detects_comma_delimiter() {
        assert_eq!(detect_delimiter(b"a,b,c"), b',');
    }

    #[tokio::test]
    async fn reads_normalised_header_rows() {
        let file = write_temp("Order Number,Item Code\n1,ABC\n2,DEF\n");
        let options = CsvSourceOptions::new(file.path());
        let mut source = CsvSource::open(options, CancellationToken::new()).unwrap();

        let first = source.next_record().await.unwrap().unwrap();
        assert_eq!(first.get("order_number").unwrap().as_text(), "1");
        assert_eq!(first.get("item_code").unwrap().as_text(), "ABC");

        let second = source.next_record().await.unwrap().unwrap();
        assert_eq!(second.get("order_number").unwrap().as_text(), "2");

        assert!(source.next_record().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn honours_skip_rows() {
        let file = write_temp("a,b\n1,2\n3,4\n5,6\n");
        let options = CsvSourceOptions::new(file.path()).with_skip_rows(1);
        let mut source = CsvSource::open(options, CancellationToken::new()).unwrap();
        let first = source.next_record().await.unwrap().unwrap();
        assert_eq!(first.get("a").unwrap().as_text(), "3");
    }

    #[tokio::test]
    async fn strips_utf8_bom() {
        let mut contents = BOM.to_vec();
        contents.extend_from_slice(b"a,b\n1,2\n");
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&contents).unwrap();
        let options = CsvSourceOptions::new(file.path());
        let mut source = CsvSource::open(options, CancellationToken::new()).unwrap();
        let first = source.next_record().await.unwrap().unwrap();
        assert_eq!(first.get("a").unwrap().as_text(), "1");
    }

    #[tokio::test]
    async fn cancellation_is_observed_before_the_next_read() {
        let file = write_temp("a,b\n1,2\n3,4\n");
        let token = CancellationToken::new();
        let options = CsvSourceOptions::new(file.path());
        let mut source = CsvSource::open(options, token.clone()).unwrap();
        token.cancel();
        assert!(matches!(source.next_record().await, Err(EtlError::Cancelled { .. })));
    }
}
