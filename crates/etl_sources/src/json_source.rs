//! JSON row source: newline-delimited (ndjson) and top-level-array modes.

use crate::compression::{open_decompressed, Compression};
use async_trait::async_trait;
use etl_protocol::{CancellationToken, EtlError, Record};
use serde_json::Value as JsonValue;
use std::collections::VecDeque;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonMode {
    NdJson,
    Array,
}

#[derive(Debug, Clone)]
pub struct JsonSourceOptions {
    pub path: PathBuf,
    pub mode: JsonMode,
    pub compression: Compression,
    pub skip_rows: u64,
}

impl JsonSourceOptions {
    pub fn new(path: impl Into<PathBuf>, mode: JsonMode) -> Self {
        let path = path.into();
        let compression = Compression::sniff_extension(&path);
        Self { path, mode, compression, skip_rows: 0 }
    }

    pub fn with_skip_rows(mut self, skip_rows: u64) -> Self {
        self.skip_rows = skip_rows;
        self
    }
}

enum Inner {
    NdJson { lines: std::io::Lines<BufReader<Box<dyn std::io::Read + Send>>>, line_no: u64 },
    /// JSON offers no element-level streaming API for a top-level array the
    /// way line splitting does for ndjson, so the array is parsed whole and
    /// drained element by element.
    Array { remaining: VecDeque<JsonValue> },
}

pub struct JsonSource {
    inner: Inner,
    cancellation: CancellationToken,
    row_index: u64,
}

impl JsonSource {
    pub fn open(options: JsonSourceOptions, cancellation: CancellationToken) -> Result<Self, EtlError> {
        let raw = open_decompressed(&options.path, options.compression)
            .map_err(|e| EtlError::SourceFormat(format!("failed to open {}: {e}", options.path.display())))?;

        let inner = match options.mode {
            JsonMode::NdJson => Inner::NdJson { lines: BufReader::new(raw).lines(), line_no: 0 },
            JsonMode::Array => {
                let parsed: JsonValue = serde_json::from_reader(raw)
                    .map_err(|e| EtlError::SourceFormat(format!("invalid JSON array: {e}")))?;
                let JsonValue::Array(items) = parsed else {
                    return Err(EtlError::SourceFormat("expected a top-level JSON array".to_string()));
                };
                Inner::Array { remaining: items.into() }
            }
        };

        let mut source = Self { inner, cancellation, row_index: 0 };
        for _ in 0..options.skip_rows {
            if source.read_raw_value()?.is_none() {
                break;
            }
        }
        Ok(source)
    }

    fn read_raw_value(&mut self) -> Result<Option<JsonValue>, EtlError> {
        match &mut self.inner {
            Inner::NdJson { lines, line_no } => loop {
                let Some(line) = lines.next() else { return Ok(None) };
                *line_no += 1;
                let line = line.map_err(|e| EtlError::SourceFormat(format!("line {line_no}: {e}")))?;
                if line.trim().is_empty() {
                    continue;
                }
                let value: JsonValue = serde_json::from_str(&line)
                    .map_err(|e| EtlError::SourceFormat(format!("line {line_no}: {e}")))?;
                self.row_index += 1;
                return Ok(Some(value));
            },
            Inner::Array { remaining } => {
                let Some(value) = remaining.pop_front() else { return Ok(None) };
                self.row_index += 1;
                Ok(Some(value))
            }
        }
    }
}

pub(crate) fn value_to_record(value: JsonValue) -> Record {
    let object = match value {
        JsonValue::Object(map) => map,
        other => {
            let mut map = serde_json::Map::new();
            map.insert("value".to_string(), other);
            map
        }
    };

    let pairs = object.into_iter().map(|(k, v)| (k, json_scalar_to_text(v)));
    Record::from_raw_pairs(pairs)
}

fn json_scalar_to_text(value: JsonValue) -> String {
    match value {
        JsonValue::Null => String::new(),
        JsonValue::String(s) => s,
        other => other.to_string(),
    }
}

#[async_trait]
impl crate::RowSource for JsonSource {
    async fn next_record(&mut self) -> Result<Option<Record>, EtlError> {
        if self.cancellation.is_cancelled() {
            return Err(EtlError::cancelled("cancellation requested"));
        }
        Ok(self.read_raw_value()?.map(value_to_record))
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

    #[tokio::test]
    async fn ndjson_parses_each_line_independently() {
        let file = write_temp("{\"Order Number\": 1}\n\n{\"Order Number\": 2}\n");
        let options = JsonSourceOptions::new(file.path(), JsonMode::NdJson);
        let mut source = JsonSource::open(options, CancellationToken::new()).unwrap();
        let first = source.next_record().await.unwrap().unwrap();
        assert_eq!(first.get("order_number").unwrap().as_text(), "1");
        let second = source.next_record().await.unwrap().unwrap();
        assert_eq!(second.get("order_number").unwrap().as_text(), "2");
        assert!(source.next_record().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn ndjson_reports_line_number_on_parse_error() {
        let file = write_temp("{\"a\": 1}\nnot json\n");
        let options = JsonSourceOptions::new(file.path(), JsonMode::NdJson);
        let mut source = JsonSource::open(options, CancellationToken::new()).unwrap();
        source.next_record().await.unwrap();
        let err = source.next_record().await.unwrap_err();
        match err {
            EtlError::SourceFormat(msg) => assert!(msg.contains("line 2")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn array_mode_wraps_non_object_elements() {
        let file = write_temp("[1, {\"a\": 2}]");
        let options = JsonSourceOptions::new(file.path(), JsonMode::Array);
        let mut source = JsonSource::open(options, CancellationToken::new()).unwrap();
        let first = source.next_record().await.unwrap().unwrap();
        assert_eq!(first.get("value").unwrap().as_text(), "1");
        let second = source.next_record().await.unwrap().unwrap();
        assert_eq!(second.get("a").unwrap().as_text(), "2");
    }

    #[tokio::test]
    async fn skip_rows_is_honoured_in_array_mode() {
        let file = write_temp("[{\"a\": 1}, {\"a\": 2}, {\"a\": 3}]");
        let options = JsonSourceOptions::new(file.path(), JsonMode::Array).with_skip_rows(2);
        let mut source = JsonSource::open(options, CancellationToken::new()).unwrap();
        let first = source.next_record().await.unwrap().unwrap();
        assert_eq!(first.get("a").unwrap().as_text(), "3");
    }
}
