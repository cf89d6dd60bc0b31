//! Paginated HTTP API row source.
//!
//! The teacher's own workspace has no HTTP client; this is enriched from
//! the sibling example repos that do (`reqwest` with the `json` feature).

use async_trait::async_trait;
use etl_protocol::{CancellationToken, EtlError, Record};
use reqwest::{Client, Method};
use serde_json::Value as JsonValue;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

impl From<HttpMethod> for Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApiSourceOptions {
    pub url: String,
    pub method: HttpMethod,
    pub headers: HashMap<String, String>,
    pub body: Option<JsonValue>,
    pub timeout: Duration,
    /// Dotted path to the record array within each response, e.g. `data.items`.
    pub data_path: Option<String>,
    /// Dotted path to the next-page URL within each response.
    pub next_page_path: Option<String>,
    pub max_pages: Option<u32>,
    /// Reserved for APIs whose pages are independently addressable (e.g. by
    /// offset) rather than linked purely via `nextPagePath`; this source
    /// always fetches one page at a time since the next URL is only known
    /// once the previous response has been parsed. See DESIGN.md.
    pub parallel_pages: u32,
    pub min_request_interval: Duration,
}

impl ApiSourceOptions {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: HttpMethod::Get,
            headers: HashMap::new(),
            body: None,
            timeout: Duration::from_secs(30),
            data_path: None,
            next_page_path: None,
            max_pages: None,
            parallel_pages: 1,
            min_request_interval: Duration::ZERO,
        }
    }
}

/// Dotted-path lookup into a JSON value, e.g. `"data.items"`.
fn lookup_path<'a>(value: &'a JsonValue, path: &str) -> Option<&'a JsonValue> {
    path.split('.').try_fold(value, |current, segment| current.get(segment))
}

fn extract_records(body: &JsonValue, data_path: Option<&str>) -> Vec<JsonValue> {
    let scope = match data_path {
        Some(path) => lookup_path(body, path).cloned().unwrap_or(JsonValue::Null),
        None => body.clone(),
    };
    match scope {
        JsonValue::Array(items) => items,
        JsonValue::Null => Vec::new(),
        other => vec![other],
    }
}

fn extract_next_url(body: &JsonValue, next_page_path: Option<&str>) -> Option<String> {
    let path = next_page_path?;
    lookup_path(body, path).and_then(|v| v.as_str()).map(str::to_string)
}

pub struct ApiSource {
    client: Client,
    options: ApiSourceOptions,
    cancellation: CancellationToken,
    buffer: VecDeque<JsonValue>,
    next_url: Option<String>,
    pages_fetched: u32,
    last_request_at: Option<Instant>,
    exhausted: bool,
}

impl ApiSource {
    pub fn new(options: ApiSourceOptions, cancellation: CancellationToken) -> Result<Self, EtlError> {
        let client = Client::builder()
            .timeout(options.timeout)
            .build()
            .map_err(|e| EtlError::Config(format!("failed to build HTTP client: {e}")))?;
        let next_url = Some(options.url.clone());
        Ok(Self {
            client,
            options,
            cancellation,
            buffer: VecDeque::new(),
            next_url,
            pages_fetched: 0,
            last_request_at: None,
            exhausted: false,
        })
    }

    /// The next-page URL to persist into checkpoint resume state, if the
    /// most recent fetch reported one.
    pub fn resume_next_url(&self) -> Option<&str> {
        self.next_url.as_deref()
    }

    /// Resume from a previously checkpointed next-page URL.
    pub fn resume_from(&mut self, next_url: Option<String>) {
        if let Some(url) = next_url {
            self.next_url = Some(url);
        }
    }

    async fn respect_rate_limit(&mut self) {
        if self.options.min_request_interval.is_zero() {
            return;
        }
        if let Some(last) = self.last_request_at {
            let elapsed = last.elapsed();
            if elapsed < self.options.min_request_interval {
                tokio::time::sleep(self.options.min_request_interval - elapsed).await;
            }
        }
    }

    async fn fetch_page(&mut self, url: String) -> Result<(), EtlError> {
        if self.options.max_pages.is_some_and(|max| self.pages_fetched >= max) {
            self.exhausted = true;
            return Ok(());
        }

        self.respect_rate_limit().await;

        let mut request = self.client.request(self.options.method.into(), &url);
        for (key, value) in &self.options.headers {
            request = request.header(key, value);
        }
        if let Some(body) = &self.options.body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| EtlError::SourceFormat(format!("API request failed: {e}")))?;
        self.last_request_at = Some(Instant::now());

        let status = response.status();
        if !status.is_success() {
            return Err(EtlError::SourceFormat(format!("API request to {url} returned {status}")));
        }

        let body: JsonValue =
            response.json().await.map_err(|e| EtlError::SourceFormat(format!("invalid JSON response from {url}: {e}")))?;

        self.pages_fetched += 1;
        self.buffer.extend(extract_records(&body, self.options.data_path.as_deref()));
        self.next_url = extract_next_url(&body, self.options.next_page_path.as_deref());
        if self.next_url.is_none() {
            self.exhausted = true;
        }
        Ok(())
    }
}

#[async_trait]
impl crate::RowSource for ApiSource {
    async fn next_record(&mut self) -> Result<Option<Record>, EtlError> {
        loop {
            if self.cancellation.is_cancelled() {
                return Err(EtlError::cancelled("cancellation requested"));
            }

            if let Some(value) = self.buffer.pop_front() {
                return Ok(Some(crate::json_source::value_to_record(value)));
            }

            if self.exhausted {
                return Ok(None);
            }

            let Some(url) = self.next_url.clone() else {
                self.exhausted = true;
                continue;
            };
            self.fetch_page(url).await?;
        }
    }

    fn resume_state(&self) -> Option<serde_json::Value> {
        Some(serde_json::json!({ "nextUrl": self.next_url }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_path_traverses_nested_objects() {
        let body = serde_json::json!({"data": {"items": [1, 2]}});
        assert_eq!(lookup_path(&body, "data.items"), Some(&serde_json::json!([1, 2])));
    }

    #[test]
    fn extract_records_defaults_to_whole_body_array() {
        let body = serde_json::json!([1, 2, 3]);
        assert_eq!(extract_records(&body, None).len(), 3);
    }

    #[test]
    fn extract_next_url_reads_dotted_path() {
        let body = serde_json::json!({"paging": {"next": "https://example.test/p2"}});
        assert_eq!(extract_next_url(&body, Some("paging.next")), Some("https://example.test/p2".to_string()));
    }

    #[test]
    fn extract_next_url_is_none_without_path() {
        let body = serde_json::json!({"paging": {"next": "https://example.test/p2"}});
        assert_eq!(extract_next_url(&body, None), None);
    }
}
