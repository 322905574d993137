//! Upload executor - sends hub requests with gzip, 5xx retry and 413 splitting

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use reqwest::{Client, Method};
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::compression;
use crate::config::Config;
use crate::error::{ApiError, ApiMessage, ExecuteError};
use crate::http_logger::{self, HttpRequestLog, HttpResponseLog, LoggedBody};
use crate::payload::{feature_label, sanitized_collection_body, split_halves, Payload};

/// User-Agent header value
const USER_AGENT: &str = concat!("xyzmaps-cli/", env!("CARGO_PKG_VERSION"));

/// Status codes the hub uses for success
fn is_success(status: u16) -> bool {
    (200..=210).contains(&status)
}

/// Decoded response body
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Json(Value),
    Text(String),
}

impl ResponseBody {
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(v) => Some(v),
            Self::Text(_) => None,
        }
    }

    pub fn into_message(self) -> ApiMessage {
        match self {
            Self::Json(v) => ApiMessage::Json(v),
            Self::Text(s) => ApiMessage::Text(s),
        }
    }
}

/// One logical hub call
#[derive(Debug, Clone)]
pub struct ApiRequest {
    /// Absolute URL, or a path relative to `{hub_root}/spaces/`
    pub uri: String,
    pub method: Method,
    pub content_type: String,
    pub payload: Option<Payload>,
    /// Gzip the body and enable retry/split handling
    pub gzip: bool,
}

impl ApiRequest {
    pub fn new(method: Method, uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            method,
            content_type: "application/json".to_string(),
            payload: None,
            gzip: false,
        }
    }

    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    pub fn with_gzip(mut self, gzip: bool) -> Self {
        self.gzip = gzip;
        self
    }

    fn expects_json(&self) -> bool {
        self.content_type.contains("json")
    }
}

/// Response of a successful call
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: ResponseBody,
}

impl ApiResponse {
    /// Accepted and failed features reported in the body
    pub fn outcome(&self) -> UploadOutcome {
        let list = |key: &str| {
            self.body
                .as_json()
                .and_then(|v| v.get(key))
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default()
        };
        UploadOutcome {
            features: list("features"),
            failed: list("failed"),
        }
    }
}

/// Features accepted by the hub and features it could not take
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UploadOutcome {
    pub features: Vec<Value>,
    pub failed: Vec<Value>,
}

impl UploadOutcome {
    /// Append another outcome after this one
    pub fn merge(&mut self, other: UploadOutcome) {
        self.features.extend(other.features);
        self.failed.extend(other.failed);
    }

    pub fn len(&self) -> usize {
        self.features.len() + self.failed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn into_body(self) -> Value {
        let mut body = json!({
            "type": "FeatureCollection",
            "features": self.features,
        });
        if !self.failed.is_empty() {
            body["failed"] = Value::Array(self.failed);
        }
        body
    }
}

/// Body of a single HTTP attempt
enum RequestBody<'a> {
    Plain(&'a str),
    Gzip { bytes: Vec<u8>, original: usize },
}

/// Pending piece of a gzip upload
struct Chunk<'a> {
    body: String,
    /// Features of `body` when it is a FeatureCollection and may be split
    features: Option<&'a [Value]>,
    depth: usize,
}

/// Executes hub requests. Gzip requests are retried on 5xx and FeatureCollections
/// rejected with 413 are bisected until every piece is accepted.
pub struct UploadExecutor {
    config: Arc<Config>,
    client: Client,
}

impl UploadExecutor {
    pub fn new(config: Arc<Config>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self { config, client })
    }

    pub fn with_client(config: Arc<Config>, client: Client) -> Self {
        Self { config, client }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Execute a request.
    ///
    /// Without gzip a single attempt is made. With gzip, 5xx responses are
    /// retried after a fixed backoff, and a 413 on a FeatureCollection splits it
    /// in two; the halves are sent one after the other and their results merged
    /// into a synthetic 200 response.
    pub async fn execute(&self, request: &ApiRequest) -> Result<ApiResponse, ExecuteError> {
        let url = self.config.resolve_uri(&request.uri);
        if request.gzip {
            self.execute_gzip(&url, request).await
        } else {
            self.execute_plain(&url, request).await
        }
    }

    async fn execute_plain(
        &self,
        url: &str,
        request: &ApiRequest,
    ) -> Result<ApiResponse, ExecuteError> {
        let body = match &request.payload {
            Some(payload) if request.method != Method::GET => Some(payload.to_body()?),
            _ => None,
        };

        let response = self
            .send(url, request, body.as_deref().map(RequestBody::Plain))
            .await?;

        if is_success(response.status) {
            Ok(response)
        } else {
            Err(ApiError::new(response.status, response.body.into_message()).into())
        }
    }

    async fn execute_gzip(
        &self,
        url: &str,
        request: &ApiRequest,
    ) -> Result<ApiResponse, ExecuteError> {
        let root = Chunk {
            body: match &request.payload {
                Some(payload) => payload.to_body()?,
                None => String::new(),
            },
            features: match &request.payload {
                Some(Payload::FeatureCollection(features)) => Some(features.as_slice()),
                _ => None,
            },
            depth: 0,
        };

        // Depth-first: the first half is fully resolved before the second is sent
        let mut pending = vec![root];
        let mut outcome = UploadOutcome::default();

        while let Some(chunk) = pending.pop() {
            let response = self.send_with_retry(url, request, &chunk.body).await?;

            match chunk.features {
                _ if is_success(response.status) => {
                    if chunk.depth == 0 {
                        return Ok(response);
                    }
                    outcome.merge(response.outcome());
                }
                Some(features) if response.status == 413 && features.len() > 1 => {
                    if chunk.depth >= self.config.max_split_depth {
                        warn!(
                            "Giving up after splitting the upload {} times",
                            chunk.depth
                        );
                        return Err(ApiError::new(413, response.body.into_message()).into());
                    }

                    let (first, second) = split_halves(features);
                    info!(
                        "Uploading chunk of {} features failed with 413 Request Entity Too Large, retrying with chunks of {} and {} features",
                        features.len(),
                        first.len(),
                        second.len()
                    );

                    for half in [second, first] {
                        pending.push(Chunk {
                            body: sanitized_collection_body(half)?,
                            features: Some(half),
                            depth: chunk.depth + 1,
                        });
                    }
                }
                Some([feature]) if response.status == 413 => {
                    warn!(
                        "Feature {} is too large for the API gateway limit, please simplify the geometry to reduce its size",
                        feature_label(feature)
                    );
                    outcome.failed.push(feature.clone());
                }
                _ => {
                    return Err(ApiError::new(response.status, response.body.into_message()).into())
                }
            }
        }

        Ok(ApiResponse {
            status: 200,
            body: ResponseBody::Json(outcome.into_body()),
        })
    }

    /// Send one gzip chunk, retrying 5xx responses while the budget lasts
    async fn send_with_retry(
        &self,
        url: &str,
        request: &ApiRequest,
        body: &str,
    ) -> Result<ApiResponse, ExecuteError> {
        let mut budget = self.config.retry_budget;

        loop {
            let request_body = if request.method == Method::GET {
                None
            } else {
                let bytes = compression::gzip(body.as_bytes()).map_err(ExecuteError::Compression)?;
                Some(RequestBody::Gzip {
                    bytes,
                    original: body.len(),
                })
            };

            let response = self.send(url, request, request_body).await?;

            if response.status >= 500 && budget > 0 {
                warn!(
                    "Server error {} from {}, retrying in {}ms ({} retries left)",
                    response.status,
                    url,
                    self.config.retry_backoff.as_millis(),
                    budget
                );
                tokio::time::sleep(self.config.retry_backoff).await;
                budget -= 1;
                continue;
            }

            return Ok(response);
        }
    }

    /// Issue a single HTTP attempt and decode the response
    async fn send(
        &self,
        url: &str,
        request: &ApiRequest,
        body: Option<RequestBody<'_>>,
    ) -> Result<ApiResponse, ApiError> {
        let request_id = Uuid::new_v4().to_string();
        let mut headers = vec![
            ("Content-Type".to_string(), request.content_type.clone()),
            ("User-Agent".to_string(), USER_AGENT.to_string()),
            ("x-request-id".to_string(), request_id),
        ];
        if request.gzip {
            headers.push(("Content-Encoding".to_string(), "gzip".to_string()));
            headers.push(("Accept-Encoding".to_string(), "gzip".to_string()));
        }

        let mut builder = self.client.request(request.method.clone(), url);
        for (name, value) in &headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let logged_body = match &body {
            Some(RequestBody::Plain(text)) => Some(LoggedBody::Text(*text)),
            Some(RequestBody::Gzip { bytes, original }) => Some(LoggedBody::Gzip {
                compressed: bytes.len(),
                original: *original,
            }),
            None => None,
        };
        let log_entry = HttpRequestLog {
            method: request.method.as_str(),
            url,
            headers,
            body: logged_body,
        };

        builder = match body {
            Some(RequestBody::Plain(text)) => builder.body(text.to_string()),
            Some(RequestBody::Gzip { bytes, .. }) => builder.body(bytes),
            None => builder,
        };

        debug!("{} {}", request.method, url);
        let start = Instant::now();

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => {
                let error_msg = e.to_string();
                http_logger::log_request(
                    &log_entry,
                    None,
                    start.elapsed().as_millis() as u64,
                    Some(&error_msg),
                );
                return Err(ApiError::transport(error_msg));
            }
        };

        let status = response.status().as_u16();
        let response_headers = if http_logger::is_enabled() {
            http_logger::extract_response_headers(&response)
        } else {
            Vec::new()
        };

        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => {
                let error_msg = format!("Failed to read response body: {}", e);
                http_logger::log_request(
                    &log_entry,
                    None,
                    start.elapsed().as_millis() as u64,
                    Some(&error_msg),
                );
                return Err(ApiError::transport(error_msg));
            }
        };

        http_logger::log_request(
            &log_entry,
            Some(&HttpResponseLog {
                status,
                headers: response_headers,
                body: Some(&text),
            }),
            start.elapsed().as_millis() as u64,
            None,
        );

        Ok(ApiResponse {
            status,
            body: decode_body(text, request.expects_json()),
        })
    }
}

/// Decode a response body; JSON bodies that fail to parse are kept as text
fn decode_body(text: String, expects_json: bool) -> ResponseBody {
    if !expects_json {
        return ResponseBody::Text(text);
    }
    if text.trim().is_empty() {
        return ResponseBody::Json(Value::Null);
    }
    match serde_json::from_str(&text) {
        Ok(value) => ResponseBody::Json(value),
        Err(_) => ResponseBody::Text(text),
    }
}
