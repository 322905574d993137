//! Space operations - list, create and upload features to hub spaces

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::error::{ApiError, ApiMessage, ExecuteError};
use crate::executor::{ApiRequest, UploadExecutor};
use crate::payload::Payload;

/// Client name sent when creating spaces
pub const CLIENT_NAME: &str = "xyzmaps-cli";

/// Summary of a space as returned by the hub
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SpaceInfo {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
}

/// Body for creating a space
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SpaceProfile {
    pub title: String,
    pub description: String,
    pub client: Value,
    #[serde(rename = "enableUUID")]
    pub enable_uuid: bool,
}

impl SpaceProfile {
    pub fn new(title: &str, description: &str) -> Self {
        Self {
            title: title.to_string(),
            description: description.to_string(),
            client: json!({ "name": CLIENT_NAME, "version": env!("CARGO_PKG_VERSION") }),
            enable_uuid: false,
        }
    }
}

/// Processor profile attaching a JSON schema validator to a space
pub fn schema_processor_profile(schema: &str) -> Value {
    json!({
        "schema-validator": [{
            "eventTypes": ["ModifyFeaturesEvent.request", "ModifySpaceEvent.request"],
            "params": {
                "schema": schema
            },
            "order": 0
        }]
    })
}

/// Options for a feature upload
#[derive(Debug, Clone)]
pub struct UploadOptions {
    /// Features per request before any 413 splitting
    pub chunk_size: usize,
    /// Chunks in flight at once
    pub concurrency: usize,
}

/// Totals of a feature upload
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UploadSummary {
    pub uploaded: usize,
    /// Features the hub could not take
    pub failed: Vec<Value>,
    /// Chunks rejected as a whole
    pub failed_chunks: usize,
}

/// Hub space client
pub struct SpaceClient {
    executor: Arc<UploadExecutor>,
}

impl SpaceClient {
    pub fn new(executor: Arc<UploadExecutor>) -> Self {
        Self { executor }
    }

    pub fn executor(&self) -> &UploadExecutor {
        &self.executor
    }

    /// List the spaces visible to the caller
    pub async fn list_spaces(&self) -> Result<Vec<SpaceInfo>, ExecuteError> {
        let url = self.executor.config().spaces_url();
        let response = self
            .executor
            .execute(&ApiRequest::new(Method::GET, url))
            .await?;

        let body = response.body.as_json().cloned().unwrap_or(Value::Null);
        parse_body(body)
    }

    /// Create a space and return it
    pub async fn create_space(
        &self,
        title: &str,
        description: &str,
    ) -> Result<SpaceInfo, ExecuteError> {
        let profile = SpaceProfile::new(title, description);
        let body = serde_json::to_string(&profile)?;

        let request = ApiRequest::new(Method::POST, self.executor.config().spaces_url())
            .with_payload(Payload::Opaque(body));
        let response = self.executor.execute(&request).await?;

        let body = response.body.as_json().cloned().unwrap_or(Value::Null);
        let space: SpaceInfo = parse_body(body)?;
        info!("Space {} created", space.id);
        Ok(space)
    }

    /// Upload features to a space in chunks.
    ///
    /// Each chunk goes through the gzip executor, so oversized chunks are split
    /// and transient failures retried. A chunk rejected outright is counted and
    /// the upload continues.
    pub async fn upload_features(
        &self,
        space_id: &str,
        features: Vec<Value>,
        options: &UploadOptions,
    ) -> UploadSummary {
        let uri = format!("{}/features", space_id);
        let chunk_size = options.chunk_size.max(1);
        let chunks: Vec<Vec<Value>> = features
            .chunks(chunk_size)
            .map(|chunk| chunk.to_vec())
            .collect();
        let total_chunks = chunks.len();

        info!(
            "Uploading {} features to space {} in {} chunks (concurrency: {})",
            features.len(),
            space_id,
            total_chunks,
            options.concurrency
        );

        let mut results: Vec<(usize, usize, Result<_, ExecuteError>)> = stream::iter(
            chunks.into_iter().enumerate().map(|(i, chunk)| {
                let len = chunk.len();
                let request = ApiRequest::new(Method::PUT, uri.clone())
                    .with_content_type("application/geo+json")
                    .with_payload(Payload::FeatureCollection(chunk))
                    .with_gzip(true);
                async move {
                    info!("Uploading chunk {}/{}...", i + 1, total_chunks);
                    let result = self.executor.execute(&request).await;
                    (i, len, result)
                }
            }),
        )
        .buffer_unordered(options.concurrency.max(1))
        .collect()
        .await;

        results.sort_by_key(|(i, _, _)| *i);

        let mut summary = UploadSummary::default();
        for (i, len, result) in results {
            match result {
                Ok(response) => {
                    // Every piece of a successful chunk was accepted except the
                    // features reported as failed, whether or not the hub echoed them
                    let outcome = response.outcome();
                    summary.uploaded += len.saturating_sub(outcome.failed.len());
                    summary.failed.extend(outcome.failed);
                }
                Err(e) => {
                    error!("Chunk {} upload failed: {}", i + 1, e);
                    summary.failed_chunks += 1;
                }
            }
        }

        if !summary.failed.is_empty() {
            warn!("{} features could not be uploaded", summary.failed.len());
        }
        summary
    }
}

/// Deserialize a JSON response body, reporting shape mismatches as API errors
fn parse_body<T: serde::de::DeserializeOwned>(body: Value) -> Result<T, ExecuteError> {
    serde_json::from_value(body.clone()).map_err(|e| {
        ExecuteError::Api(ApiError {
            status: None,
            message: ApiMessage::Text(format!("Unexpected response {}: {}", body, e)),
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_space_profile_serialization() {
        let profile = SpaceProfile::new("roads", "road network");
        let value = serde_json::to_value(&profile).unwrap();
        assert_eq!(value["title"], "roads");
        assert_eq!(value["description"], "road network");
        assert_eq!(value["enableUUID"], false);
        assert_eq!(value["client"]["name"], CLIENT_NAME);
    }

    #[test]
    fn test_schema_processor_profile() {
        let value = schema_processor_profile("{\"type\":\"object\"}");
        let validator = &value["schema-validator"][0];
        assert_eq!(validator["order"], 0);
        assert_eq!(validator["params"]["schema"], "{\"type\":\"object\"}");
        assert_eq!(validator["eventTypes"][1], "ModifySpaceEvent.request");
    }

    #[test]
    fn test_space_info_tolerates_missing_fields() {
        let space: SpaceInfo = serde_json::from_value(json!({"id": "abc"})).unwrap();
        assert_eq!(space.id, "abc");
        assert_eq!(space.title, "");
        assert!(space.description.is_none());
    }
}
