//! Request payloads and GeoJSON feature helpers

use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::warn;

/// Borrowed FeatureCollection for serialization without cloning features
#[derive(Serialize)]
struct CollectionRef<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    features: &'a [Value],
}

/// Request body, classified once when it enters the executor.
///
/// Only `FeatureCollection` payloads can be split when the hub rejects them as
/// too large.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// A single GeoJSON Feature object
    Feature(Value),
    /// The features of a GeoJSON FeatureCollection, in order
    FeatureCollection(Vec<Value>),
    /// Anything else, sent verbatim
    Opaque(String),
}

impl Payload {
    /// Classify a request body
    pub fn classify(text: &str) -> Self {
        match serde_json::from_str::<Value>(text) {
            Ok(value) => Self::from_value(value).unwrap_or_else(|| Self::Opaque(text.to_string())),
            Err(_) => Self::Opaque(text.to_string()),
        }
    }

    /// Classify a parsed JSON value; `None` when it is not GeoJSON
    pub fn from_value(value: Value) -> Option<Self> {
        match value.get("type").and_then(Value::as_str) {
            Some("Feature") => Some(Self::Feature(value)),
            Some("FeatureCollection") => match value {
                Value::Object(mut obj) => match obj.remove("features") {
                    Some(Value::Array(features)) => Some(Self::FeatureCollection(features)),
                    _ => None,
                },
                _ => None,
            },
            _ => None,
        }
    }

    pub fn is_feature_collection(&self) -> bool {
        matches!(self, Self::FeatureCollection(_))
    }

    /// Number of features carried (0 for opaque bodies)
    pub fn feature_count(&self) -> usize {
        match self {
            Self::Feature(_) => 1,
            Self::FeatureCollection(features) => features.len(),
            Self::Opaque(_) => 0,
        }
    }

    /// Serialized request body
    pub fn to_body(&self) -> serde_json::Result<String> {
        match self {
            Self::Feature(feature) => serde_json::to_string(feature),
            Self::FeatureCollection(features) => serde_json::to_string(&CollectionRef {
                kind: "FeatureCollection",
                features,
            }),
            Self::Opaque(text) => Ok(text.clone()),
        }
    }
}

/// Build a `FeatureCollection` object
pub fn feature_collection(features: Vec<Value>) -> Value {
    json!({
        "type": "FeatureCollection",
        "features": features,
    })
}

/// Split features into a front half of `ceil(n/2)` and a back half with the rest.
///
/// The halves are disjoint and preserve order.
pub fn split_halves(features: &[Value]) -> (&[Value], &[Value]) {
    features.split_at(features.len().div_ceil(2))
}

/// Remove every NUL character from every string value, recursively.
/// Object keys are left untouched.
pub fn strip_null_bytes(value: &mut Value) {
    match value {
        Value::String(s) => {
            if s.contains('\0') {
                s.retain(|c| c != '\0');
            }
        }
        Value::Array(items) => items.iter_mut().for_each(strip_null_bytes),
        Value::Object(map) => map.values_mut().for_each(strip_null_bytes),
        _ => {}
    }
}

/// Serialize features as a FeatureCollection with NUL characters stripped
pub fn sanitized_collection_body(features: &[Value]) -> serde_json::Result<String> {
    let mut collection = feature_collection(features.to_vec());
    strip_null_bytes(&mut collection);
    serde_json::to_string(&collection)
}

/// Flatten Features and FeatureCollections into a single feature list
pub fn collate(items: Vec<Value>) -> Vec<Value> {
    let mut features = Vec::new();
    for item in items {
        match Payload::from_value(item.clone()) {
            Some(Payload::Feature(feature)) => features.push(feature),
            Some(Payload::FeatureCollection(inner)) => features.extend(inner),
            _ => warn!(
                "Unknown type {}",
                item.get("type").map(|v| v.to_string()).unwrap_or_default()
            ),
        }
    }
    features
}

/// Identify a feature in diagnostics: its id, or the whole feature as JSON
pub fn feature_label(feature: &Value) -> String {
    match feature.get("id") {
        Some(Value::String(id)) if !id.is_empty() => format!("with ID {}", id),
        Some(Value::Number(id)) => format!("with ID {}", id),
        _ => feature.to_string(),
    }
}

/// Mutable access to a feature's `properties`, creating the object if missing
pub fn properties_mut(feature: &mut Value) -> Option<&mut Map<String, Value>> {
    let obj = feature.as_object_mut()?;
    let props = obj
        .entry("properties")
        .or_insert_with(|| Value::Object(Map::new()));
    if props.is_null() {
        *props = Value::Object(Map::new());
    }
    props.as_object_mut()
}
