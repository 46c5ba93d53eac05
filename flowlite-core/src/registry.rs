//! Host node registry: snapshots and the sources that produce them.
//!
//! The host's metadata is loosely typed JSON. Nothing here fails on an
//! unexpected shape; components and fields that do not look the way we
//! expect are simply invisible to the extractors.

use crate::error::RegistryError;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::time::Duration;

/// Shape of a single input field declaration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldShape<'a> {
    /// `[[choice, choice, ...], {options}?]`: an enumerated list of values.
    ChoiceList(&'a [Value]),
    /// A recognizable declaration without enumerated choices (`["INT", {...}]`).
    Opaque,
    /// Anything else.
    Malformed,
}

impl<'a> FieldShape<'a> {
    pub fn classify(spec: &'a Value) -> Self {
        match spec.as_array() {
            Some(items) if !items.is_empty() => match &items[0] {
                Value::Array(choices) => FieldShape::ChoiceList(choices),
                _ => FieldShape::Opaque,
            },
            _ => FieldShape::Malformed,
        }
    }
}

/// Truthiness of a field declaration. Null, `false`, zero and empty
/// containers count as absent, so lookup falls through to `optional`.
fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Borrowed view of one component's declared inputs.
#[derive(Debug, Clone, Copy)]
pub struct ComponentInputs<'a> {
    required: Option<&'a Map<String, Value>>,
    optional: Option<&'a Map<String, Value>>,
}

impl<'a> ComponentInputs<'a> {
    /// Extract `input.required` / `input.optional` from a component spec.
    /// Returns `None` when the component has no usable `input` object.
    pub fn from_spec(spec: &'a Value) -> Option<Self> {
        let input = spec.as_object()?.get("input")?.as_object()?;
        Some(Self {
            required: input.get("required").and_then(Value::as_object),
            optional: input.get("optional").and_then(Value::as_object),
        })
    }

    /// Look up a field, preferring `required` over `optional`.
    pub fn field(&self, key: &str) -> Option<&'a Value> {
        let lookup = |section: Option<&'a Map<String, Value>>| {
            section.and_then(|m| m.get(key)).filter(|v| is_present(v))
        };
        lookup(self.required).or_else(|| lookup(self.optional))
    }
}

/// A sample of one component's raw input declaration, for diagnostics.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SampleInput {
    pub component: String,
    pub input: Value,
}

/// Point-in-time copy of the host registry, in host iteration order.
#[derive(Debug, Clone, Default)]
pub struct RegistrySnapshot {
    components: Map<String, Value>,
}

impl RegistrySnapshot {
    pub fn new(components: Map<String, Value>) -> Self {
        Self { components }
    }

    /// Build a snapshot from a full registry dump. The top level must be a
    /// JSON object keyed by component name.
    pub fn from_value(value: Value) -> Result<Self, RegistryError> {
        match value {
            Value::Object(components) => Ok(Self { components }),
            other => Err(RegistryError::Malformed {
                message: format!("expected an object at the top level, found {}", kind_of(&other)),
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Components in host iteration order.
    pub fn components(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.components.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Up to `limit` components with a non-empty input declaration.
    pub fn sample_inputs(&self, limit: usize) -> Vec<SampleInput> {
        self.components
            .iter()
            .filter_map(|(name, spec)| {
                let input = spec.get("input")?;
                is_present(input).then(|| SampleInput {
                    component: name.clone(),
                    input: input.clone(),
                })
            })
            .take(limit)
            .collect()
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Anything that can produce a registry snapshot on demand.
#[async_trait]
pub trait RegistrySource: Send + Sync {
    async fn snapshot(&self) -> Result<RegistrySnapshot, RegistryError>;
}

/// Fixed in-memory registry.
#[derive(Debug, Clone, Default)]
pub struct StaticRegistry {
    snapshot: RegistrySnapshot,
}

impl StaticRegistry {
    pub fn new(snapshot: RegistrySnapshot) -> Self {
        Self { snapshot }
    }

    pub fn from_value(value: Value) -> Result<Self, RegistryError> {
        RegistrySnapshot::from_value(value).map(Self::new)
    }
}

#[async_trait]
impl RegistrySource for StaticRegistry {
    async fn snapshot(&self) -> Result<RegistrySnapshot, RegistryError> {
        Ok(self.snapshot.clone())
    }
}

/// Registry read from a JSON dump on disk. The file is re-read on every
/// snapshot so edits are picked up on the next cache rebuild.
#[derive(Debug, Clone)]
pub struct FileRegistry {
    path: PathBuf,
}

impl FileRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl RegistrySource for FileRegistry {
    async fn snapshot(&self) -> Result<RegistrySnapshot, RegistryError> {
        let raw = tokio::fs::read(&self.path)
            .await
            .map_err(|source| RegistryError::Read {
                path: self.path.clone(),
                source,
            })?;
        let value: Value = serde_json::from_slice(&raw).map_err(|e| RegistryError::Malformed {
            message: e.to_string(),
        })?;
        RegistrySnapshot::from_value(value)
    }
}

/// Registry fetched from the host's `object_info` endpoint.
#[derive(Debug, Clone)]
pub struct HttpRegistry {
    client: reqwest::Client,
    endpoint: url::Url,
}

impl HttpRegistry {
    /// `base` is the host root, e.g. `http://127.0.0.1:8188`.
    pub fn new(base: &url::Url, timeout: Duration) -> Result<Self, RegistryError> {
        let mut base = base.clone();
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let endpoint = base.join("object_info").map_err(|e| RegistryError::Request {
            message: format!("invalid registry url: {}", e),
        })?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RegistryError::Request {
                message: e.to_string(),
            })?;
        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &url::Url {
        &self.endpoint
    }
}

#[async_trait]
impl RegistrySource for HttpRegistry {
    async fn snapshot(&self) -> Result<RegistrySnapshot, RegistryError> {
        tracing::debug!(endpoint = %self.endpoint, "Fetching registry snapshot");
        let resp = self
            .client
            .get(self.endpoint.clone())
            .send()
            .await
            .map_err(|e| RegistryError::Request {
                message: e.to_string(),
            })?;
        let status = resp.status();
        if !status.is_success() {
            return Err(RegistryError::Status {
                status: status.as_u16(),
            });
        }
        let value: Value = resp.json().await.map_err(|e| RegistryError::Malformed {
            message: e.to_string(),
        })?;
        RegistrySnapshot::from_value(value)
    }
}
