//! # Catalog
//!
//! A small, fixed-shape summary of the host registry: model, LoRA, VAE,
//! sampler and scheduler names, served in place of the full metadata dump.
//! Built by [`build_catalog`] and memoized by [`CatalogCache`].

mod builder;
mod cache;
mod extract;

pub use builder::{build_catalog, keys};
pub use cache::{CatalogCache, CatalogOutcome, CatalogResponse, Clock, SystemClock};
pub use extract::{dedup_preserving_order, FieldExtractor, LORA_MARKER};

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use serde_json::Value;

/// One successful extraction, recorded in diagnostic builds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractionRecord {
    /// Component the values came from.
    pub component: String,
    /// Field name that matched.
    pub field: String,
    /// Raw length of the choice list.
    pub count: usize,
    /// First few raw entries.
    pub sample: Vec<Value>,
}

/// Model names, grouped by the loader field they came from.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ModelGroups {
    pub all: Vec<String>,
    pub ckpt: Vec<String>,
    pub unet: Vec<String>,
}

/// The distilled registry summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Catalog {
    #[serde(rename = "ts", serialize_with = "serialize_unix_seconds")]
    pub built_at: DateTime<Utc>,
    pub models: ModelGroups,
    pub loras: Vec<String>,
    pub vae: Vec<String>,
    pub samplers: Vec<String>,
    pub schedulers: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extraction_debug: Option<Vec<ExtractionRecord>>,
}

impl Catalog {
    /// Build time as fractional Unix seconds.
    pub fn timestamp(&self) -> f64 {
        unix_seconds(&self.built_at)
    }

    pub fn has_diagnostics(&self) -> bool {
        self.extraction_debug.is_some()
    }
}

fn unix_seconds(at: &DateTime<Utc>) -> f64 {
    at.timestamp_millis() as f64 / 1000.0
}

fn serialize_unix_seconds<S: Serializer>(at: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(unix_seconds(at))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_catalog_serializes_flat_shape() {
        let catalog = Catalog {
            built_at: Utc.timestamp_millis_opt(1_700_000_000_500).unwrap(),
            models: ModelGroups {
                all: vec!["a".into()],
                ckpt: vec!["a".into()],
                unet: vec![],
            },
            loras: vec![],
            vae: vec!["ae".into()],
            samplers: vec!["euler".into()],
            schedulers: vec!["normal".into()],
            extraction_debug: None,
        };
        let json = serde_json::to_value(&catalog).unwrap();
        assert_eq!(json["ts"], 1_700_000_000.5);
        assert_eq!(json["models"]["all"][0], "a");
        assert_eq!(json["samplers"][0], "euler");
        assert!(json.get("extraction_debug").is_none());
        assert!((catalog.timestamp() - 1_700_000_000.5).abs() < 1e-9);
    }
}
