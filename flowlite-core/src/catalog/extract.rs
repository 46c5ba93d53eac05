//! Choice-list extraction over a registry snapshot.

use super::ExtractionRecord;
use crate::registry::{ComponentInputs, FieldShape, RegistrySnapshot};
use serde_json::Value;
use std::collections::HashSet;

/// Number of raw entries kept in an extraction record's sample.
const SAMPLE_LEN: usize = 3;

/// Name fragment identifying LoRA loader components.
pub const LORA_MARKER: &str = "lora";

/// Pulls the enumerated values of a set of input fields out of every
/// component in a snapshot.
///
/// Per component at most one field contributes: the first key in `keys`
/// that is present (`required` before `optional`). Output is trimmed,
/// blank-free and deduplicated by first occurrence.
#[derive(Debug, Clone, Copy)]
pub struct FieldExtractor {
    keys: &'static [&'static str],
    name_marker: Option<&'static str>,
}

impl FieldExtractor {
    pub const fn new(keys: &'static [&'static str]) -> Self {
        Self {
            keys,
            name_marker: None,
        }
    }

    /// Only inspect components whose name contains `marker`, ignoring case.
    pub const fn with_name_marker(mut self, marker: &'static str) -> Self {
        self.name_marker = Some(marker);
        self
    }

    /// LoRA loaders share no field naming beyond `lora_name`, and only
    /// components named like a LoRA loader are trusted to mean it.
    pub const fn lora() -> Self {
        Self::new(&["lora_name"]).with_name_marker(LORA_MARKER)
    }

    pub fn keys(&self) -> &'static [&'static str] {
        self.keys
    }

    /// Run the extraction. When `records` is given, one record is appended
    /// per contributing component.
    pub fn extract(
        &self,
        snapshot: &RegistrySnapshot,
        mut records: Option<&mut Vec<ExtractionRecord>>,
    ) -> Vec<String> {
        let mut out = Vec::new();

        for (name, spec) in snapshot.components() {
            if !self.accepts(name) {
                continue;
            }
            let Some(inputs) = ComponentInputs::from_spec(spec) else {
                continue;
            };
            let Some((key, field)) = self
                .keys
                .iter()
                .find_map(|key| inputs.field(key).map(|field| (*key, field)))
            else {
                continue;
            };
            let FieldShape::ChoiceList(choices) = FieldShape::classify(field) else {
                continue;
            };

            out.extend(
                choices
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string),
            );

            if let Some(records) = records.as_deref_mut() {
                if !choices.is_empty() {
                    records.push(ExtractionRecord {
                        component: name.to_string(),
                        field: key.to_string(),
                        count: choices.len(),
                        sample: choices.iter().take(SAMPLE_LEN).cloned().collect(),
                    });
                }
            }
        }

        dedup_preserving_order(out)
    }

    fn accepts(&self, component: &str) -> bool {
        match self.name_marker {
            Some(marker) => component.to_lowercase().contains(marker),
            None => true,
        }
    }
}

/// Drop repeated strings, keeping the first occurrence of each.
pub fn dedup_preserving_order(items: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::with_capacity(items.len());
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn snapshot(value: Value) -> RegistrySnapshot {
        RegistrySnapshot::from_value(value).unwrap()
    }

    #[test]
    fn test_extract_dedups_across_components() {
        let snap = snapshot(json!({
            "CheckpointLoaderSimple": {"input": {"required": {"ckpt_name": [["a.ckpt", "b.ckpt"]]}}},
            "ImageOnlyCheckpointLoader": {"input": {"required": {"ckpt_name": [["b.ckpt", "c.ckpt"]]}}}
        }));
        let out = FieldExtractor::new(&["ckpt_name"]).extract(&snap, None);
        assert_eq!(out, vec!["a.ckpt", "b.ckpt", "c.ckpt"]);
    }

    #[test]
    fn test_extract_trims_and_drops_blank_and_non_strings() {
        let snap = snapshot(json!({
            "Loader": {"input": {"required": {"vae_name": [["  ae.safetensors ", "", "   ", 42, null, "ae.safetensors"]]}}}
        }));
        let out = FieldExtractor::new(&["vae_name"]).extract(&snap, None);
        assert_eq!(out, vec!["ae.safetensors"]);
    }

    #[test]
    fn test_first_present_key_wins_per_component() {
        let snap = snapshot(json!({
            "Dual": {"input": {"required": {
                "ckpt_name": [["from_ckpt"]],
                "model_name": [["from_model"]]
            }}}
        }));
        let out = FieldExtractor::new(&["ckpt_name", "model_name"]).extract(&snap, None);
        assert_eq!(out, vec!["from_ckpt"]);
    }

    #[test]
    fn test_opaque_first_key_blocks_later_keys() {
        let snap = snapshot(json!({
            "Odd": {"input": {"required": {
                "vae_name": ["STRING", {"default": ""}],
                "vae": [["never.pt"]]
            }}}
        }));
        let out = FieldExtractor::new(&["vae_name", "vae"]).extract(&snap, None);
        assert!(out.is_empty());
    }

    #[test]
    fn test_optional_section_is_used() {
        let snap = snapshot(json!({
            "Sampler": {"input": {"optional": {"scheduler": [["normal", "karras"]]}}}
        }));
        let out = FieldExtractor::new(&["scheduler"]).extract(&snap, None);
        assert_eq!(out, vec!["normal", "karras"]);
    }

    #[test]
    fn test_malformed_components_are_skipped() {
        let snap = snapshot(json!({
            "Broken": "not an object",
            "NoInput": {"output": ["IMAGE"]},
            "BadInput": {"input": [1, 2, 3]},
            "Good": {"input": {"required": {"sampler_name": [["euler"]]}}}
        }));
        let out = FieldExtractor::new(&["sampler_name"]).extract(&snap, None);
        assert_eq!(out, vec!["euler"]);
    }

    #[test]
    fn test_lora_requires_name_marker() {
        let snap = snapshot(json!({
            "LoraLoader": {"input": {"required": {"lora_name": [["style.safetensors"]]}}},
            "LoRAStackLOADER": {"input": {"optional": {"lora_name": [["detail.safetensors"]]}}},
            "SomethingElse": {"input": {"required": {"lora_name": [["ignored.safetensors"]]}}}
        }));
        let out = FieldExtractor::lora().extract(&snap, None);
        assert_eq!(out, vec!["style.safetensors", "detail.safetensors"]);
    }

    #[test]
    fn test_records_capture_provenance() {
        let snap = snapshot(json!({
            "UNETLoader": {"input": {"required": {"unet_name": [["a", "b", "c", "d"]]}}},
            "EmptyLoader": {"input": {"required": {"unet_name": [[]]}}}
        }));
        let mut records = Vec::new();
        FieldExtractor::new(&["unet_name"]).extract(&snap, Some(&mut records));
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].component, "UNETLoader");
        assert_eq!(records[0].field, "unet_name");
        assert_eq!(records[0].count, 4);
        assert_eq!(records[0].sample, vec![json!("a"), json!("b"), json!("c")]);
    }

    #[test]
    fn test_dedup_preserving_order() {
        let items = vec!["b".to_string(), "a".into(), "b".into(), "c".into(), "a".into()];
        assert_eq!(dedup_preserving_order(items), vec!["b", "a", "c"]);
    }
}
