use super::extract::FieldExtractor;
use super::{Catalog, ExtractionRecord, ModelGroups};
use crate::registry::RegistrySnapshot;
use chrono::{DateTime, Utc};

/// Field names searched for each catalog group, in precedence order.
pub mod keys {
    pub const MODELS_ALL: &[&str] = &["unet_name", "ckpt_name", "model_name"];
    pub const MODELS_CKPT: &[&str] = &["ckpt_name", "model_name"];
    pub const MODELS_UNET: &[&str] = &["unet_name"];
    pub const VAE: &[&str] = &["vae_name", "vae"];
    pub const SAMPLERS: &[&str] = &["sampler_name"];
    pub const SCHEDULERS: &[&str] = &["scheduler"];
}

/// Build a catalog from one snapshot.
///
/// Each group is extracted independently with its own key list, so
/// `models.all` is not necessarily `ckpt ∪ unet`. A component that does not
/// fit the expected shape contributes nothing; this never fails.
pub fn build_catalog(
    snapshot: &RegistrySnapshot,
    diagnostics: bool,
    built_at: DateTime<Utc>,
) -> Catalog {
    let mut records: Vec<ExtractionRecord> = Vec::new();
    let mut run = |extractor: FieldExtractor| {
        extractor.extract(snapshot, diagnostics.then_some(&mut records))
    };

    let models = ModelGroups {
        all: run(FieldExtractor::new(keys::MODELS_ALL)),
        ckpt: run(FieldExtractor::new(keys::MODELS_CKPT)),
        unet: run(FieldExtractor::new(keys::MODELS_UNET)),
    };
    let loras = run(FieldExtractor::lora());
    let vae = run(FieldExtractor::new(keys::VAE));
    let samplers = run(FieldExtractor::new(keys::SAMPLERS));
    let schedulers = run(FieldExtractor::new(keys::SCHEDULERS));

    Catalog {
        built_at,
        models,
        loras,
        vae,
        samplers,
        schedulers,
        extraction_debug: diagnostics.then_some(records),
    }
}
