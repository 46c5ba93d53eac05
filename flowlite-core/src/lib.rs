//! # FlowLite Core
//!
//! Core library for FlowLite, a lightweight companion service for
//! node-graph image generation hosts. Provides a cached, slim catalog of the
//! host's model/LoRA/VAE/sampler choices and a hardened image download
//! endpoint with optional PNG→JPEG compression and cleanup.

pub mod catalog;
pub mod config;
pub mod delivery;
pub mod error;
pub mod registry;
pub mod server;

// Re-export commonly used types at the crate root.
pub use catalog::{build_catalog, Catalog, CatalogCache, CatalogResponse, Clock, SystemClock};
pub use config::{load_config, FlowliteConfig};
pub use delivery::{
    resolve_path, DeliveryKind, DeliveryPipeline, DeliveryRequest, DirectoryLayout,
    ImageTranscoder, StaticLayout,
};
pub use error::{FlowliteError, Result};
pub use registry::{RegistrySnapshot, RegistrySource};
pub use server::{router, AppState, SharedState};
