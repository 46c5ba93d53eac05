use super::builder::build_catalog;
use super::Catalog;
use crate::error::RegistryError;
use crate::registry::{RegistrySource, SampleInput};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Number of raw component inputs included in a diagnostic response.
const SAMPLE_INPUTS: usize = 3;

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Whether a response came from memory or from a fresh build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CatalogOutcome {
    Cached,
    Rebuilt,
}

/// The catalog handed to a caller, plus snapshot diagnostics when requested.
#[derive(Debug, Clone, Serialize)]
pub struct CatalogResponse {
    #[serde(flatten)]
    pub catalog: Arc<Catalog>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub component_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_inputs: Option<Vec<SampleInput>>,
    #[serde(skip)]
    pub outcome: CatalogOutcome,
}

#[derive(Debug)]
struct CacheEntry {
    stored_at: DateTime<Utc>,
    catalog: Arc<Catalog>,
}

/// Time-bounded memo of the last non-diagnostic catalog.
///
/// The check-build-store sequence runs under one async lock, so callers that
/// arrive while a rebuild is in flight wait for it and then reuse its result.
pub struct CatalogCache {
    source: Arc<dyn RegistrySource>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    entry: Mutex<Option<CacheEntry>>,
}

impl std::fmt::Debug for CatalogCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogCache")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl CatalogCache {
    pub fn new(source: Arc<dyn RegistrySource>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            source,
            clock,
            ttl,
            entry: Mutex::new(None),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Return the cached catalog if it is still fresh, otherwise rebuild.
    ///
    /// A cache hit never carries diagnostics. On a rebuild with
    /// `diagnostics` set, the response is a separate diagnostic build of the
    /// same snapshot; the stored entry stays diagnostic-free.
    pub async fn get(
        &self,
        force_refresh: bool,
        diagnostics: bool,
    ) -> Result<CatalogResponse, RegistryError> {
        let mut entry = self.entry.lock().await;
        let now = self.clock.now();

        if !force_refresh {
            if let Some(cached) = entry.as_ref() {
                if self.is_fresh(cached, now) {
                    tracing::debug!(
                        age_ms = (now - cached.stored_at).num_milliseconds(),
                        "Serving cached catalog"
                    );
                    return Ok(CatalogResponse {
                        catalog: Arc::clone(&cached.catalog),
                        component_count: None,
                        sample_inputs: None,
                        outcome: CatalogOutcome::Cached,
                    });
                }
            }
        }

        let snapshot = self.source.snapshot().await?;
        let catalog = Arc::new(build_catalog(&snapshot, false, now));
        *entry = Some(CacheEntry {
            stored_at: now,
            catalog: Arc::clone(&catalog),
        });
        drop(entry);

        tracing::info!(
            components = snapshot.len(),
            models = catalog.models.all.len(),
            loras = catalog.loras.len(),
            force_refresh,
            "Catalog rebuilt"
        );

        if diagnostics {
            return Ok(CatalogResponse {
                catalog: Arc::new(build_catalog(&snapshot, true, now)),
                component_count: Some(snapshot.len()),
                sample_inputs: Some(snapshot.sample_inputs(SAMPLE_INPUTS)),
                outcome: CatalogOutcome::Rebuilt,
            });
        }

        Ok(CatalogResponse {
            catalog,
            component_count: None,
            sample_inputs: None,
            outcome: CatalogOutcome::Rebuilt,
        })
    }

    fn is_fresh(&self, entry: &CacheEntry, now: DateTime<Utc>) -> bool {
        match (now - entry.stored_at).to_std() {
            Ok(age) => age < self.ttl,
            // stored_at is in the future (clock stepped back): treat as fresh
            Err(_) => true,
        }
    }
}
