//! Polygon-to-cells conversion with tiered fallback
//!
//! Tiers are tried in order; an error in one tier is logged and the next
//! tier is attempted. The sampler tier sits last and only fails when even
//! its centroid fallback cannot be indexed.

use std::time::Instant;

use h3o::{CellIndex, Resolution};
use metrics::{counter, histogram};
use tracing::{debug, warn};

use crate::config::PolyfillConfig;

use super::sampler::{SamplerSettings, sample_polyfill};
use super::service::GridIndexer;
use super::types::{GeoPolygon, GridError, PolyfillMethod};

/// One strategy in the polyfill chain
pub trait PolyfillTier: Send + Sync {
    fn method(&self) -> PolyfillMethod;

    fn polyfill(
        &self,
        indexer: &dyn GridIndexer,
        polygon: &GeoPolygon,
        res: Resolution,
    ) -> Result<Vec<CellIndex>, GridError>;
}

/// Delegates to the indexer's native polygon conversion
pub struct NativeTier;

impl PolyfillTier for NativeTier {
    fn method(&self) -> PolyfillMethod {
        PolyfillMethod::Native
    }

    fn polyfill(
        &self,
        indexer: &dyn GridIndexer,
        polygon: &GeoPolygon,
        res: Resolution,
    ) -> Result<Vec<CellIndex>, GridError> {
        indexer.polygon_to_cells(polygon, res)
    }
}

/// Lattice sampling over the exterior ring
pub struct SampledTier {
    pub settings: SamplerSettings,
}

impl PolyfillTier for SampledTier {
    fn method(&self) -> PolyfillMethod {
        PolyfillMethod::Sampled
    }

    fn polyfill(
        &self,
        indexer: &dyn GridIndexer,
        polygon: &GeoPolygon,
        res: Resolution,
    ) -> Result<Vec<CellIndex>, GridError> {
        sample_polyfill(indexer, &polygon.exterior, res, &self.settings)
    }
}

/// Result of a polyfill run
#[derive(Debug, Clone, PartialEq)]
pub struct PolyfillOutcome {
    pub cells: Vec<CellIndex>,
    pub method: PolyfillMethod,
}

/// Ordered list of polyfill tiers
pub struct PolyfillChain {
    tiers: Vec<Box<dyn PolyfillTier>>,
}

impl PolyfillChain {
    pub fn new(tiers: Vec<Box<dyn PolyfillTier>>) -> Self {
        Self { tiers }
    }

    /// Build the chain described by the configuration: native first when
    /// enabled, sampler always last.
    pub fn from_config(config: &PolyfillConfig) -> Self {
        let mut tiers: Vec<Box<dyn PolyfillTier>> = Vec::new();
        if config.native_enabled {
            tiers.push(Box::new(NativeTier));
        }
        tiers.push(Box::new(SampledTier {
            settings: SamplerSettings {
                max_samples: config.max_samples,
                base_step_deg: config.base_step_deg,
            },
        }));
        Self::new(tiers)
    }

    pub fn methods(&self) -> Vec<PolyfillMethod> {
        self.tiers.iter().map(|t| t.method()).collect()
    }

    pub fn has_native(&self) -> bool {
        self.methods().contains(&PolyfillMethod::Native)
    }

    pub fn run(
        &self,
        indexer: &dyn GridIndexer,
        polygon: &GeoPolygon,
        res: Resolution,
    ) -> Result<PolyfillOutcome, GridError> {
        let start = Instant::now();
        let mut last_error = None;

        for tier in &self.tiers {
            let method = tier.method();
            match tier.polyfill(indexer, polygon, res) {
                Ok(cells) => {
                    debug!("Polyfill via {} produced {} cells", method.as_str(), cells.len());
                    histogram!("hexcell_polyfill_duration_seconds", "method" => method.as_str())
                        .record(start.elapsed());
                    return Ok(PolyfillOutcome { cells, method });
                }
                Err(e) => {
                    warn!("Polyfill tier {} failed, falling back: {}", method.as_str(), e);
                    counter!("hexcell_polyfill_fallback_total", "tier" => method.as_str())
                        .increment(1);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| GridError::Polyfill("no polyfill tier configured".to_string())))
    }
}
