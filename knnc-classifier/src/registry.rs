//! Feature registry
//!
//! Maps feature names to search-provider factories. Feature names given on
//! the command line are validated here, before any pipeline work starts.

use crate::error::{Error, Result};
use crate::search::{DescriptorSearch, DistanceMetric, SearchProvider};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

/// Builds a search provider for a feature name
pub type ProviderFactory = Box<dyn Fn(&str) -> Arc<dyn SearchProvider> + Send + Sync>;

/// Compact composite descriptors, compared with the Tanimoto coefficient
const TANIMOTO_FEATURES: [&str; 3] = ["CEDD", "FCTH", "JCD"];

/// Histogram-style descriptors, compared with L1
const L1_FEATURES: [&str; 11] = [
    "AutoColorCorrelogram",
    "BinaryPatternsPyramid",
    "FuzzyColorHistogram",
    "FuzzyOpponentHistogram",
    "JointHistogram",
    "LocalBinaryPatterns",
    "LocalBinaryPatternsAndOpponent",
    "LuminanceLayout",
    "OpponentHistogram",
    "RankAndOpponent",
    "SimpleColorHistogram",
];

/// Texture and layout descriptors, compared with L2
const L2_FEATURES: [&str; 6] = [
    "ColorLayout",
    "EdgeHistogram",
    "Gabor",
    "PHOG",
    "ScalableColor",
    "Tamura",
];

/// Registry of known features
#[derive(Default)]
pub struct FeatureRegistry {
    factories: BTreeMap<String, ProviderFactory>,
}

impl FeatureRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in descriptor feature
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for (names, metric) in [
            (&TANIMOTO_FEATURES[..], DistanceMetric::Tanimoto),
            (&L1_FEATURES[..], DistanceMetric::L1),
            (&L2_FEATURES[..], DistanceMetric::L2),
        ] {
            for &name in names {
                registry.register_descriptor(name, metric);
            }
        }
        registry
    }

    /// Register (or replace) a factory for `name`
    pub fn register(&mut self, name: impl Into<String>, factory: ProviderFactory) {
        self.factories.insert(name.into(), factory);
    }

    /// Register an exhaustive descriptor search for `name`
    pub fn register_descriptor(&mut self, name: impl Into<String>, metric: DistanceMetric) {
        self.register(
            name,
            Box::new(move |feature| Arc::new(DescriptorSearch::new(feature, metric))),
        );
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered feature names, sorted
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Provider for one feature
    pub fn create(&self, name: &str) -> Result<Arc<dyn SearchProvider>> {
        self.factories
            .get(name)
            .map(|factory| factory(name))
            .ok_or_else(|| Error::UnknownFeature(name.to_string()))
    }

    /// Providers for the requested features, in request order
    ///
    /// Fails on the first unknown name. Repeated names are used once.
    pub fn resolve(&self, names: &[String]) -> Result<Vec<Arc<dyn SearchProvider>>> {
        if names.is_empty() {
            return Err(Error::Config("no features selected".to_string()));
        }

        let mut providers: Vec<Arc<dyn SearchProvider>> = Vec::with_capacity(names.len());
        for name in names {
            if providers.iter().any(|p| p.feature() == name) {
                warn!("Feature {} requested more than once; using it once", name);
                continue;
            }
            providers.push(self.create(name)?);
        }
        Ok(providers)
    }
}
