//! Process-local cache of the production model parameters.
//!
//! There is no expiry: entries stay until [`ParameterCache::invalidate`] is
//! called, which a retraining deploy or rollback must do. In a multi-instance
//! deployment each process holds its own, eventually consistent copy.

use anyhow::Result;
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

use crate::models::params::{ModelParameters, HEURISTIC_VERSION};
use crate::store::Store;

/// Parameters together with the version that produced them
#[derive(Debug, Clone, PartialEq)]
pub struct CachedModel {
    pub version: String,
    pub params: ModelParameters,
}

impl CachedModel {
    pub fn heuristic() -> Self {
        Self {
            version: HEURISTIC_VERSION.to_string(),
            params: ModelParameters::default(),
        }
    }
}

#[derive(Default)]
pub struct ParameterCache {
    current: RwLock<Option<Arc<CachedModel>>>,
}

impl ParameterCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<Arc<CachedModel>> {
        self.current.read().ok().and_then(|guard| guard.clone())
    }

    pub fn set(&self, model: CachedModel) -> Arc<CachedModel> {
        let model = Arc::new(model);
        match self.current.write() {
            Ok(mut guard) => *guard = Some(model.clone()),
            Err(e) => warn!(error = %e, "Parameter cache lock poisoned, not caching"),
        }
        model
    }

    pub fn invalidate(&self) {
        if let Ok(mut guard) = self.current.write() {
            *guard = None;
        }
        info!("Prediction parameter cache invalidated");
    }
}

/// Load the production parameters for a model, falling back to the heuristic
pub async fn load_production(store: &dyn Store, model_name: &str) -> Result<CachedModel> {
    match store.production_model(model_name).await? {
        Some(version) => {
            info!(
                model = %model_name,
                version = %version.version,
                "Loaded production model parameters"
            );
            Ok(CachedModel {
                version: version.version,
                params: version.parameters,
            })
        }
        None => {
            info!(model = %model_name, "No production model, using heuristic parameters");
            Ok(CachedModel::heuristic())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_set_invalidate() {
        let cache = ParameterCache::new();
        assert!(cache.get().is_none());

        cache.set(CachedModel::heuristic());
        assert_eq!(cache.get().unwrap().version, HEURISTIC_VERSION);

        cache.invalidate();
        assert!(cache.get().is_none());
    }

    #[test]
    fn test_instances_are_isolated() {
        let a = ParameterCache::new();
        let b = ParameterCache::new();
        a.set(CachedModel::heuristic());
        assert!(b.get().is_none());
    }
}
