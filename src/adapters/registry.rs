//! Adapter registry
//!
//! Maps provider slugs to the adapter that syncs them.

use std::collections::HashMap;
use std::sync::Arc;

use super::ProviderAdapter;

#[derive(Debug, Clone, thiserror::Error)]
pub enum RegistryError {
    #[error("No adapter registered for provider '{name}'")]
    AdapterNotFound { name: String },
}

#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: HashMap<String, Arc<dyn ProviderAdapter>>,
    fallback: Option<Arc<dyn ProviderAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `adapter` for `slug`, replacing any previous registration.
    pub fn register(&mut self, slug: impl Into<String>, adapter: Arc<dyn ProviderAdapter>) {
        self.adapters.insert(slug.into(), adapter);
    }

    /// Adapter used for slugs without a dedicated registration.
    pub fn with_fallback(mut self, adapter: Arc<dyn ProviderAdapter>) -> Self {
        self.fallback = Some(adapter);
        self
    }

    pub fn get(&self, slug: &str) -> Result<Arc<dyn ProviderAdapter>, RegistryError> {
        self.adapters
            .get(slug)
            .or(self.fallback.as_ref())
            .cloned()
            .ok_or_else(|| RegistryError::AdapterNotFound {
                name: slug.to_string(),
            })
    }

    pub fn slugs(&self) -> Vec<String> {
        let mut slugs: Vec<_> = self.adapters.keys().cloned().collect();
        slugs.sort();
        slugs
    }
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("adapters", &self.slugs())
            .field("fallback", &self.fallback.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::DemoAdapter;

    #[test]
    fn lookup_prefers_registered_then_fallback() {
        let mut registry = AdapterRegistry::new();
        assert!(matches!(
            registry.get("fitbit"),
            Err(RegistryError::AdapterNotFound { .. })
        ));

        registry.register("fitbit", Arc::new(DemoAdapter::default()));
        assert!(registry.get("fitbit").is_ok());
        assert!(registry.get("oura").is_err());

        let registry = registry.with_fallback(Arc::new(DemoAdapter::default()));
        assert!(registry.get("oura").is_ok());
        assert_eq!(registry.slugs(), vec!["fitbit".to_string()]);
    }
}
