//! Lookup of provider mapping tables by identifier

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use regex::Regex;
use tracing::warn;

use super::builtin;
use super::mapping::ProviderMapping;
use crate::normalize::text::ansi_pattern;

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("invalid text pattern in provider tables: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("unknown provider: {0}")]
    UnknownProvider(String),
}

/// Registered provider tables plus the shared terminal-escape pattern
#[derive(Debug, Clone)]
pub struct ProviderRegistry {
    providers: BTreeMap<String, Arc<ProviderMapping>>,
    ansi: Arc<Regex>,
}

impl ProviderRegistry {
    /// Registry with no providers; every lookup fails closed
    pub fn empty() -> Result<Self, ProviderError> {
        Ok(Self {
            providers: BTreeMap::new(),
            ansi: Arc::new(ansi_pattern()?),
        })
    }

    pub fn with_builtins() -> Result<Self, ProviderError> {
        let mut registry = Self::empty()?;
        for mapping in builtin::all()? {
            registry.register(mapping);
        }
        Ok(registry)
    }

    /// Add or replace a provider table
    pub fn register(&mut self, mapping: ProviderMapping) {
        self.providers
            .insert(mapping.id.clone(), Arc::new(mapping));
    }

    pub fn get(&self, id: &str) -> Option<Arc<ProviderMapping>> {
        self.providers.get(id).cloned()
    }

    /// Mapping for `id`, or a plain-text stand-in without fallbacks when the
    /// provider is not registered
    pub fn resolve(&self, id: &str) -> Arc<ProviderMapping> {
        match self.get(id) {
            Some(mapping) => mapping,
            None => {
                warn!(provider = id, "no mapping registered; treating output as plain text");
                Arc::new(ProviderMapping::unregistered(id))
            }
        }
    }

    /// Point a registered provider at a different side-channel location
    pub fn override_activity(
        &mut self,
        id: &str,
        state_dir: Option<PathBuf>,
        watched_files: Option<Vec<String>>,
    ) -> Result<(), ProviderError> {
        let current = self
            .get(id)
            .ok_or_else(|| ProviderError::UnknownProvider(id.to_string()))?;
        let mut mapping = (*current).clone();
        if let Some(dir) = state_dir {
            mapping.state_dir = Some(dir);
        }
        if let Some(files) = watched_files {
            mapping.watched_files = files;
        }
        self.register(mapping);
        Ok(())
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.providers.keys().map(String::as_str)
    }

    pub fn mappings(&self) -> impl Iterator<Item = &ProviderMapping> {
        self.providers.values().map(|m| m.as_ref())
    }

    pub fn ansi(&self) -> Arc<Regex> {
        Arc::clone(&self.ansi)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::FramingMode;

    #[test]
    fn builtins_are_registered_in_id_order() {
        let registry = ProviderRegistry::with_builtins().unwrap();
        let ids: Vec<&str> = registry.ids().collect();
        assert_eq!(ids, vec!["aider", "claude", "cline", "codex", "gemini", "generic"]);
    }

    #[test]
    fn resolve_unknown_provider_fails_closed() {
        let registry = ProviderRegistry::with_builtins().unwrap();
        let mapping = registry.resolve("cursor-agent");
        assert!(!mapping.registered);
        assert_eq!(mapping.framing_hint, Some(FramingMode::PlainText));
        assert!(mapping.text_patterns.is_empty());
    }

    #[test]
    fn override_activity_replaces_state_dir() {
        let mut registry = ProviderRegistry::with_builtins().unwrap();
        registry
            .override_activity(
                "claude",
                Some(PathBuf::from("/tmp/claude-state")),
                Some(vec!["session.jsonl".to_string()]),
            )
            .unwrap();
        let mapping = registry.get("claude").unwrap();
        assert_eq!(mapping.state_dir, Some(PathBuf::from("/tmp/claude-state")));
        assert_eq!(mapping.watched_files, vec!["session.jsonl".to_string()]);
    }

    #[test]
    fn override_activity_rejects_unknown_provider() {
        let mut registry = ProviderRegistry::empty().unwrap();
        let err = registry
            .override_activity("nope", None, None)
            .unwrap_err();
        assert_eq!(err.to_string(), "unknown provider: nope");
    }
}
