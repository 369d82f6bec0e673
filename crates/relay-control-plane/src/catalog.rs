//! Provider catalog.

use relay_core::ProviderDefinition;

use crate::config::{validate_providers, ConfigError};

/// Ordered, validated table of providers. Enumeration order is the order the
/// providers were supplied in.
#[derive(Debug, Clone, Default)]
pub struct ProviderCatalog {
    providers: Vec<ProviderDefinition>,
}

impl ProviderCatalog {
    /// Build a catalog, rejecting duplicate ids and incomplete entries.
    pub fn new(providers: Vec<ProviderDefinition>) -> Result<Self, ConfigError> {
        validate_providers(&providers)?;
        Ok(Self { providers })
    }

    pub fn get(&self, id: &str) -> Option<&ProviderDefinition> {
        self.providers.iter().find(|p| p.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProviderDefinition> {
        self.providers.iter()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.id.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::CommunicationMethod;

    fn provider(id: &str) -> ProviderDefinition {
        ProviderDefinition::new(id, CommunicationMethod::Cli, "qwen", "m")
            .with_context_limit(32_000)
            .with_command("qwen", Vec::<String>::new())
    }

    #[test]
    fn test_lookup_and_order() {
        let catalog =
            ProviderCatalog::new(vec![provider("b"), provider("a"), provider("c")]).unwrap();
        assert_eq!(catalog.ids(), vec!["b", "a", "c"]);
        assert!(catalog.get("a").is_some());
        assert!(catalog.get("z").is_none());
    }

    #[test]
    fn test_empty_catalog_is_valid() {
        let catalog = ProviderCatalog::new(Vec::new()).unwrap();
        assert!(catalog.is_empty());
    }
}
