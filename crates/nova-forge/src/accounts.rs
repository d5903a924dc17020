//! Caller authentication

use crate::config::ForgeConfig;
use nova_core::{NovaError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Identity of the account that submitted a job
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallerId(String);

impl CallerId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CallerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Maps API keys to account identities
#[derive(Debug, Default, Clone)]
pub struct AccountRegistry {
    by_key: HashMap<String, CallerId>,
}

impl AccountRegistry {
    /// Build the registry from the `[accounts.<name>]` tables
    pub fn from_config(config: &ForgeConfig) -> Self {
        let mut registry = Self::default();
        for (name, account) in &config.accounts {
            registry.register(&account.api_key, CallerId::new(name.clone()));
        }
        registry
    }

    /// Register a key; empty keys are ignored
    fn register(&mut self, api_key: &str, caller: CallerId) {
        let key = api_key.trim();
        if !key.is_empty() {
            self.by_key.insert(key.to_string(), caller);
        }
    }

    /// Resolve an API key to its account
    pub fn authenticate(&self, api_key: &str) -> Result<CallerId> {
        let key = api_key.trim();
        if key.is_empty() {
            return Err(NovaError::Unauthorized("missing API key".to_string()));
        }
        self.by_key
            .get(key)
            .cloned()
            .ok_or_else(|| NovaError::Unauthorized("unknown API key".to_string()))
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AccountConfig;

    #[test]
    fn test_from_config() {
        let mut config = ForgeConfig::default();
        config.accounts.insert(
            "studio".to_string(),
            AccountConfig {
                api_key: "key-studio".to_string(),
            },
        );
        let registry = AccountRegistry::from_config(&config);
        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.authenticate("key-studio").unwrap(),
            CallerId::new("studio")
        );
    }

    #[test]
    fn test_rejects_unknown_and_empty_keys() {
        let mut registry = AccountRegistry::default();
        registry.register("k1", CallerId::new("alice"));
        registry.register("  ", CallerId::new("nobody"));
        assert_eq!(registry.len(), 1);

        assert!(matches!(
            registry.authenticate("k2"),
            Err(NovaError::Unauthorized(_))
        ));
        assert!(matches!(
            registry.authenticate(""),
            Err(NovaError::Unauthorized(_))
        ));
    }
}
