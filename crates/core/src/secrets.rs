use anyhow::Context;

/// Credential lookup seam. Providers resolve their keys through an injected
/// store first and fall back to the process environment, so an external
/// secret manager can be dropped in without touching provider code.
#[async_trait::async_trait]
pub trait SecretStore: Send + Sync {
    async fn get(&self, name: &str) -> Option<String>;
}

/// Reads secrets straight from the environment.
#[derive(Debug, Clone, Default)]
pub struct EnvSecretStore;

#[async_trait::async_trait]
impl SecretStore for EnvSecretStore {
    async fn get(&self, name: &str) -> Option<String> {
        std::env::var(name).ok().filter(|v| !v.trim().is_empty())
    }
}

/// Store-first, environment-fallback resolution.
pub async fn resolve(store: &dyn SecretStore, name: &str) -> anyhow::Result<String> {
    if let Some(value) = store.get(name).await {
        return Ok(value);
    }
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .with_context(|| format!("secret {name} not found in store or environment"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct MapSecretStore(HashMap<String, String>);

    #[async_trait::async_trait]
    impl SecretStore for MapSecretStore {
        async fn get(&self, name: &str) -> Option<String> {
            self.0.get(name).cloned()
        }
    }

    // PATH is always set in the test environment, so these exercise the
    // store-vs-environment precedence without mutating process state.

    #[tokio::test]
    async fn store_takes_priority_over_environment() {
        let store = MapSecretStore(HashMap::from([(
            "PATH".to_string(),
            "from-store".to_string(),
        )]));
        let value = resolve(&store, "PATH").await.unwrap();
        assert_eq!(value, "from-store");
    }

    #[tokio::test]
    async fn falls_back_to_the_environment() {
        let store = MapSecretStore(HashMap::new());
        let value = resolve(&store, "PATH").await.unwrap();
        assert!(!value.is_empty());
        assert_ne!(value, "from-store");
    }

    #[tokio::test]
    async fn missing_everywhere_is_an_error() {
        let store = MapSecretStore(HashMap::new());
        assert!(resolve(&store, "DAYBRIEF_TEST_SECRET_ABSENT").await.is_err());
    }
}
