//! Factory for the garden cluster itself

use async_trait::async_trait;
use kube::Config;

use garden_common::Result;

use super::{ensure_category, ClientSetFactory};
use crate::client_set::ClientSetBuilder;
use crate::key::{ClientSetKey, ClusterCategory};

/// Builds the garden client set from the process's own configuration
///
/// The garden credentials belong to the running process and never rotate
/// underneath it, so the fingerprint is constant and the entry is built once.
pub struct GardenClientSetFactory<B> {
    config: Config,
    builder: B,
}

impl<B> GardenClientSetFactory<B> {
    /// Create a factory for the garden reachable with `config`
    pub fn new(config: Config, builder: B) -> Self {
        Self { config, builder }
    }
}

#[async_trait]
impl<B: ClientSetBuilder> ClientSetFactory for GardenClientSetFactory<B> {
    type ClientSet = B::ClientSet;

    fn category(&self) -> ClusterCategory {
        ClusterCategory::Garden
    }

    async fn new_client_set(&self, key: &ClientSetKey) -> Result<(B::ClientSet, String)> {
        let fingerprint = self.calculate_fingerprint(key).await?;
        let client_set = self
            .builder
            .build_from_config(key, self.config.clone(), &fingerprint)
            .await?;
        Ok((client_set, fingerprint))
    }

    async fn calculate_fingerprint(&self, key: &ClientSetKey) -> Result<String> {
        ensure_category(key, ClusterCategory::Garden)?;
        Ok(String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::FakeBuilder;

    fn factory() -> GardenClientSetFactory<FakeBuilder> {
        let config = Config::new("https://garden.example.com".parse().unwrap());
        GardenClientSetFactory::new(config, FakeBuilder::default())
    }

    #[tokio::test]
    async fn builds_from_process_config() {
        let factory = factory();
        let (cs, fingerprint) = factory.new_client_set(&ClientSetKey::Garden).await.unwrap();

        assert_eq!(fingerprint, "");
        assert_eq!(cs.key, ClientSetKey::Garden);
        assert!(String::from_utf8_lossy(&cs.kubeconfig).contains("garden.example.com"));
        assert_eq!(factory.builder.builds(), 1);
    }

    #[tokio::test]
    async fn fingerprint_is_constant() {
        let factory = factory();
        let a = factory.calculate_fingerprint(&ClientSetKey::Garden).await.unwrap();
        let b = factory.calculate_fingerprint(&ClientSetKey::Garden).await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn rejects_other_keys() {
        let factory = factory();
        let err = factory
            .new_client_set(&ClientSetKey::seed("seed-a"))
            .await
            .unwrap_err();
        assert!(err.is_programmer_error());
        assert_eq!(factory.builder.builds(), 0);
    }
}
