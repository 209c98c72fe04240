//! Factory for seed clusters

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use garden_common::kubeconfig::{fingerprint, kubeconfig_from_secret};
use garden_common::{Error, Result};

use super::{ensure_category, ClientSetFactory};
use crate::client_set::ClientSetBuilder;
use crate::garden_reader::GardenReader;
use crate::key::{ClientSetKey, ClusterCategory};

/// Namespace assumed for seed secret references without one
const DEFAULT_SEED_SECRET_NAMESPACE: &str = "garden";

/// Builds seed client sets from the kubeconfig Secret a Seed references
pub struct SeedClientSetFactory<B> {
    garden: Arc<dyn GardenReader>,
    builder: B,
}

impl<B> SeedClientSetFactory<B> {
    /// Create a factory reading Seeds and their Secrets through `garden`
    pub fn new(garden: Arc<dyn GardenReader>, builder: B) -> Self {
        Self { garden, builder }
    }

    async fn kubeconfig(&self, key: &ClientSetKey) -> Result<Vec<u8>> {
        let ClientSetKey::Seed { name } = key else {
            return Err(Error::unsupported_key(key.to_string(), ClusterCategory::Seed.as_str()));
        };

        let seed = self
            .garden
            .get_seed(name)
            .await?
            .ok_or_else(|| Error::unresolved(key.key(), "seed not found"))?;
        let secret_ref = seed
            .spec
            .secret_ref
            .as_ref()
            .ok_or_else(|| Error::unresolved(key.key(), "seed has no secret reference"))?;

        let namespace = secret_ref.namespace_or(DEFAULT_SEED_SECRET_NAMESPACE);
        debug!(key = %key, namespace, secret = %secret_ref.name, "reading seed kubeconfig");

        let secret = self
            .garden
            .get_secret(namespace, &secret_ref.name)
            .await?
            .ok_or_else(|| {
                Error::credentials_not_ready(
                    key.key(),
                    format!("secret {}/{} not found", namespace, secret_ref.name),
                )
            })?;
        kubeconfig_from_secret(&secret)
            .map(<[u8]>::to_vec)
            .ok_or_else(|| {
                Error::credentials_not_ready(
                    key.key(),
                    format!("secret {}/{} has no kubeconfig", namespace, secret_ref.name),
                )
            })
    }
}

#[async_trait]
impl<B: ClientSetBuilder> ClientSetFactory for SeedClientSetFactory<B> {
    type ClientSet = B::ClientSet;

    fn category(&self) -> ClusterCategory {
        ClusterCategory::Seed
    }

    async fn new_client_set(&self, key: &ClientSetKey) -> Result<(B::ClientSet, String)> {
        ensure_category(key, ClusterCategory::Seed)?;
        let kubeconfig = self.kubeconfig(key).await?;
        let fingerprint = fingerprint(&kubeconfig);
        let client_set = self
            .builder
            .build_from_kubeconfig(key, &kubeconfig, &fingerprint)
            .await?;
        Ok((client_set, fingerprint))
    }

    async fn calculate_fingerprint(&self, key: &ClientSetKey) -> Result<String> {
        ensure_category(key, ClusterCategory::Seed)?;
        Ok(fingerprint(&self.kubeconfig(key).await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::garden_reader::MockGardenReader;
    use crate::test_util::{kubeconfig, kubeconfig_secret, FakeBuilder};
    use garden_common::crd::{SecretRef, Seed, SeedSpec};

    fn seed(secret_ref: Option<SecretRef>) -> Seed {
        Seed::new("seed-a", SeedSpec { secret_ref })
    }

    fn secret_ref(namespace: Option<&str>) -> SecretRef {
        SecretRef {
            name: "seed-a-kubeconfig".to_string(),
            namespace: namespace.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn builds_from_referenced_secret() {
        let doc = kubeconfig("https://api.seed-a.example.com", "t0k3n");
        let mut garden = MockGardenReader::new();
        garden
            .expect_get_seed()
            .withf(|name| name == "seed-a")
            .returning(|_| Ok(Some(seed(Some(secret_ref(Some("garden-seeds")))))));
        let expected = doc.clone();
        garden
            .expect_get_secret()
            .withf(|ns, name| ns == "garden-seeds" && name == "seed-a-kubeconfig")
            .returning(move |ns, name| Ok(Some(kubeconfig_secret(ns, name, &expected))));

        let factory = SeedClientSetFactory::new(Arc::new(garden), FakeBuilder::default());
        let key = ClientSetKey::seed("seed-a");
        let (cs, fp) = factory.new_client_set(&key).await.unwrap();

        assert_eq!(fp, fingerprint(doc.as_bytes()));
        assert_eq!(cs.fingerprint, fp);
        assert_eq!(cs.kubeconfig, doc.as_bytes());
        assert_eq!(factory.calculate_fingerprint(&key).await.unwrap(), fp);
    }

    #[tokio::test]
    async fn secret_namespace_defaults_to_garden() {
        let mut garden = MockGardenReader::new();
        garden
            .expect_get_seed()
            .returning(|_| Ok(Some(seed(Some(secret_ref(None))))));
        garden
            .expect_get_secret()
            .withf(|ns, _| ns == "garden")
            .returning(|ns, name| Ok(Some(kubeconfig_secret(ns, name, "kind: Config"))));

        let factory = SeedClientSetFactory::new(Arc::new(garden), FakeBuilder::default());
        assert!(factory
            .calculate_fingerprint(&ClientSetKey::seed("seed-a"))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn seed_without_secret_ref_is_unresolved() {
        let mut garden = MockGardenReader::new();
        garden.expect_get_seed().returning(|_| Ok(Some(seed(None))));
        garden.expect_get_secret().never();

        let factory = SeedClientSetFactory::new(Arc::new(garden), FakeBuilder::default());
        let err = factory
            .new_client_set(&ClientSetKey::seed("seed-a"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Unresolved { .. }));
        assert!(err.to_string().contains("secret reference"));
    }

    #[tokio::test]
    async fn missing_seed_is_unresolved() {
        let mut garden = MockGardenReader::new();
        garden.expect_get_seed().returning(|_| Ok(None));

        let factory = SeedClientSetFactory::new(Arc::new(garden), FakeBuilder::default());
        let err = factory
            .calculate_fingerprint(&ClientSetKey::seed("seed-a"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Unresolved { ref key, .. } if key == "seed-a"));
    }

    #[tokio::test]
    async fn missing_secret_is_not_ready() {
        let mut garden = MockGardenReader::new();
        garden
            .expect_get_seed()
            .returning(|_| Ok(Some(seed(Some(secret_ref(None))))));
        garden.expect_get_secret().returning(|_, _| Ok(None));

        let factory = SeedClientSetFactory::new(Arc::new(garden), FakeBuilder::default());
        let err = factory
            .new_client_set(&ClientSetKey::seed("seed-a"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CredentialsNotReady { .. }));
        assert_eq!(factory.builder.builds(), 0);
    }

    #[tokio::test]
    async fn rejects_shoot_keys() {
        let garden = MockGardenReader::new();
        let factory = SeedClientSetFactory::new(Arc::new(garden), FakeBuilder::default());
        let err = factory
            .new_client_set(&ClientSetKey::shoot("garden-p1", "s1"))
            .await
            .unwrap_err();
        assert!(err.is_programmer_error());
    }
}
