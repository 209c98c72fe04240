//! Factory for plant clusters

use std::sync::Arc;

use async_trait::async_trait;

use garden_common::kubeconfig::{fingerprint, kubeconfig_from_secret};
use garden_common::{Error, Result};

use super::{ensure_category, ClientSetFactory};
use crate::client_set::ClientSetBuilder;
use crate::garden_reader::GardenReader;
use crate::key::{ClientSetKey, ClusterCategory};

/// Builds plant client sets from the Secret referenced by a Plant
pub struct PlantClientSetFactory<B> {
    garden: Arc<dyn GardenReader>,
    builder: B,
}

impl<B> PlantClientSetFactory<B> {
    /// Create a factory reading Plants and their Secrets through `garden`
    pub fn new(garden: Arc<dyn GardenReader>, builder: B) -> Self {
        Self { garden, builder }
    }

    async fn kubeconfig(&self, key: &ClientSetKey) -> Result<Vec<u8>> {
        let ClientSetKey::Plant { namespace, name } = key else {
            return Err(Error::unsupported_key(key.to_string(), ClusterCategory::Plant.as_str()));
        };

        let plant = self
            .garden
            .get_plant(namespace, name)
            .await?
            .ok_or_else(|| Error::unresolved(key.key(), "plant not found"))?;
        let secret_name = &plant.spec.secret_ref.name;
        if secret_name.is_empty() {
            return Err(Error::unresolved(key.key(), "plant has no secret reference"));
        }

        let secret = self
            .garden
            .get_secret(namespace, secret_name)
            .await?
            .ok_or_else(|| {
                Error::credentials_not_ready(key.key(), format!("secret {} not found", secret_name))
            })?;
        kubeconfig_from_secret(&secret)
            .map(<[u8]>::to_vec)
            .ok_or_else(|| {
                Error::credentials_not_ready(key.key(), format!("secret {} has no kubeconfig", secret_name))
            })
    }
}

#[async_trait]
impl<B: ClientSetBuilder> ClientSetFactory for PlantClientSetFactory<B> {
    type ClientSet = B::ClientSet;

    fn category(&self) -> ClusterCategory {
        ClusterCategory::Plant
    }

    async fn new_client_set(&self, key: &ClientSetKey) -> Result<(B::ClientSet, String)> {
        ensure_category(key, ClusterCategory::Plant)?;
        let kubeconfig = self.kubeconfig(key).await?;
        let fingerprint = fingerprint(&kubeconfig);
        let client_set = self
            .builder
            .build_from_kubeconfig(key, &kubeconfig, &fingerprint)
            .await?;
        Ok((client_set, fingerprint))
    }

    async fn calculate_fingerprint(&self, key: &ClientSetKey) -> Result<String> {
        ensure_category(key, ClusterCategory::Plant)?;
        Ok(fingerprint(&self.kubeconfig(key).await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::garden_reader::MockGardenReader;
    use crate::test_util::{kubeconfig, kubeconfig_secret, FakeBuilder};
    use garden_common::crd::{Plant, PlantSpec, SecretRef};

    fn plant(secret: &str) -> Plant {
        Plant::new(
            "ext",
            PlantSpec {
                secret_ref: SecretRef {
                    name: secret.to_string(),
                    namespace: None,
                },
            },
        )
    }

    /// Story: a plant registered in a project is reached with the kubeconfig
    /// stored next to it
    #[tokio::test]
    async fn story_plant_secret_in_plant_namespace() {
        let doc = kubeconfig("https://ext.example.com", "abc");
        let mut garden = MockGardenReader::new();
        garden
            .expect_get_plant()
            .withf(|ns, name| ns == "garden-p1" && name == "ext")
            .returning(|_, _| Ok(Some(plant("ext-kubeconfig"))));
        let stored = doc.clone();
        garden
            .expect_get_secret()
            .withf(|ns, name| ns == "garden-p1" && name == "ext-kubeconfig")
            .returning(move |ns, name| Ok(Some(kubeconfig_secret(ns, name, &stored))));

        let factory = PlantClientSetFactory::new(Arc::new(garden), FakeBuilder::default());
        let (cs, fp) = factory
            .new_client_set(&ClientSetKey::plant("garden-p1", "ext"))
            .await
            .unwrap();
        assert_eq!(fp, fingerprint(doc.as_bytes()));
        assert_eq!(cs.key, ClientSetKey::plant("garden-p1", "ext"));
    }

    #[tokio::test]
    async fn missing_plant_is_unresolved() {
        let mut garden = MockGardenReader::new();
        garden.expect_get_plant().returning(|_, _| Ok(None));

        let factory = PlantClientSetFactory::new(Arc::new(garden), FakeBuilder::default());
        let err = factory
            .calculate_fingerprint(&ClientSetKey::plant("garden-p1", "ext"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Unresolved { ref key, .. } if key == "garden-p1/ext"));
    }

    #[tokio::test]
    async fn empty_kubeconfig_is_not_ready() {
        let mut garden = MockGardenReader::new();
        garden
            .expect_get_plant()
            .returning(|_, _| Ok(Some(plant("ext-kubeconfig"))));
        garden
            .expect_get_secret()
            .returning(|ns, name| Ok(Some(kubeconfig_secret(ns, name, ""))));

        let factory = PlantClientSetFactory::new(Arc::new(garden), FakeBuilder::default());
        let err = factory
            .new_client_set(&ClientSetKey::plant("garden-p1", "ext"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CredentialsNotReady { .. }));
    }

    #[tokio::test]
    async fn rejects_seed_keys() {
        let factory = PlantClientSetFactory::new(
            Arc::new(MockGardenReader::new()),
            FakeBuilder::default(),
        );
        assert!(factory
            .calculate_fingerprint(&ClientSetKey::seed("seed-a"))
            .await
            .unwrap_err()
            .is_programmer_error());
    }
}
