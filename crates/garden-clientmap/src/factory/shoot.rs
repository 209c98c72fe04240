//! Factory for shoot clusters
//!
//! A shoot's credentials live in its control-plane namespace on the seed it
//! is scheduled to, so building a shoot client set takes three hops:
//!
//! 1. Resolve the seed and control-plane namespace of the shoot (cached).
//! 2. Pick the credential Secret: `gardener-internal` when the in-cluster API
//!    server name resolves from here, `gardener` otherwise.
//! 3. Read the Secret through a client to the seed and build from its
//!    kubeconfig.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use kube::ResourceExt;
use parking_lot::Mutex;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use garden_common::crd::compute_technical_id;
use garden_common::kubeconfig::{fingerprint, is_token_populated, kubeconfig_from_secret};
use garden_common::{
    Error, Result, KUBE_APISERVER_SERVICE_NAME, SECRET_NAME_GARDENER,
    SECRET_NAME_GARDENER_INTERNAL,
};

use super::{ensure_category, ClientSetFactory};
use crate::client_set::{ClientSet, ClientSetBuilder, SecretReader};
use crate::dns::DnsResolver;
use crate::garden_reader::GardenReader;
use crate::key::{ClientSetKey, ClusterCategory};
use crate::map::ClientMap;

/// Source of seed clients for reading shoot credentials
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SeedClientGetter: Send + Sync {
    /// Secret access on the seed named `seed_name`
    async fn seed_secrets(&self, seed_name: &str) -> Result<Arc<dyn SecretReader>>;
}

/// Seed client getter backed by the seed client map
pub struct SeedClientMapGetter {
    seeds: Arc<dyn ClientMap<ClientSet = ClientSet>>,
}

impl SeedClientMapGetter {
    /// Wrap the client map serving seed keys
    pub fn new(seeds: Arc<dyn ClientMap<ClientSet = ClientSet>>) -> Self {
        Self { seeds }
    }
}

#[async_trait]
impl SeedClientGetter for SeedClientMapGetter {
    async fn seed_secrets(&self, seed_name: &str) -> Result<Arc<dyn SecretReader>> {
        let client_set: Arc<dyn SecretReader> =
            self.seeds.get_client(&ClientSetKey::seed(seed_name)).await?;
        Ok(client_set)
    }
}

/// Where a shoot's control plane lives
#[derive(Clone, Debug, PartialEq, Eq)]
struct SeedNamespace {
    seed_name: String,
    namespace: String,
}

/// Resolved control plane of a shoot with Secret access on its seed
struct Route {
    reader: Arc<dyn SecretReader>,
    namespace: String,
    /// Taken from the routing cache rather than looked up in the garden
    cached: bool,
}

/// Builds shoot client sets from credentials stored on the hosting seed
pub struct ShootClientSetFactory<B> {
    garden: Arc<dyn GardenReader>,
    seeds: Arc<dyn SeedClientGetter>,
    dns: Arc<dyn DnsResolver>,
    builder: B,
    /// Shoot key to control-plane location; entries are dropped when reading
    /// credentials through them fails or the key is invalidated
    seed_namespaces: Mutex<HashMap<ClientSetKey, SeedNamespace>>,
}

impl<B> ShootClientSetFactory<B> {
    /// Create a shoot factory
    pub fn new(
        garden: Arc<dyn GardenReader>,
        seeds: Arc<dyn SeedClientGetter>,
        dns: Arc<dyn DnsResolver>,
        builder: B,
    ) -> Self {
        Self {
            garden,
            seeds,
            dns,
            builder,
            seed_namespaces: Mutex::new(HashMap::new()),
        }
    }

    /// Find the seed hosting the shoot and a Secret reader on it
    async fn resolve(&self, key: &ClientSetKey, namespace: &str, name: &str) -> Result<Route> {
        let cached = self.seed_namespaces.lock().get(key).cloned();
        if let Some(target) = cached {
            match self.seeds.seed_secrets(&target.seed_name).await {
                Ok(reader) => {
                    return Ok(Route {
                        reader,
                        namespace: target.namespace,
                        cached: true,
                    });
                }
                Err(e) => {
                    debug!(
                        key = %key,
                        seed = %target.seed_name,
                        error = %e,
                        "cached seed unavailable, resolving shoot again"
                    );
                    self.seed_namespaces.lock().remove(key);
                }
            }
        }

        let shoot = self
            .garden
            .get_shoot(namespace, name)
            .await?
            .ok_or_else(|| Error::unresolved(key.key(), "shoot not found"))?;
        let seed_name = shoot
            .scheduled_seed()
            .ok_or_else(|| Error::unresolved(key.key(), "shoot is not scheduled yet"))?
            .to_string();

        let control_plane_namespace = match shoot.technical_id() {
            Some(id) => id.to_string(),
            None => {
                let project = self
                    .garden
                    .project_for_namespace(namespace)
                    .await?
                    .ok_or_else(|| {
                        Error::unresolved(
                            key.key(),
                            format!("no project found for namespace {}", namespace),
                        )
                    })?;
                compute_technical_id(&project.name_any(), name)
            }
        };

        let reader = self.seeds.seed_secrets(&seed_name).await?;
        debug!(key = %key, seed = %seed_name, namespace = %control_plane_namespace, "resolved shoot control plane");
        self.seed_namespaces.lock().insert(
            key.clone(),
            SeedNamespace {
                seed_name,
                namespace: control_plane_namespace.clone(),
            },
        );
        Ok(Route {
            reader,
            namespace: control_plane_namespace,
            cached: false,
        })
    }

    /// Read the kubeconfig the shoot should be reached with
    async fn kubeconfig(&self, key: &ClientSetKey) -> Result<Vec<u8>> {
        let ClientSetKey::Shoot { namespace, name } = key else {
            return Err(Error::unsupported_key(key.to_string(), ClusterCategory::Shoot.as_str()));
        };

        let route = self.resolve(key, namespace, name).await?;
        match self.read_kubeconfig(key, &route).await {
            Err(e) if route.cached => {
                // The control plane may have moved while the old seed stayed up
                debug!(key = %key, error = %e, "cached shoot location failed, resolving again");
                self.seed_namespaces.lock().remove(key);
                let route = self.resolve(key, namespace, name).await?;
                self.read_kubeconfig(key, &route).await
            }
            result => result,
        }
    }

    /// Read the kubeconfig Secret from the control-plane namespace of `route`
    async fn read_kubeconfig(&self, key: &ClientSetKey, route: &Route) -> Result<Vec<u8>> {
        let control_plane = &route.namespace;
        let host = format!("{}.{}.svc", KUBE_APISERVER_SERVICE_NAME, control_plane);
        let secret_name = match self.dns.lookup_host(&host).await {
            Ok(()) => SECRET_NAME_GARDENER_INTERNAL,
            Err(e) => {
                debug!(key = %key, host = %host, error = %e, "using external endpoint");
                SECRET_NAME_GARDENER
            }
        };

        let secret = route
            .reader
            .get_secret(control_plane, secret_name)
            .await?
            .ok_or_else(|| {
                Error::credentials_not_ready(
                    key.key(),
                    format!("secret {}/{} not found", control_plane, secret_name),
                )
            })?;
        kubeconfig_from_secret(&secret)
            .map(<[u8]>::to_vec)
            .ok_or_else(|| {
                Error::credentials_not_ready(
                    key.key(),
                    format!("secret {}/{} has no kubeconfig", control_plane, secret_name),
                )
            })
    }
}

#[async_trait]
impl<B: ClientSetBuilder> ClientSetFactory for ShootClientSetFactory<B> {
    type ClientSet = B::ClientSet;

    fn category(&self) -> ClusterCategory {
        ClusterCategory::Shoot
    }

    async fn new_client_set(&self, key: &ClientSetKey) -> Result<(B::ClientSet, String)> {
        ensure_category(key, ClusterCategory::Shoot)?;
        let kubeconfig = self.kubeconfig(key).await?;

        let populated = is_token_populated(&kubeconfig)
            .map_err(|e| Error::build(key.key(), format!("failed to parse kubeconfig: {}", e)))?;
        if !populated {
            return Err(Error::credentials_not_ready(key.key(), "token not populated"));
        }

        let fingerprint = fingerprint(&kubeconfig);
        let client_set = self
            .builder
            .build_from_kubeconfig(key, &kubeconfig, &fingerprint)
            .await?;
        Ok((client_set, fingerprint))
    }

    async fn calculate_fingerprint(&self, key: &ClientSetKey) -> Result<String> {
        ensure_category(key, ClusterCategory::Shoot)?;
        Ok(fingerprint(&self.kubeconfig(key).await?))
    }

    fn invalidate(&self, key: &ClientSetKey) {
        self.seed_namespaces.lock().remove(key);
    }
}
