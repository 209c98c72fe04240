//! Client sets and how they are built
//!
//! A [`ClientSet`] is one authenticated connection to one cluster. It is built
//! once per cache entry, never mutated, and shared by every caller through an
//! `Arc`. When credentials rotate the client map replaces it wholesale.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::api::Api;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use garden_common::{Error, Result};

use crate::config::ClientMapConfig;
use crate::key::ClientSetKey;

/// One configured client to one remote cluster
#[derive(Clone)]
pub struct ClientSet {
    key: ClientSetKey,
    client: Client,
    config: Config,
    fingerprint: String,
}

impl ClientSet {
    /// Wrap an already configured client
    pub fn new(key: ClientSetKey, client: Client, config: Config, fingerprint: String) -> Self {
        Self {
            key,
            client,
            config,
            fingerprint,
        }
    }

    /// Key of the cluster this client set talks to
    pub fn key(&self) -> &ClientSetKey {
        &self.key
    }

    /// Typed client handle (cheap to clone)
    pub fn client(&self) -> Client {
        self.client.clone()
    }

    /// Transport configuration the client was built from
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Fingerprint of the credential material used to build this client set
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Git version reported by the cluster's API server
    pub async fn server_version(&self) -> Result<String> {
        let info = self.client.apiserver_version().await?;
        Ok(info.git_version)
    }
}

impl fmt::Debug for ClientSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientSet")
            .field("key", &self.key)
            .field("cluster_url", &self.config.cluster_url.to_string())
            .field("fingerprint", &self.fingerprint)
            .finish()
    }
}

/// Trait abstracting Secret reads on one cluster
///
/// Implemented by [`ClientSet`]; the shoot factory uses it to read credential
/// Secrets from the seed hosting a shoot's control plane.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SecretReader: Send + Sync {
    /// Get a Secret, returning None if it does not exist
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>>;
}

#[async_trait]
impl SecretReader for ClientSet {
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }
}

/// Builds client sets from credential material
///
/// Factories locate credentials; builders turn them into clients. The
/// production builder creates real `kube` clients, tests substitute builders
/// producing plain values.
#[async_trait]
pub trait ClientSetBuilder: Send + Sync + 'static {
    /// Client set type produced
    type ClientSet: Send + Sync + 'static;

    /// Build from a kubeconfig document (YAML or JSON)
    async fn build_from_kubeconfig(
        &self,
        key: &ClientSetKey,
        kubeconfig: &[u8],
        fingerprint: &str,
    ) -> Result<Self::ClientSet>;

    /// Build from an in-process configuration
    async fn build_from_config(
        &self,
        key: &ClientSetKey,
        config: Config,
        fingerprint: &str,
    ) -> Result<Self::ClientSet>;
}

/// Builder producing [`ClientSet`]s backed by `kube` clients
#[derive(Clone, Debug)]
pub struct KubeClientSetBuilder {
    connect_timeout: Duration,
    read_timeout: Duration,
}

impl KubeClientSetBuilder {
    /// Create a builder applying the given client timeouts
    pub fn new(connect_timeout: Duration, read_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            read_timeout,
        }
    }

    /// Create a builder using the timeouts of a client map configuration
    pub fn from_config(config: &ClientMapConfig) -> Self {
        Self::new(config.connect_timeout, config.read_timeout)
    }
}

impl Default for KubeClientSetBuilder {
    fn default() -> Self {
        Self::from_config(&ClientMapConfig::default())
    }
}

/// Parse a kubeconfig document into a `kube` configuration
pub async fn config_from_kubeconfig(key: &ClientSetKey, kubeconfig: &[u8]) -> Result<Config> {
    let text = std::str::from_utf8(kubeconfig)
        .map_err(|e| Error::build(key.key(), format!("kubeconfig is not valid UTF-8: {}", e)))?;
    let kubeconfig = Kubeconfig::from_yaml(text)
        .map_err(|e| Error::build(key.key(), format!("failed to parse kubeconfig: {}", e)))?;
    Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
        .await
        .map_err(|e| Error::build(key.key(), format!("failed to load kubeconfig: {}", e)))
}

#[async_trait]
impl ClientSetBuilder for KubeClientSetBuilder {
    type ClientSet = ClientSet;

    async fn build_from_kubeconfig(
        &self,
        key: &ClientSetKey,
        kubeconfig: &[u8],
        fingerprint: &str,
    ) -> Result<ClientSet> {
        let config = config_from_kubeconfig(key, kubeconfig).await?;
        self.build_from_config(key, config, fingerprint).await
    }

    async fn build_from_config(
        &self,
        key: &ClientSetKey,
        mut config: Config,
        fingerprint: &str,
    ) -> Result<ClientSet> {
        config.connect_timeout = Some(self.connect_timeout);
        config.read_timeout = Some(self.read_timeout);

        let client = Client::try_from(config.clone())
            .map_err(|e| Error::build(key.key(), format!("failed to create client: {}", e)))?;

        debug!(key = %key, server = %config.cluster_url, "Built client set");
        Ok(ClientSet::new(
            key.clone(),
            client,
            config,
            fingerprint.to_string(),
        ))
    }
}
