//! Read access to garden resources needed for routing
//!
//! Factories never talk to the API server directly; they go through
//! [`GardenReader`] so routing logic can be tested with mocks.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Namespace, Secret};
use kube::api::{Api, ListParams};
use kube::Client;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use garden_common::crd::{Plant, Project, Seed, Shoot};
use garden_common::{Result, PROJECT_NAME_LABEL};

/// Trait abstracting the garden API reads factories depend on
///
/// Every getter returns `Ok(None)` when the object does not exist.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait GardenReader: Send + Sync {
    /// Get a Shoot by namespace and name
    async fn get_shoot(&self, namespace: &str, name: &str) -> Result<Option<Shoot>>;

    /// Get a Seed by name
    async fn get_seed(&self, name: &str) -> Result<Option<Seed>>;

    /// Get a Plant by namespace and name
    async fn get_plant(&self, namespace: &str, name: &str) -> Result<Option<Plant>>;

    /// Get a Secret from the garden cluster
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>>;

    /// Find the project owning a namespace
    async fn project_for_namespace(&self, namespace: &str) -> Result<Option<Project>>;
}

/// Real garden reader backed by a `kube` client
pub struct KubeGardenReader {
    client: Client,
}

impl KubeGardenReader {
    /// Create a reader on the given garden client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl GardenReader for KubeGardenReader {
    async fn get_shoot(&self, namespace: &str, name: &str) -> Result<Option<Shoot>> {
        let api: Api<Shoot> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn get_seed(&self, name: &str) -> Result<Option<Seed>> {
        let api: Api<Seed> = Api::all(self.client.clone());
        Ok(api.get_opt(name).await?)
    }

    async fn get_plant(&self, namespace: &str, name: &str) -> Result<Option<Plant>> {
        let api: Api<Plant> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn project_for_namespace(&self, namespace: &str) -> Result<Option<Project>> {
        let projects: Api<Project> = Api::all(self.client.clone());

        // Project namespaces carry the owning project's name as a label
        let namespaces: Api<Namespace> = Api::all(self.client.clone());
        if let Some(ns) = namespaces.get_opt(namespace).await? {
            let label = ns
                .metadata
                .labels
                .as_ref()
                .and_then(|labels| labels.get(PROJECT_NAME_LABEL));
            if let Some(project_name) = label {
                if let Some(project) = projects.get_opt(project_name).await? {
                    return Ok(Some(project));
                }
            }
        }

        debug!(namespace, "namespace not labelled with a project, listing projects");
        let list = projects.list(&ListParams::default()).await?;
        Ok(list
            .items
            .into_iter()
            .find(|p| p.spec.namespace.as_deref() == Some(namespace)))
    }
}
