//! Seed resource: a cluster hosting shoot control planes

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::SecretRef;

/// Seed registers a hosting cluster with the garden
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(group = "core.gardener.cloud", version = "v1beta1", kind = "Seed")]
#[serde(rename_all = "camelCase")]
pub struct SeedSpec {
    /// Secret in the garden holding the seed's kubeconfig
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_ref: Option<SecretRef>,
}
