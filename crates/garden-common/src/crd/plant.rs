//! Plant resource: an externally managed cluster registered in a project

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::SecretRef;

/// Plant registers an external cluster by its kubeconfig Secret
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "core.gardener.cloud",
    version = "v1beta1",
    kind = "Plant",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct PlantSpec {
    /// Secret in the plant's namespace holding the kubeconfig
    pub secret_ref: SecretRef,
}
