//! Project resource: groups shoots and owns one garden namespace

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Project owns a namespace in the garden cluster holding its shoots
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(group = "core.gardener.cloud", version = "v1beta1", kind = "Project")]
#[serde(rename_all = "camelCase")]
pub struct ProjectSpec {
    /// Garden namespace belonging to this project
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}
