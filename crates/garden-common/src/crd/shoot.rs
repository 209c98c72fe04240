//! Shoot resource: an end-user cluster whose control plane runs on a seed

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Shoot is a managed cluster scheduled onto a seed.
///
/// Example:
/// ```yaml
/// apiVersion: core.gardener.cloud/v1beta1
/// kind: Shoot
/// metadata:
///   name: s1
///   namespace: garden-p1
/// spec:
///   seedName: seed-a
/// status:
///   technicalID: shoot--p1--s1
/// ```
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "core.gardener.cloud",
    version = "v1beta1",
    kind = "Shoot",
    namespaced,
    status = "ShootStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct ShootSpec {
    /// Seed the shoot is scheduled to (unset until the scheduler assigns one)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed_name: Option<String>,
}

/// Observed state of a Shoot
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ShootStatus {
    /// Name of the shoot's control-plane namespace on the seed
    #[serde(
        rename = "technicalID",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub technical_id: Option<String>,

    /// Seed currently hosting the control plane
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed_name: Option<String>,
}

impl Shoot {
    /// Technical ID recorded in the status, if non-empty
    pub fn technical_id(&self) -> Option<&str> {
        self.status
            .as_ref()
            .and_then(|s| s.technical_id.as_deref())
            .filter(|id| !id.is_empty())
    }

    /// `spec.seedName`, if scheduled
    pub fn scheduled_seed(&self) -> Option<&str> {
        self.spec.seed_name.as_deref().filter(|s| !s.is_empty())
    }
}

/// Compute the technical ID of a shoot's control-plane namespace
///
/// Used for shoots whose status does not carry one yet.
pub fn compute_technical_id(project_name: &str, shoot_name: &str) -> String {
    format!("{}-{}--{}", crate::TECHNICAL_ID_PREFIX, project_name, shoot_name)
}
