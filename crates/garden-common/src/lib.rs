//! Common types for the garden client map: errors, CRDs, kubeconfig helpers and telemetry

#![deny(missing_docs)]

pub mod crd;
pub mod error;
pub mod kubeconfig;
pub mod metrics;
pub mod telemetry;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Data key holding the kubeconfig document inside credential Secrets
pub const KUBECONFIG_SECRET_KEY: &str = "kubeconfig";

/// Secret in a shoot's control-plane namespace used from inside the seed
pub const SECRET_NAME_GARDENER_INTERNAL: &str = "gardener-internal";

/// Secret in a shoot's control-plane namespace used through the public endpoint
pub const SECRET_NAME_GARDENER: &str = "gardener";

/// Name of the kube-apiserver Service in a shoot's control-plane namespace
pub const KUBE_APISERVER_SERVICE_NAME: &str = "kube-apiserver";

/// Prefix of the technical ID assigned to shoot control-plane namespaces
pub const TECHNICAL_ID_PREFIX: &str = "shoot-";

/// Namespace label naming the project that owns the namespace
pub const PROJECT_NAME_LABEL: &str = "project.gardener.cloud/name";
