//! Shared fixtures for unit tests

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use kube::api::ObjectMeta;
use kube::Config;

use garden_common::{Error, Result, KUBECONFIG_SECRET_KEY};

use crate::client_set::ClientSetBuilder;
use crate::key::ClientSetKey;

/// Client set stand-in recording what it was built from
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FakeClientSet {
    pub key: ClientSetKey,
    pub fingerprint: String,
    pub kubeconfig: Vec<u8>,
    /// Build number, starting at 1
    pub serial: usize,
}

/// Builder producing [`FakeClientSet`]s without touching the network
#[derive(Default)]
pub struct FakeBuilder {
    pub builds: AtomicUsize,
    pub fail: AtomicBool,
}

impl FakeBuilder {
    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }

    fn next(&self, key: &ClientSetKey, kubeconfig: Vec<u8>, fingerprint: &str) -> Result<FakeClientSet> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::build(key.key(), "fake builder failure"));
        }
        let serial = self.builds.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(FakeClientSet {
            key: key.clone(),
            fingerprint: fingerprint.to_string(),
            kubeconfig,
            serial,
        })
    }
}

#[async_trait]
impl ClientSetBuilder for FakeBuilder {
    type ClientSet = FakeClientSet;

    async fn build_from_kubeconfig(
        &self,
        key: &ClientSetKey,
        kubeconfig: &[u8],
        fingerprint: &str,
    ) -> Result<FakeClientSet> {
        self.next(key, kubeconfig.to_vec(), fingerprint)
    }

    async fn build_from_config(
        &self,
        key: &ClientSetKey,
        config: Config,
        fingerprint: &str,
    ) -> Result<FakeClientSet> {
        self.next(key, config.cluster_url.to_string().into_bytes(), fingerprint)
    }
}

/// Minimal token kubeconfig for `server`
pub fn kubeconfig(server: &str, token: &str) -> String {
    format!(
        r#"apiVersion: v1
kind: Config
current-context: target
clusters:
- name: target
  cluster:
    server: {server}
contexts:
- name: target
  context:
    cluster: target
    user: target
users:
- name: target
  user:
    token: "{token}"
"#
    )
}

/// Credential Secret carrying `kubeconfig` under the standard data key
pub fn kubeconfig_secret(namespace: &str, name: &str, kubeconfig: &str) -> Secret {
    let mut data = BTreeMap::new();
    data.insert(
        KUBECONFIG_SECRET_KEY.to_string(),
        ByteString(kubeconfig.as_bytes().to_vec()),
    );
    Secret {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        data: Some(data),
        ..Default::default()
    }
}
