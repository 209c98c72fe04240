//! Per-category client set factories
//!
//! A factory knows, for one cluster category, how to locate the credentials of
//! a cluster, fingerprint them, and build a client set from them. The generic
//! client map owns caching and concurrency; factories stay stateless apart from
//! small routing caches (see [`ShootClientSetFactory`]).

mod garden;
mod plant;
mod seed;
mod shoot;

pub use garden::GardenClientSetFactory;
pub use plant::PlantClientSetFactory;
pub use seed::SeedClientSetFactory;
pub use shoot::{SeedClientGetter, SeedClientMapGetter, ShootClientSetFactory};

use async_trait::async_trait;

use garden_common::{Error, Result};

use crate::key::{ClientSetKey, ClusterCategory};

/// Builds and fingerprints client sets for one cluster category
#[async_trait]
pub trait ClientSetFactory: Send + Sync + 'static {
    /// Client set type produced
    type ClientSet: Send + Sync + 'static;

    /// Category of keys this factory serves
    fn category(&self) -> ClusterCategory;

    /// Build a client set for `key`
    ///
    /// Returns the client set together with the fingerprint of the credential
    /// material it was built from.
    async fn new_client_set(&self, key: &ClientSetKey) -> Result<(Self::ClientSet, String)>;

    /// Fingerprint of the credentials `key` would be built from right now
    ///
    /// Must be cheaper than a build; it runs on every cache freshness check.
    async fn calculate_fingerprint(&self, key: &ClientSetKey) -> Result<String>;

    /// Drop any auxiliary state kept for `key`
    fn invalidate(&self, _key: &ClientSetKey) {}
}

/// Fail fast when a key of another category reaches a factory
pub(crate) fn ensure_category(key: &ClientSetKey, expected: ClusterCategory) -> Result<()> {
    if key.category() == expected {
        Ok(())
    } else {
        Err(Error::unsupported_key(key.to_string(), expected.as_str()))
    }
}
