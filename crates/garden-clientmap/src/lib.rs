//! Multi-cluster client cache for garden, seed, shoot and plant clusters
//!
//! Controllers running against a garden ask for a client to some other
//! cluster by key and get a shared, ready-to-use [`ClientSet`]:
//!
//! ```ignore
//! use garden_clientmap::{build_client_map, ClientMap, ClientMapConfig, ClientSetKey};
//!
//! let map = build_client_map(kube::Config::infer().await?, &ClientMapConfig::from_env()?)?;
//! let shoot = map.get_client(&ClientSetKey::shoot("garden-p1", "s1")).await?;
//! ```
//!
//! The [`GenericClientMap`] caches one client set per key, builds it at most
//! once at a time, and rebuilds it when the fingerprint of the stored
//! credentials changes. What a key resolves to is decided by the
//! per-category [`factory`] implementations.

#![deny(missing_docs)]

pub mod client_set;
pub mod clock;
pub mod config;
pub mod delegating;
pub mod dns;
pub mod factory;
pub mod garden_reader;
pub mod key;
pub mod map;
pub mod setup;

#[cfg(test)]
mod test_util;

pub use client_set::{ClientSet, ClientSetBuilder, KubeClientSetBuilder, SecretReader};
pub use clock::{Clock, SystemClock};
pub use config::ClientMapConfig;
pub use delegating::{DelegatingClientMap, DelegatingClientMapBuilder};
pub use factory::ClientSetFactory;
pub use key::{ClientSetKey, ClusterCategory};
pub use map::{spawn_eviction, ClientMap, GenericClientMap};
pub use setup::build_client_map;
