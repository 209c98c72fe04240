//! Delegating client map: one entry point for every cluster category

use std::sync::Arc;

use async_trait::async_trait;

use garden_common::{Error, Result};

use crate::client_set::ClientSet;
use crate::key::{ClientSetKey, ClusterCategory};
use crate::map::ClientMap;

type Delegate<CS> = Arc<dyn ClientMap<ClientSet = CS>>;

/// Routes each key to the client map registered for its category
///
/// Categories without a registered map reject their keys with an
/// unsupported key error.
pub struct DelegatingClientMap<CS = ClientSet> {
    garden: Option<Delegate<CS>>,
    seeds: Option<Delegate<CS>>,
    shoots: Option<Delegate<CS>>,
    plants: Option<Delegate<CS>>,
}

impl<CS: Send + Sync + 'static> DelegatingClientMap<CS> {
    /// Start assembling a delegating map
    pub fn builder() -> DelegatingClientMapBuilder<CS> {
        DelegatingClientMapBuilder::default()
    }

    fn delegate(&self, key: &ClientSetKey) -> Result<&Delegate<CS>> {
        let delegate = match key.category() {
            ClusterCategory::Garden => self.garden.as_ref(),
            ClusterCategory::Seed => self.seeds.as_ref(),
            ClusterCategory::Shoot => self.shoots.as_ref(),
            ClusterCategory::Plant => self.plants.as_ref(),
        };
        delegate.ok_or_else(|| Error::unsupported_key(key.to_string(), "registered category"))
    }

    /// Client map registered for `category`, if any
    pub fn map_for(&self, category: ClusterCategory) -> Option<Delegate<CS>> {
        match category {
            ClusterCategory::Garden => self.garden.clone(),
            ClusterCategory::Seed => self.seeds.clone(),
            ClusterCategory::Shoot => self.shoots.clone(),
            ClusterCategory::Plant => self.plants.clone(),
        }
    }
}

#[async_trait]
impl<CS: Send + Sync + 'static> ClientMap for DelegatingClientMap<CS> {
    type ClientSet = CS;

    async fn get_client(&self, key: &ClientSetKey) -> Result<Arc<CS>> {
        self.delegate(key)?.get_client(key).await
    }

    fn invalidate_client(&self, key: &ClientSetKey) -> Result<()> {
        self.delegate(key)?.invalidate_client(key)
    }

    fn evict_idle(&self) -> usize {
        [&self.garden, &self.seeds, &self.shoots, &self.plants]
            .into_iter()
            .flatten()
            .map(|map| map.evict_idle())
            .sum()
    }
}

/// Builder for [`DelegatingClientMap`]
pub struct DelegatingClientMapBuilder<CS = ClientSet> {
    garden: Option<Delegate<CS>>,
    seeds: Option<Delegate<CS>>,
    shoots: Option<Delegate<CS>>,
    plants: Option<Delegate<CS>>,
}

impl<CS> Default for DelegatingClientMapBuilder<CS> {
    fn default() -> Self {
        Self {
            garden: None,
            seeds: None,
            shoots: None,
            plants: None,
        }
    }
}

impl<CS: Send + Sync + 'static> DelegatingClientMapBuilder<CS> {
    /// Map serving the garden key
    pub fn garden(mut self, map: Delegate<CS>) -> Self {
        self.garden = Some(map);
        self
    }

    /// Map serving seed keys
    pub fn seeds(mut self, map: Delegate<CS>) -> Self {
        self.seeds = Some(map);
        self
    }

    /// Map serving shoot keys
    pub fn shoots(mut self, map: Delegate<CS>) -> Self {
        self.shoots = Some(map);
        self
    }

    /// Map serving plant keys
    pub fn plants(mut self, map: Delegate<CS>) -> Self {
        self.plants = Some(map);
        self
    }

    /// Finish assembly
    pub fn build(self) -> DelegatingClientMap<CS> {
        DelegatingClientMap {
            garden: self.garden,
            seeds: self.seeds,
            shoots: self.shoots,
            plants: self.plants,
        }
    }
}
