//! Assembly of the production client map

use std::sync::Arc;

use kube::{Client, Config};
use tracing::info;

use garden_common::{Error, Result};

use crate::client_set::{ClientSet, KubeClientSetBuilder};
use crate::clock::{Clock, SystemClock};
use crate::config::ClientMapConfig;
use crate::delegating::DelegatingClientMap;
use crate::dns::SystemResolver;
use crate::factory::{
    GardenClientSetFactory, PlantClientSetFactory, SeedClientMapGetter, SeedClientSetFactory,
    ShootClientSetFactory,
};
use crate::garden_reader::{GardenReader, KubeGardenReader};
use crate::key::ClientSetKey;
use crate::map::{ClientMap, GenericClientMap};

/// Build the delegating client map serving all four cluster categories
///
/// `garden` is the configuration this process reaches the garden with. Seed
/// and plant credentials are read from the garden; shoot credentials are read
/// from the hosting seed through the seed map built here.
///
/// Must be called from within a tokio runtime.
pub fn build_client_map(garden: Config, config: &ClientMapConfig) -> Result<DelegatingClientMap> {
    config.validate()?;

    let builder = KubeClientSetBuilder::from_config(config);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let garden_client = Client::try_from(garden.clone()).map_err(|e| {
        Error::build(
            ClientSetKey::Garden.key(),
            format!("failed to create garden client: {}", e),
        )
    })?;
    let reader: Arc<dyn GardenReader> = Arc::new(KubeGardenReader::new(garden_client));

    let garden_map = GenericClientMap::new(
        Arc::new(GardenClientSetFactory::new(garden, builder.clone())),
        clock.clone(),
        config.clone(),
    );

    let seeds: Arc<dyn ClientMap<ClientSet = ClientSet>> = Arc::new(GenericClientMap::new(
        Arc::new(SeedClientSetFactory::new(reader.clone(), builder.clone())),
        clock.clone(),
        config.clone(),
    ));

    let shoot_factory = ShootClientSetFactory::new(
        reader.clone(),
        Arc::new(SeedClientMapGetter::new(seeds.clone())),
        Arc::new(SystemResolver),
        builder.clone(),
    );
    let shoots = GenericClientMap::new(Arc::new(shoot_factory), clock.clone(), config.clone());

    let plants = GenericClientMap::new(
        Arc::new(PlantClientSetFactory::new(reader, builder)),
        clock,
        config.clone(),
    );

    info!(
        refresh_interval = ?config.refresh_interval,
        build_timeout = ?config.build_timeout,
        idle_timeout = ?config.idle_timeout,
        "Client map assembled"
    );

    Ok(DelegatingClientMap::<ClientSet>::builder()
        .garden(Arc::new(garden_map))
        .seeds(seeds)
        .shoots(Arc::new(shoots))
        .plants(Arc::new(plants))
        .build())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn invalid_config_is_rejected_before_connecting() {
        let garden = Config::new("https://garden.example.com".parse().unwrap());
        let config = ClientMapConfig {
            connect_timeout: Duration::ZERO,
            ..Default::default()
        };

        let err = build_client_map(garden, &config).err().unwrap();
        assert!(matches!(err, Error::Config { .. }));
    }
}
