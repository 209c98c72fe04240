//! Garden resource definitions read by the client set factories
//!
//! Only the fields the factories route on are modelled; everything else in
//! the objects is ignored during deserialization.

mod plant;
mod project;
mod seed;
mod shoot;
mod types;

pub use plant::{Plant, PlantSpec};
pub use project::{Project, ProjectSpec};
pub use seed::{Seed, SeedSpec};
pub use shoot::{compute_technical_id, Shoot, ShootSpec, ShootStatus};
pub use types::SecretRef;
