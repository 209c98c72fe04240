//! Client set keys: the identity of a cluster the client map can reach

use std::fmt;
use std::str::FromStr;

use garden_common::Error;

/// Category of cluster a key addresses
///
/// Each category is served by its own factory and its own generic client map.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ClusterCategory {
    /// The garden cluster itself
    Garden,
    /// A seed cluster hosting shoot control planes
    Seed,
    /// A shoot cluster, reached through its seed
    Shoot,
    /// An externally managed cluster registered as a plant
    Plant,
}

impl ClusterCategory {
    /// Stable lowercase name, used in metrics labels and error messages
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Garden => "garden",
            Self::Seed => "seed",
            Self::Shoot => "shoot",
            Self::Plant => "plant",
        }
    }
}

impl fmt::Display for ClusterCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of one cluster
///
/// Keys are plain values: two keys are equal iff category and identifying
/// fields are equal, so they can be used directly as map keys.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ClientSetKey {
    /// The garden cluster (singleton)
    Garden,
    /// A seed, identified by name
    Seed {
        /// Seed name
        name: String,
    },
    /// A shoot, identified by its project namespace and name
    Shoot {
        /// Garden namespace of the shoot (the project namespace)
        namespace: String,
        /// Shoot name
        name: String,
    },
    /// A plant, identified by namespace and name
    Plant {
        /// Garden namespace of the plant
        namespace: String,
        /// Plant name
        name: String,
    },
}

impl ClientSetKey {
    /// Key for a seed cluster
    pub fn seed(name: impl Into<String>) -> Self {
        Self::Seed { name: name.into() }
    }

    /// Key for a shoot cluster
    pub fn shoot(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self::Shoot {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Key for a plant cluster
    pub fn plant(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self::Plant {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Category this key belongs to
    pub fn category(&self) -> ClusterCategory {
        match self {
            Self::Garden => ClusterCategory::Garden,
            Self::Seed { .. } => ClusterCategory::Seed,
            Self::Shoot { .. } => ClusterCategory::Shoot,
            Self::Plant { .. } => ClusterCategory::Plant,
        }
    }

    /// Canonical string form used in log lines and error messages
    ///
    /// `garden`, `<seed>` or `<namespace>/<name>`. The form is not unique
    /// across categories; use the key itself for lookups.
    pub fn key(&self) -> String {
        match self {
            Self::Garden => "garden".to_string(),
            Self::Seed { name } => name.clone(),
            Self::Shoot { namespace, name } | Self::Plant { namespace, name } => {
                format!("{}/{}", namespace, name)
            }
        }
    }
}

impl fmt::Display for ClientSetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// Parses `garden`, `seed:<name>`, `shoot:<namespace>/<name>` and
/// `plant:<namespace>/<name>`.
impl FromStr for ClientSetKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "garden" {
            return Ok(Self::Garden);
        }

        let invalid = || {
            Error::config(format!(
                "invalid client set key {:?}: expected garden, seed:<name>, \
                 shoot:<namespace>/<name> or plant:<namespace>/<name>",
                s
            ))
        };

        let (category, rest) = s.split_once(':').ok_or_else(invalid)?;
        let namespaced = || match rest.split_once('/') {
            Some((ns, name)) if !ns.is_empty() && !name.is_empty() && !name.contains('/') => {
                Ok((ns.to_string(), name.to_string()))
            }
            _ => Err(invalid()),
        };

        match category {
            "seed" if !rest.is_empty() && !rest.contains('/') => Ok(Self::seed(rest)),
            "shoot" => namespaced().map(|(namespace, name)| Self::Shoot { namespace, name }),
            "plant" => namespaced().map(|(namespace, name)| Self::Plant { namespace, name }),
            _ => Err(invalid()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn canonical_forms() {
        assert_eq!(ClientSetKey::Garden.key(), "garden");
        assert_eq!(ClientSetKey::seed("seed-a").key(), "seed-a");
        assert_eq!(ClientSetKey::shoot("garden-p1", "s1").key(), "garden-p1/s1");
        assert_eq!(ClientSetKey::plant("garden-p1", "ext").to_string(), "garden-p1/ext");
    }

    #[test]
    fn equality_includes_category() {
        assert_eq!(
            ClientSetKey::shoot("garden-p1", "s1"),
            ClientSetKey::shoot("garden-p1", "s1")
        );
        // Same canonical string, different clusters
        assert_ne!(
            ClientSetKey::shoot("garden-p1", "s1"),
            ClientSetKey::plant("garden-p1", "s1")
        );
        assert_ne!(
            ClientSetKey::shoot("garden-p1", "s1"),
            ClientSetKey::shoot("garden-p2", "s1")
        );
    }

    #[test]
    fn keys_work_as_map_keys() {
        let mut map = HashMap::new();
        map.insert(ClientSetKey::shoot("garden-p1", "s1"), 1);
        map.insert(ClientSetKey::plant("garden-p1", "s1"), 2);
        map.insert(ClientSetKey::Garden, 3);

        assert_eq!(map.get(&ClientSetKey::shoot("garden-p1", "s1")), Some(&1));
        assert_eq!(map.get(&ClientSetKey::plant("garden-p1", "s1")), Some(&2));
        assert_eq!(map.get(&ClientSetKey::Garden), Some(&3));
    }

    #[test]
    fn categories() {
        assert_eq!(ClientSetKey::Garden.category(), ClusterCategory::Garden);
        assert_eq!(ClientSetKey::seed("a").category(), ClusterCategory::Seed);
        assert_eq!(ClientSetKey::shoot("a", "b").category().as_str(), "shoot");
        assert_eq!(ClientSetKey::plant("a", "b").category().to_string(), "plant");
    }

    #[test]
    fn parse_round_trips_cli_forms() {
        assert_eq!("garden".parse::<ClientSetKey>().unwrap(), ClientSetKey::Garden);
        assert_eq!(
            "seed:seed-a".parse::<ClientSetKey>().unwrap(),
            ClientSetKey::seed("seed-a")
        );
        assert_eq!(
            "shoot:garden-p1/s1".parse::<ClientSetKey>().unwrap(),
            ClientSetKey::shoot("garden-p1", "s1")
        );
        assert_eq!(
            "plant:garden-p1/ext".parse::<ClientSetKey>().unwrap(),
            ClientSetKey::plant("garden-p1", "ext")
        );
    }

    #[test]
    fn parse_rejects_malformed_keys() {
        for bad in [
            "",
            "seed",
            "seed:",
            "seed:a/b",
            "shoot:s1",
            "shoot:/s1",
            "shoot:garden-p1/",
            "shoot:a/b/c",
            "cluster:a/b",
        ] {
            assert!(bad.parse::<ClientSetKey>().is_err(), "{bad:?} should not parse");
        }
    }
}
