//! Client map configuration

use std::time::Duration;

use garden_common::{Error, Result};

/// Default connection timeout for clients to remote clusters
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default read timeout for clients to remote clusters
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);
/// Default bound for a single factory call
pub const DEFAULT_BUILD_TIMEOUT: Duration = Duration::from_secs(60);
/// Default period of the idle eviction loop
pub const DEFAULT_EVICTION_PERIOD: Duration = Duration::from_secs(60);

/// Prefix of the environment variables read by [`ClientMapConfig::from_env`]
pub const ENV_PREFIX: &str = "GARDEN_CLIENTMAP_";

/// Tuning knobs for the generic client map and the clients it builds
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientMapConfig {
    /// Minimum time between fingerprint checks of a cached entry.
    /// Zero checks on every access.
    pub refresh_interval: Duration,
    /// Bound for a single factory call (build or fingerprint). None disables it.
    pub build_timeout: Option<Duration>,
    /// Entries not accessed for this long are evicted. None keeps them forever.
    pub idle_timeout: Option<Duration>,
    /// Period of the background eviction loop
    pub eviction_period: Duration,
    /// Connect timeout applied to every built client
    pub connect_timeout: Duration,
    /// Read timeout applied to every built client
    pub read_timeout: Duration,
}

impl Default for ClientMapConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::ZERO,
            build_timeout: Some(DEFAULT_BUILD_TIMEOUT),
            idle_timeout: None,
            eviction_period: DEFAULT_EVICTION_PERIOD,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

impl ClientMapConfig {
    /// Load the configuration from `GARDEN_CLIENTMAP_*` environment variables
    ///
    /// Durations are whole seconds. A value of `0` for `BUILD_TIMEOUT_SECS` or
    /// `IDLE_TIMEOUT_SECS` disables that bound. Unset variables keep defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let secs = |suffix: &str| -> Result<Option<Duration>> {
            let name = format!("{ENV_PREFIX}{suffix}");
            match lookup(&name) {
                None => Ok(None),
                Some(raw) => raw
                    .trim()
                    .parse::<u64>()
                    .map(|s| Some(Duration::from_secs(s)))
                    .map_err(|e| Error::config(format!("{name}={raw:?} is not a number of seconds: {e}"))),
            }
        };
        let optional = |d: Duration| if d.is_zero() { None } else { Some(d) };

        let mut config = Self::default();
        if let Some(d) = secs("REFRESH_INTERVAL_SECS")? {
            config.refresh_interval = d;
        }
        if let Some(d) = secs("BUILD_TIMEOUT_SECS")? {
            config.build_timeout = optional(d);
        }
        if let Some(d) = secs("IDLE_TIMEOUT_SECS")? {
            config.idle_timeout = optional(d);
        }
        if let Some(d) = secs("EVICTION_PERIOD_SECS")? {
            config.eviction_period = d;
        }
        if let Some(d) = secs("CONNECT_TIMEOUT_SECS")? {
            config.connect_timeout = d;
        }
        if let Some(d) = secs("READ_TIMEOUT_SECS")? {
            config.read_timeout = d;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject combinations the map cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.idle_timeout.is_some() && self.eviction_period.is_zero() {
            return Err(Error::config(
                "eviction period must be positive when an idle timeout is set",
            ));
        }
        if self.connect_timeout.is_zero() || self.read_timeout.is_zero() {
            return Err(Error::config("client timeouts must be positive"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (format!("{ENV_PREFIX}{k}"), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn defaults_check_on_every_access() {
        let config = ClientMapConfig::default();
        assert!(config.refresh_interval.is_zero());
        assert_eq!(config.build_timeout, Some(DEFAULT_BUILD_TIMEOUT));
        assert_eq!(config.idle_timeout, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn empty_environment_gives_defaults() {
        let config = ClientMapConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, ClientMapConfig::default());
    }

    #[test]
    fn environment_overrides() {
        let config = ClientMapConfig::from_lookup(lookup(&[
            ("REFRESH_INTERVAL_SECS", "30"),
            ("BUILD_TIMEOUT_SECS", "0"),
            ("IDLE_TIMEOUT_SECS", "3600"),
            ("EVICTION_PERIOD_SECS", " 120 "),
            ("CONNECT_TIMEOUT_SECS", "2"),
            ("READ_TIMEOUT_SECS", "10"),
        ]))
        .unwrap();

        assert_eq!(config.refresh_interval, Duration::from_secs(30));
        assert_eq!(config.build_timeout, None);
        assert_eq!(config.idle_timeout, Some(Duration::from_secs(3600)));
        assert_eq!(config.eviction_period, Duration::from_secs(120));
        assert_eq!(config.connect_timeout, Duration::from_secs(2));
        assert_eq!(config.read_timeout, Duration::from_secs(10));
    }

    #[test]
    fn malformed_values_name_the_variable() {
        let err = ClientMapConfig::from_lookup(lookup(&[("REFRESH_INTERVAL_SECS", "soon")]))
            .unwrap_err();
        assert!(err.to_string().contains("GARDEN_CLIENTMAP_REFRESH_INTERVAL_SECS"));
    }

    #[test]
    fn idle_timeout_needs_an_eviction_period() {
        let err = ClientMapConfig::from_lookup(lookup(&[
            ("IDLE_TIMEOUT_SECS", "60"),
            ("EVICTION_PERIOD_SECS", "0"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("eviction period"));
    }

    #[test]
    fn zero_client_timeouts_are_rejected() {
        let config = ClientMapConfig {
            read_timeout: Duration::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
