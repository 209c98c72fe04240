//! Best-effort DNS resolution
//!
//! Used only as a routing heuristic: whether the shoot's in-cluster API server
//! name resolves decides between the internal and external credentials.

use std::io;
use std::time::Duration;

use async_trait::async_trait;

#[cfg(test)]
use mockall::automock;

/// Upper bound for a single lookup so a stalled resolver cannot hold up a build
pub const DNS_LOOKUP_TIMEOUT: Duration = Duration::from_secs(2);

/// Trait abstracting hostname resolution
#[cfg_attr(test, automock)]
#[async_trait]
pub trait DnsResolver: Send + Sync {
    /// Resolve `host`, succeeding if it yields at least one address
    async fn lookup_host(&self, host: &str) -> io::Result<()>;
}

/// Resolver using the system resolver through tokio
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemResolver;

#[async_trait]
impl DnsResolver for SystemResolver {
    async fn lookup_host(&self, host: &str) -> io::Result<()> {
        let lookup = tokio::net::lookup_host((host, 443));
        let mut addrs = tokio::time::timeout(DNS_LOOKUP_TIMEOUT, lookup)
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, format!("lookup of {host} timed out")))??;

        if addrs.next().is_some() {
            Ok(())
        } else {
            Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{host} resolved to no addresses"),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn localhost_resolves() {
        assert!(SystemResolver.lookup_host("localhost").await.is_ok());
    }

    #[tokio::test]
    async fn invalid_name_fails() {
        // RFC 2606 reserves .invalid so it never resolves
        assert!(SystemResolver
            .lookup_host("kube-apiserver.shoot--p1--s1.invalid")
            .await
            .is_err());
    }
}
