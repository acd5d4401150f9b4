//! Caching DNS resolver for the HTTP client
//!
//! Many links share few hosts, so answers are cached for a fixed TTL and
//! address families are interleaved so connects alternate IPv6 and IPv4.

use hyper::client::connect::dns::Name;
use moka::future::Cache;
use reqwest::dns::{Addrs, Resolve, Resolving};
use std::error::Error;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

/// Upper bound on cached hosts
const MAX_HOSTS: u64 = 10_000;

/// DNS resolver that memoizes lookups for `ttl`
#[derive(Clone)]
pub struct CachingResolver {
    cache: Cache<String, Vec<SocketAddr>>,
}

impl CachingResolver {
    pub fn new(ttl: Duration) -> Self {
        Self {
            cache: Cache::builder()
                .max_capacity(MAX_HOSTS)
                .time_to_live(ttl)
                .build(),
        }
    }

    async fn lookup(&self, host: String) -> Result<Vec<SocketAddr>, Arc<io::Error>> {
        self.cache
            .try_get_with(host.clone(), async move {
                trace!("Resolving {}", host);
                let resolved: Vec<SocketAddr> =
                    tokio::net::lookup_host((host.as_str(), 0)).await?.collect();
                if resolved.is_empty() {
                    return Err(io::Error::new(
                        io::ErrorKind::NotFound,
                        format!("no addresses found for {}", host),
                    ));
                }
                Ok(interleave(resolved))
            })
            .await
    }
}

impl Resolve for CachingResolver {
    fn resolve(&self, name: Name) -> Resolving {
        let resolver = self.clone();
        let host = name.as_str().to_string();
        Box::pin(async move {
            match resolver.lookup(host).await {
                Ok(addrs) => Ok(Box::new(addrs.into_iter()) as Addrs),
                Err(e) => Err(Box::new(e) as Box<dyn Error + Send + Sync>),
            }
        })
    }
}

/// Alternates address families, starting with the family listed first
fn interleave(addrs: Vec<SocketAddr>) -> Vec<SocketAddr> {
    let prefer_v6 = addrs.first().is_some_and(SocketAddr::is_ipv6);
    let (preferred, other): (Vec<_>, Vec<_>) =
        addrs.into_iter().partition(|addr| addr.is_ipv6() == prefer_v6);

    let mut out = Vec::with_capacity(preferred.len() + other.len());
    let mut preferred = preferred.into_iter();
    let mut other = other.into_iter();
    loop {
        match (preferred.next(), other.next()) {
            (None, None) => break,
            (first, second) => out.extend(first.into_iter().chain(second)),
        }
    }
    out
}
