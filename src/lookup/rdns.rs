use anyhow::Result;
use hickory_resolver::TokioAsyncResolver;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tracing::debug;

use super::sanitize_display;

/// Names hop addresses for traceroute output
pub trait HopNamer {
    /// Hostname for the address, or None to print it numerically
    fn name(&self, addr: Ipv4Addr) -> Option<String>;
}

/// Never resolves; hops are printed by address
#[derive(Debug, Clone, Copy, Default)]
pub struct NumericNamer;

impl HopNamer for NumericNamer {
    fn name(&self, _addr: Ipv4Addr) -> Option<String> {
        None
    }
}

/// DNS cache entry
struct CacheEntry {
    hostname: Option<String>,
    cached_at: Instant,
}

/// Reverse DNS lookups with caching
pub struct DnsLookup {
    resolver: TokioAsyncResolver,
    cache: RwLock<HashMap<IpAddr, CacheEntry>>,
    cache_ttl: Duration,
}

impl DnsLookup {
    pub fn new() -> Result<Self> {
        let resolver = TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default());

        Ok(Self {
            resolver,
            cache: RwLock::new(HashMap::new()),
            cache_ttl: Duration::from_secs(3600), // 1 hour
        })
    }

    /// Lookup reverse DNS for an IP, using cache
    pub async fn reverse_lookup(&self, ip: IpAddr) -> Option<String> {
        {
            let cache = self.cache.read();
            if let Some(entry) = cache.get(&ip)
                && entry.cached_at.elapsed() < self.cache_ttl
            {
                return entry.hostname.clone();
            }
        }

        let hostname = match self.resolver.reverse_lookup(ip).await {
            Ok(lookup) => lookup.iter().next().map(|name| {
                let s = name.to_string();
                // Remove trailing dot
                sanitize_display(s.trim_end_matches('.'))
            }),
            Err(e) => {
                debug!(%ip, error = %e, "reverse lookup failed");
                None
            }
        };

        self.cache.write().insert(
            ip,
            CacheEntry {
                hostname: hostname.clone(),
                cached_at: Instant::now(),
            },
        );

        hostname
    }
}

/// Drives `DnsLookup` from the blocking engine thread
///
/// Must not be used from inside an async task: `Handle::block_on` panics there.
pub struct BlockingDns {
    dns: Arc<DnsLookup>,
    handle: Handle,
}

impl BlockingDns {
    pub fn new(dns: Arc<DnsLookup>, handle: Handle) -> Self {
        Self { dns, handle }
    }
}

impl HopNamer for BlockingDns {
    fn name(&self, addr: Ipv4Addr) -> Option<String> {
        self.handle
            .block_on(self.dns.reverse_lookup(IpAddr::V4(addr)))
    }
}
