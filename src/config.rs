use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::cli::Args;
use crate::probe::DEFAULT_PAYLOAD_SIZE;

/// Probes sent when no count (or zero) is given
pub const DEFAULT_PING_COUNT: u16 = 4;
/// Default maximum TTL
pub const DEFAULT_MAX_HOPS: u8 = 30;
/// Default queries per TTL
pub const DEFAULT_MAX_QUERIES: u8 = 3;

/// Runtime configuration for a ping run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PingConfig {
    /// Number of echo requests to send
    pub count: u16,
    /// How long to wait for each reply
    #[serde(with = "duration_serde")]
    pub timeout: Duration,
    /// Pause after each probe
    #[serde(with = "duration_serde")]
    pub interval: Duration,
    /// ICMP payload bytes per probe
    pub payload_size: usize,
}

impl Default for PingConfig {
    fn default() -> Self {
        Self {
            count: DEFAULT_PING_COUNT,
            timeout: Duration::from_secs(2),
            interval: Duration::from_secs(1),
            payload_size: DEFAULT_PAYLOAD_SIZE,
        }
    }
}

/// Runtime configuration for a traceroute run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceConfig {
    /// Highest TTL probed
    pub max_hops: u8,
    /// Probes sent per TTL
    pub max_queries: u8,
    /// How long to wait for each query
    #[serde(with = "duration_serde")]
    pub timeout: Duration,
    /// ICMP payload bytes per probe
    pub payload_size: usize,
    /// Reverse-resolve hop addresses
    pub dns_enabled: bool,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            max_hops: DEFAULT_MAX_HOPS,
            max_queries: DEFAULT_MAX_QUERIES,
            timeout: Duration::from_secs(1),
            payload_size: DEFAULT_PAYLOAD_SIZE,
            dns_enabled: true,
        }
    }
}

/// Zero means "use the default"
fn or_default<T: PartialEq + Default>(value: T, default: T) -> T {
    if value == T::default() { default } else { value }
}

impl From<&Args> for PingConfig {
    fn from(args: &Args) -> Self {
        Self {
            count: or_default(args.count, DEFAULT_PING_COUNT),
            ..Self::default()
        }
    }
}

impl From<&Args> for TraceConfig {
    fn from(args: &Args) -> Self {
        Self {
            max_hops: or_default(args.max_hops, DEFAULT_MAX_HOPS),
            max_queries: or_default(args.max_queries, DEFAULT_MAX_QUERIES),
            dns_enabled: !args.no_dns,
            ..Self::default()
        }
    }
}

/// Serde helper for Duration
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Ok(Duration::from_secs_f64(secs))
    }
}
