use clap::{ArgGroup, Parser};

/// Upper bound on queries per hop
const MAX_SAFE_QUERIES: u8 = 10;

/// What to run against the target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Ping,
    Traceroute,
}

/// Multifunctional network reachability tool: ICMP ping and traceroute
#[derive(Parser, Debug, Clone)]
#[command(name = "netreach")]
#[command(author, version, about, long_about = None)]
#[command(group(ArgGroup::new("mode").required(true).args(["ping", "tr"])))]
pub struct Args {
    /// Ping the target
    #[arg(long = "ping")]
    pub ping: bool,

    /// Trace the route to the target
    #[arg(long = "tr")]
    pub tr: bool,

    /// Target host (IPv4 address or hostname)
    #[arg(required = true)]
    pub target: String,

    /// Number of pings to send (0 = default of 4)
    #[arg(short = 'n', long = "count", default_value = "0")]
    pub count: u16,

    /// Maximum number of hops (0 = default of 30)
    #[arg(short = 'm', long = "max-hops", default_value = "0")]
    pub max_hops: u8,

    /// Queries per hop (0 = default of 3)
    #[arg(short = 'q', long = "queries", default_value = "0")]
    pub max_queries: u8,

    /// Skip reverse DNS lookups of hops
    #[arg(long = "no-dns")]
    pub no_dns: bool,

    /// Print the run report as JSON instead of streaming text
    #[arg(long = "json")]
    pub json: bool,

    /// Enable verbose logging
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
}

impl Args {
    pub fn mode(&self) -> Mode {
        if self.tr { Mode::Traceroute } else { Mode::Ping }
    }

    /// Validate arguments
    pub fn validate(&self) -> Result<(), String> {
        if self.target.trim().is_empty() {
            return Err("Target cannot be empty".into());
        }

        if self.max_queries > MAX_SAFE_QUERIES {
            return Err(format!("Queries per hop cannot exceed {}", MAX_SAFE_QUERIES));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ping_mode() {
        let args = Args::parse_from(["netreach", "--ping", "-n", "6", "127.0.0.1"]);
        assert_eq!(args.mode(), Mode::Ping);
        assert_eq!(args.count, 6);
        assert_eq!(args.target, "127.0.0.1");
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_trace_mode() {
        let args = Args::parse_from(["netreach", "--tr", "-m", "10", "-q", "4", "example.com"]);
        assert_eq!(args.mode(), Mode::Traceroute);
        assert_eq!(args.max_hops, 10);
        assert_eq!(args.max_queries, 4);
    }

    #[test]
    fn test_mode_is_required_and_exclusive() {
        assert!(Args::try_parse_from(["netreach", "127.0.0.1"]).is_err());
        assert!(Args::try_parse_from(["netreach", "--ping", "--tr", "127.0.0.1"]).is_err());
        assert!(Args::try_parse_from(["netreach", "--ping"]).is_err());
    }

    #[test]
    fn test_validate_limits() {
        let args = Args::parse_from(["netreach", "--tr", "-q", "11", "example.com"]);
        assert!(args.validate().is_err());

        let args = Args::parse_from(["netreach", "--ping", " "]);
        assert!(args.validate().is_err());
    }
}
