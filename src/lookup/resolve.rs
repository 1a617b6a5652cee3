use anyhow::{Context, Result, bail};
use std::net::{IpAddr, Ipv4Addr, ToSocketAddrs};

/// Resolve a target string to an IPv4 address
///
/// Accepts dotted-quad literals, `localhost`, or any name the system
/// resolver knows. IPv6-only targets are rejected.
pub fn resolve_target(target: &str) -> Result<Ipv4Addr> {
    if target.eq_ignore_ascii_case("localhost") {
        return Ok(Ipv4Addr::LOCALHOST);
    }

    match target.parse::<IpAddr>() {
        Ok(IpAddr::V4(ip)) => return Ok(ip),
        Ok(IpAddr::V6(_)) => bail!("IPv6 targets are not supported: {}", target),
        Err(_) => {}
    }

    let addrs: Vec<IpAddr> = format!("{}:0", target)
        .to_socket_addrs()
        .with_context(|| format!("cannot resolve the target: {}", target))?
        .map(|s| s.ip())
        .collect();

    if addrs.is_empty() {
        bail!("No addresses found for hostname: {}", target);
    }

    addrs
        .iter()
        .find_map(|ip| match ip {
            IpAddr::V4(v4) => Some(*v4),
            IpAddr::V6(_) => None,
        })
        .with_context(|| format!("No IPv4 addresses found for hostname: {}", target))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_address() {
        assert_eq!(resolve_target("192.0.2.7").unwrap(), Ipv4Addr::new(192, 0, 2, 7));
    }

    #[test]
    fn test_localhost() {
        assert_eq!(resolve_target("localhost").unwrap(), Ipv4Addr::LOCALHOST);
        assert_eq!(resolve_target("LOCALHOST").unwrap(), Ipv4Addr::LOCALHOST);
    }

    #[test]
    fn test_ipv6_rejected() {
        let err = resolve_target("::1").unwrap_err();
        assert!(err.to_string().contains("IPv6"));
    }

    #[test]
    fn test_invalid_name() {
        assert!(resolve_target("no such host.invalid").is_err());
    }
}
