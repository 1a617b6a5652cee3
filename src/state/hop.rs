use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

/// Results for a single TTL of a traceroute
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceHop {
    pub ttl: u8,
    /// Responder of the first answered query, None if every query timed out
    pub address: Option<Ipv4Addr>,
    pub hostname: Option<String>,
    /// One entry per query in send order, None for a timeout
    pub rtts: Vec<Option<f64>>,
    /// The responder was the destination
    pub reached: bool,
}

impl TraceHop {
    pub fn new(ttl: u8) -> Self {
        Self {
            ttl,
            address: None,
            hostname: None,
            rtts: Vec::new(),
            reached: false,
        }
    }

    /// Record an answered query
    pub fn record_reply(&mut self, rtt_ms: f64) {
        self.rtts.push(Some(rtt_ms));
    }

    /// Record a query that got no answer
    pub fn record_timeout(&mut self) {
        self.rtts.push(None);
    }

    pub fn received(&self) -> usize {
        self.rtts.iter().filter(|r| r.is_some()).count()
    }

    /// Render as a traceroute output line
    ///
    /// Queries that timed out before the responder was known are printed
    /// ahead of the responder, matching the order they happened in.
    pub fn render(&self) -> String {
        let mut line = format!(" {:2}", self.ttl);
        let first_reply = self.rtts.iter().position(|r| r.is_some());

        for (i, rtt) in self.rtts.iter().enumerate() {
            if Some(i) == first_reply
                && let Some(address) = self.address
            {
                let name = self
                    .hostname
                    .clone()
                    .unwrap_or_else(|| address.to_string());
                line.push_str(&format!(" {} ({})", name, address));
            }
            match rtt {
                Some(ms) => line.push_str(&format!(" {:.3} ms", ms)),
                None => line.push_str(" *"),
            }
        }

        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_full_hop() {
        let mut hop = TraceHop::new(3);
        hop.address = Some(Ipv4Addr::new(10, 0, 0, 1));
        hop.hostname = Some("gw.example".to_string());
        hop.record_reply(1.0);
        hop.record_reply(2.5);
        hop.record_reply(0.125);
        assert_eq!(hop.render(), "  3 gw.example (10.0.0.1) 1.000 ms 2.500 ms 0.125 ms");
        assert_eq!(hop.received(), 3);
    }

    #[test]
    fn test_render_silent_hop() {
        let mut hop = TraceHop::new(12);
        for _ in 0..3 {
            hop.record_timeout();
        }
        assert_eq!(hop.render(), " 12 * * *");
        assert_eq!(hop.received(), 0);
    }

    #[test]
    fn test_render_late_first_reply() {
        let mut hop = TraceHop::new(5);
        hop.address = Some(Ipv4Addr::new(192, 0, 2, 9));
        hop.record_timeout();
        hop.record_reply(4.0);
        hop.record_timeout();
        assert_eq!(hop.render(), "  5 * 192.0.2.9 (192.0.2.9) 4.000 ms *");
    }
}
