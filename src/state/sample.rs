use serde::{Deserialize, Serialize};
use std::time::Instant;

/// A probe that has been sent and is awaiting a response
#[derive(Debug, Clone, Copy)]
pub struct PendingProbe {
    pub sequence: u16,
    pub sent_at: Instant,
}

impl PendingProbe {
    pub fn new(sequence: u16, sent_at: Instant) -> Self {
        Self { sequence, sent_at }
    }

    /// Complete the probe with its matching reply
    pub fn complete(self, received_at: Instant, ttl: u8) -> RttSample {
        let rtt = received_at.saturating_duration_since(self.sent_at);
        RttSample {
            sequence: self.sequence,
            ttl,
            rtt_ms: rtt.as_secs_f64() * 1000.0,
        }
    }
}

/// Round-trip measurement of one answered probe
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RttSample {
    pub sequence: u16,
    /// TTL observed on the reply's IP header
    pub ttl: u8,
    pub rtt_ms: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_complete_measures_rtt() {
        let sent_at = Instant::now();
        let sample = PendingProbe::new(4, sent_at).complete(sent_at + Duration::from_micros(1500), 63);
        assert_eq!(sample.sequence, 4);
        assert_eq!(sample.ttl, 63);
        assert!((sample.rtt_ms - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_reply_before_send_clamps_to_zero() {
        let sent_at = Instant::now() + Duration::from_millis(5);
        let sample = PendingProbe::new(1, sent_at).complete(Instant::now(), 64);
        assert_eq!(sample.rtt_ms, 0.0);
    }
}
