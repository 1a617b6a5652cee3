use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StatsError {
    #[error("round-trip time wasn't calculated: no replies recorded")]
    NoSamples,
}

/// Counters and RTT samples for one engine run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineStats {
    pub transmitted: u64,
    pub received: u64,
    /// Round-trip times in milliseconds, in arrival order
    pub rtt_samples: Vec<f64>,
}

impl EngineStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a probe was sent
    pub fn record_sent(&mut self) {
        self.transmitted += 1;
    }

    /// Record a matched reply
    pub fn record_reply(&mut self, rtt_ms: f64) {
        self.received += 1;
        self.rtt_samples.push(rtt_ms);
    }

    /// Packet loss percentage, rounded up
    pub fn loss_pct(&self) -> u32 {
        if self.transmitted == 0 {
            return 0;
        }
        let lost = self.transmitted.saturating_sub(self.received);
        (lost * 100).div_ceil(self.transmitted) as u32
    }

    /// Min/avg/max/mdev over all samples
    pub fn summary(&self) -> Result<RttSummary, StatsError> {
        RttSummary::from_samples(&self.rtt_samples)
    }
}

/// Batch RTT statistics, all in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RttSummary {
    pub min: f64,
    pub avg: f64,
    pub max: f64,
    /// Mean absolute deviation from the average
    pub mdev: f64,
}

impl RttSummary {
    pub fn from_samples(samples: &[f64]) -> Result<Self, StatsError> {
        if samples.is_empty() {
            return Err(StatsError::NoSamples);
        }

        let n = samples.len() as f64;
        let min = samples.iter().copied().fold(f64::INFINITY, f64::min);
        let max = samples.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let avg = samples.iter().sum::<f64>() / n;
        let mdev = samples.iter().map(|s| (s - avg).abs()).sum::<f64>() / n;

        Ok(Self { min, avg, max, mdev })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_values() {
        let summary = RttSummary::from_samples(&[1.0, 2.0, 3.0, 6.0]).unwrap();
        assert_eq!(summary.min, 1.0);
        assert_eq!(summary.max, 6.0);
        assert_eq!(summary.avg, 3.0);
        // |1-3| + |2-3| + |3-3| + |6-3| = 6, / 4
        assert_eq!(summary.mdev, 1.5);
    }

    #[test]
    fn test_single_sample() {
        let summary = RttSummary::from_samples(&[0.25]).unwrap();
        assert_eq!(summary.min, 0.25);
        assert_eq!(summary.max, 0.25);
        assert_eq!(summary.avg, 0.25);
        assert_eq!(summary.mdev, 0.0);
    }

    #[test]
    fn test_empty_samples() {
        assert_eq!(RttSummary::from_samples(&[]), Err(StatsError::NoSamples));

        let mut stats = EngineStats::new();
        stats.record_sent();
        assert_eq!(stats.summary(), Err(StatsError::NoSamples));
    }

    #[test]
    fn test_loss_rounds_up() {
        let mut stats = EngineStats::new();
        for _ in 0..3 {
            stats.record_sent();
        }
        stats.record_reply(1.0);
        stats.record_reply(1.0);
        // 33.33..% lost
        assert_eq!(stats.loss_pct(), 34);

        stats.record_reply(1.0);
        assert_eq!(stats.loss_pct(), 0);
    }

    #[test]
    fn test_loss_exact_percentages() {
        for (tx, rx, expected) in [(50, 29, 42), (100, 57, 43), (100, 58, 42), (150, 87, 42)] {
            let stats = EngineStats {
                transmitted: tx,
                received: rx,
                rtt_samples: Vec::new(),
            };
            assert_eq!(stats.loss_pct(), expected, "tx={} rx={}", tx, rx);
        }
    }

    #[test]
    fn test_loss_edges() {
        let mut stats = EngineStats::new();
        assert_eq!(stats.loss_pct(), 0);

        stats.record_sent();
        stats.record_sent();
        assert_eq!(stats.loss_pct(), 100);
    }

    use proptest::prelude::*;

    proptest! {
        /// Loss is the smallest whole percentage not below the exact lost share
        #[test]
        fn proptest_loss_is_exact_ceiling(tx in 1u64..10_000, rx_frac in 0.0f64..=1.0) {
            let rx = ((tx as f64) * rx_frac) as u64;
            let stats = EngineStats {
                transmitted: tx,
                received: rx,
                rtt_samples: Vec::new(),
            };
            let loss = stats.loss_pct() as u64;
            let lost = tx - rx;
            prop_assert!(loss * tx >= lost * 100);
            prop_assert!(loss == 0 || (loss - 1) * tx < lost * 100);
        }
    }
}
