use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::config::PingConfig;
use crate::error::EngineError;
use crate::export::write_ping_summary;
use crate::probe::{
    ChannelError, ICMP_HEADER_SIZE, IcmpChannel, IcmpDatagram, IcmpMessage, ResponseKind,
    build_payload, get_identifier, parse_response, unreachable_description,
};
use crate::state::{EngineStats, PendingProbe, RttSample, RttSummary, StatsError, Target};

/// Granularity at which a pause notices cancellation
const CANCEL_POLL: Duration = Duration::from_millis(100);

/// Why a ping run stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PingTermination {
    /// Every requested probe was sent
    Completed,
    /// A destination-unreachable reply ended the run
    Unreachable { code: u8 },
    /// Interrupted by the operator
    Cancelled,
}

/// Everything a ping run measured
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingReport {
    pub target: Target,
    pub started_at: DateTime<Utc>,
    pub config: PingConfig,
    pub stats: EngineStats,
    pub samples: Vec<RttSample>,
    pub termination: PingTermination,
}

impl PingReport {
    fn new(target: Target, config: PingConfig) -> Self {
        Self {
            target,
            started_at: Utc::now(),
            config,
            stats: EngineStats::new(),
            samples: Vec::new(),
            termination: PingTermination::Completed,
        }
    }

    /// RTT statistics, failing if no reply was matched
    pub fn summary(&self) -> Result<RttSummary, StatsError> {
        self.stats.summary()
    }
}

/// How a single probe ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProbeOutcome {
    Replied,
    Lost,
    Unreachable(u8),
    Unrelated,
}

/// Sleep for `delay`, returning false early if cancelled
pub fn pause(cancel: &CancellationToken, delay: Duration) -> bool {
    let deadline = Instant::now() + delay;
    loop {
        if cancel.is_cancelled() {
            return false;
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return true;
        }
        std::thread::sleep(remaining.min(CANCEL_POLL));
    }
}

/// Sends echo requests one at a time and measures the replies
pub struct PingEngine<C, W> {
    channel: C,
    out: W,
    config: PingConfig,
    target: Target,
    identifier: u16,
    payload: Vec<u8>,
    cancel: CancellationToken,
}

impl<C: IcmpChannel, W: Write> PingEngine<C, W> {
    pub fn new(
        channel: C,
        out: W,
        config: PingConfig,
        target: Target,
        cancel: CancellationToken,
    ) -> Self {
        let payload = build_payload(config.payload_size);
        Self {
            channel,
            out,
            config,
            target,
            identifier: get_identifier(),
            payload,
            cancel,
        }
    }

    /// Use a fixed ICMP identifier instead of the process id
    pub fn with_identifier(mut self, identifier: u16) -> Self {
        self.identifier = identifier;
        self
    }

    /// Run to completion, cancellation, or a fatal channel error
    ///
    /// The statistics block is printed and the channel released on every
    /// path, including the error path.
    pub fn run(mut self) -> Result<PingReport, EngineError> {
        let mut report = PingReport::new(self.target.clone(), self.config.clone());
        let outcome = self.probe_loop(&mut report);
        self.finalize(report, outcome)
    }

    fn probe_loop(&mut self, report: &mut PingReport) -> Result<PingTermination, EngineError> {
        writeln!(
            self.out,
            "Pinging {} [{}] with {} bytes of data:",
            self.target.original,
            self.target.resolved,
            self.payload.len() + ICMP_HEADER_SIZE
        )?;

        for sequence in 1..=self.config.count {
            if self.cancel.is_cancelled() {
                return Ok(PingTermination::Cancelled);
            }

            if let ProbeOutcome::Unreachable(code) = self.probe(sequence, report)? {
                return Ok(PingTermination::Unreachable { code });
            }

            let last = sequence == self.config.count;
            if !last && !pause(&self.cancel, self.config.interval) {
                return Ok(PingTermination::Cancelled);
            }
        }

        if self.cancel.is_cancelled() {
            return Ok(PingTermination::Cancelled);
        }
        Ok(PingTermination::Completed)
    }

    /// Send one echo request and wait for its answer
    fn probe(&mut self, sequence: u16, report: &mut PingReport) -> Result<ProbeOutcome, EngineError> {
        let request = IcmpMessage::echo_request(self.identifier, sequence, self.payload.clone());
        let sent = self.channel.send(&request.encode(), self.target.resolved)?;
        report.stats.record_sent();

        let pending = PendingProbe::new(sequence, sent.at);
        let deadline = sent.at + self.config.timeout;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let received = match self.channel.recv(remaining) {
                Ok(received) => received,
                Err(ChannelError::Timeout) => {
                    writeln!(self.out, "From {}: Failed to receive packet", self.target.resolved)?;
                    return Ok(ProbeOutcome::Lost);
                }
                Err(e) => return Err(e.into()),
            };

            let datagram = match IcmpDatagram::decode(&received.datagram) {
                Ok(datagram) => datagram,
                Err(e) => {
                    debug!(source = %received.source, error = %e, "dropping undecodable datagram");
                    continue;
                }
            };

            let Some(response) = parse_response(&datagram, self.identifier) else {
                trace!(source = %received.source, "ignoring ICMP for another process");
                continue;
            };

            match response.kind {
                kind if kind.is_echo() => {
                    if response.sequence != Some(sequence) {
                        debug!(got = ?response.sequence, expected = sequence, "ignoring stale echo");
                        continue;
                    }
                    let sample = pending.complete(received.at, response.ttl);
                    report.stats.record_reply(sample.rtt_ms);
                    report.samples.push(sample);
                    writeln!(
                        self.out,
                        "{} bytes from {}: icmp_seq={} ttl={} rtt={:.3} ms",
                        response.size, received.source, sample.sequence, sample.ttl, sample.rtt_ms
                    )?;
                    return Ok(ProbeOutcome::Replied);
                }
                ResponseKind::DestUnreachable(code) => {
                    writeln!(
                        self.out,
                        "From {}: icmp_seq={} {}",
                        received.source,
                        sequence,
                        unreachable_description(code)
                    )?;
                    return Ok(ProbeOutcome::Unreachable(code));
                }
                _ => {
                    writeln!(
                        self.out,
                        "Received ICMP packet [type: {} code: {} id: {}]",
                        datagram.message.icmp_type, datagram.message.code, response.identifier
                    )?;
                    return Ok(ProbeOutcome::Unrelated);
                }
            }
        }
    }

    /// Print statistics and release the channel
    fn finalize(
        self,
        mut report: PingReport,
        outcome: Result<PingTermination, EngineError>,
    ) -> Result<PingReport, EngineError> {
        let Self {
            channel, mut out, ..
        } = self;

        let written = write_ping_summary(&mut out, report.target.resolved, &report.stats);
        channel.close();

        let termination = outcome?;
        // Missing samples are part of the report, not a failure of the run
        let _ = written?;
        report.termination = termination;
        debug!(?termination, "ping finished");
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pause_zero_returns_immediately() {
        let cancel = CancellationToken::new();
        assert!(pause(&cancel, Duration::ZERO));
    }

    #[test]
    fn test_pause_observes_cancellation() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let start = Instant::now();
        assert!(!pause(&cancel, Duration::from_secs(5)));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_pause_waits() {
        let cancel = CancellationToken::new();
        let start = Instant::now();
        assert!(pause(&cancel, Duration::from_millis(20)));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }
}
