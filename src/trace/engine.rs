use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::net::Ipv4Addr;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::config::TraceConfig;
use crate::error::EngineError;
use crate::lookup::HopNamer;
use crate::probe::{
    ChannelError, ICMP_HEADER_SIZE, IcmpChannel, IcmpDatagram, IcmpMessage, ResponseKind,
    build_payload, get_identifier, parse_response,
};
use crate::state::{PendingProbe, RttSample, Target, TraceHop};

/// Why a traceroute stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceTermination {
    /// The destination answered at this TTL
    Reached { ttl: u8 },
    /// This TTL's first responder repeated the previous hop
    DuplicateHop { ttl: u8 },
    /// Ran out of TTLs without reaching the destination
    MaxHops,
    /// Interrupted by the operator
    Cancelled,
}

/// Everything a traceroute run discovered
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceReport {
    pub target: Target,
    pub started_at: DateTime<Utc>,
    pub config: TraceConfig,
    /// One entry per printed line, in TTL order
    pub hops: Vec<TraceHop>,
    pub termination: TraceTermination,
}

impl TraceReport {
    fn new(target: Target, config: TraceConfig) -> Self {
        Self {
            target,
            started_at: Utc::now(),
            config,
            hops: Vec::new(),
            termination: TraceTermination::MaxHops,
        }
    }

    /// Whether the destination itself answered
    pub fn reached(&self) -> bool {
        matches!(self.termination, TraceTermination::Reached { .. })
    }
}

/// An answered query
#[derive(Debug, Clone, Copy)]
struct QueryReply {
    source: Ipv4Addr,
    sample: RttSample,
}

/// Walks TTLs upward, sending a fixed set of queries at each one
pub struct TracerouteEngine<C, W, N> {
    channel: C,
    out: W,
    namer: N,
    config: TraceConfig,
    target: Target,
    identifier: u16,
    payload: Vec<u8>,
    sequence: u16,
    cancel: CancellationToken,
}

impl<C: IcmpChannel, W: Write, N: HopNamer> TracerouteEngine<C, W, N> {
    pub fn new(
        channel: C,
        out: W,
        namer: N,
        config: TraceConfig,
        target: Target,
        cancel: CancellationToken,
    ) -> Self {
        let payload = build_payload(config.payload_size);
        Self {
            channel,
            out,
            namer,
            config,
            target,
            identifier: get_identifier(),
            payload,
            sequence: 0,
            cancel,
        }
    }

    /// Use a fixed ICMP identifier instead of the process id
    pub fn with_identifier(mut self, identifier: u16) -> Self {
        self.identifier = identifier;
        self
    }

    /// Run until the destination is reached, TTLs run out, or cancellation
    ///
    /// The channel is released on every path.
    pub fn run(mut self) -> Result<TraceReport, EngineError> {
        let mut report = TraceReport::new(self.target.clone(), self.config.clone());
        let outcome = self.scan(&mut report);

        let Self { channel, out, .. } = self;
        channel.close();
        drop(out);

        report.termination = outcome?;
        debug!(termination = ?report.termination, hops = report.hops.len(), "traceroute finished");
        Ok(report)
    }

    fn scan(&mut self, report: &mut TraceReport) -> Result<TraceTermination, EngineError> {
        writeln!(
            self.out,
            "traceroute to {} ({}), {} hops max, {} byte packets",
            self.target.original,
            self.target.resolved,
            self.config.max_hops,
            self.payload.len() + ICMP_HEADER_SIZE
        )?;

        let mut previous: Option<Ipv4Addr> = None;

        for ttl in 1..=self.config.max_hops {
            if self.cancel.is_cancelled() {
                return Ok(TraceTermination::Cancelled);
            }

            self.channel.set_ttl(ttl)?;
            let mut hop = TraceHop::new(ttl);

            for _ in 0..self.config.max_queries {
                if self.cancel.is_cancelled() {
                    break;
                }

                let Some(reply) = self.query()? else {
                    hop.record_timeout();
                    continue;
                };

                if hop.address.is_none() {
                    if previous == Some(reply.source) {
                        debug!(ttl, source = %reply.source, "hop repeats previous responder");
                        return Ok(TraceTermination::DuplicateHop { ttl });
                    }
                    hop.address = Some(reply.source);
                    hop.hostname = self.namer.name(reply.source);
                }

                hop.record_reply(reply.sample.rtt_ms);
                if reply.source == self.target.resolved {
                    hop.reached = true;
                }
            }

            writeln!(self.out, "{}", hop.render())?;
            previous = hop.address;
            let reached = hop.reached;
            report.hops.push(hop);

            if reached {
                return Ok(TraceTermination::Reached { ttl });
            }
            if self.cancel.is_cancelled() {
                return Ok(TraceTermination::Cancelled);
            }
        }

        Ok(TraceTermination::MaxHops)
    }

    /// Send one echo request at the current TTL and wait for a response
    ///
    /// Returns None on timeout.
    fn query(&mut self) -> Result<Option<QueryReply>, EngineError> {
        self.sequence = self.sequence.wrapping_add(1);
        let sequence = self.sequence;

        let request = IcmpMessage::echo_request(self.identifier, sequence, self.payload.clone());
        let sent = self.channel.send(&request.encode(), self.target.resolved)?;

        let pending = PendingProbe::new(sequence, sent.at);
        let deadline = sent.at + self.config.timeout;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let received = match self.channel.recv(remaining) {
                Ok(received) => received,
                Err(ChannelError::Timeout) => return Ok(None),
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

            if response.sequence.is_some_and(|s| s != sequence) {
                debug!(got = ?response.sequence, expected = sequence, "ignoring late response");
                continue;
            }

            if let ResponseKind::Other { icmp_type, code } = response.kind {
                debug!(icmp_type, code, "ignoring unrelated ICMP message");
                continue;
            }

            return Ok(Some(QueryReply {
                source: received.source,
                sample: pending.complete(received.at, response.ttl),
            }));
        }
    }
}
