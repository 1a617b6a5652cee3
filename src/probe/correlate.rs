use crate::probe::icmp::{
    ICMP_DEST_UNREACHABLE, ICMP_ECHO_REPLY, ICMP_ECHO_REQUEST, ICMP_TIME_EXCEEDED, IcmpDatagram,
};

/// ICMP response type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    EchoReply,
    /// Our own request looped back (seen on loopback paths)
    EchoRequest,
    DestUnreachable(u8),
    TimeExceeded(u8),
    Other { icmp_type: u8, code: u8 },
}

impl ResponseKind {
    /// Whether the response answers an echo probe directly
    pub fn is_echo(&self) -> bool {
        matches!(self, ResponseKind::EchoReply | ResponseKind::EchoRequest)
    }
}

/// A received datagram attributed to this process's probes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedResponse {
    pub kind: ResponseKind,
    /// Sequence of the probe this answers, when the message carries one
    pub sequence: Option<u16>,
    /// Identifier field of the outer ICMP header
    pub identifier: u16,
    /// TTL of the IP datagram that carried the response
    pub ttl: u8,
    /// Size of the ICMP portion
    pub size: usize,
}

/// Extract (identifier, sequence) of the echo request quoted in an ICMP error
///
/// Error payloads start with the original IP header followed by at least the
/// first 8 bytes of the original ICMP message.
fn quoted_echo(payload: &[u8]) -> Option<(u16, u16)> {
    let quoted = IcmpDatagram::decode(payload).ok()?;
    if quoted.message.icmp_type != ICMP_ECHO_REQUEST {
        return None;
    }
    Some((quoted.message.identifier, quoted.message.sequence))
}

/// Attribute a received datagram to our probes
///
/// Returns None for traffic that belongs to someone else: echo messages with a
/// foreign identifier, or errors quoting another process's echo request.
/// Errors whose quote cannot be parsed are kept, since they may still be ours.
pub fn parse_response(datagram: &IcmpDatagram, identifier: u16) -> Option<ParsedResponse> {
    let msg = &datagram.message;

    let (kind, sequence) = match msg.icmp_type {
        ICMP_ECHO_REPLY | ICMP_ECHO_REQUEST => {
            if msg.identifier != identifier {
                return None;
            }
            let kind = if msg.icmp_type == ICMP_ECHO_REPLY {
                ResponseKind::EchoReply
            } else {
                ResponseKind::EchoRequest
            };
            (kind, Some(msg.sequence))
        }
        ICMP_DEST_UNREACHABLE | ICMP_TIME_EXCEEDED => {
            let quoted = quoted_echo(&msg.payload);
            if let Some((quoted_id, _)) = quoted
                && quoted_id != identifier
            {
                return None;
            }
            let kind = if msg.icmp_type == ICMP_DEST_UNREACHABLE {
                ResponseKind::DestUnreachable(msg.code)
            } else {
                ResponseKind::TimeExceeded(msg.code)
            };
            (kind, quoted.map(|(_, seq)| seq))
        }
        other => (
            ResponseKind::Other {
                icmp_type: other,
                code: msg.code,
            },
            None,
        ),
    };

    Some(ParsedResponse {
        kind,
        sequence,
        identifier: msg.identifier,
        ttl: datagram.ttl,
        size: datagram.icmp_len(),
    })
}
