use pnet::packet::ipv4::Ipv4Packet;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use thiserror::Error;

use crate::probe::checksum::checksum;

/// ICMP header size (fixed)
pub const ICMP_HEADER_SIZE: usize = 8;
/// Default payload size (standard ping)
pub const DEFAULT_PAYLOAD_SIZE: usize = 56;
/// Minimum IPv4 header size
pub const IPV4_HEADER_MIN: usize = 20;

pub const ICMP_ECHO_REPLY: u8 = 0;
pub const ICMP_DEST_UNREACHABLE: u8 = 3;
pub const ICMP_ECHO_REQUEST: u8 = 8;
pub const ICMP_TIME_EXCEEDED: u8 = 11;

/// Printable fill pattern for probe payloads
const PAYLOAD_PATTERN: &[u8; DEFAULT_PAYLOAD_SIZE] =
    b"!!\"#$%&'()*+,-./0123456789:;<=>?@ABCDEFGHIJKLMNOPQRSTUV\0";

/// Destination unreachable descriptions, indexed by ICMP code
const UNREACHABLE_REASONS: [&str; 16] = [
    "Destination network unreachable",
    "Destination host unreachable",
    "Destination protocol unreachable",
    "Destination port unreachable",
    "Fragmentation required, and DF flag set",
    "Source route failed",
    "Destination network unknown",
    "Destination host unknown",
    "Source host isolated",
    "Network administratively prohibited",
    "Host administratively prohibited",
    "Network unreachable for ToS",
    "Host unreachable for ToS",
    "Communication administratively prohibited",
    "Host Precedence Violation",
    "Precedence cutoff in effect",
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Packet too short: expected at least {expected} bytes, got {actual}")]
    TooShort { expected: usize, actual: usize },

    #[error("Not an IPv4 datagram (version {0})")]
    NotIpv4(u8),

    #[error("Invalid IPv4 header length: {0} words")]
    BadHeaderLength(u8),
}

/// Get process identifier for ICMP identification field
pub fn get_identifier() -> u16 {
    std::process::id() as u16
}

/// Build a probe payload of the given size from the fill pattern
pub fn build_payload(size: usize) -> Vec<u8> {
    PAYLOAD_PATTERN.iter().cycle().take(size).copied().collect()
}

/// Describe a destination-unreachable code
pub fn unreachable_description(code: u8) -> Cow<'static, str> {
    match UNREACHABLE_REASONS.get(code as usize) {
        Some(reason) => Cow::Borrowed(reason),
        None => Cow::Owned(format!("Destination unreachable (unknown code {})", code)),
    }
}

/// An ICMP header plus payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IcmpMessage {
    pub icmp_type: u8,
    pub code: u8,
    pub checksum: u16,
    pub identifier: u16,
    pub sequence: u16,
    pub payload: Vec<u8>,
}

impl IcmpMessage {
    /// Echo request with the checksum left for `encode` to fill in
    pub fn echo_request(identifier: u16, sequence: u16, payload: Vec<u8>) -> Self {
        Self {
            icmp_type: ICMP_ECHO_REQUEST,
            code: 0,
            checksum: 0,
            identifier,
            sequence,
            payload,
        }
    }

    /// Size on the wire
    pub fn wire_len(&self) -> usize {
        ICMP_HEADER_SIZE + self.payload.len()
    }

    /// Serialize in network byte order with a freshly computed checksum
    pub fn encode(&self) -> Vec<u8> {
        let mut buffer = Vec::with_capacity(self.wire_len());
        buffer.push(self.icmp_type);
        buffer.push(self.code);
        buffer.extend_from_slice(&[0, 0]);
        buffer.extend_from_slice(&self.identifier.to_be_bytes());
        buffer.extend_from_slice(&self.sequence.to_be_bytes());
        buffer.extend_from_slice(&self.payload);

        let cksum = checksum(&buffer);
        buffer[2..4].copy_from_slice(&cksum.to_be_bytes());
        buffer
    }

    /// Parse an ICMP message from any byte slice
    ///
    /// The checksum is carried over as received, not validated.
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.len() < ICMP_HEADER_SIZE {
            return Err(DecodeError::TooShort {
                expected: ICMP_HEADER_SIZE,
                actual: bytes.len(),
            });
        }

        Ok(Self {
            icmp_type: bytes[0],
            code: bytes[1],
            checksum: u16::from_be_bytes([bytes[2], bytes[3]]),
            identifier: u16::from_be_bytes([bytes[4], bytes[5]]),
            sequence: u16::from_be_bytes([bytes[6], bytes[7]]),
            payload: bytes[ICMP_HEADER_SIZE..].to_vec(),
        })
    }
}

/// An ICMP message received inside its IPv4 datagram
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IcmpDatagram {
    /// TTL from the enclosing IP header
    pub ttl: u8,
    /// Offset of the ICMP header from the start of the datagram (IHL * 4)
    pub icmp_offset: usize,
    pub message: IcmpMessage,
}

impl IcmpDatagram {
    /// Decode a raw-socket datagram (IPv4 header followed by ICMP)
    pub fn decode(datagram: &[u8]) -> Result<Self, DecodeError> {
        let ip = Ipv4Packet::new(datagram).ok_or(DecodeError::TooShort {
            expected: IPV4_HEADER_MIN,
            actual: datagram.len(),
        })?;

        let version = ip.get_version();
        if version != 4 {
            return Err(DecodeError::NotIpv4(version));
        }

        let ihl = ip.get_header_length();
        let icmp_offset = ihl as usize * 4;
        if icmp_offset < IPV4_HEADER_MIN {
            return Err(DecodeError::BadHeaderLength(ihl));
        }
        if datagram.len() < icmp_offset {
            return Err(DecodeError::TooShort {
                expected: icmp_offset,
                actual: datagram.len(),
            });
        }

        let message = IcmpMessage::decode(&datagram[icmp_offset..])?;

        Ok(Self {
            ttl: ip.get_ttl(),
            icmp_offset,
            message,
        })
    }

    /// Bytes of the ICMP message as received
    pub fn icmp_len(&self) -> usize {
        self.message.wire_len()
    }
}
