use anyhow::{Result, anyhow};
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::io;
use std::mem::MaybeUninit;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, trace};

/// Receive buffer size (one Ethernet MTU)
const RECV_BUFFER_SIZE: usize = 1500;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Failed to create raw socket: {0}")]
    SocketCreation(#[source] io::Error),

    #[error("Failed to send ICMP packet: {0}")]
    Send(#[source] io::Error),

    #[error("Failed to receive ICMP packet: {0}")]
    Recv(#[source] io::Error),

    #[error("Failed to set TTL {ttl}: {source}")]
    SetTtl {
        ttl: u8,
        #[source]
        source: io::Error,
    },

    #[error("Receive timed out")]
    Timeout,
}

/// Outcome of a send, stamped right after the send call returned
#[derive(Debug, Clone, Copy)]
pub struct Sent {
    pub len: usize,
    pub at: Instant,
}

/// A received datagram, stamped right after the receive call returned
#[derive(Debug, Clone)]
pub struct Received {
    /// Full IP datagram (raw sockets deliver the IP header)
    pub datagram: Vec<u8>,
    pub source: Ipv4Addr,
    pub at: Instant,
}

/// A bidirectional ICMP transport the engines drive one probe at a time
pub trait IcmpChannel {
    /// Send an encoded ICMP message to the destination
    fn send(&mut self, packet: &[u8], destination: Ipv4Addr) -> Result<Sent, ChannelError>;

    /// Block until a datagram arrives or the timeout elapses
    fn recv(&mut self, timeout: Duration) -> Result<Received, ChannelError>;

    /// Set the IP TTL used for all subsequent sends
    fn set_ttl(&mut self, ttl: u8) -> Result<(), ChannelError>;

    /// Release the transport; called once when a run ends
    fn close(self)
    where
        Self: Sized,
    {
        drop(self);
    }
}

/// A raw IPv4 ICMP socket, exclusively owned by one engine run
///
/// The socket is closed when the channel is dropped or explicitly closed.
#[derive(Debug)]
pub struct RawChannel {
    socket: Socket,
}

impl RawChannel {
    /// Open a raw socket for the given address family and protocol
    pub fn open(domain: Domain, protocol: Protocol) -> Result<Self, ChannelError> {
        let socket =
            Socket::new(domain, Type::RAW, Some(protocol)).map_err(ChannelError::SocketCreation)?;
        socket
            .set_nonblocking(false)
            .map_err(ChannelError::SocketCreation)?;
        debug!(?domain, ?protocol, "opened raw socket");
        Ok(Self { socket })
    }

    /// Open a raw IPv4 ICMP socket
    pub fn open_icmp() -> Result<Self, ChannelError> {
        Self::open(Domain::IPV4, Protocol::ICMPV4)
    }
}

impl Drop for RawChannel {
    fn drop(&mut self) {
        debug!("closing raw socket");
    }
}

fn is_timeout(err: &io::Error) -> bool {
    matches!(err.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
}

/// Repeat a blocking receive until it succeeds, fails, or the deadline passes
///
/// Each attempt is handed the time left. Interrupted calls are retried.
fn recv_until<T, F>(deadline: Instant, mut attempt: F) -> Result<T, ChannelError>
where
    F: FnMut(Duration) -> io::Result<T>,
{
    loop {
        // A zero read timeout would mean "block forever"
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(ChannelError::Timeout);
        }

        match attempt(remaining) {
            Ok(result) => return Ok(result),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                trace!(?remaining, "receive interrupted, retrying");
            }
            Err(e) if is_timeout(&e) => return Err(ChannelError::Timeout),
            Err(e) => return Err(ChannelError::Recv(e)),
        }
    }
}

impl IcmpChannel for RawChannel {
    fn send(&mut self, packet: &[u8], destination: Ipv4Addr) -> Result<Sent, ChannelError> {
        let addr = SockAddr::from(SocketAddrV4::new(destination, 0));
        let len = self
            .socket
            .send_to(packet, &addr)
            .map_err(ChannelError::Send)?;
        let at = Instant::now();
        trace!(len, %destination, "sent ICMP packet");
        Ok(Sent { len, at })
    }

    fn recv(&mut self, timeout: Duration) -> Result<Received, ChannelError> {
        let deadline = Instant::now() + timeout;
        let mut buffer = [MaybeUninit::<u8>::uninit(); RECV_BUFFER_SIZE];
        let (len, from) = recv_until(deadline, |remaining| {
            self.socket.set_read_timeout(Some(remaining))?;
            self.socket.recv_from(&mut buffer)
        })?;
        let at = Instant::now();

        // SAFETY: recv_from initialized the first `len` bytes of the buffer
        let datagram =
            unsafe { std::slice::from_raw_parts(buffer.as_ptr() as *const u8, len) }.to_vec();

        let source = match from.as_socket() {
            Some(SocketAddr::V4(addr)) => *addr.ip(),
            _ => {
                return Err(ChannelError::Recv(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "datagram from a non-IPv4 source",
                )));
            }
        };

        trace!(len, %source, "received datagram");
        Ok(Received {
            datagram,
            source,
            at,
        })
    }

    fn set_ttl(&mut self, ttl: u8) -> Result<(), ChannelError> {
        self.socket
            .set_ttl(ttl as u32)
            .map_err(|source| ChannelError::SetTtl { ttl, source })
    }
}

/// Check that raw ICMP sockets can be opened
pub fn check_permissions() -> Result<()> {
    if RawChannel::open_icmp().is_ok() {
        return Ok(());
    }

    let binary_path = std::env::current_exe()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|_| "netreach".to_string());

    Err(anyhow!(
        "Insufficient permissions for raw sockets.\n\n\
         Fix options:\n\
         \u{2022} Run with sudo: sudo netreach --ping <target>\n\
         \u{2022} Add capability: sudo setcap cap_net_raw+ep {}",
        binary_path
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_kinds() {
        assert!(is_timeout(&io::Error::from(io::ErrorKind::WouldBlock)));
        assert!(is_timeout(&io::Error::from(io::ErrorKind::TimedOut)));
        assert!(!is_timeout(&io::Error::from(io::ErrorKind::PermissionDenied)));
        assert!(!is_timeout(&io::Error::from(io::ErrorKind::Interrupted)));
    }

    #[test]
    fn test_recv_retries_interrupted() {
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut attempts = 0;
        let result = recv_until(deadline, |remaining| {
            assert!(!remaining.is_zero());
            attempts += 1;
            if attempts < 3 {
                Err(io::Error::from(io::ErrorKind::Interrupted))
            } else {
                Ok(attempts)
            }
        });
        assert_eq!(result.unwrap(), 3);
    }

    #[test]
    fn test_recv_interrupted_until_deadline() {
        let deadline = Instant::now() + Duration::from_millis(20);
        let result: Result<(), _> =
            recv_until(deadline, |_| Err(io::Error::from(io::ErrorKind::Interrupted)));
        assert!(matches!(result, Err(ChannelError::Timeout)));
        assert!(Instant::now() >= deadline);
    }

    #[test]
    fn test_recv_maps_errors() {
        let deadline = Instant::now() + Duration::from_secs(5);
        let result: Result<(), _> =
            recv_until(deadline, |_| Err(io::Error::from(io::ErrorKind::WouldBlock)));
        assert!(matches!(result, Err(ChannelError::Timeout)));

        let result: Result<(), _> =
            recv_until(deadline, |_| Err(io::Error::from(io::ErrorKind::ConnectionRefused)));
        assert!(matches!(result, Err(ChannelError::Recv(_))));

        let past = Instant::now();
        let mut called = false;
        let result: Result<(), _> = recv_until(past, |_| {
            called = true;
            Ok(())
        });
        assert!(matches!(result, Err(ChannelError::Timeout)));
        assert!(!called);
    }

    #[test]
    fn test_error_messages_name_operation() {
        let err = ChannelError::SetTtl {
            ttl: 7,
            source: io::Error::from(io::ErrorKind::PermissionDenied),
        };
        assert!(err.to_string().starts_with("Failed to set TTL 7"));

        let err = ChannelError::Send(io::Error::from(io::ErrorKind::NetworkUnreachable));
        assert!(err.to_string().starts_with("Failed to send ICMP packet"));
    }
}
