//! DNS name resolution over UDP.

use std::{
    io,
    net::{Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket},
    time::Duration,
};

use crate::{
    hex::Hex,
    packet::{decoder::Packet, encoder::build_query, name::DomainName, Header, RCode, Type},
    DNS_BUFFER_SIZE,
};

/// A simple, synchronous, non-recursive DNS stub resolver.
///
/// Every query sends a single datagram to the configured server and waits for the matching reply.
/// Lost packets are not retransmitted, and truncated responses are not retried over TCP.
pub struct SyncResolver {
    server: SocketAddr,
    sock: UdpSocket,
    rng: fastrand::Rng,
}

impl SyncResolver {
    const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

    /// Creates a new DNS resolver that will contact the given server.
    ///
    /// Transaction IDs are drawn from a randomly seeded generator.
    pub fn new(server: SocketAddr) -> io::Result<Self> {
        Self::with_rng(server, fastrand::Rng::new())
    }

    /// Creates a new DNS resolver that will contact the given server and draw transaction IDs
    /// from `rng`.
    pub fn with_rng(server: SocketAddr, rng: fastrand::Rng) -> io::Result<Self> {
        let bind_addr: SocketAddr = if server.is_ipv6() {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        };
        let mut this = Self {
            server,
            sock: UdpSocket::bind(bind_addr)?,
            rng,
        };
        this.set_timeout(Some(Self::DEFAULT_TIMEOUT))?;
        Ok(this)
    }

    /// Returns the address of the name server this resolver talks to.
    pub fn server(&self) -> SocketAddr {
        self.server
    }

    /// Sets the timeout after which to abort a resolution attempt, or `None` to wait forever.
    ///
    /// This is the timeout for individual receive operations, not for the whole query. Packets that
    /// don't match the query that was sent will be ignored, but still reset the timeout.
    pub fn set_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        self.sock.set_read_timeout(timeout)?;
        Ok(())
    }

    /// Attempts to resolve `hostname` to its IPv4 addresses.
    ///
    /// If the query times out, an error of type [`io::ErrorKind::WouldBlock`] or
    /// [`io::ErrorKind::TimedOut`] will be returned.
    ///
    /// The resolver does not perform recursive resolution (it is a "stub resolver"). It does set
    /// the `RD` bit in the query, which instructs the server to perform recursion.
    pub fn resolve(&mut self, hostname: &str) -> io::Result<Vec<Ipv4Addr>> {
        let name = DomainName::from_str(hostname)?;
        let packet = self.query(&name, Type::A)?;
        Ok(packet.ipv4_answers().collect())
    }

    /// Sends a query for records of type `ty` pertaining to `name`, and returns the decoded
    /// response.
    pub fn query(&mut self, name: &DomainName, ty: Type) -> io::Result<Packet> {
        let query = build_query(&mut self.rng, name, ty);
        let (header, _) = Header::decode(&query)?;
        let id = header.id();

        log::trace!("querying {} for {} {}, raw query: {}", self.server, name, ty, Hex(&query));
        self.sock.send_to(&query, self.server)?;

        loop {
            let mut recv_buf = [0; DNS_BUFFER_SIZE];
            let (b, addr) = self.sock.recv_from(&mut recv_buf)?;
            let recv = &recv_buf[..b];
            log::trace!("recv from {}: {}", addr, Hex(recv));

            if addr != self.server {
                log::warn!("ignoring datagram from unexpected address {}", addr);
                continue;
            }

            match accept_response(recv, id) {
                Ok(Some(packet)) => return Ok(packet),
                Ok(None) => {}
                Err(e) => {
                    log::warn!("failed to decode response from {}: {}", addr, e);
                }
            }
        }
    }
}

/// Decodes `msg` if it is the response to the query with transaction ID `id`.
///
/// Returns `Ok(None)` if the message is well-formed but not the response we're waiting for.
fn accept_response(msg: &[u8], id: u16) -> Result<Option<Packet>, crate::Error> {
    let packet = Packet::decode(msg)?;
    let h = packet.header();
    if !h.is_response() || h.id() != id {
        log::warn!(
            "ignoring message with ID {} (is_response={}), expected response to {}",
            h.id(),
            h.is_response(),
            id,
        );
        return Ok(None);
    }

    if h.is_truncated() {
        log::warn!("response to {} is truncated", id);
    }
    if h.rcode() != RCode::NO_ERROR {
        log::debug!("server responded with {}", h.rcode());
    }
    for rr in packet.answers() {
        log::debug!("ANS: {}", rr);
    }

    Ok(Some(packet))
}
