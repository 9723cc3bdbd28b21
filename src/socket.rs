//! Datagram I/O for both endpoints.
//!
//! [`Socket`] wraps a `tokio::net::UdpSocket` and moves whole RTP packets:
//! outbound packets are encoded here, inbound datagrams are decoded and
//! checksum-verified before the caller sees them.  Windows, timers and ACK
//! rules live in the engines.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};

use thiserror::Error;
use tokio::net::UdpSocket;

use crate::packet::{Packet, PacketError, RECV_BUFFER};

#[derive(Debug, Error)]
pub enum SocketError {
    /// OS-level failure on bind, send or receive.  Ends the transfer.
    #[error("socket I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// A datagram arrived but failed validation.  Callers drop it and keep
    /// receiving.
    #[error("packet rejected: {0}")]
    Packet(#[from] PacketError),
}

/// One bound UDP endpoint.
#[derive(Debug)]
pub struct Socket {
    /// Resolved local address; the real port when bound to port 0.
    pub local_addr: SocketAddr,
    inner: UdpSocket,
}

impl Socket {
    /// Bind `local_addr`.  Port 0 picks an ephemeral port.
    pub async fn bind(local_addr: SocketAddr) -> Result<Self, SocketError> {
        let inner = UdpSocket::bind(local_addr).await?;
        let local_addr = inner.local_addr()?;
        Ok(Self { local_addr, inner })
    }

    /// Bind an ephemeral port on the wildcard address of `peer`'s family.
    pub async fn bind_for(peer: SocketAddr) -> Result<Self, SocketError> {
        let local = match peer {
            SocketAddr::V4(_) => SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
            SocketAddr::V6(_) => SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0)),
        };
        Self::bind(local).await
    }

    pub async fn send_to(&self, packet: &Packet, dest: SocketAddr) -> Result<(), SocketError> {
        self.send_datagram(&packet.encode(), dest).await
    }

    /// Send bytes that were encoded earlier, e.g. a buffered retransmission.
    pub async fn send_datagram(&self, bytes: &[u8], dest: SocketAddr) -> Result<(), SocketError> {
        self.inner.send_to(bytes, dest).await?;
        Ok(())
    }

    /// Wait for the next datagram and return it decoded, with its source.
    ///
    /// A datagram that fails to decode yields [`SocketError::Packet`]; the
    /// socket stays usable.
    pub async fn recv_from(&self) -> Result<(Packet, SocketAddr), SocketError> {
        let mut buf = [0u8; RECV_BUFFER];
        let (len, from) = self.inner.recv_from(&mut buf).await?;
        Ok((Packet::decode(&buf[..len])?, from))
    }
}
