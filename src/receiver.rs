//! Receiver engine: validate, reassemble, acknowledge.
//!
//! The [`Receiver`] blocks on the socket with no idle timeout.  Every
//! datagram that passes the checksum is applied to the
//! [`ReceiveWindow`](crate::receive_window::ReceiveWindow), and the active
//! policy picks the ACK sent back to the datagram's source.  An in-order END
//! completes the stream; the reassembled bytes are returned to the caller,
//! which writes them out exactly once.
//!
//! With a non-zero linger the receiver stays in `TimeWait` for that long
//! after END, re-acknowledging retransmissions whose earlier ACK was lost.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::time::{timeout_at, Instant};

use crate::packet::Packet;
use crate::policy::{ArqPolicy, Variant};
use crate::receive_window::{Arrival, ReceiveWindow};
use crate::socket::{Socket, SocketError};
use crate::state::ConnectionState;

/// Receiver settings.  `window_size` and `variant` must match the sender's.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiverConfig {
    pub window_size: u32,
    pub variant: Variant,
    /// Time spent re-acknowledging END after the stream completed.
    pub linger: Duration,
}

impl ReceiverConfig {
    pub fn new(window_size: u32, variant: Variant) -> Self {
        Self {
            window_size,
            variant,
            linger: Duration::ZERO,
        }
    }
}

/// One inbound connection.
pub struct Receiver {
    socket: Socket,
    window: ReceiveWindow,
    policy: Box<dyn ArqPolicy>,
    linger: Duration,
}

impl Receiver {
    /// Bind `local_addr` and prepare to receive one stream.
    pub async fn bind(local_addr: SocketAddr, config: ReceiverConfig) -> Result<Self, SocketError> {
        let socket = Socket::bind(local_addr).await?;
        Ok(Self::new(socket, config))
    }

    /// # Panics
    ///
    /// Panics if `config.window_size` is zero.
    pub fn new(socket: Socket, config: ReceiverConfig) -> Self {
        Self {
            socket,
            window: ReceiveWindow::new(config.window_size),
            policy: config.variant.policy(),
            linger: config.linger,
        }
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.socket.local_addr
    }

    pub fn state(&self) -> ConnectionState {
        self.window.state()
    }

    /// Receive until an in-order END arrives; return the reassembled stream.
    pub async fn run(mut self) -> Result<Vec<u8>, SocketError> {
        log::info!(
            "[rtp:recv] listening on {} (window={}, variant={})",
            self.local_addr(),
            self.window.window_size(),
            self.policy.variant()
        );

        loop {
            let (packet, addr) = match self.socket.recv_from().await {
                Ok(received) => received,
                Err(SocketError::Packet(e)) => {
                    log::debug!("[rtp:recv] dropped datagram: {e}");
                    continue;
                }
                Err(e) => return Err(e),
            };
            if self.handle(packet, addr).await? == Arrival::Finished {
                break;
            }
        }

        log::info!(
            "[rtp:recv] stream complete: {} byte(s)",
            self.window.output().len()
        );
        self.linger().await?;
        self.window.close();
        Ok(self.window.into_output())
    }

    /// Apply one verified packet and send the policy's ACK, if any.
    async fn handle(&mut self, packet: Packet, addr: SocketAddr) -> Result<Arrival, SocketError> {
        let was = self.window.state();
        let arrival = self.window.on_packet(&packet);
        let ack = self
            .policy
            .on_packet_received(&packet.header, arrival, self.window.expected());

        log::debug!(
            "[rtp:recv] ← {} seq={} len={} {:?}; expected={} buffered={}",
            packet.header.packet_type,
            packet.header.seq_num,
            packet.payload.len(),
            arrival,
            self.window.expected(),
            self.window.buffered()
        );
        if was != self.window.state() && !was.is_finished() {
            log::info!("[rtp:recv] {} from {addr}", self.window.state());
        }

        if let Some(ack_num) = ack {
            self.socket.send_to(&Packet::ack(ack_num), addr).await?;
            log::debug!("[rtp:recv] → ACK {ack_num}");
        }
        Ok(arrival)
    }

    /// Keep answering retransmissions until the linger period is over.
    async fn linger(&mut self) -> Result<(), SocketError> {
        if self.linger.is_zero() {
            return Ok(());
        }
        let deadline = Instant::now() + self.linger;
        loop {
            match timeout_at(deadline, self.socket.recv_from()).await {
                Err(_elapsed) => return Ok(()),
                Ok(Ok((packet, addr))) => {
                    self.handle(packet, addr).await?;
                }
                Ok(Err(SocketError::Packet(e))) => {
                    log::debug!("[rtp:recv] dropped datagram: {e}");
                }
                Ok(Err(e)) => return Err(e),
            }
        }
    }
}
