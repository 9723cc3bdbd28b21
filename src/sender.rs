//! Sender engine: segmentation and the send loop.
//!
//! # Architecture
//!
//! ```text
//!  input bytes ──frame_stream──▶ START, DATA 1..=N, END
//!                                       │
//!                                 ┌─────▼──────┐   on_ack_received      ┌───────────┐
//!                                 │ SendWindow │◀───────────────────────│ ArqPolicy │
//!                                 └─────┬──────┘   retransmit_decision  └───────────┘
//!                                       │ datagrams        ▲ ACKs
//!                                 ┌─────▼──────────────────┴───┐
//!                                 │           Socket           │
//!                                 └────────────────────────────┘
//! ```
//!
//! One loop iteration: transmit whatever the window admits, wait at most
//! one poll interval for an ACK, feed it to the policy, then retransmit
//! whatever the policy says is due.  The loop ends when END is acknowledged.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::time::timeout;

use crate::packet::{Packet, PacketType, MAX_CHUNK};
use crate::policy::{ArqPolicy, Variant};
use crate::send_window::SendWindow;
use crate::socket::{Socket, SocketError};
use crate::timer::TimerConfig;

/// Sender settings.  `window_size` and `variant` must match the receiver's.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderConfig {
    pub window_size: u32,
    pub variant: Variant,
    pub timers: TimerConfig,
    /// DATA payload size; every chunk but the last is exactly this long.
    pub chunk_size: usize,
}

impl SenderConfig {
    pub fn new(window_size: u32, variant: Variant) -> Self {
        Self {
            window_size,
            variant,
            timers: TimerConfig::for_variant(variant),
            chunk_size: MAX_CHUNK,
        }
    }
}

/// Errors that end a transfer early.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error(transparent)]
    Socket(#[from] SocketError),
    #[error("peer unresponsive: packet {seq} retransmitted {retransmits} times without acknowledgement")]
    PeerUnresponsive { seq: u32, retransmits: u32 },
}

/// What a completed transfer cost.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferReport {
    /// Packets in the transfer, START and END included.
    pub packets: u32,
    /// Payload bytes delivered.
    pub bytes: usize,
    /// Datagrams sent, first transmissions and retransmissions alike.
    pub transmissions: u64,
    pub retransmissions: u64,
    /// Valid ACKs received from the peer, useful or not.
    pub acks_received: u64,
    pub elapsed: Duration,
}

/// Split `data` into the full packet sequence of one connection:
/// START(0), DATA(1..=N) of `chunk_size` bytes (the last may be shorter),
/// END(N + 1).
///
/// # Panics
///
/// Panics if `chunk_size` is zero.
pub fn frame_stream(data: &[u8], chunk_size: usize) -> Vec<Packet> {
    let mut packets = Vec::with_capacity(data.len() / chunk_size + 2);
    packets.push(Packet::start());
    for (i, chunk) in data.chunks(chunk_size).enumerate() {
        packets.push(Packet::data(i as u32 + 1, chunk.to_vec()));
    }
    packets.push(Packet::end(packets.len() as u32));
    packets
}

/// One outbound connection.
pub struct Sender {
    socket: Socket,
    peer: SocketAddr,
    window: SendWindow,
    policy: Box<dyn ArqPolicy>,
    timers: TimerConfig,
    report: TransferReport,
}

impl Sender {
    /// Prepare to deliver `data` to `peer` over `socket`.
    ///
    /// # Panics
    ///
    /// Panics if `config.window_size` or `config.chunk_size` is zero.
    pub fn new(socket: Socket, peer: SocketAddr, data: &[u8], config: SenderConfig) -> Self {
        let packets = frame_stream(data, config.chunk_size);
        let report = TransferReport {
            packets: packets.len() as u32,
            bytes: data.len(),
            ..TransferReport::default()
        };
        Self {
            socket,
            peer,
            window: SendWindow::new(packets, config.window_size),
            policy: config.variant.policy(),
            timers: config.timers,
            report,
        }
    }

    pub fn window(&self) -> &SendWindow {
        &self.window
    }

    /// Drive the transfer until END is acknowledged.
    pub async fn run(mut self) -> Result<TransferReport, TransferError> {
        let started = Instant::now();
        log::info!(
            "[rtp:send] {} packet(s), {} byte(s) → {} (window={}, variant={})",
            self.report.packets,
            self.report.bytes,
            self.peer,
            self.window.window_size(),
            self.policy.variant()
        );

        while !self.window.is_complete() {
            self.transmit_new().await?;
            self.poll_ack().await?;
            self.retransmit_due().await?;
        }

        self.report.elapsed = started.elapsed();
        log::info!(
            "[rtp:send] {}: {} transmission(s), {} retransmission(s) in {:?}",
            self.window.state(),
            self.report.transmissions,
            self.report.retransmissions,
            self.report.elapsed
        );
        Ok(self.report)
    }

    /// Send every never-sent packet the window admits.
    async fn transmit_new(&mut self) -> Result<(), SocketError> {
        while let Some(seq) = self.window.next_sendable() {
            self.socket
                .send_datagram(self.window.datagram(seq), self.peer)
                .await?;
            self.window.record_sent(seq, Instant::now());
            self.report.transmissions += 1;
            log::debug!(
                "[rtp:send] → {} seq={} outstanding={}",
                self.window.packet_type(seq),
                seq,
                self.window.outstanding()
            );
        }
        Ok(())
    }

    /// Wait at most one poll interval for a datagram and apply it.
    async fn poll_ack(&mut self) -> Result<(), SocketError> {
        let (packet, addr) = match timeout(self.timers.poll_interval, self.socket.recv_from()).await {
            Err(_elapsed) => return Ok(()),
            Ok(Ok(received)) => received,
            Ok(Err(SocketError::Packet(e))) => {
                log::debug!("[rtp:send] dropped datagram: {e}");
                return Ok(());
            }
            Ok(Err(e)) => return Err(e),
        };

        if packet.header.packet_type != PacketType::Ack {
            log::debug!(
                "[rtp:send] ignoring {} from {addr}",
                packet.header.packet_type
            );
            return Ok(());
        }
        // A wildcard-bound receiver on a multihomed host may answer from
        // another local address, but always from the same port.
        if addr.port() != self.peer.port() {
            log::warn!("[rtp:send] ignoring ACK from {addr}; peer is {}", self.peer);
            return Ok(());
        }

        self.report.acks_received += 1;
        let ack_num = packet.header.seq_num;
        let newly = self
            .policy
            .on_ack_received(&mut self.window, ack_num, Instant::now());
        log::debug!(
            "[rtp:send] ← ACK {} (newly acked {}, base={})",
            ack_num,
            newly,
            self.window.base()
        );
        Ok(())
    }

    /// Retransmit whatever the policy reports as timed out.
    async fn retransmit_due(&mut self) -> Result<(), TransferError> {
        let due = self
            .policy
            .retransmit_decision(&self.window, Instant::now(), self.timers.rto);
        if due.is_empty() {
            return Ok(());
        }

        let base = self.window.base();
        if let Some(limit) = self.timers.max_retransmits {
            let retransmits = self.window.retransmits(base);
            if due.contains(&base) && retransmits >= limit {
                log::warn!("[rtp:send] giving up on seq={base} after {retransmits} retransmission(s)");
                return Err(TransferError::PeerUnresponsive {
                    seq: base,
                    retransmits,
                });
            }
        }

        log::warn!(
            "[rtp:send] timeout, retransmitting {} packet(s) from base={}",
            due.len(),
            base
        );
        for seq in due {
            self.socket
                .send_datagram(self.window.datagram(seq), self.peer)
                .await?;
            self.window.record_sent(seq, Instant::now());
            self.report.transmissions += 1;
            self.report.retransmissions += 1;
        }
        Ok(())
    }
}

/// Bind an ephemeral socket and deliver `data` to `peer`.
pub async fn send_stream(
    peer: SocketAddr,
    data: &[u8],
    config: SenderConfig,
) -> Result<TransferReport, TransferError> {
    let socket = Socket::bind_for(peer).await?;
    Sender::new(socket, peer, data, config).run().await
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
