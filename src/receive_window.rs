//! Receive-side delivery cursor and reassembly buffer.
//!
//! [`ReceiveWindow`] implements the receiver half of both ARQ policies; the
//! policies differ only in which ACK they send back, not in what gets
//! buffered or delivered:
//!
//! - A packet at `expected` is **delivered**: its payload is appended to the
//!   output and the cursor advances, draining every contiguous buffered
//!   packet behind it.
//! - A DATA packet in `(expected, expected + window_size)` is **buffered**
//!   until the cursor reaches it.
//! - Anything below `expected` is a **duplicate**, anything at or beyond
//!   `expected + window_size` is **out of window**; neither changes state.
//!
//! START is treated as the delivery of sequence number 0 with no payload, so
//! the first START opens the connection and later ones are duplicates.
//!
//! This module only manages state; all socket I/O is the caller's
//! responsibility.

use std::collections::BTreeMap;

use crate::packet::{Packet, PacketType};
use crate::state::ConnectionState;

/// What applying one packet did to the receive window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arrival {
    /// In order: delivered, cursor advanced.
    Delivered,
    /// Ahead of the cursor, inside the window: held for later.
    Buffered,
    /// Already delivered or already buffered.
    Duplicate,
    /// Beyond the window, or DATA/END before the connection was opened.
    OutOfWindow,
    /// END at the cursor: the stream is complete.
    Finished,
    /// END ahead of the cursor: data is still missing.
    EarlyEnd,
    /// Not addressed to a receiver (an ACK).
    Ignored,
}

/// Receiver-side state for one connection.
#[derive(Debug)]
pub struct ReceiveWindow {
    /// Smallest sequence number not yet delivered.
    expected: u32,
    window_size: u32,
    /// Payloads that arrived ahead of `expected`, keyed by sequence number.
    buffer: BTreeMap<u32, Vec<u8>>,
    /// Reassembled byte stream, in order.
    output: Vec<u8>,
    state: ConnectionState,
}

impl ReceiveWindow {
    /// # Panics
    ///
    /// Panics if `window_size` is zero.
    pub fn new(window_size: u32) -> Self {
        assert!(window_size >= 1, "window_size must be at least 1");
        Self {
            expected: 0,
            window_size,
            buffer: BTreeMap::new(),
            output: Vec::new(),
            state: ConnectionState::Listen,
        }
    }

    pub fn expected(&self) -> u32 {
        self.expected
    }

    pub fn window_size(&self) -> u32 {
        self.window_size
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Number of packets waiting in the reassembly buffer.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_buffered(&self, seq: u32) -> bool {
        self.buffer.contains_key(&seq)
    }

    /// Bytes delivered so far.
    pub fn output(&self) -> &[u8] {
        &self.output
    }

    pub fn into_output(self) -> Vec<u8> {
        self.output
    }

    /// Mark the connection fully closed (after any linger period).
    pub fn close(&mut self) {
        self.state = ConnectionState::Closed;
    }

    /// Apply one verified packet.
    pub fn on_packet(&mut self, packet: &Packet) -> Arrival {
        let seq = packet.header.seq_num;
        match packet.header.packet_type {
            PacketType::Start => self.on_start(),
            PacketType::Data => self.on_data(seq, &packet.payload),
            PacketType::End => self.on_end(seq),
            PacketType::Ack => Arrival::Ignored,
        }
    }

    fn on_start(&mut self) -> Arrival {
        if self.state != ConnectionState::Listen {
            return Arrival::Duplicate;
        }
        self.state = ConnectionState::Established;
        self.advance(&[]);
        Arrival::Delivered
    }

    fn on_data(&mut self, seq: u32, payload: &[u8]) -> Arrival {
        if self.state == ConnectionState::Listen {
            // No connection yet; nothing to place this against.
            return Arrival::OutOfWindow;
        }
        if seq < self.expected {
            return Arrival::Duplicate;
        }
        if seq >= self.expected.saturating_add(self.window_size) {
            return Arrival::OutOfWindow;
        }
        if seq == self.expected {
            self.advance(payload);
            return Arrival::Delivered;
        }
        if self.buffer.contains_key(&seq) {
            return Arrival::Duplicate;
        }
        self.buffer.insert(seq, payload.to_vec());
        Arrival::Buffered
    }

    fn on_end(&mut self, seq: u32) -> Arrival {
        if self.state == ConnectionState::Listen {
            return Arrival::OutOfWindow;
        }
        if seq < self.expected {
            Arrival::Duplicate
        } else if seq == self.expected {
            self.expected += 1;
            self.state = ConnectionState::TimeWait;
            Arrival::Finished
        } else {
            Arrival::EarlyEnd
        }
    }

    /// Deliver the packet at `expected`, then drain the buffer.
    fn advance(&mut self, payload: &[u8]) {
        self.output.extend_from_slice(payload);
        self.expected += 1;
        while let Some(ready) = self.buffer.remove(&self.expected) {
            self.output.extend_from_slice(&ready);
            self.expected += 1;
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
