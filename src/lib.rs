//! `rtp` — a reliable, in-order byte stream over UDP.
//!
//! # Architecture
//!
//! ```text
//!  ┌──────────┐  START, DATA, END  ┌──────────┐
//!  │  Sender  │───────────────────▶│ Receiver │
//!  └────┬─────┘                    └─────┬────┘
//!       │◀───────── ACKs ────────────────┘
//!       │                                │
//!  ┌────▼───────┐   ┌───────────┐   ┌────▼──────────┐
//!  │ SendWindow │◀──│ ArqPolicy │──▶│ ReceiveWindow │
//!  └────┬───────┘   └───────────┘   └────┬──────────┘
//!       │ raw UDP datagrams              │
//!  ┌────▼────────────────────────────────▼┐
//!  │                Socket                │  (thin async wrapper around tokio UdpSocket)
//!  └──────────────────────────────────────┘
//! ```
//!
//! Both ends share one window size and one [`Variant`]: `base` is
//! Go-Back-N with cumulative ACKs, `opt` is selective repeat with
//! per-packet ACKs.
//!
//! Each module has a single responsibility:
//! - [`checksum`]        — CRC-32 over a byte slice
//! - [`packet`]          — wire format (serialise / deserialise)
//! - [`state`]           — connection lifecycle states
//! - [`timer`]           — retransmission timeout and poll settings
//! - [`send_window`]     — outbound sliding window bookkeeping
//! - [`receive_window`]  — inbound reassembly and buffering
//! - [`policy`]          — the two ARQ variants
//! - [`sender`]          — segmentation and the send loop
//! - [`receiver`]        — the receive loop
//! - [`simulator`]       — lossy/reorder network layer for testing
//! - [`socket`]          — async UDP socket abstraction

pub mod checksum;
pub mod packet;
pub mod policy;
pub mod receive_window;
pub mod receiver;
pub mod send_window;
pub mod sender;
pub mod simulator;
pub mod socket;
pub mod state;
pub mod timer;

pub use packet::{Header, Packet, PacketError, PacketType};
pub use policy::{ArqPolicy, Variant};
pub use receiver::{Receiver, ReceiverConfig};
pub use sender::{send_stream, Sender, SenderConfig, TransferError, TransferReport};
pub use socket::{Socket, SocketError};
pub use timer::TimerConfig;
