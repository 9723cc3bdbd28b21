//! ARQ policies.
//!
//! Both protocol variants share the wire format, the windows and the engine
//! loops.  They differ in exactly three decisions, which [`ArqPolicy`]
//! captures:
//!
//! | Decision | [`Cumulative`] ("base") | [`Selective`] ("opt") |
//! |---|---|---|
//! | ACK sent by the receiver | `expected` after the packet | the packet's own seq (START → 1) |
//! | Window advance on ACK | slide `base` to `ack_num` | mark one packet, slide over acked prefix |
//! | Retransmission | whole window when the activity timer expires | each packet whose own timer expired |

use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::packet::{Header, PacketType};
use crate::receive_window::Arrival;
use crate::send_window::SendWindow;

/// The policy seam between the engines and the variant-specific rules.
pub trait ArqPolicy: Send + Sync {
    fn variant(&self) -> Variant;

    /// Sender: fold one ACK into `window`.
    ///
    /// Returns the number of packets newly acknowledged.
    fn on_ack_received(&mut self, window: &mut SendWindow, ack_num: u32, now: Instant) -> usize;

    /// Receiver: the ACK number to answer `header` with, given what applying
    /// it did and the cursor afterwards.  `None` sends no ACK.
    fn on_packet_received(&self, header: &Header, arrival: Arrival, expected: u32) -> Option<u32>;

    /// Sender: sequence numbers due for retransmission at `now`.
    fn retransmit_decision(&self, window: &SendWindow, now: Instant, rto: Duration) -> Vec<u32>;
}

// ---------------------------------------------------------------------------
// Cumulative
// ---------------------------------------------------------------------------

/// Cumulative ACKs with Go-Back-N retransmission.
#[derive(Debug, Default)]
pub struct Cumulative;

impl ArqPolicy for Cumulative {
    fn variant(&self) -> Variant {
        Variant::Cumulative
    }

    fn on_ack_received(&mut self, window: &mut SendWindow, ack_num: u32, now: Instant) -> usize {
        // Stale, duplicate, or acknowledging something never sent.
        if ack_num <= window.base() || ack_num > window.next_seq() {
            return 0;
        }
        window.ack_through(ack_num, now)
    }

    fn on_packet_received(&self, _header: &Header, arrival: Arrival, expected: u32) -> Option<u32> {
        match arrival {
            Arrival::Ignored => None,
            _ => Some(expected),
        }
    }

    fn retransmit_decision(&self, window: &SendWindow, now: Instant, rto: Duration) -> Vec<u32> {
        if window.activity_expired(now, rto) {
            window.unacked_in_flight().collect()
        } else {
            Vec::new()
        }
    }
}

// ---------------------------------------------------------------------------
// Selective
// ---------------------------------------------------------------------------

/// Per-packet ACKs with selective-repeat retransmission.
///
/// The receiver answers START with ACK(1), the same value it uses for
/// DATA 1 (or for END on an empty stream), so the wire alone cannot tell
/// the two apart.  The sender keeps count: ACK(1) first acknowledges START,
/// and ACK(1)s up to the number of START transmissions are taken as
/// answers to retransmitted STARTs.
///
/// Beyond that count an ACK(1) may still be a network duplicate of a START
/// answer.  The first such ACK(1) is held without acknowledging DATA 1:
/// its timer stays armed, DATA 1 is retransmitted, and only an ACK(1)
/// received after that retransmission acknowledges it.  `base` stays at 1
/// meanwhile, so END is withheld.  A START answer duplicated and delayed
/// by more than one timeout can still be mistaken for DATA 1's ACK.
///
/// On an empty stream packet 1 is END, and ACK(1) beyond the START count
/// acknowledges it directly: retransmitting END to a receiver that has
/// already finished would never be answered.
#[derive(Debug, Default)]
pub struct Selective {
    ack_one_seen: u32,
    /// DATA 1 transmissions when the first unconfirmed ACK(1) arrived.
    held_at: Option<u32>,
}

impl Selective {
    /// Acknowledge DATA 1 only after it was retransmitted past a held ACK(1).
    fn confirm_data_one(&mut self, window: &mut SendWindow, now: Instant) -> usize {
        let sent = window.tx_count(1);
        match self.held_at {
            Some(at) if sent > at => window.ack_one(1, now),
            Some(_) => 0,
            None => {
                self.held_at = Some(sent);
                0
            }
        }
    }
}

impl ArqPolicy for Selective {
    fn variant(&self) -> Variant {
        Variant::Selective
    }

    fn on_ack_received(&mut self, window: &mut SendWindow, ack_num: u32, now: Instant) -> usize {
        if ack_num == 1 && window.next_seq() > 0 {
            self.ack_one_seen += 1;
            if !window.is_acked(0) {
                return window.ack_one(0, now);
            }
            if self.ack_one_seen <= window.tx_count(0) {
                // Could still be the answer to a retransmitted START.
                return 0;
            }
            if window.next_seq() > 1 && window.packet_type(1) == PacketType::Data {
                return self.confirm_data_one(window, now);
            }
        }
        if ack_num >= window.next_seq() {
            return 0;
        }
        window.ack_one(ack_num, now)
    }

    fn on_packet_received(&self, header: &Header, arrival: Arrival, _expected: u32) -> Option<u32> {
        match arrival {
            Arrival::Ignored | Arrival::OutOfWindow => None,
            _ if header.packet_type == PacketType::Start => Some(1),
            _ => Some(header.seq_num),
        }
    }

    fn retransmit_decision(&self, window: &SendWindow, now: Instant, rto: Duration) -> Vec<u32> {
        window
            .unacked_in_flight()
            .filter(|&seq| window.packet_expired(seq, now, rto))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Variant
// ---------------------------------------------------------------------------

/// Which policy an endpoint runs.  Both ends of a connection must agree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Variant {
    /// Cumulative ACK, Go-Back-N.  Named `base` on the command line.
    #[default]
    Cumulative,
    /// Per-packet ACK, selective repeat.  Named `opt` on the command line.
    Selective,
}

impl Variant {
    /// A fresh policy instance for one endpoint.
    pub fn policy(self) -> Box<dyn ArqPolicy> {
        match self {
            Variant::Cumulative => Box::new(Cumulative),
            Variant::Selective => Box::new(Selective::default()),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Variant::Cumulative => "base",
            Variant::Selective => "opt",
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown variant {0:?} (expected \"base\" or \"opt\")")]
pub struct ParseVariantError(String);

impl FromStr for Variant {
    type Err = ParseVariantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "base" | "cumulative" | "gbn" => Ok(Variant::Cumulative),
            "opt" | "selective" | "sr" => Ok(Variant::Selective),
            _ => Err(ParseVariantError(s.to_owned())),
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
