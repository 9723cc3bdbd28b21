//! Send-side sliding window.
//!
//! [`SendWindow`] owns every encoded packet of one transfer and tracks which
//! of them are in flight, which are acknowledged, and when each was last
//! transmitted.  It decides *what may be sent*; the active
//! [`crate::policy::ArqPolicy`] decides how ACKs move the window and what is
//! retransmitted.
//!
//! # Sequence-number layout
//!
//! ```text
//!   base             next_seq        send_limit
//!     │                  │                │
//!  ───┼──────────────────┼────────────────┼──────────▶ seq space
//!     │ <── in flight ──▶│ <── sendable ─▶│
//! ```
//!
//! `send_limit` also gates the lifecycle: START travels alone until it is
//! acknowledged, and END is released only once every DATA packet is.
//! `next_seq - base` never exceeds `window_size`.
//!
//! This module only manages state; all socket I/O is the caller's responsibility.

use std::time::{Duration, Instant};

use crate::packet::{Packet, PacketType};
use crate::state::ConnectionState;
use crate::timer::RetransmitTimer;

/// One packet of the transfer.
#[derive(Debug, Clone)]
struct Slot {
    packet_type: PacketType,
    /// The encoded datagram, ready to hand to the socket.
    datagram: Vec<u8>,
    acked: bool,
    /// Total number of times this packet has been transmitted.
    tx_count: u32,
    timer: RetransmitTimer,
}

/// Sender-side window state for one connection.
#[derive(Debug)]
pub struct SendWindow {
    slots: Vec<Slot>,
    /// Smallest unacknowledged sequence number (left window edge).
    base: u32,
    /// Smallest sequence number never transmitted.
    next_seq: u32,
    window_size: u32,
    /// Re-armed on every transmission and every advance of `base`.
    activity: RetransmitTimer,
}

impl SendWindow {
    /// Build a window over `packets`, which must be the full START, DATA*,
    /// END sequence numbered from 0.
    ///
    /// # Panics
    ///
    /// Panics if `window_size` is zero or `packets` holds fewer than two
    /// packets.
    pub fn new(packets: Vec<Packet>, window_size: u32) -> Self {
        assert!(window_size >= 1, "window_size must be at least 1");
        assert!(packets.len() >= 2, "a transfer needs at least START and END");
        let slots = packets
            .into_iter()
            .map(|packet| Slot {
                packet_type: packet.header.packet_type,
                datagram: packet.encode(),
                acked: false,
                tx_count: 0,
                timer: RetransmitTimer::default(),
            })
            .collect();
        Self {
            slots,
            base: 0,
            next_seq: 0,
            window_size,
            activity: RetransmitTimer::default(),
        }
    }

    /// Number of packets in the transfer, START and END included.
    pub fn total(&self) -> u32 {
        self.slots.len() as u32
    }

    /// Sequence number of the END packet.
    pub fn end_seq(&self) -> u32 {
        self.total() - 1
    }

    pub fn base(&self) -> u32 {
        self.base
    }

    pub fn next_seq(&self) -> u32 {
        self.next_seq
    }

    pub fn window_size(&self) -> u32 {
        self.window_size
    }

    /// Packets transmitted at least once and not yet slid past.
    pub fn outstanding(&self) -> u32 {
        self.next_seq - self.base
    }

    /// `true` once END itself has been acknowledged.
    pub fn is_complete(&self) -> bool {
        self.base == self.total()
    }

    pub fn state(&self) -> ConnectionState {
        if self.is_complete() {
            ConnectionState::Closed
        } else if self.base == 0 {
            ConnectionState::StartSent
        } else if self.base < self.end_seq() {
            ConnectionState::Established
        } else {
            ConnectionState::EndSent
        }
    }

    /// Exclusive upper bound on sequence numbers that may be in flight now.
    fn send_limit(&self) -> u32 {
        let end_seq = self.end_seq();
        if self.base == 0 {
            1
        } else if self.base < end_seq {
            self.base.saturating_add(self.window_size).min(end_seq)
        } else {
            self.total()
        }
    }

    /// The next never-sent packet the window admits, if any.
    ///
    /// Call [`record_sent`](Self::record_sent) after transmitting it.
    pub fn next_sendable(&self) -> Option<u32> {
        (self.next_seq < self.send_limit()).then_some(self.next_seq)
    }

    /// The encoded datagram for `seq`.
    pub fn datagram(&self, seq: u32) -> &[u8] {
        &self.slots[seq as usize].datagram
    }

    pub fn packet_type(&self, seq: u32) -> PacketType {
        self.slots[seq as usize].packet_type
    }

    /// Record a (re)transmission of `seq` at `now`.
    ///
    /// Advances `next_seq` when `seq` is the next never-sent packet.
    pub fn record_sent(&mut self, seq: u32, now: Instant) {
        debug_assert!(
            seq < self.send_limit(),
            "record_sent({seq}) outside the window [{}, {})",
            self.base,
            self.send_limit()
        );
        let slot = &mut self.slots[seq as usize];
        slot.tx_count += 1;
        slot.timer.arm(now);
        self.activity.arm(now);
        if seq == self.next_seq {
            self.next_seq += 1;
        }
    }

    pub fn is_acked(&self, seq: u32) -> bool {
        self.slots.get(seq as usize).is_some_and(|s| s.acked)
    }

    /// How many times `seq` has been transmitted.
    pub fn tx_count(&self, seq: u32) -> u32 {
        self.slots.get(seq as usize).map_or(0, |s| s.tx_count)
    }

    /// How many times `seq` has been transmitted beyond the first.
    pub fn retransmits(&self, seq: u32) -> u32 {
        self.tx_count(seq).saturating_sub(1)
    }

    /// Cumulative acknowledgement: everything below `ack_num` has arrived.
    ///
    /// Returns the number of newly acknowledged packets.  The caller must
    /// ensure `base < ack_num <= next_seq`.
    pub fn ack_through(&mut self, ack_num: u32, now: Instant) -> usize {
        debug_assert!(ack_num > self.base && ack_num <= self.next_seq);
        let mut newly = 0;
        for slot in &mut self.slots[self.base as usize..ack_num as usize] {
            if !slot.acked {
                slot.acked = true;
                slot.timer.disarm();
                newly += 1;
            }
        }
        self.base = ack_num;
        self.activity.arm(now);
        newly
    }

    /// Selective acknowledgement of exactly `seq`, then slide `base` over the
    /// contiguous acknowledged prefix.
    ///
    /// Returns `1` if `seq` was newly acknowledged, `0` otherwise.  The
    /// caller must ensure `seq < next_seq`.
    pub fn ack_one(&mut self, seq: u32, now: Instant) -> usize {
        debug_assert!(seq < self.next_seq);
        let slot = &mut self.slots[seq as usize];
        if slot.acked {
            return 0;
        }
        slot.acked = true;
        slot.timer.disarm();

        let before = self.base;
        while self.base < self.total() && self.slots[self.base as usize].acked {
            self.base += 1;
        }
        if self.base != before {
            self.activity.arm(now);
        }
        1
    }

    /// Unacknowledged sequence numbers in `[base, next_seq)`, in order.
    pub fn unacked_in_flight(&self) -> impl Iterator<Item = u32> + '_ {
        (self.base..self.next_seq).filter(move |&seq| !self.slots[seq as usize].acked)
    }

    /// `true` when nothing has been sent and no ACK has moved the window
    /// for longer than `rto`.
    pub fn activity_expired(&self, now: Instant, rto: Duration) -> bool {
        self.activity.expired(now, rto)
    }

    /// `true` when `seq` itself was last sent more than `rto` ago.
    pub fn packet_expired(&self, seq: u32, now: Instant, rto: Duration) -> bool {
        self.slots[seq as usize].timer.expired(now, rto)
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    /// START, `n` one-byte DATA packets, END.
    fn window(n: u32, window_size: u32) -> SendWindow {
        let mut packets = vec![Packet::start()];
        packets.extend((1..=n).map(|seq| Packet::data(seq, vec![seq as u8])));
        packets.push(Packet::end(n + 1));
        SendWindow::new(packets, window_size)
    }

    /// Transmit everything the window currently admits.
    fn fill(w: &mut SendWindow, now: Instant) -> Vec<u32> {
        let mut sent = Vec::new();
        while let Some(seq) = w.next_sendable() {
            w.record_sent(seq, now);
            sent.push(seq);
        }
        sent
    }

    #[test]
    fn initial_state() {
        let w = window(3, 4);
        assert_eq!(w.total(), 5);
        assert_eq!(w.end_seq(), 4);
        assert_eq!(w.base(), 0);
        assert_eq!(w.next_seq(), 0);
        assert_eq!(w.state(), ConnectionState::StartSent);
        assert!(!w.is_complete());
    }

    #[test]
    #[should_panic(expected = "window_size must be at least 1")]
    fn zero_window_rejected() {
        window(1, 0);
    }

    #[test]
    fn start_travels_alone() {
        let now = Instant::now();
        let mut w = window(5, 4);
        assert_eq!(fill(&mut w, now), vec![0]);
        assert_eq!(w.next_sendable(), None);
    }

    #[test]
    fn data_fills_window_after_start_acked() {
        let now = Instant::now();
        let mut w = window(5, 3);
        fill(&mut w, now);
        w.ack_through(1, now);
        assert_eq!(w.state(), ConnectionState::Established);
        assert_eq!(fill(&mut w, now), vec![1, 2, 3]);
        assert_eq!(w.outstanding(), 3);
    }

    #[test]
    fn end_waits_for_all_data() {
        let now = Instant::now();
        let mut w = window(2, 8);
        fill(&mut w, now);
        w.ack_through(1, now);
        assert_eq!(fill(&mut w, now), vec![1, 2]);
        w.ack_through(2, now);
        assert_eq!(w.next_sendable(), None);
        w.ack_through(3, now);
        assert_eq!(w.state(), ConnectionState::EndSent);
        assert_eq!(fill(&mut w, now), vec![3]);
        w.ack_through(4, now);
        assert!(w.is_complete());
        assert_eq!(w.state(), ConnectionState::Closed);
    }

    #[test]
    fn empty_stream_is_start_then_end() {
        let now = Instant::now();
        let mut w = SendWindow::new(vec![Packet::start(), Packet::end(1)], 4);
        assert_eq!(fill(&mut w, now), vec![0]);
        w.ack_one(0, now);
        assert_eq!(fill(&mut w, now), vec![1]);
        w.ack_one(1, now);
        assert!(w.is_complete());
    }

    #[test]
    fn outstanding_never_exceeds_window() {
        let now = Instant::now();
        for window_size in 1..=5 {
            let mut w = window(12, window_size);
            while !w.is_complete() {
                fill(&mut w, now);
                assert!(w.outstanding() <= window_size);
                let next = w.base() + 1;
                w.ack_through(next, now);
            }
        }
    }

    #[test]
    fn ack_through_counts_only_new() {
        let now = Instant::now();
        let mut w = window(4, 4);
        fill(&mut w, now);
        w.ack_through(1, now);
        fill(&mut w, now);
        w.ack_one(3, now);
        assert_eq!(w.ack_through(4, now), 2);
        assert_eq!(w.base(), 4);
    }

    #[test]
    fn ack_one_slides_over_contiguous_prefix() {
        let now = Instant::now();
        let mut w = window(4, 4);
        fill(&mut w, now);
        w.ack_one(0, now);
        fill(&mut w, now);

        assert_eq!(w.ack_one(3, now), 1);
        assert_eq!(w.base(), 1);
        assert_eq!(w.ack_one(2, now), 1);
        assert_eq!(w.base(), 1);
        assert_eq!(w.ack_one(1, now), 1);
        assert_eq!(w.base(), 4);
        assert_eq!(w.ack_one(1, now), 0);
    }

    #[test]
    fn unacked_in_flight_skips_acked() {
        let now = Instant::now();
        let mut w = window(4, 4);
        fill(&mut w, now);
        w.ack_one(0, now);
        fill(&mut w, now);
        w.ack_one(2, now);
        assert_eq!(w.unacked_in_flight().collect::<Vec<_>>(), vec![1, 3, 4]);
    }

    #[test]
    fn record_sent_counts_transmissions() {
        let now = Instant::now();
        let mut w = window(1, 1);
        fill(&mut w, now);
        w.record_sent(0, now);
        assert_eq!(w.tx_count(0), 2);
        assert_eq!(w.retransmits(0), 1);
        assert_eq!(w.next_seq(), 1);
    }

    #[test]
    fn timers_track_last_transmission() {
        let rto = Duration::from_millis(500);
        let t0 = Instant::now();
        let mut w = window(2, 2);
        fill(&mut w, t0);
        w.ack_one(0, t0);
        fill(&mut w, t0 + Duration::from_millis(300));

        let later = t0 + Duration::from_millis(700);
        assert!(!w.packet_expired(1, later, rto));
        assert!(!w.activity_expired(later, rto));
        let much_later = t0 + Duration::from_millis(900);
        assert!(w.packet_expired(1, much_later, rto));
        assert!(w.activity_expired(much_later, rto));
    }

    #[test]
    fn acked_packet_timer_is_disarmed() {
        let rto = Duration::from_millis(500);
        let t0 = Instant::now();
        let mut w = window(1, 1);
        fill(&mut w, t0);
        w.ack_one(0, t0);
        assert!(!w.packet_expired(0, t0 + Duration::from_secs(5), rto));
    }
}
