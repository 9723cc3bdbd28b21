//! Retransmission timing.
//!
//! RTP uses a fixed retransmission timeout (no RTT estimation, no back-off).
//! This module provides:
//! - [`TimerConfig`] — the timing knobs of a sender: timeout, how long one
//!   loop iteration may wait for an ACK, and an optional give-up cap.
//! - [`RetransmitTimer`] — a one-shot deadline armed at the last
//!   transmission.  The cumulative policy keeps one per window, the
//!   selective policy one per packet.

use std::time::{Duration, Instant};

use crate::policy::Variant;

/// Fixed retransmission timeout used by both policies.
pub const DEFAULT_RTO: Duration = Duration::from_millis(500);

/// Timing parameters of a sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerConfig {
    /// Time without progress before unacknowledged packets are resent.
    pub rto: Duration,
    /// Upper bound on a single wait for an inbound ACK.  The retransmission
    /// check runs at least this often.
    pub poll_interval: Duration,
    /// Give up once the packet at the window base has been retransmitted
    /// more than this many times.  `None` retries forever.
    pub max_retransmits: Option<u32>,
}

impl TimerConfig {
    /// Default timings for `variant`.
    pub fn for_variant(variant: Variant) -> Self {
        let poll_interval = match variant {
            Variant::Cumulative => Duration::from_millis(100),
            Variant::Selective => Duration::from_millis(50),
        };
        Self {
            rto: DEFAULT_RTO,
            poll_interval,
            max_retransmits: None,
        }
    }
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self::for_variant(Variant::Cumulative)
    }
}

/// A one-shot deadline measured from the last time it was armed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetransmitTimer {
    armed_at: Option<Instant>,
}

impl RetransmitTimer {
    /// Restart the timer at `now`.
    pub fn arm(&mut self, now: Instant) {
        self.armed_at = Some(now);
    }

    pub fn disarm(&mut self) {
        self.armed_at = None;
    }

    pub fn is_armed(&self) -> bool {
        self.armed_at.is_some()
    }

    /// `true` when the timer is armed and strictly more than `rto` has
    /// elapsed since it was armed.
    pub fn expired(&self, now: Instant, rto: Duration) -> bool {
        match self.armed_at {
            Some(at) => now.saturating_duration_since(at) > rto,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_variant() {
        let base = TimerConfig::for_variant(Variant::Cumulative);
        let opt = TimerConfig::for_variant(Variant::Selective);
        assert_eq!(base.rto, Duration::from_millis(500));
        assert_eq!(opt.rto, Duration::from_millis(500));
        assert_eq!(base.poll_interval, Duration::from_millis(100));
        assert_eq!(opt.poll_interval, Duration::from_millis(50));
        assert_eq!(base.max_retransmits, None);
        assert_eq!(TimerConfig::default(), base);
    }

    #[test]
    fn disarmed_timer_never_expires() {
        let t = RetransmitTimer::default();
        assert!(!t.is_armed());
        assert!(!t.expired(Instant::now() + Duration::from_secs(60), DEFAULT_RTO));
    }

    #[test]
    fn expires_strictly_after_rto() {
        let start = Instant::now();
        let mut t = RetransmitTimer::default();
        t.arm(start);
        assert!(!t.expired(start + DEFAULT_RTO, DEFAULT_RTO));
        assert!(t.expired(start + DEFAULT_RTO + Duration::from_millis(1), DEFAULT_RTO));
    }

    #[test]
    fn rearm_restarts_deadline() {
        let start = Instant::now();
        let mut t = RetransmitTimer::default();
        t.arm(start);
        t.arm(start + Duration::from_millis(400));
        assert!(!t.expired(start + Duration::from_millis(600), DEFAULT_RTO));
        t.disarm();
        assert!(!t.expired(start + Duration::from_secs(5), DEFAULT_RTO));
    }
}
