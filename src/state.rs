//! Connection lifecycle states.
//!
//! An RTP connection has no handshake beyond START/END, so the lifecycle is
//! much shorter than TCP's.  Both endpoints report their position with the
//! same [`ConnectionState`]; state transitions are driven by
//! [`crate::send_window`] and [`crate::receive_window`].
//!
//! ```text
//!  sender:    StartSent ──ACK(START)──▶ Established ──all DATA acked──▶ EndSent ──ACK(END)──▶ Closed
//!  receiver:  Listen ──START──▶ Established ──END in order──▶ TimeWait ──linger over──▶ Closed
//! ```

/// All positions a sender or receiver can occupy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionState {
    /// Receiver waiting for the first START.
    #[default]
    Listen,
    /// Sender has START in flight and nothing else.
    StartSent,
    /// START acknowledged (sender) or received (receiver); data flowing.
    Established,
    /// Every DATA packet acknowledged; END in flight.
    EndSent,
    /// Receiver saw END in order and is re-acknowledging END retransmissions.
    TimeWait,
    /// Transfer complete.
    Closed,
}

impl ConnectionState {
    /// `true` once the connection will exchange no more data.
    pub fn is_finished(self) -> bool {
        matches!(self, Self::TimeWait | Self::Closed)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Listen => "LISTEN",
            Self::StartSent => "START_SENT",
            Self::Established => "ESTABLISHED",
            Self::EndSent => "END_SENT",
            Self::TimeWait => "TIME_WAIT",
            Self::Closed => "CLOSED",
        };
        f.write_str(name)
    }
}
