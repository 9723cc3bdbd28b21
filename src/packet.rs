//! Wire-format definitions for RTP packets.
//!
//! Every datagram exchanged between peers is a [`Packet`].  This module is
//! responsible for:
//! - Defining the on-wire binary layout (four header fields, payload).
//! - Serialising a [`Packet`] into a byte buffer ready for transmission.
//! - Deserialising a raw datagram back into a [`Packet`], rejecting it when
//!   the checksum does not verify.
//!
//! No I/O happens here; this is pure data transformation.
//!
//! # Wire format
//!
//! All fields are unsigned 32-bit **big-endian** integers.
//!
//! ```text
//!  0               1               2               3
//!  0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                             Type                              |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                        Sequence Number                        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                        Payload Length                         |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                           Checksum                            |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                     Payload ... (DATA only)                   |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! Total header size: [`HEADER_LEN`] = 16 bytes.

use thiserror::Error;

use crate::checksum::checksum;

/// Byte length of the fixed-size header on the wire.
pub const HEADER_LEN: usize = 16;

/// Largest datagram a sender produces: 1500 MTU − 20 IP − 8 UDP.
pub const MAX_DATAGRAM: usize = 1472;

/// Largest DATA payload that fits in [`MAX_DATAGRAM`].
pub const MAX_CHUNK: usize = MAX_DATAGRAM - HEADER_LEN;

/// Size of the buffer every endpoint receives into.
pub const RECV_BUFFER: usize = 2048;

// Byte offsets of each field within the serialised header.
const OFF_TYPE: usize = 0;
const OFF_SEQ: usize = 4;
const OFF_LENGTH: usize = 8;
const OFF_CHECKSUM: usize = 12;

/// Discriminant carried in the `type` header field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    /// Opens the connection; always sequence number 0.
    Start = 0,
    /// Closes the connection; sequence number `N + 1`.
    End = 1,
    /// Carries one chunk of the byte stream.
    Data = 2,
    /// Acknowledgement; meaning of `seq_num` depends on the ARQ policy.
    Ack = 3,
}

impl TryFrom<u32> for PacketType {
    type Error = PacketError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Start),
            1 => Ok(Self::End),
            2 => Ok(Self::Data),
            3 => Ok(Self::Ack),
            other => Err(PacketError::UnknownType(other)),
        }
    }
}

impl std::fmt::Display for PacketType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Start => "START",
            Self::End => "END",
            Self::Data => "DATA",
            Self::Ack => "ACK",
        };
        f.write_str(name)
    }
}

/// Fixed-size protocol header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub packet_type: PacketType,
    pub seq_num: u32,
    /// Payload length in bytes.
    ///
    /// On encode this is computed from the actual payload length.
    pub length: u32,
    /// CRC-32 over the packet with this field zeroed.
    ///
    /// On encode this is computed and written last; on decode it is the
    /// verified value that was received.
    pub checksum: u32,
}

/// A complete protocol datagram: header + payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub header: Header,
    pub payload: Vec<u8>,
}

impl Packet {
    fn control(packet_type: PacketType, seq_num: u32) -> Self {
        Packet {
            header: Header {
                packet_type,
                seq_num,
                length: 0,
                checksum: 0,
            },
            payload: Vec::new(),
        }
    }

    /// The connection-opening packet (sequence number 0).
    pub fn start() -> Self {
        Self::control(PacketType::Start, 0)
    }

    /// The connection-closing packet.
    pub fn end(seq_num: u32) -> Self {
        Self::control(PacketType::End, seq_num)
    }

    /// An acknowledgement carrying `seq_num`.
    pub fn ack(seq_num: u32) -> Self {
        Self::control(PacketType::Ack, seq_num)
    }

    /// A data packet carrying `payload`.
    pub fn data(seq_num: u32, payload: Vec<u8>) -> Self {
        Packet {
            header: Header {
                packet_type: PacketType::Data,
                seq_num,
                length: payload.len() as u32,
                checksum: 0,
            },
            payload,
        }
    }

    /// Serialise this packet into a newly allocated byte vector.
    ///
    /// `header.length` and `header.checksum` are computed from the actual
    /// payload; any values already stored in those fields are ignored.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![0u8; HEADER_LEN + self.payload.len()];

        buf[OFF_TYPE..OFF_TYPE + 4]
            .copy_from_slice(&(self.header.packet_type as u32).to_be_bytes());
        buf[OFF_SEQ..OFF_SEQ + 4].copy_from_slice(&self.header.seq_num.to_be_bytes());
        buf[OFF_LENGTH..OFF_LENGTH + 4]
            .copy_from_slice(&(self.payload.len() as u32).to_be_bytes());
        // Checksum field stays zero while computing the checksum.
        buf[HEADER_LEN..].copy_from_slice(&self.payload);

        let csum = checksum(&buf);
        buf[OFF_CHECKSUM..OFF_CHECKSUM + 4].copy_from_slice(&csum.to_be_bytes());

        buf
    }

    /// Parse a [`Packet`] from one received datagram.
    ///
    /// The payload is the `length` bytes following the header, clamped to
    /// what was actually received; a short datagram then fails the checksum.
    ///
    /// Returns [`Err`] if:
    /// - `buf` is shorter than [`HEADER_LEN`],
    /// - the checksum does not verify, or
    /// - the type field is not a known [`PacketType`].
    pub fn decode(buf: &[u8]) -> Result<Self, PacketError> {
        if buf.len() < HEADER_LEN {
            return Err(PacketError::BufferTooShort(buf.len()));
        }

        let raw_type = read_u32(buf, OFF_TYPE);
        let seq_num = read_u32(buf, OFF_SEQ);
        let length = read_u32(buf, OFF_LENGTH);
        let received = read_u32(buf, OFF_CHECKSUM);

        let end = HEADER_LEN
            .saturating_add(length as usize)
            .min(buf.len());

        // Verify checksum: zero the stored field, recompute, compare.
        let mut scratch = buf[..end].to_vec();
        scratch[OFF_CHECKSUM..OFF_CHECKSUM + 4].fill(0);
        let computed = checksum(&scratch);
        if computed != received {
            return Err(PacketError::ChecksumMismatch { received, computed });
        }

        Ok(Packet {
            header: Header {
                packet_type: PacketType::try_from(raw_type)?,
                seq_num,
                length,
                checksum: received,
            },
            payload: buf[HEADER_LEN..end].to_vec(),
        })
    }
}

fn read_u32(buf: &[u8], offset: usize) -> u32 {
    let mut field = [0u8; 4];
    field.copy_from_slice(&buf[offset..offset + 4]);
    u32::from_be_bytes(field)
}

/// Reasons a received datagram is rejected.
///
/// None of these are fatal: the caller drops the datagram and relies on the
/// peer's retransmission timer.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PacketError {
    #[error("datagram of {0} bytes is too short to contain a header")]
    BufferTooShort(usize),
    #[error("checksum mismatch: received {received:#010x}, computed {computed:#010x}")]
    ChecksumMismatch { received: u32, computed: u32 },
    #[error("unknown packet type {0}")]
    UnknownType(u32),
}
