//! Integrity checksum shared by every packet on the wire.
//!
//! Both endpoints must compute the value identically: over the encoded
//! packet with the checksum field zeroed.  The algorithm is CRC-32 with the
//! ISO-HDLC parameters (the polynomial used by zlib's `crc32`).  It catches
//! accidental bit errors; it is not a cryptographic MAC.

use crc::{Crc, CRC_32_ISO_HDLC};

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Compute the checksum of `data`.
///
/// The caller must zero any checksum field within `data` first.
pub fn checksum(data: &[u8]) -> u32 {
    CRC32.checksum(data)
}
