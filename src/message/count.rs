//! The per-exchange tradable-symbol count.

use crate::error::{Error, Result};
use crate::frame::Frame;
use crate::types::Exchange;

use super::MessageType;

/// Builds the count request frame for `exchange`.
///
/// Payload: the exchange tag byte, a zero pad byte, then four bytes whose
/// meaning the vendor never documented (`75 c7 33 01`); they are constant
/// across every known server and are reproduced verbatim.
#[must_use]
pub fn request(msg_id: u32, exchange: Exchange) -> Frame {
    let data = vec![exchange.wire_tag(), 0x00, 0x75, 0xc7, 0x33, 0x01];
    Frame::new(msg_id, 0x01, MessageType::Count as u16, data)
}

/// Decodes the count response: a single little-endian `u16`.
pub fn decode(data: &[u8]) -> Result<u16> {
    if data.len() < 2 {
        return Err(Error::protocol("count response shorter than 2 bytes"));
    }
    Ok(u16::from_le_bytes([data[0], data[1]]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_layout_matches_known_trailer() {
        let f = request(1, Exchange::Sh);
        assert_eq!(f.data, vec![1, 0x00, 0x75, 0xc7, 0x33, 0x01]);
    }

    #[test]
    fn decode_reads_little_endian_count() {
        assert_eq!(decode(&[0x10, 0x27]).unwrap(), 10000);
    }

    #[test]
    fn decode_rejects_empty() {
        assert!(decode(&[]).is_err());
    }
}
