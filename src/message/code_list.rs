//! The paged tradable-symbol catalog listing.

use crate::error::{Error, Result};
use crate::frame::Frame;
use crate::types::{Code, Exchange};
use crate::vbyte;

use super::MessageType;

/// Records per page. The server always returns up to this many starting at
/// `start`; callers page by incrementing `start` by this amount.
pub const PAGE_SIZE: u16 = 1000;

const RECORD_LEN: usize = 29;

/// Builds a catalog page request frame for `exchange` starting at record
/// index `start`.
///
/// Layout: `exchange(1) | start(2,LE)`.
#[must_use]
pub fn request(msg_id: u32, exchange: Exchange, start: u16) -> Frame {
    let mut data = vec![exchange.wire_tag()];
    data.extend_from_slice(&start.to_le_bytes());
    Frame::new(msg_id, 0x01, MessageType::CodeList as u16, data)
}

/// Decodes a page of catalog records for `exchange`.
///
/// The response opens with a `uint16` record count (redundant with the
/// caller already knowing how many it asked for, but present on the wire),
/// followed by that many 29-byte records: `code(6) | multiplier(2,LE) |
/// name(8,GBK) | pad(4) | decimal(1) | last_price(4, mantissa-packed) |
/// pad(4)`.
pub fn decode(data: &[u8], exchange: Exchange) -> Result<Vec<Code>> {
    if data.len() < 2 {
        return Err(Error::protocol("catalog page shorter than the leading count field"));
    }
    let records = &data[2..];
    let mut out = Vec::with_capacity(records.len() / RECORD_LEN);
    for chunk in records.chunks(RECORD_LEN) {
        if chunk.len() < RECORD_LEN {
            break;
        }
        let code = ascii_field(&chunk[0..6]);
        let multiplier = u16::from_le_bytes([chunk[6], chunk[7]]);
        let (name, _, _) = encoding_rs::GBK.decode(&chunk[8..16]);
        let name = name.trim_end_matches('\0').trim().to_string();
        let decimal = chunk[20] as i8;
        let last_raw = u32::from_le_bytes([chunk[21], chunk[22], chunk[23], chunk[24]]);
        let last_price = vbyte::volume_mantissa(last_raw);

        out.push(Code {
            code,
            name,
            exchange,
            multiplier,
            decimal,
            last_price,
        });
    }
    if out.is_empty() && !records.is_empty() {
        return Err(Error::protocol("catalog page shorter than one record"));
    }
    Ok(out)
}

fn ascii_field(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_end_matches('\0')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(code: &str, decimal: i8) -> Vec<u8> {
        let mut r = vec![0u8; RECORD_LEN];
        r[0..6].copy_from_slice(code.as_bytes());
        r[6..8].copy_from_slice(&100u16.to_le_bytes());
        r[20] = decimal as u8;
        r
    }

    #[test]
    fn decode_splits_records_by_fixed_length() {
        let mut data = 2u16.to_le_bytes().to_vec();
        data.extend(record("600000", 2));
        data.extend(record("000001", 2));
        let out = decode(&data, Exchange::Sh).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].code, "600000");
        assert_eq!(out[1].code, "000001");
        assert_eq!(out[0].multiplier, 100);
    }

    #[test]
    fn decode_empty_page_is_empty() {
        assert_eq!(decode(&0u16.to_le_bytes(), Exchange::Sh).unwrap().len(), 0);
    }

    #[test]
    fn request_layout() {
        let f = request(1, Exchange::Sz, 500);
        assert_eq!(f.data, vec![0, 0xf4, 0x01]);
    }
}
