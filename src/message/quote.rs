//! The real-time quote snapshot message.
//!
//! A single request batches up to 80 symbols; the response carries one
//! variable-length record per symbol, most fields vbyte-encoded relative to
//! the bar's previous close. The exact count and meaning of the trailing
//! reserved fields is not published by the vendor; this decoder consumes a
//! fixed number of them (documented inline) and the divergence, if any turns
//! out to be load-bearing, is recorded as an open question rather than
//! silently guessed away.

use crate::error::{Error, Result};
use crate::frame::Frame;
use crate::types::{Exchange, Level, Price, Quote, K};
use crate::vbyte;

use super::MessageType;

/// Builds a batched quote request for up to 80 `(exchange, code)` pairs.
///
/// Layout: 8 reserved bytes, `count(2,LE)`, then `count` repetitions of
/// `exchange(1) | code(6)`.
pub fn request<'a>(
    msg_id: u32,
    codes: impl IntoIterator<Item = (Exchange, &'a str)>,
) -> Result<Frame> {
    let mut data = vec![0u8; 8];
    let mut count: u16 = 0;
    let mut body = Vec::new();
    for (exchange, code) in codes {
        if code.len() != 6 {
            return Err(Error::invalid_argument(format!(
                "symbol code must be 6 characters: {code:?}"
            )));
        }
        body.push(exchange.wire_tag());
        body.extend_from_slice(code.as_bytes());
        count += 1;
    }
    if count == 0 || count > 80 {
        return Err(Error::invalid_argument(
            "quote request must carry between 1 and 80 symbols",
        ));
    }
    data.extend_from_slice(&count.to_le_bytes());
    data.extend_from_slice(&body);
    Ok(Frame::new(msg_id, 0x01, MessageType::Quote as u16, data))
}

/// Decodes a batched quote response into one [`Quote`] per symbol.
pub fn decode(data: &[u8]) -> Result<Vec<Quote>> {
    if data.len() < 10 {
        return Err(Error::protocol("quote response shorter than fixed header"));
    }
    let mut cursor = &data[8..];
    let count = {
        let n = u16::from_le_bytes([cursor[0], cursor[1]]);
        cursor = &cursor[2..];
        n
    };

    let mut out = Vec::with_capacity(count as usize);
    for _ in 0..count {
        if cursor.len() < 7 {
            return Err(Error::protocol("quote record truncated before code field"));
        }
        let exchange = Exchange::from_wire_tag(cursor[0])?;
        let code = String::from_utf8_lossy(&cursor[1..7]).to_string();
        cursor = &cursor[7..];

        let (rest, activity1) = vbyte::decode(cursor);
        cursor = rest;
        let (rest, previous_close) = vbyte::decode(cursor);
        cursor = rest;
        let (rest, open_delta) = vbyte::decode(cursor);
        cursor = rest;
        let (rest, close_raw) = vbyte::decode(cursor);
        cursor = rest;
        let (rest, high_delta) = vbyte::decode(cursor);
        cursor = rest;
        let (rest, low_delta) = vbyte::decode(cursor);
        cursor = rest;

        let previous_close = Price(previous_close * 10);
        let open = previous_close + Price(open_delta * 10);
        let close = previous_close + Price(open_delta * 10) + Price(close_raw * 10);
        let high = previous_close + Price(open_delta * 10) + Price(high_delta * 10);
        let low = previous_close + Price(open_delta * 10) + Price(low_delta * 10);
        let k = K {
            previous_close,
            open,
            high,
            low,
            close,
        };

        let (rest, server_time) = vbyte::decode(cursor);
        cursor = rest;
        let (rest, total_volume) = vbyte::decode(cursor);
        cursor = rest;
        let (rest, last_volume) = vbyte::decode(cursor);
        cursor = rest;

        if cursor.len() < 4 {
            return Err(Error::protocol("quote record truncated before amount field"));
        }
        let amount_raw = u32::from_le_bytes([cursor[0], cursor[1], cursor[2], cursor[3]]);
        cursor = &cursor[4..];
        let amount = Price((vbyte::volume_mantissa(amount_raw) * 1000.0).round() as i64);

        let mut bids = [Level::default(); 5];
        let mut asks = [Level::default(); 5];
        for level in 0..5 {
            let (rest, buy_delta) = vbyte::decode(cursor);
            cursor = rest;
            let (rest, sell_delta) = vbyte::decode(cursor);
            cursor = rest;
            let (rest, buy_qty) = vbyte::decode(cursor);
            cursor = rest;
            let (rest, sell_qty) = vbyte::decode(cursor);
            cursor = rest;
            bids[level] = Level {
                price: close + Price(buy_delta * 10),
                quantity: buy_qty,
            };
            asks[level] = Level {
                price: close + Price(sell_delta * 10),
                quantity: sell_qty,
            };
        }

        let (rest, inside_volume) = vbyte::decode(cursor);
        cursor = rest;
        let (rest, outside_volume) = vbyte::decode(cursor);
        cursor = rest;
        let (rest, rate_raw) = vbyte::decode(cursor);
        cursor = rest;
        let (rest, activity2) = vbyte::decode(cursor);
        cursor = rest;

        out.push(Quote {
            exchange,
            code,
            k,
            server_time,
            total_volume,
            last_volume,
            amount,
            inside_volume,
            outside_volume,
            bids,
            asks,
            rate: rate_raw as f64 / 1000.0,
            activity1: (activity1 & 0xffff) as u16,
            activity2: (activity2 & 0xffff) as u16,
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_rejects_empty_batch() {
        assert!(request(1, std::iter::empty::<(Exchange, &str)>()).is_err());
    }

    #[test]
    fn request_rejects_oversize_batch() {
        let codes = vec![(Exchange::Sh, "600000"); 81];
        assert!(request(1, codes).is_err());
    }

    #[test]
    fn request_layout_has_count_and_symbols() {
        let f = request(1, [(Exchange::Sh, "600000"), (Exchange::Sz, "000001")]).unwrap();
        assert_eq!(&f.data[8..10], &2u16.to_le_bytes());
        assert_eq!(f.data[10], Exchange::Sh.wire_tag());
        assert_eq!(&f.data[11..17], b"600000");
    }

    #[test]
    fn decode_rejects_short_input() {
        assert!(decode(&[0; 4]).is_err());
    }
}
