//! Live and historical time-and-sales tick streams.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crate::error::{Error, Result};
use crate::frame::Frame;
use crate::types::{Exchange, Price, Trade, TradeStatus};
use crate::vbyte;

use super::MessageType;

/// The scale the vendor decoder divides accumulated tick prices by before
/// display. Every currently known code prefix resolves to `1`; this helper
/// exists so a future prefix that needs a different scale has a single call
/// site to change.
fn base_price_scale(_code: &str) -> i64 {
    1
}

/// Builds a live tick-stream request frame for up to 800 records starting
/// at `start`.
///
/// Layout: `exchange(1) | code(6) | start(2,LE) | count(2,LE)`.
pub fn request(
    msg_id: u32,
    exchange: Exchange,
    code: &str,
    start: u16,
    count: u16,
) -> Result<Frame> {
    if count > 800 {
        return Err(Error::invalid_argument("trade request count must be <= 800"));
    }
    let mut data = vec![exchange.wire_tag()];
    data.extend_from_slice(code.as_bytes());
    data.extend_from_slice(&start.to_le_bytes());
    data.extend_from_slice(&count.to_le_bytes());
    Ok(Frame::new(msg_id, 0x01, MessageType::MinuteTrade as u16, data))
}

/// Builds a historical tick-stream request frame for `date`.
///
/// Layout: `date(4,LE,YYYYMMDD) | exchange(1) | code(6) | start(2,LE) |
/// count(2,LE)`.
pub fn history_request(
    msg_id: u32,
    date: NaiveDate,
    exchange: Exchange,
    code: &str,
    start: u16,
    count: u16,
) -> Result<Frame> {
    if count > 800 {
        return Err(Error::invalid_argument("trade request count must be <= 800"));
    }
    let yyyymmdd: u32 = date.format("%Y%m%d").to_string().parse().unwrap_or(0);
    let mut data = yyyymmdd.to_le_bytes().to_vec();
    data.push(exchange.wire_tag());
    data.extend_from_slice(code.as_bytes());
    data.extend_from_slice(&start.to_le_bytes());
    data.extend_from_slice(&count.to_le_bytes());
    Ok(Frame::new(msg_id, 0x01, MessageType::HistoryTrade as u16, data))
}

/// Converts a raw two-byte little-endian "minutes since midnight" field
/// into a time of day.
fn hhmm_to_time(minutes_since_midnight: i64) -> NaiveTime {
    let hh = (minutes_since_midnight / 60).clamp(0, 23) as u32;
    let mm = (minutes_since_midnight % 60).clamp(0, 59) as u32;
    NaiveTime::from_hms_opt(hh, mm, 0).unwrap_or_default()
}

/// Decodes a live tick-stream response. Each record carries its own trade
/// count (`number`); historical records do not, see [`history_decode`].
///
/// The response opens with a `uint16` record count before the per-record
/// data.
pub fn decode(data: &[u8], date: NaiveDate, code: &str) -> Result<Vec<Trade>> {
    if data.len() < 2 {
        return Err(Error::protocol("trade response shorter than the leading count field"));
    }
    let scale = base_price_scale(code);
    let mut cursor = &data[2..];
    let mut running_price: i64 = 0;
    let mut out = Vec::new();
    while cursor.len() >= 2 {
        let mut hhmm_bytes = [0u8; 2];
        hhmm_bytes.copy_from_slice(&cursor[..2]);
        cursor = &cursor[2..];
        let hhmm = i64::from(u16::from_le_bytes(hhmm_bytes));
        let (rest, delta) = vbyte::decode(cursor);
        cursor = rest;
        running_price += delta * 10;
        let (rest, volume) = vbyte::decode(cursor);
        cursor = rest;
        let (rest, number) = vbyte::decode(cursor);
        cursor = rest;
        let (rest, status) = vbyte::decode(cursor);
        cursor = rest;
        let (rest, _unused) = vbyte::decode(cursor);
        cursor = rest;

        out.push(Trade {
            time: NaiveDateTime::new(date, hhmm_to_time(hhmm)),
            price: Price(running_price / scale),
            volume,
            status: TradeStatus::from_wire(status),
            number,
        });
    }
    Ok(out)
}

/// Decodes a historical tick-stream response. One fewer field per record
/// than [`decode`]: no per-record trade count.
///
/// The response opens with a `uint16` record count before the per-record
/// data.
pub fn history_decode(data: &[u8], date: NaiveDate, code: &str) -> Result<Vec<Trade>> {
    if data.len() < 2 {
        return Err(Error::protocol("history trade response shorter than the leading count field"));
    }
    let scale = base_price_scale(code);
    let mut cursor = &data[2..];
    let mut running_price: i64 = 0;
    let mut out = Vec::new();
    while cursor.len() >= 2 {
        let mut hhmm_bytes = [0u8; 2];
        hhmm_bytes.copy_from_slice(&cursor[..2]);
        cursor = &cursor[2..];
        let hhmm = i64::from(u16::from_le_bytes(hhmm_bytes));
        let (rest, delta) = vbyte::decode(cursor);
        cursor = rest;
        running_price += delta * 10;
        let (rest, volume) = vbyte::decode(cursor);
        cursor = rest;
        let (rest, status) = vbyte::decode(cursor);
        cursor = rest;
        let (rest, _unused) = vbyte::decode(cursor);
        cursor = rest;

        out.push(Trade {
            time: NaiveDateTime::new(date, hhmm_to_time(hhmm)),
            price: Price(running_price / scale),
            volume,
            status: TradeStatus::from_wire(status),
            number: 0,
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_rejects_oversize_count() {
        assert!(request(1, Exchange::Sh, "600000", 0, 801).is_err());
    }

    #[test]
    fn history_request_prepends_date_before_exchange() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let f = history_request(1, date, Exchange::Sh, "600000", 0, 100).unwrap();
        assert_eq!(&f.data[0..4], &20_240_301u32.to_le_bytes());
        assert_eq!(f.data[4], Exchange::Sh.wire_tag());
    }

    #[test]
    fn decode_empty_is_empty() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert!(decode(&0u16.to_le_bytes(), date, "600000").unwrap().is_empty());
    }

    #[test]
    fn hhmm_is_minutes_since_midnight() {
        assert_eq!(hhmm_to_time(9 * 60 + 31), NaiveTime::from_hms_opt(9, 31, 0).unwrap());
    }

    #[test]
    fn decode_reads_minutes_since_midnight_as_raw_u16() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let mut data = 1u16.to_le_bytes().to_vec();
        data.extend_from_slice(&(9 * 60 + 31u16).to_le_bytes());
        data.extend_from_slice(&[10, 5, 3, 0, 0]);
        let trades = decode(&data, date, "600000").unwrap();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].time.time(), NaiveTime::from_hms_opt(9, 31, 0).unwrap());
    }
}
