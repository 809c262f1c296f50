//! Live and historical one-minute time-and-sales ladders.
//!
//! Both response shapes are a fixed 240-record grid (one per trading
//! minute); the grid's absolute times are reconstructed from a running
//! cursor rather than read off the wire, since the server does not send a
//! timestamp per record.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};

use crate::error::{Error, Result};
use crate::frame::Frame;
use crate::types::{Exchange, Price};
use crate::vbyte;

use super::MessageType;

const RECORDS: usize = 240;
const MORNING_RECORDS: usize = 120;

/// One minute's trade summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MinuteBar {
    pub time: NaiveDateTime,
    pub price: Price,
    pub volume: i64,
}

/// Builds a live-minute-data request frame.
///
/// Layout: `exchange(1) | code(6)`.
#[must_use]
pub fn request(msg_id: u32, exchange: Exchange, code: &str) -> Frame {
    let mut data = vec![exchange.wire_tag()];
    data.extend_from_slice(code.as_bytes());
    Frame::new(msg_id, 0x01, MessageType::Minute as u16, data)
}

/// Builds a historical-minute-data request frame for `date`.
///
/// Layout: `date(4,LE,YYYYMMDD) | exchange(1) | code(6)`.
#[must_use]
pub fn history_request(msg_id: u32, date: NaiveDate, exchange: Exchange, code: &str) -> Frame {
    let yyyymmdd: u32 = date.format("%Y%m%d").to_string().parse().unwrap_or(0);
    let mut data = yyyymmdd.to_le_bytes().to_vec();
    data.push(exchange.wire_tag());
    data.extend_from_slice(code.as_bytes());
    Frame::new(msg_id, 0x01, MessageType::HistoryMinute as u16, data)
}

fn grid_times(date: NaiveDate, start: NaiveTime, jump: Duration) -> Vec<NaiveDateTime> {
    let mut times = Vec::with_capacity(RECORDS);
    let base = NaiveDateTime::new(date, start);
    for i in 0..RECORDS {
        let mut t = base + Duration::minutes(i as i64);
        if i >= MORNING_RECORDS {
            t += jump;
        }
        times.push(t);
    }
    times
}

/// Decodes a live minute-data response: absolute price and volume per
/// record, the morning session starting `09:00` and the afternoon session
/// starting two hours after the 120th record's nominal time.
///
/// The response opens with a `uint16` record count followed by 4 reserved
/// bytes before the per-record data.
pub fn decode(data: &[u8], date: NaiveDate) -> Result<Vec<MinuteBar>> {
    if data.len() < 6 {
        return Err(Error::protocol("minute response shorter than fixed header"));
    }
    let times = grid_times(date, NaiveTime::from_hms_opt(9, 0, 0).unwrap(), Duration::hours(2));
    let mut cursor = &data[6..];
    let mut out = Vec::with_capacity(RECORDS);
    for &time in &times {
        if cursor.is_empty() {
            break;
        }
        let (rest, price_raw) = vbyte::decode(cursor);
        cursor = rest;
        let (rest, volume) = vbyte::decode(cursor);
        cursor = rest;
        let (rest, _number) = vbyte::decode(cursor);
        cursor = rest;
        out.push(MinuteBar {
            time,
            price: Price(price_raw * 10),
            volume,
        });
    }
    if out.is_empty() {
        return Err(Error::protocol("minute response carried no records"));
    }
    Ok(out)
}

/// Decodes a historical minute-data response.
///
/// Each record's price is a delta accumulated onto a running total (the
/// server never resends the absolute price); a second price field is read
/// and discarded, mirroring the vendor decoder, which treats it as unused.
/// The morning session starts `09:30` and the afternoon ninety minutes
/// after the 120th record's nominal time.
///
/// The response opens with a `uint16` record count followed by 4 reserved
/// bytes before the per-record data.
pub fn history_decode(data: &[u8], date: NaiveDate) -> Result<Vec<MinuteBar>> {
    if data.len() < 6 {
        return Err(Error::protocol("history minute response shorter than fixed header"));
    }
    let times = grid_times(
        date,
        NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
        Duration::minutes(90),
    );
    let mut cursor = &data[6..];
    let mut out = Vec::with_capacity(RECORDS);
    let mut running = 0i64;
    for &time in &times {
        if cursor.is_empty() {
            break;
        }
        let (rest, delta) = vbyte::decode(cursor);
        cursor = rest;
        running += delta;
        let (rest, _unused) = vbyte::decode(cursor);
        cursor = rest;
        out.push(MinuteBar {
            time,
            price: Price(running * 10),
            volume: 0,
        });
    }
    if out.is_empty() {
        return Err(Error::protocol("history minute response carried no records"));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_layout_is_exchange_then_code() {
        let f = request(1, Exchange::Sh, "600000");
        assert_eq!(f.data, [&[0u8][..], b"600000"].concat());
    }

    #[test]
    fn history_request_prepends_date() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let f = history_request(1, date, Exchange::Sz, "000001");
        assert_eq!(&f.data[0..4], &20_240_102u32.to_le_bytes());
        assert_eq!(f.data[4], Exchange::Sz.wire_tag());
    }

    #[test]
    fn afternoon_session_starts_at_thirteen_hundred() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let times = grid_times(date, NaiveTime::from_hms_opt(9, 0, 0).unwrap(), Duration::hours(2));
        assert_eq!(times[120].time(), NaiveTime::from_hms_opt(13, 0, 0).unwrap());
    }

    #[test]
    fn decode_rejects_empty_input() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        assert!(decode(&[], date).is_err());
    }

    #[test]
    fn decode_skips_leading_count_and_reserved_bytes() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let mut data = 1u16.to_le_bytes().to_vec();
        data.extend_from_slice(&[0u8; 4]);
        data.extend_from_slice(&[10, 5, 3]);
        let bars = decode(&data, date).unwrap();
        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].price, Price(100));
        assert_eq!(bars[0].volume, 5);
    }
}
