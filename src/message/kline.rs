//! K-line (OHLCV bar) request/response codec.
//!
//! Bars chain: each bar's absolute prices are reconstructed from deltas
//! relative to a running `last` price carried *across* bars, not just
//! within one bar, so decoding is inherently sequential over the whole page.

use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime};

use crate::error::{Error, Result};
use crate::frame::Frame;
use crate::types::{Exchange, K, KlineBar, Period, Price};
use crate::vbyte;

use super::MessageType;

/// Maximum bars the server will return in a single page.
pub const MAX_COUNT: u16 = 800;

/// Builds a K-line request frame.
///
/// Layout: `exchange(1) | 0 | code(6) | period(1) | 0 | 0x01 | 0 |
/// start(2,LE) | count(2,LE) | reserved(10)`.
pub fn request(
    msg_id: u32,
    exchange: Exchange,
    code: &str,
    period: Period,
    start: u16,
    count: u16,
) -> Result<Frame> {
    if count > MAX_COUNT {
        return Err(Error::invalid_argument(format!(
            "kline request count must be <= {MAX_COUNT}"
        )));
    }
    let mut data = vec![exchange.wire_tag(), 0x00];
    data.extend_from_slice(code.as_bytes());
    data.push(period.wire_type());
    data.extend_from_slice(&[0x00, 0x01, 0x00]);
    data.extend_from_slice(&start.to_le_bytes());
    data.extend_from_slice(&count.to_le_bytes());
    data.extend_from_slice(&[0u8; 10]);
    Ok(Frame::new(msg_id, 0x01, MessageType::Kline as u16, data))
}

/// Reconstructs a bar's absolute timestamp.
///
/// Intraday periods pack `year_month_day(2,LE)` then `hour_minute(2,LE)`,
/// where `year = base >> 11 + 2004`, `month = base % 2048 / 100`, `day =
/// base % 2048 % 100`, and `hour_minute` is minutes since midnight. Daily
/// and coarser periods pack a plain `YYYYMMDD(4,LE)` and are stamped at the
/// exchange's `15:00` local close.
pub fn decode_time(bytes: &[u8; 4], period: Period) -> NaiveDateTime {
    if period.is_intraday() {
        let ymd = u16::from_le_bytes([bytes[0], bytes[1]]) as u32;
        let hm = u16::from_le_bytes([bytes[2], bytes[3]]) as i64;
        let year = (ymd >> 11) + 2004;
        let month = (ymd % 2048) / 100;
        let day = (ymd % 2048) % 100;
        let date = NaiveDate::from_ymd_opt(year as i32, month.max(1), day.max(1))
            .unwrap_or_else(|| NaiveDate::from_ymd_opt(2004, 1, 1).unwrap());
        let time = NaiveTime::from_hms_opt((hm / 60).clamp(0, 23) as u32, (hm % 60).clamp(0, 59) as u32, 0)
            .unwrap_or_default();
        NaiveDateTime::new(date, time)
    } else {
        let ymd = u32::from_le_bytes(*bytes);
        let year = ymd / 10000;
        let month = (ymd / 100) % 100;
        let day = ymd % 100;
        let date = NaiveDate::from_ymd_opt(year as i32, month.max(1), day.max(1))
            .unwrap_or_else(|| NaiveDate::from_ymd_opt(2004, 1, 1).unwrap());
        NaiveDateTime::new(date, NaiveTime::from_hms_opt(15, 0, 0).unwrap())
    }
}

/// Decodes a page of K-line bars.
///
/// The response opens with a `uint16` bar count before the per-bar records.
/// `last` seeds the price chain (the close of the bar immediately before
/// this page, or `0` for the oldest page); returns the decoded bars and the
/// chain's final close, so a paging caller can feed it into the next call.
pub fn decode(data: &[u8], period: Period, is_index: bool, mut last: i64) -> Result<(Vec<KlineBar>, i64)> {
    if data.len() < 2 {
        return Err(Error::protocol("kline page shorter than the leading count field"));
    }
    let mut cursor = &data[2..];
    let mut out = Vec::new();
    while cursor.len() >= 4 {
        let mut time_bytes = [0u8; 4];
        time_bytes.copy_from_slice(&cursor[..4]);
        cursor = &cursor[4..];
        let time = decode_time(&time_bytes, period);

        let (rest, open_raw) = vbyte::decode(cursor);
        cursor = rest;
        let (rest, close_raw) = vbyte::decode(cursor);
        cursor = rest;
        let (rest, high_raw) = vbyte::decode(cursor);
        cursor = rest;
        let (rest, low_raw) = vbyte::decode(cursor);
        cursor = rest;

        let previous_close = Price(last * 10);
        let open = Price(last * 10 + open_raw * 10);
        let close = Price(last * 10 + open_raw * 10 + close_raw * 10);
        let high = Price(last * 10 + open_raw * 10 + high_raw * 10);
        let low = Price(last * 10 + open_raw * 10 + low_raw * 10);
        last = last + open_raw + close_raw;

        let (rest, volume_raw) = vbyte::decode(cursor);
        cursor = rest;
        let mut volume = volume_raw;
        if period.is_intraday() {
            volume /= 100;
        }
        if is_index {
            volume *= 100;
        }

        if cursor.len() < 4 {
            return Err(Error::protocol("kline bar truncated before amount field"));
        }
        let amount_raw = u32::from_le_bytes([cursor[0], cursor[1], cursor[2], cursor[3]]);
        cursor = &cursor[4..];
        let amount = Price((vbyte::volume_mantissa(amount_raw) * 1000.0).round() as i64);

        let (up_count, down_count) = if is_index {
            if cursor.len() < 4 {
                return Err(Error::protocol("index kline bar truncated before up/down counts"));
            }
            let up = u16::from_le_bytes([cursor[0], cursor[1]]) as i32;
            let down = u16::from_le_bytes([cursor[2], cursor[3]]) as i32;
            cursor = &cursor[4..];
            (up, down)
        } else {
            (0, 0)
        };

        out.push(KlineBar {
            time,
            k: K {
                previous_close,
                open,
                high,
                low,
                close,
            },
            volume,
            amount,
            up_count,
            down_count,
        });
    }
    Ok((out, last))
}

/// Patches a known server quirk: the half-day lunch-close bar at `11:30` is
/// sometimes reported with a timestamp of `13:00`, but only for the bar the
/// server is still actively updating — today's. The quirk only fires when
/// the *last* bar in the page is dated today and falls in the `13:00..15:00`
/// window; legitimate historical afternoon-session bars at exactly `13:00`
/// on other dates are left untouched.
pub fn fix_kline_time(bars: &mut [KlineBar]) {
    let Some(last) = bars.last() else {
        return;
    };
    let today = Local::now().date_naive();
    let window_start = NaiveTime::from_hms_opt(13, 0, 0).unwrap();
    let window_end = NaiveTime::from_hms_opt(15, 0, 0).unwrap();
    if last.time.date() != today || last.time.time() < window_start || last.time.time() >= window_end {
        return;
    }

    let start = bars.len().saturating_sub(120);
    for bar in &mut bars[start..] {
        if bar.time.date() == today && bar.time.time() == window_start {
            bar.time = NaiveDateTime::new(bar.time.date(), NaiveTime::from_hms_opt(11, 30, 0).unwrap());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_rejects_oversize_count() {
        assert!(request(1, Exchange::Sh, "600000", Period::Day, 0, 801).is_err());
    }

    #[test]
    fn request_layout_matches_fixed_header() {
        let f = request(1, Exchange::Sh, "600000", Period::Day, 0, 10).unwrap();
        assert_eq!(f.data[0], Exchange::Sh.wire_tag());
        assert_eq!(f.data[1], 0);
        assert_eq!(&f.data[2..8], b"600000");
        assert_eq!(f.data[8], Period::Day.wire_type());
        assert_eq!(f.data.len(), 26);
    }

    #[test]
    fn decode_time_daily_uses_fifteen_hundred() {
        let bytes = 20_240_102u32.to_le_bytes();
        let t = decode_time(&bytes, Period::Day);
        assert_eq!(t.time(), NaiveTime::from_hms_opt(15, 0, 0).unwrap());
        assert_eq!(t.date(), NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
    }

    #[test]
    fn fix_kline_time_patches_todays_lunch_bar() {
        let today = Local::now().date_naive();
        let mut bars = vec![KlineBar {
            time: NaiveDateTime::new(today, NaiveTime::from_hms_opt(13, 0, 0).unwrap()),
            k: K::default(),
            volume: 0,
            amount: Price(0),
            up_count: 0,
            down_count: 0,
        }];
        fix_kline_time(&mut bars);
        assert_eq!(bars[0].time.time(), NaiveTime::from_hms_opt(11, 30, 0).unwrap());
    }

    #[test]
    fn fix_kline_time_leaves_historical_afternoon_bar_alone() {
        let mut bars = vec![KlineBar {
            time: NaiveDateTime::new(
                NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
                NaiveTime::from_hms_opt(13, 0, 0).unwrap(),
            ),
            k: K::default(),
            volume: 0,
            amount: Price(0),
            up_count: 0,
            down_count: 0,
        }];
        fix_kline_time(&mut bars);
        assert_eq!(bars[0].time.time(), NaiveTime::from_hms_opt(13, 0, 0).unwrap());
    }

    #[test]
    fn decode_empty_page_returns_empty() {
        let (bars, last) = decode(&0u16.to_le_bytes(), Period::Day, false, 0).unwrap();
        assert!(bars.is_empty());
        assert_eq!(last, 0);
    }
}
