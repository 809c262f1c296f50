//! Shared data model: exchanges, prices, K-line bundles, ticks, quotes, and
//! catalog code records.

use std::fmt;

use chrono::Timelike;

use crate::error::{Error, Result};

/// One of the three exchanges the quote server knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Exchange {
    /// Shenzhen Stock Exchange.
    Sz,
    /// Shanghai Stock Exchange.
    Sh,
    /// Beijing Stock Exchange.
    Bj,
}

impl Exchange {
    /// The wire tag for this exchange (`0` = SZ, `1` = SH, `2` = BJ).
    #[must_use]
    pub fn wire_tag(self) -> u8 {
        match self {
            Exchange::Sz => 0,
            Exchange::Sh => 1,
            Exchange::Bj => 2,
        }
    }

    /// The two-character presentation prefix (`"sz"`, `"sh"`, `"bj"`).
    #[must_use]
    pub fn prefix(self) -> &'static str {
        match self {
            Exchange::Sz => "sz",
            Exchange::Sh => "sh",
            Exchange::Bj => "bj",
        }
    }

    /// Parses a wire tag byte into an [`Exchange`].
    pub fn from_wire_tag(tag: u8) -> Result<Self> {
        match tag {
            0 => Ok(Exchange::Sz),
            1 => Ok(Exchange::Sh),
            2 => Ok(Exchange::Bj),
            other => Err(Error::protocol(format!("unknown exchange tag 0x{other:02x}"))),
        }
    }
}

impl fmt::Display for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// A price expressed in mills (thousandths of the base currency unit).
///
/// All arithmetic on prices is exact integer arithmetic; conversion to
/// floating point is for display only. No price is ever carried as a float
/// on the wire-decoding path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Price(pub i64);

impl Price {
    /// Converts to a floating-point value in whole currency units, for display.
    #[must_use]
    pub fn to_f64(self) -> f64 {
        self.0 as f64 / 1000.0
    }
}

impl std::ops::Add for Price {
    type Output = Price;
    fn add(self, rhs: Price) -> Price {
        Price(self.0 + rhs.0)
    }
}

impl std::ops::Sub for Price {
    type Output = Price;
    fn sub(self, rhs: Price) -> Price {
        Price(self.0 - rhs.0)
    }
}

impl std::ops::Mul<i64> for Price {
    type Output = Price;
    fn mul(self, rhs: i64) -> Price {
        Price(self.0 * rhs)
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}", self.to_f64())
    }
}

/// The five-price OHLC bundle plus the bar's previous close.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct K {
    /// The prior bar's close (`0` when there is no predecessor in the chain).
    pub previous_close: Price,
    pub open: Price,
    pub high: Price,
    pub low: Price,
    pub close: Price,
}

/// A single K-line (bar) row, as returned from a `Kline`/`HistoryMinute`-style response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KlineBar {
    pub time: chrono::NaiveDateTime,
    pub k: K,
    pub volume: i64,
    pub amount: Price,
    /// Populated only for index bars.
    pub up_count: i32,
    /// Populated only for index bars.
    pub down_count: i32,
}

/// The trade-tick status as reported by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeStatus {
    Buy,
    Sell,
    Mixed,
}

impl TradeStatus {
    pub(crate) fn from_wire(code: i64) -> Self {
        match code {
            0 => TradeStatus::Buy,
            1 => TradeStatus::Sell,
            _ => TradeStatus::Mixed,
        }
    }
}

/// A single time-and-sales record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trade {
    pub time: chrono::NaiveDateTime,
    pub price: Price,
    /// Volume in lots.
    pub volume: i64,
    pub status: TradeStatus,
    /// Populated for live responses; zero for historical ones.
    pub number: i64,
}

/// One price/quantity pair in a five-deep order book snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Level {
    pub price: Price,
    pub quantity: i64,
}

/// A real-time quote snapshot for one symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    pub exchange: Exchange,
    pub code: String,
    pub k: K,
    pub server_time: i64,
    pub total_volume: i64,
    pub last_volume: i64,
    pub amount: Price,
    pub inside_volume: i64,
    pub outside_volume: i64,
    pub bids: [Level; 5],
    pub asks: [Level; 5],
    pub rate: f64,
    pub activity1: u16,
    pub activity2: u16,
}

/// A catalog code record, as returned by `CodeList`.
#[derive(Debug, Clone, PartialEq)]
pub struct Code {
    pub code: String,
    pub name: String,
    pub exchange: Exchange,
    pub multiplier: u16,
    pub decimal: i8,
    pub last_price: f64,
}

impl Code {
    /// The per-symbol price scale `10^(2-decimal)`, used to rescale quote
    /// prices for non-equity instruments.
    #[must_use]
    pub fn price_scale(&self) -> f64 {
        10f64.powi(2 - i32::from(self.decimal))
    }

    /// Rescales a raw quote price using this record's [`Code::price_scale`].
    #[must_use]
    pub fn rescale(&self, price: Price) -> Price {
        Price((price.0 as f64 * self.price_scale()).round() as i64)
    }

    /// The fully qualified symbol, e.g. `"sh600000"`.
    #[must_use]
    pub fn full_code(&self) -> String {
        format!("{}{}", self.exchange.prefix(), self.code)
    }
}

/// The K-line sampling period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Period {
    Minute1,
    Minute5,
    Minute15,
    Minute30,
    Minute60,
    Day,
    Week,
    Month,
    Quarter,
    Year,
}

impl Period {
    /// The wire type byte for a `Kline` request.
    #[must_use]
    pub fn wire_type(self) -> u8 {
        match self {
            Period::Minute5 => 0,
            Period::Minute15 => 1,
            Period::Minute30 => 2,
            Period::Minute60 => 3,
            Period::Day => 9,
            Period::Week => 5,
            Period::Month => 6,
            Period::Minute1 => 7,
            Period::Quarter => 10,
            Period::Year => 11,
        }
    }

    /// Whether bars of this period pack an intraday (year/month/day + minute)
    /// timestamp, as opposed to a plain `YYYYMMDD` daily-and-above timestamp.
    #[must_use]
    pub fn is_intraday(self) -> bool {
        matches!(
            self,
            Period::Minute1
                | Period::Minute5
                | Period::Minute15
                | Period::Minute30
                | Period::Minute60
        )
    }
}

/// Normalizes a bare 6-digit code or an already-qualified 8-character code
/// into `(Exchange, 6-digit code)`, inferring the exchange prefix for bare
/// codes using the standard stock/ETF numbering ranges.
pub fn normalize_code(code: &str) -> Result<(Exchange, String)> {
    let qualified = add_prefix(code);
    if qualified.len() != 8 {
        return Err(Error::invalid_argument(format!(
            "symbol must be 8 characters once qualified, e.g. sz000001: got {qualified:?}"
        )));
    }
    let (prefix, number) = qualified.split_at(2);
    let exchange = match prefix.to_ascii_lowercase().as_str() {
        "sh" => Exchange::Sh,
        "sz" => Exchange::Sz,
        "bj" => Exchange::Bj,
        other => {
            return Err(Error::invalid_argument(format!(
                "unknown exchange prefix {other:?}"
            )))
        }
    };
    Ok((exchange, number.to_string()))
}

/// Adds the exchange prefix to a bare 6-digit code, inferring the exchange
/// from the standard numbering ranges. Codes that are already 8 characters,
/// or that match none of the known ranges, are returned unchanged.
#[must_use]
pub fn add_prefix(code: &str) -> String {
    if code.len() != 6 {
        return code.to_string();
    }
    let prefix = match code {
        c if c.starts_with('6') => Some("sh"),
        c if c.starts_with('0') => Some("sz"),
        c if c.starts_with("30") => Some("sz"),
        c if c.starts_with("510")
            || c.starts_with("511")
            || c.starts_with("512")
            || c.starts_with("513")
            || c.starts_with("515") =>
        {
            Some("sh")
        }
        c if c.starts_with("159") => Some("sz"),
        c if c.starts_with('8') || c.starts_with("92") || c.starts_with("43") => Some("bj"),
        _ => None,
    };
    match prefix {
        Some(p) => format!("{p}{code}"),
        None => code.to_string(),
    }
}

/// Classifies a fully qualified 8-character code as a stock, per the
/// `sh6…`, `sz0…`/`sz30…`, `bj8…`/`bj92…`/`bj43…` prefix rules.
#[must_use]
pub fn is_stock(full_code: &str) -> bool {
    if full_code.len() != 8 {
        return false;
    }
    let lower = full_code.to_ascii_lowercase();
    let (prefix, rest) = lower.split_at(2);
    match prefix {
        "sh" => rest.starts_with('6'),
        "sz" => rest.starts_with('0') || rest.starts_with("30"),
        "bj" => rest.starts_with("92") || rest.starts_with("43") || rest.starts_with('8'),
        _ => false,
    }
}

/// A page of K-line bars with aggregation helpers.
#[derive(Debug, Clone, Default)]
pub struct Klines(pub Vec<KlineBar>);

impl Klines {
    /// Aggregates every `n` consecutive bars into one coarser bar: open of
    /// the first, close of the last, high/low extremes, summed
    /// volume/amount. The last, possibly short, group is dropped rather
    /// than emitted as a partial bar.
    #[must_use]
    pub fn merge(&self, n: usize) -> Vec<KlineBar> {
        if n == 0 {
            return Vec::new();
        }
        self.0
            .chunks(n)
            .filter(|chunk| chunk.len() == n)
            .map(|chunk| {
                let first = chunk[0];
                let last = chunk[chunk.len() - 1];
                let high = chunk.iter().map(|b| b.k.high).max().unwrap_or(first.k.high);
                let low = chunk.iter().map(|b| b.k.low).min().unwrap_or(first.k.low);
                let volume = chunk.iter().map(|b| b.volume).sum();
                let amount = Price(chunk.iter().map(|b| b.amount.0).sum());
                KlineBar {
                    time: last.time,
                    k: K {
                        previous_close: first.k.previous_close,
                        open: first.k.open,
                        high,
                        low,
                        close: last.k.close,
                    },
                    volume,
                    amount,
                    up_count: chunk.iter().map(|b| b.up_count).sum(),
                    down_count: chunk.iter().map(|b| b.down_count).sum(),
                }
            })
            .collect()
    }
}

/// Standard trading-session minute marks, in minutes since midnight.
const MORNING_OPEN: i64 = 9 * 60 + 30;
const MORNING_CLOSE: i64 = 11 * 60 + 30;
const AFTERNOON_OPEN: i64 = 13 * 60;
const AFTERNOON_CLOSE: i64 = 15 * 60;

/// A tick list with aggregation helpers.
#[derive(Debug, Clone, Default)]
pub struct Trades(pub Vec<Trade>);

impl Trades {
    /// Folds the tick list into one-minute bars bucketed onto the standard
    /// 240-minute trading-session grid (`09:31..=11:30`, `13:01..=15:00`).
    /// Ticks outside the session, or with a non-positive price, are
    /// dropped.
    #[must_use]
    pub fn to_minute_bars(&self) -> Vec<KlineBar> {
        use std::collections::BTreeMap;

        let mut buckets: BTreeMap<(chrono::NaiveDate, i64), Vec<&Trade>> = BTreeMap::new();
        for trade in &self.0 {
            if trade.price.0 <= 0 {
                continue;
            }
            let minute_of_day = i64::from(trade.time.time().hour()) * 60 + i64::from(trade.time.time().minute());
            let bucket = if (MORNING_OPEN + 1..=MORNING_CLOSE).contains(&minute_of_day) {
                minute_of_day
            } else if (AFTERNOON_OPEN + 1..=AFTERNOON_CLOSE).contains(&minute_of_day) {
                minute_of_day
            } else {
                continue;
            };
            buckets
                .entry((trade.time.date(), bucket))
                .or_default()
                .push(trade);
        }

        buckets
            .into_iter()
            .map(|((date, minute), ticks)| {
                let open = ticks.first().unwrap().price;
                let close = ticks.last().unwrap().price;
                let high = ticks.iter().map(|t| t.price).max().unwrap_or(open);
                let low = ticks.iter().map(|t| t.price).min().unwrap_or(open);
                let volume = ticks.iter().map(|t| t.volume).sum();
                let time = chrono::NaiveDateTime::new(
                    date,
                    chrono::NaiveTime::from_hms_opt((minute / 60) as u32, (minute % 60) as u32, 0)
                        .unwrap(),
                );
                KlineBar {
                    time,
                    k: K {
                        previous_close: Price::default(),
                        open,
                        high,
                        low,
                        close,
                    },
                    volume,
                    amount: Price::default(),
                    up_count: 0,
                    down_count: 0,
                }
            })
            .collect()
    }
}

/// The date the Shanghai Stock Exchange was established; no trading-day
/// query is ever valid before this date.
#[must_use]
pub fn exchange_inception() -> chrono::NaiveDate {
    chrono::NaiveDate::from_ymd_opt(1990, 12, 19).expect("1990-12-19 is a valid calendar date")
}

/// Classifies a fully qualified 8-character code as an ETF, per the
/// `sh51/56/58…`, `sz15/16…` prefix rules.
#[must_use]
pub fn is_etf(full_code: &str) -> bool {
    if full_code.len() != 8 {
        return false;
    }
    let lower = full_code.to_ascii_lowercase();
    let (prefix, rest) = lower.split_at(2);
    match prefix {
        "sh" => rest.starts_with("51") || rest.starts_with("56") || rest.starts_with("58"),
        "sz" => rest.starts_with("15") || rest.starts_with("16"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_inference_matches_known_ranges() {
        assert_eq!(add_prefix("600000"), "sh600000");
        assert_eq!(add_prefix("000001"), "sz000001");
        assert_eq!(add_prefix("300750"), "sz300750");
        assert_eq!(add_prefix("510300"), "sh510300");
        assert_eq!(add_prefix("159915"), "sz159915");
        assert_eq!(add_prefix("830799"), "bj830799");
    }

    #[test]
    fn stock_and_etf_classification_are_disjoint() {
        let codes = [
            "sh600000", "sz000001", "sz300750", "bj830799", "sh510300", "sh511990", "sh588000",
            "sz159915", "sz161725",
        ];
        for c in codes {
            assert!(!(is_stock(c) && is_etf(c)), "{c} classified as both");
        }
        assert!(is_stock("sh600000"));
        assert!(is_stock("sz000001"));
        assert!(is_stock("sz300750"));
        assert!(is_stock("bj830799"));
        assert!(is_etf("sh510300"));
        assert!(is_etf("sz159915"));
    }
}
