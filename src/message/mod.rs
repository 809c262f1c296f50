//! Per-message-type request encoders and response decoders.
//!
//! The server does not echo back anything that would let a decoder alone
//! reconstruct absolute timestamps or apply the right price scale (a date,
//! a period, whether a code is an index). [`Client`](crate::client::Client)
//! methods hold that context as a local variable across the `await` on the
//! response and pass it straight to the relevant decoder, so no cross-task
//! context map is needed. [`Context`] and its variants are kept here as a
//! typed description of what each decoder needs, for callers assembling
//! requests outside of [`Client`](crate::client::Client).

pub mod code_list;
pub mod connect;
pub mod count;
pub mod heart;
pub mod kline;
pub mod minute;
pub mod quote;
pub mod trade;

use crate::types::Period;

/// Wire type tags carried in the frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum MessageType {
    Connect = 0x000d,
    Heart = 0x0004,
    Count = 0x044e,
    CodeList = 0x0450,
    Quote = 0x053e,
    Minute = 0x051d,
    HistoryMinute = 0x0fb4,
    MinuteTrade = 0x0fc5,
    HistoryTrade = 0x0fb5,
    Kline = 0x052d,
}

/// Per-request context a decoder needs but the server does not echo.
#[derive(Debug, Clone)]
pub enum Context {
    None,
    Trade(TradeContext),
    Kline(KlineContext),
    Minute(MinuteContext),
}

/// Context for live/history trade-tick decoding.
#[derive(Debug, Clone)]
pub struct TradeContext {
    pub date: chrono::NaiveDate,
    pub code: String,
}

/// Context for K-line decoding.
#[derive(Debug, Clone, Copy)]
pub struct KlineContext {
    pub period: Period,
    pub is_index: bool,
}

/// Context for minute-time-data decoding.
#[derive(Debug, Clone, Copy)]
pub struct MinuteContext {
    pub date: chrono::NaiveDate,
}
