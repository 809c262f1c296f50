//! A Rust client for the TDX proprietary market-data TCP protocol used by
//! Chinese brokerage quote servers. Its goal is to be as expressive,
//! performant, and as safe as possible.

#![warn(missing_docs)]
#![allow(
    clippy::implicit_return,
    clippy::missing_docs_in_private_items,
    clippy::exhaustive_enums,
    clippy::exhaustive_structs,
    clippy::question_mark_used,
    clippy::separated_literal_suffix,
    clippy::single_char_lifetime_names
)]

/// Persisted, daily-refreshed catalog of tradable symbols.
pub mod catalog;
/// Contains the all-important [`client::Client`] struct and its methods, which facilitate
/// communication with a quote server. Also contains a [`client::Builder`] struct to manage the
/// creation of new connections.
pub mod client;
mod comm;
/// Dial strategies for choosing and connecting to a quote server host.
pub mod dialer;
/// The crate's unified [`error::Error`] type and [`error::Kind`] taxonomy.
pub mod error;
/// The length-prefixed, optionally zlib-compressed wire frame.
pub mod frame;
/// Scrapers for data the quote server itself cannot supply.
pub mod http;
/// Composes a client, catalog, and trading-day calendar behind one scheduler.
pub mod manager;
/// Request/response codecs for each quote server operation.
pub mod message;
/// A bounded pool of reusable connections.
pub mod pool;
mod reader;
/// Domain types: exchanges, prices, quotes, K-line bars, and ticks.
pub mod types;
/// The variable-width signed integer encoding used throughout the wire format.
pub mod vbyte;
/// Persisted, daily-refreshed trading-day calendar.
pub mod workday;

pub use client::{Builder, Client, Config};
pub use error::{Error, Kind, Result};
pub use types::{Code, Exchange, K, KlineBar, Level, Period, Quote, Trade, TradeStatus};
