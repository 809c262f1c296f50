//! HTTP scrapers that fill in data the quote server itself cannot supply.

pub mod bse;
