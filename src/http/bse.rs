//! Scrapes the Beijing Stock Exchange's public symbol list.
//!
//! The quote server's `code_list` operation only ever enumerates Shanghai
//! and Shenzhen, so Beijing Exchange symbols have to come from BSE's own
//! JSONP listing endpoint instead.

use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::types::{Code, Exchange};

const ENDPOINT: &str = "https://www.bse.cn/nqxxController/nqxxCnjg.do";
const PAGE_SIZE: u32 = 50;
const MAX_PAGES: u32 = 200;
const PAGE_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, Deserialize)]
struct Row {
    #[serde(rename = "xxzqdm")]
    code: String,
    #[serde(rename = "xxzqjc")]
    name: String,
    #[serde(rename = "hqzjcj")]
    last: f64,
}

#[derive(Debug, Deserialize)]
struct Page {
    #[serde(default)]
    content: Vec<Row>,
}

/// Fetches every listed BSE symbol, paging until a short page signals the
/// end of the listing.
pub async fn fetch_all(client: &reqwest::Client) -> Result<Vec<Code>> {
    let mut all = Vec::new();
    for page in 0..MAX_PAGES {
        let rows = fetch_page(client, page).await?;
        let got = rows.len();
        all.extend(rows.into_iter().map(|row| Code {
            code: row.code,
            name: row.name,
            exchange: Exchange::Bj,
            multiplier: 1,
            decimal: 2,
            last_price: row.last,
        }));
        if got < PAGE_SIZE as usize {
            break;
        }
        tokio::time::sleep(PAGE_DELAY).await;
    }
    Ok(all)
}

async fn fetch_page(client: &reqwest::Client, page: u32) -> Result<Vec<Row>> {
    let callback = format!("jQuery_bse_{page}");
    let body = client
        .post(ENDPOINT)
        .form(&[
            ("page", page.to_string()),
            ("pageSize", PAGE_SIZE.to_string()),
            ("callback", callback.clone()),
        ])
        .send()
        .await?
        .text()
        .await?;

    let json = strip_jsonp(&body, &callback)?;
    let parsed: Page = serde_json::from_str(json)?;
    Ok(parsed.content)
}

/// Strips a `callback(...)` JSONP wrapper, returning the inner JSON text.
fn strip_jsonp<'a>(body: &'a str, callback: &str) -> Result<&'a str> {
    let body = body.trim();
    let prefix = format!("{callback}(");
    let inner = body
        .strip_prefix(&prefix)
        .and_then(|s| s.strip_suffix(')'))
        .ok_or_else(|| Error::upstream("response was not wrapped in the expected JSONP callback"))?;
    Ok(inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_jsonp_unwraps_callback() {
        let wrapped = "jQuery_bse_0({\"content\":[]})";
        assert_eq!(strip_jsonp(wrapped, "jQuery_bse_0").unwrap(), "{\"content\":[]}");
    }

    #[test]
    fn strip_jsonp_rejects_unwrapped_body() {
        assert!(strip_jsonp("{\"content\":[]}", "jQuery_bse_0").is_err());
    }
}
