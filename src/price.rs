use std::sync::mpsc::Sender;
use std::thread;

use log::{info, warn};
use serde_json::Value;

use crate::error::{Result, SimError};

pub const DEFAULT_PRICE_URL: &str =
    "https://api.coingecko.com/api/v3/simple/price?ids=bitcoin&vs_currencies=usd";

/// Single blocking GET against the quote endpoint.
pub fn fetch_btc_price(url: &str) -> Result<f64> {
    let response = reqwest::blocking::get(url)?.error_for_status()?;
    let body: Value = response.json()?;
    parse_quote(&body)
}

/// Accepts `{"bitcoin":{"usd":N}}` or an object with a top-level numeric
/// `price` or `usd` field. Prices sent as strings are also accepted.
pub fn parse_quote(body: &Value) -> Result<f64> {
    let candidate = body
        .pointer("/bitcoin/usd")
        .or_else(|| body.get("price"))
        .or_else(|| body.get("usd"))
        .ok_or_else(|| SimError::BadResponse(format!("no price field in {body}")))?;
    let price = match candidate {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
    .ok_or_else(|| SimError::BadResponse(format!("price is not numeric: {candidate}")))?;
    if !price.is_finite() || price <= 0.0 {
        return Err(SimError::BadResponse(format!("price {price} is not positive")));
    }
    Ok(price)
}

/// Runs one fetch on a background thread and hands the outcome to `deliver`.
/// The caller never waits on it.
pub fn spawn_fetch<T, F>(url: String, tx: Sender<T>, deliver: F)
where
    T: Send + 'static,
    F: FnOnce(Result<f64>) -> T + Send + 'static,
{
    thread::spawn(move || {
        let result = fetch_btc_price(&url);
        match &result {
            Ok(price) => info!("price source quoted {:.2} USD", price),
            Err(err) => warn!("price lookup failed, keeping fallback: {err}"),
        }
        let _ = tx.send(deliver(result));
    });
}
