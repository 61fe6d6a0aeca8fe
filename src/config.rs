use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use dotenvy::dotenv;

use crate::price::DEFAULT_PRICE_URL;
use crate::sim::DEFAULT_REWARD_PERIOD;

const DEFAULT_DATA_DIR: &str = ".hashfaucet";

#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub price_url: String,
    pub fetch_price: bool,
    pub reward_period: u32,
    pub log_file: PathBuf,
    /// Variables that were set but could not be parsed. Reported once the
    /// logger is up.
    pub rejected: Vec<(String, String)>,
}

impl Config {
    pub fn from_env() -> Self {
        let _ = dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut rejected = Vec::new();
        let data_dir = lookup("HASHFAUCET_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));
        let price_url =
            lookup("HASHFAUCET_PRICE_URL").unwrap_or_else(|| DEFAULT_PRICE_URL.to_string());
        let fetch_price = match lookup("HASHFAUCET_PRICE_FETCH") {
            None => true,
            Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
                "0" | "false" | "no" | "off" => false,
                "1" | "true" | "yes" | "on" => true,
                _ => {
                    rejected.push(("HASHFAUCET_PRICE_FETCH".to_string(), raw));
                    true
                }
            },
        };
        let reward_period = match parse_or(
            &lookup,
            "HASHFAUCET_REWARD_PERIOD",
            DEFAULT_REWARD_PERIOD,
            &mut rejected,
        ) {
            Some(period) if period > 0 => period,
            Some(period) => {
                rejected.push(("HASHFAUCET_REWARD_PERIOD".to_string(), period.to_string()));
                DEFAULT_REWARD_PERIOD
            }
            None => DEFAULT_REWARD_PERIOD,
        };
        let log_file = lookup("HASHFAUCET_LOG_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("hashfaucet.log"));

        Self {
            data_dir,
            price_url,
            fetch_price,
            reward_period,
            log_file,
            rejected,
        }
    }
}

/// `Some(default)` when unset, `None` (and a rejection) when unparsable.
fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
    rejected: &mut Vec<(String, String)>,
) -> Option<T> {
    match lookup(key) {
        None => Some(default),
        Some(raw) => match raw.trim().parse() {
            Ok(value) => Some(value),
            Err(_) => {
                rejected.push((key.to_string(), raw));
                None
            }
        },
    }
}
