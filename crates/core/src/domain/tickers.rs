use serde_json::Value;
use std::collections::BTreeSet;

/// Top-level `market_data` keys that never name a ticker.
const RESERVED_KEYS: &[&str] = &[
    "tickers",
    "prices",
    "market_data",
    "as_of_date",
    "date",
    "summary",
    "indexes",
    "indices",
    "macro",
    "notes",
];

type Strategy = fn(&Value) -> Option<BTreeSet<String>>;

/// Derives the ticker set from `market_data`, trying each extraction
/// strategy in order and returning the first non-empty result.
pub fn extract_tickers(market_data: &Value) -> BTreeSet<String> {
    const STRATEGIES: &[Strategy] = &[explicit_tickers, price_map_keys, top_level_keys];

    for strategy in STRATEGIES {
        if let Some(tickers) = strategy(market_data) {
            if !tickers.is_empty() {
                return tickers;
            }
        }
    }
    BTreeSet::new()
}

/// `{"tickers": ["SMCI", "IREN"]}`
fn explicit_tickers(market_data: &Value) -> Option<BTreeSet<String>> {
    let list = market_data.get("tickers")?.as_array()?;
    Some(collect_strings(list.iter().filter_map(Value::as_str)))
}

/// `{"prices": {"SMCI": {...}}}` or `{"market_data": {"SMCI": {...}}}`
fn price_map_keys(market_data: &Value) -> Option<BTreeSet<String>> {
    for key in ["prices", "market_data"] {
        if let Some(map) = market_data.get(key).and_then(Value::as_object) {
            return Some(collect_strings(map.keys().map(String::as_str)));
        }
    }
    None
}

/// Remaining top-level keys, minus reserved names.
fn top_level_keys(market_data: &Value) -> Option<BTreeSet<String>> {
    let map = market_data.as_object()?;
    Some(collect_strings(
        map.keys()
            .map(String::as_str)
            .filter(|key| !RESERVED_KEYS.contains(key)),
    ))
}

fn collect_strings<'a>(values: impl Iterator<Item = &'a str>) -> BTreeSet<String> {
    values
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
