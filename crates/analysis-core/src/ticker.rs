use serde::{Deserialize, Serialize};

/// Market a ticker trades on, inferred from the code shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Market {
    /// Mainland A-share (Shanghai / Shenzhen), 6 decimal digits
    #[serde(rename = "cn")]
    AShare,
    /// Hong Kong, 5 digits or HK-prefixed
    #[serde(rename = "hk")]
    HongKong,
    /// US equity or index, 1-6 letters with optional single-dot suffix
    #[serde(rename = "us")]
    Us,
}

impl Market {
    /// Infer the market for a canonical ticker. Returns None for
    /// unrecognized shapes (callers fail open).
    pub fn of(ticker: &str) -> Option<Market> {
        let t = ticker.trim();
        if t.is_empty() {
            return None;
        }
        if t.len() == 6 && t.bytes().all(|b| b.is_ascii_digit()) {
            return Some(Market::AShare);
        }
        if t.len() == 5 && t.bytes().all(|b| b.is_ascii_digit()) {
            return Some(Market::HongKong);
        }
        if let Some(rest) = t.strip_prefix("HK") {
            if !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()) {
                return Some(Market::HongKong);
            }
        }
        if US_INDEX_MAPPING.iter().any(|(k, _, _)| *k == t) {
            return Some(Market::Us);
        }
        if is_us_equity_shape(t) {
            return Some(Market::Us);
        }
        None
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Market::AShare => "cn",
            Market::HongKong => "hk",
            Market::Us => "us",
        }
    }
}

fn is_us_equity_shape(t: &str) -> bool {
    let (head, tail) = match t.split_once('.') {
        Some((h, s)) => (h, Some(s)),
        None => (t, None),
    };
    if head.is_empty() || head.len() > 6 || !head.bytes().all(|b| b.is_ascii_uppercase()) {
        return false;
    }
    match tail {
        None => true,
        Some(s) => s.len() == 1 && s.bytes().all(|b| b.is_ascii_uppercase()),
    }
}

/// Normalize a raw user-supplied code to its canonical uppercase form.
///
/// Idempotent: `canonicalize(canonicalize(x)) == canonicalize(x)`.
pub fn canonicalize(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}

/// User input -> (US quote-source symbol, display name).
///
/// US indices need the caret-prefixed symbol on the quote source; stock
/// symbols pass through untouched.
const US_INDEX_MAPPING: &[(&str, &str, &str)] = &[
    ("SPX", "^GSPC", "S&P 500"),
    ("^GSPC", "^GSPC", "S&P 500"),
    ("GSPC", "^GSPC", "S&P 500"),
    ("DJI", "^DJI", "Dow Jones Industrial Average"),
    ("^DJI", "^DJI", "Dow Jones Industrial Average"),
    ("DJIA", "^DJI", "Dow Jones Industrial Average"),
    ("IXIC", "^IXIC", "Nasdaq Composite"),
    ("^IXIC", "^IXIC", "Nasdaq Composite"),
    ("NASDAQ", "^IXIC", "Nasdaq Composite"),
    ("NDX", "^NDX", "Nasdaq 100"),
    ("^NDX", "^NDX", "Nasdaq 100"),
    ("VIX", "^VIX", "CBOE Volatility Index"),
    ("^VIX", "^VIX", "CBOE Volatility Index"),
    ("RUT", "^RUT", "Russell 2000"),
    ("^RUT", "^RUT", "Russell 2000"),
];

/// Map a canonical code to the US quote-source index symbol, if it is a
/// known US index alias.
pub fn map_us_index(code: &str) -> Option<&'static str> {
    US_INDEX_MAPPING
        .iter()
        .find(|(k, _, _)| *k == code)
        .map(|(_, sym, _)| *sym)
}

/// Display name for a known US index alias.
pub fn us_index_display_name(code: &str) -> Option<&'static str> {
    US_INDEX_MAPPING
        .iter()
        .find(|(k, _, _)| *k == code)
        .map(|(_, _, name)| *name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalize_is_idempotent() {
        for raw in ["aapl", " 600519 ", "hk0700", "brk.b", "^gspc"] {
            let once = canonicalize(raw);
            assert_eq!(once, canonicalize(&once));
        }
    }

    #[test]
    fn market_inference() {
        assert_eq!(Market::of("600519"), Some(Market::AShare));
        assert_eq!(Market::of("000001"), Some(Market::AShare));
        assert_eq!(Market::of("00700"), Some(Market::HongKong));
        assert_eq!(Market::of("HK0700"), Some(Market::HongKong));
        assert_eq!(Market::of("AAPL"), Some(Market::Us));
        assert_eq!(Market::of("BRK.B"), Some(Market::Us));
        assert_eq!(Market::of("SPX"), Some(Market::Us));
        assert_eq!(Market::of(""), None);
        assert_eq!(Market::of("12345678"), None);
    }

    #[test]
    fn us_index_aliases_resolve() {
        assert_eq!(map_us_index("SPX"), Some("^GSPC"));
        assert_eq!(map_us_index("DJIA"), Some("^DJI"));
        assert_eq!(map_us_index("NASDAQ"), Some("^IXIC"));
        assert_eq!(map_us_index("AAPL"), None);
    }

    #[test]
    fn index_alias_is_not_a_stock() {
        // SPX matches the letters-only shape but must classify through the
        // index table, and never be treated as a plain equity by callers.
        assert_eq!(Market::of("SPX"), Some(Market::Us));
        assert!(map_us_index("SPX").is_some());
    }
}
