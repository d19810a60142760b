//! Symbol normalization (spec §4.13): strip `/`, `:`, and quote-currency
//! suffixes down to a bare asset code (`"BTC/USDT:USDT"` → `"BTC"`).

const QUOTE_SUFFIXES: &[&str] = &["USDT", "USDC", "USD", "BUSD"];

pub fn normalize_symbol(raw: &str) -> String {
    let stripped: String = raw.chars().filter(|c| *c != '/' && *c != ':').collect();

    for quote in QUOTE_SUFFIXES {
        if let Some(base) = stripped.strip_suffix(quote) {
            if !base.is_empty() {
                return base.to_string();
            }
        }
    }
    stripped
}
