//! Supplementary ticker extraction over cashtags and known symbols.
//! The LLM's symbol list is authoritative for scoring; this extractor
//! widens the stored list so symbol searches still match posts the
//! model under-reported.

use std::collections::HashSet;

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Uppercase English words that collide with ticker symbols
    static ref COMMON_WORDS: HashSet<&'static str> = [
        "A", "I", "AM", "PM", "AN", "AS", "AT", "BE", "BY", "DO", "GO", "HE",
        "IF", "IN", "IS", "IT", "ME", "MY", "NO", "OF", "OK", "ON", "OR", "SO",
        "TO", "UP", "US", "WE", "ALL", "AND", "ARE", "BIG", "BUT", "CAN", "CEO",
        "DAY", "DD", "DIP", "ETF", "FOR", "GET", "GOT", "HAS", "HOW", "IPO",
        "ITS", "LET", "LOT", "LOW", "MAY", "NEW", "NOT", "NOW", "OLD", "ONE",
        "OUR", "OUT", "OWN", "PUT", "RUN", "SEE", "THE", "TOP", "TRY", "TWO",
        "WHO", "WHY", "WIN", "YET", "YOU", "ATH", "ATL", "AVG", "BUY", "EPS",
        "FED", "GDP", "IMO", "LOL", "QE", "ROI", "SEC", "USA", "USD", "YTD",
        "YOLO", "HODL", "FOMO", "FUD", "TLDR", "EDIT", "LINK", "FREE", "JUST",
        "LIKE", "LONG", "MUCH", "NEXT", "ONLY", "OVER", "SOME", "STOP", "THAT",
        "THEM", "THEN", "THIS", "VERY", "WANT", "WHAT", "WHEN", "WITH", "WORK",
        "YEAR", "YOUR", "BEEN", "CALL", "CASH", "DOWN", "EVEN", "EVER", "GOOD",
        "HAVE", "HERE", "HIGH", "HOLD", "LAST", "LESS", "LOOK", "LOSS", "MADE",
        "MAKE", "MORE", "MOST", "MOVE", "MUST", "NEED", "SELL", "TAKE", "TIME",
        "WILL", "WERE", "BEST", "GAIN", "PUTS", "CALLS", "SHORT",
    ]
    .into_iter()
    .collect();

    /// Widely traded tickers recognized without a cashtag
    static ref POPULAR_TICKERS: HashSet<&'static str> = [
        "AAPL", "MSFT", "GOOGL", "GOOG", "AMZN", "NVDA", "META", "TSLA", "BRK",
        "JPM", "JNJ", "WMT", "PG", "MA", "UNH", "HD", "DIS", "BAC",
        "AMD", "INTC", "CRM", "ADBE", "NFLX", "PYPL", "SQ", "SHOP", "UBER",
        "LYFT", "SNAP", "PINS", "ZM", "DOCU", "CRWD", "NET", "PLTR",
        "SNOW", "COIN", "HOOD", "SOFI", "RIVN", "LCID", "NIO", "XPEV",
        "GME", "AMC", "BB", "BBBY", "WISH", "CLOV", "SPCE",
        "SPY", "QQQ", "IWM", "DIA", "VTI", "VOO", "VXX", "ARKK", "SQQQ", "TQQQ",
        "MSTR", "MARA", "RIOT", "HUT", "BITF", "GBTC", "ETHE",
    ]
    .into_iter()
    .collect();

    static ref CRYPTO_SYMBOLS: HashSet<&'static str> = [
        "BTC", "ETH", "SOL", "XRP", "ADA", "DOGE", "SHIB", "DOT", "AVAX",
        "MATIC", "LINK", "UNI", "ATOM", "LTC", "BCH", "XLM", "ALGO", "VET",
        "FIL", "AAVE", "EOS", "XTZ", "THETA", "AXS", "SAND", "MANA", "ENJ",
        "NEAR", "FTM", "ONE", "HBAR", "EGLD", "FLOW", "KSM", "CAKE", "RUNE",
        "ZEC", "DASH", "COMP", "MKR", "SNX", "YFI", "SUSHI", "CRV", "BAT",
        "PEPE", "BONK", "WIF", "FLOKI",
    ]
    .into_iter()
    .collect();

    static ref FOREX_PAIRS: HashSet<&'static str> = [
        "EURUSD", "GBPUSD", "USDJPY", "USDCHF", "AUDUSD", "USDCAD", "NZDUSD",
        "EURGBP", "EURJPY", "GBPJPY", "AUDJPY", "EURAUD", "EURCHF", "GBPCHF",
        "AUDCAD", "CADJPY", "NZDJPY", "AUDNZD", "EURNZD", "GBPAUD", "GBPCAD",
    ]
    .into_iter()
    .collect();

    static ref CASHTAG_RE: Regex = Regex::new(r"\$([A-Za-z]{1,5})\b").expect("valid cashtag regex");
    static ref STANDALONE_RE: Regex = Regex::new(r"\b([A-Z]{2,5})\b").expect("valid ticker regex");
    static ref FOREX_RE: Regex =
        Regex::new(r"\b([A-Z]{3})/?([A-Z]{3})\b").expect("valid forex regex");
}

/// Extract ticker symbols from text, ordered by first occurrence.
/// Recognizes cashtags, well-known bare tickers, crypto symbols, and
/// forex pairs.
pub fn extract_tickers(text: &str) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }

    // (byte offset, symbol) so the result preserves first-occurrence order
    let mut found: Vec<(usize, String)> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut push = |pos: usize, symbol: String, seen: &mut HashSet<String>| {
        if seen.insert(symbol.clone()) {
            found.push((pos, symbol));
        }
    };

    for caps in CASHTAG_RE.captures_iter(text) {
        if let Some(m) = caps.get(1) {
            let ticker = m.as_str().to_uppercase();
            if !COMMON_WORDS.contains(ticker.as_str()) {
                push(m.start(), ticker, &mut seen);
            }
        }
    }

    for caps in STANDALONE_RE.captures_iter(text) {
        if let Some(m) = caps.get(1) {
            let ticker = m.as_str();
            if POPULAR_TICKERS.contains(ticker) || CRYPTO_SYMBOLS.contains(ticker) {
                push(m.start(), ticker.to_string(), &mut seen);
            }
        }
    }

    for caps in FOREX_RE.captures_iter(text) {
        if let (Some(first), Some(m1), Some(m2)) = (caps.get(0), caps.get(1), caps.get(2)) {
            let pair = format!("{}{}", m1.as_str(), m2.as_str());
            if FOREX_PAIRS.contains(pair.as_str()) {
                push(first.start(), pair, &mut seen);
            }
        }
    }

    found.sort_by_key(|(pos, _)| *pos);
    found.into_iter().map(|(_, symbol)| symbol).collect()
}

/// Union of the LLM's symbols and the regex extractor's, LLM list first.
pub fn merge_symbols(llm_symbols: &[String], extracted: &[String]) -> Vec<String> {
    let mut seen: HashSet<&str> = llm_symbols.iter().map(|s| s.as_str()).collect();
    let mut merged = llm_symbols.to_vec();
    for symbol in extracted {
        if seen.insert(symbol.as_str()) {
            merged.push(symbol.clone());
        }
    }
    merged
}
