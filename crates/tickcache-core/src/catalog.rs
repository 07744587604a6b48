//! Offline ticker lookup.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SymbolMatch {
    pub symbol: &'static str,
    pub name: &'static str,
    pub exchange: &'static str,
}

const CATALOG: &[SymbolMatch] = &[
    entry("AAPL", "Apple Inc.", "NASDAQ"),
    entry("MSFT", "Microsoft Corporation", "NASDAQ"),
    entry("GOOGL", "Alphabet Inc. Class A", "NASDAQ"),
    entry("GOOG", "Alphabet Inc. Class C", "NASDAQ"),
    entry("AMZN", "Amazon.com Inc.", "NASDAQ"),
    entry("META", "Meta Platforms Inc.", "NASDAQ"),
    entry("NVDA", "NVIDIA Corporation", "NASDAQ"),
    entry("TSLA", "Tesla Inc.", "NASDAQ"),
    entry("NFLX", "Netflix Inc.", "NASDAQ"),
    entry("AMD", "Advanced Micro Devices Inc.", "NASDAQ"),
    entry("INTC", "Intel Corporation", "NASDAQ"),
    entry("ADBE", "Adobe Inc.", "NASDAQ"),
    entry("CSCO", "Cisco Systems Inc.", "NASDAQ"),
    entry("PEP", "PepsiCo Inc.", "NASDAQ"),
    entry("COST", "Costco Wholesale Corporation", "NASDAQ"),
    entry("IBM", "International Business Machines Corporation", "NYSE"),
    entry("ORCL", "Oracle Corporation", "NYSE"),
    entry("JPM", "JPMorgan Chase & Co.", "NYSE"),
    entry("BAC", "Bank of America Corporation", "NYSE"),
    entry("GS", "The Goldman Sachs Group Inc.", "NYSE"),
    entry("V", "Visa Inc.", "NYSE"),
    entry("MA", "Mastercard Incorporated", "NYSE"),
    entry("BRK.B", "Berkshire Hathaway Inc. Class B", "NYSE"),
    entry("JNJ", "Johnson & Johnson", "NYSE"),
    entry("PFE", "Pfizer Inc.", "NYSE"),
    entry("UNH", "UnitedHealth Group Incorporated", "NYSE"),
    entry("WMT", "Walmart Inc.", "NYSE"),
    entry("KO", "The Coca-Cola Company", "NYSE"),
    entry("DIS", "The Walt Disney Company", "NYSE"),
    entry("XOM", "Exxon Mobil Corporation", "NYSE"),
    entry("CVX", "Chevron Corporation", "NYSE"),
    entry("BA", "The Boeing Company", "NYSE"),
    entry("SPY", "SPDR S&P 500 ETF Trust", "NYSEARCA"),
    entry("QQQ", "Invesco QQQ Trust", "NASDAQ"),
    entry("DIA", "SPDR Dow Jones Industrial Average ETF", "NYSEARCA"),
    entry("IWM", "iShares Russell 2000 ETF", "NYSEARCA"),
];

const fn entry(symbol: &'static str, name: &'static str, exchange: &'static str) -> SymbolMatch {
    SymbolMatch {
        symbol,
        name,
        exchange,
    }
}

/// Case-insensitive substring match on symbol or name. Exact symbol matches
/// come first, then symbol prefixes, then everything else in catalog order.
pub fn search(query: &str, limit: usize) -> Vec<SymbolMatch> {
    let needle = query.trim().to_ascii_lowercase();
    if needle.is_empty() || limit == 0 {
        return Vec::new();
    }

    let mut ranked: Vec<(u8, SymbolMatch)> = CATALOG
        .iter()
        .filter_map(|candidate| {
            let symbol = candidate.symbol.to_ascii_lowercase();
            let rank = if symbol == needle {
                0
            } else if symbol.starts_with(&needle) {
                1
            } else if symbol.contains(&needle) || candidate.name.to_ascii_lowercase().contains(&needle) {
                2
            } else {
                return None;
            };
            Some((rank, *candidate))
        })
        .collect();

    ranked.sort_by_key(|(rank, _)| *rank);
    ranked
        .into_iter()
        .take(limit)
        .map(|(_, candidate)| candidate)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_symbol_ranks_first() {
        let matches = search("ma", 10);
        assert_eq!(matches[0].symbol, "MA");
        assert!(matches.iter().any(|candidate| candidate.symbol == "AMZN"));
    }

    #[test]
    fn matches_company_names_case_insensitively() {
        let matches = search("APPLE", 5);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].symbol, "AAPL");
    }

    #[test]
    fn respects_limit_and_blank_queries() {
        assert_eq!(search("inc", 3).len(), 3);
        assert!(search("   ", 10).is_empty());
        assert!(search("zzzz", 10).is_empty());
    }
}
