use core_types::AssetClass;

const FOREX_PAIRS: &[&str] = &[
    "EURUSD", "GBPUSD", "USDJPY", "USDCHF", "AUDUSD", "USDCAD", "NZDUSD", "EURGBP", "EURJPY",
];

/// Best-effort symbol classification for the market-hours table. Real asset
/// metadata belongs to the persistence layer; this is the fallback when a
/// caller only has a bare symbol string to go on.
pub fn classify_asset(symbol: &str) -> AssetClass {
    let upper = symbol.to_ascii_uppercase();
    if upper.contains("BTC") || upper.contains("ETH") || upper.ends_with("USDT") || upper.ends_with("USDC") {
        return AssetClass::Crypto;
    }
    if FOREX_PAIRS.contains(&upper.as_str()) {
        return AssetClass::Forex;
    }
    AssetClass::IndexStockOrCommodity
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_crypto_by_ticker_suffix() {
        assert_eq!(classify_asset("BTCUSDT"), AssetClass::Crypto);
    }

    #[test]
    fn classifies_known_forex_pair() {
        assert_eq!(classify_asset("EURUSD"), AssetClass::Forex);
    }

    #[test]
    fn falls_back_to_stock_or_commodity() {
        assert_eq!(classify_asset("AAPL"), AssetClass::IndexStockOrCommodity);
    }
}
