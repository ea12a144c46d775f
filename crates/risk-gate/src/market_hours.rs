use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};

use core_types::AssetClass;

/// Whether the given asset class is tradeable at `now` (UTC). Crypto never
/// closes; forex follows the Sunday-22:00-to-Friday-22:00 session; everything
/// else (indices/stocks/commodities) is a plain weekday 08:00-22:00 window.
pub fn is_market_open(asset_class: AssetClass, now: DateTime<Utc>) -> bool {
    match asset_class {
        AssetClass::Crypto => true,
        AssetClass::Forex => {
            let weekday = now.weekday();
            let hour = now.hour();
            match weekday {
                Weekday::Sat => false,
                Weekday::Fri => hour < 22,
                Weekday::Sun => hour >= 22,
                _ => true,
            }
        }
        AssetClass::IndexStockOrCommodity => {
            let weekday = now.weekday();
            let hour = now.hour();
            !matches!(weekday, Weekday::Sat | Weekday::Sun) && (8..22).contains(&hour)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn crypto_always_open() {
        assert!(is_market_open(AssetClass::Crypto, at(2026, 7, 26, 3)));
    }

    #[test]
    fn forex_closed_friday_after_22() {
        // 2026-07-31 is a Friday.
        assert!(!is_market_open(AssetClass::Forex, at(2026, 7, 31, 22)));
        assert!(is_market_open(AssetClass::Forex, at(2026, 7, 31, 21)));
    }

    #[test]
    fn forex_closed_sunday_before_22() {
        // 2026-08-02 is a Sunday.
        assert!(!is_market_open(AssetClass::Forex, at(2026, 8, 2, 10)));
        assert!(is_market_open(AssetClass::Forex, at(2026, 8, 2, 23)));
    }

    #[test]
    fn stocks_closed_outside_session_and_weekends() {
        assert!(is_market_open(AssetClass::IndexStockOrCommodity, at(2026, 7, 30, 10)));
        assert!(!is_market_open(AssetClass::IndexStockOrCommodity, at(2026, 7, 30, 23)));
        assert!(!is_market_open(AssetClass::IndexStockOrCommodity, at(2026, 8, 1, 10)));
    }
}
