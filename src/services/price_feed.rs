//! Simulated price feed.
//!
//! Cosmetic prices only: trades record an entry price at creation and an
//! exit price at settlement, but neither influences the outcome. Prices
//! random-walk a little on each read so the numbers look alive.

use dashmap::DashMap;
use rand::Rng;

/// Maximum per-read drift (fraction of price).
const DRIFT: f64 = 0.005;

/// Maximum exit-price deviation from entry (fraction of price).
const EXIT_JITTER: f64 = 0.01;

/// In-memory simulated price source.
pub struct PriceFeed {
    prices: DashMap<String, f64>,
}

impl PriceFeed {
    /// Create a feed seeded with the default pair set.
    pub fn new() -> Self {
        let prices = DashMap::new();
        prices.insert("BTC/USDT".to_string(), 67_000.0);
        prices.insert("ETH/USDT".to_string(), 3_500.0);
        prices.insert("SOL/USDT".to_string(), 180.0);
        prices.insert("XRP/USDT".to_string(), 0.62);
        prices.insert("DOGE/USDT".to_string(), 0.12);
        Self { prices }
    }

    /// Whether the pair is quoted.
    pub fn supports(&self, pair: &str) -> bool {
        self.prices.contains_key(pair)
    }

    /// Current price for a pair, drifting it a little per read.
    pub fn current_price(&self, pair: &str) -> Option<f64> {
        let mut entry = self.prices.get_mut(pair)?;
        let drift = rand::thread_rng().gen_range(-DRIFT..DRIFT);
        let price = round_price(*entry.value() * (1.0 + drift));
        *entry.value_mut() = price;
        Some(price)
    }

    /// Exit price derived from the entry price with a small jitter.
    pub fn exit_price(&self, entry_price: f64) -> f64 {
        let jitter = rand::thread_rng().gen_range(-EXIT_JITTER..EXIT_JITTER);
        round_price(entry_price * (1.0 + jitter))
    }
}

impl Default for PriceFeed {
    fn default() -> Self {
        Self::new()
    }
}

fn round_price(price: f64) -> f64 {
    (price * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_pairs_quoted() {
        let feed = PriceFeed::new();
        assert!(feed.supports("BTC/USDT"));
        assert!(feed.current_price("BTC/USDT").is_some());
        assert!(!feed.supports("SHIB/USDT"));
        assert!(feed.current_price("SHIB/USDT").is_none());
    }

    #[test]
    fn test_drift_is_bounded() {
        let feed = PriceFeed::new();
        let mut prev = feed.current_price("ETH/USDT").unwrap();
        for _ in 0..100 {
            let next = feed.current_price("ETH/USDT").unwrap();
            assert!((next - prev).abs() <= prev * DRIFT * 1.01);
            prev = next;
        }
    }

    #[test]
    fn test_exit_price_near_entry() {
        let feed = PriceFeed::new();
        for _ in 0..100 {
            let exit = feed.exit_price(67_000.0);
            assert!((exit - 67_000.0).abs() <= 67_000.0 * EXIT_JITTER * 1.01);
        }
    }
}
