pub mod binance;
pub mod bybit;
pub mod okx;
pub mod upbit;

pub use binance::BinanceAdapter;
pub use bybit::BybitAdapter;
pub use okx::OkxAdapter;
pub use upbit::UpbitAdapter;

use crate::traits::SiteAdapter;
use crate::types::{AggregatorError, FetchConfig, Result};
use std::sync::Arc;

/// Exchanges with a built-in adapter.
pub const EXCHANGES: &[&str] = &["binance", "bybit", "okx", "upbit"];

pub type AdapterConstructor = fn(FetchConfig) -> Result<Arc<dyn SiteAdapter>>;

/// Name-to-constructor table of every built-in adapter.
pub fn registry() -> Vec<(&'static str, AdapterConstructor)> {
    vec![
        ("binance", binance as AdapterConstructor),
        ("bybit", bybit as AdapterConstructor),
        ("okx", okx as AdapterConstructor),
        ("upbit", upbit as AdapterConstructor),
    ]
}

fn binance(config: FetchConfig) -> Result<Arc<dyn SiteAdapter>> {
    Ok(Arc::new(BinanceAdapter::new(config)?))
}

fn bybit(config: FetchConfig) -> Result<Arc<dyn SiteAdapter>> {
    Ok(Arc::new(BybitAdapter::new(config)?))
}

fn okx(config: FetchConfig) -> Result<Arc<dyn SiteAdapter>> {
    Ok(Arc::new(OkxAdapter::new(config)?))
}

fn upbit(config: FetchConfig) -> Result<Arc<dyn SiteAdapter>> {
    Ok(Arc::new(UpbitAdapter::new(config)?))
}

pub fn build(name: &str, config: FetchConfig) -> Result<Arc<dyn SiteAdapter>> {
    let name = name.trim().to_lowercase();
    let constructor = registry()
        .into_iter()
        .find(|(known, _)| *known == name)
        .map(|(_, constructor)| constructor)
        .ok_or(AggregatorError::UnknownExchange { name })?;
    constructor(config)
}

pub fn build_all(names: &[String], config: &FetchConfig) -> Result<Vec<Arc<dyn SiteAdapter>>> {
    names.iter().map(|name| build(name, config.clone())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_covers_every_exchange() {
        let names: Vec<_> = registry().into_iter().map(|(name, _)| name).collect();
        assert_eq!(names, EXCHANGES);
    }

    #[test]
    fn builds_known_and_rejects_unknown() {
        let adapter = build("Binance", FetchConfig::immediate()).unwrap();
        assert_eq!(adapter.exchange(), "binance");
        assert!(matches!(
            build("nowhere", FetchConfig::immediate()),
            Err(AggregatorError::UnknownExchange { .. })
        ));
    }
}
