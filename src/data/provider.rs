use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::Candle;
use crate::error::ProviderError;

/// Abstract interface for fetching daily market data.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Up to `lookback_days` most recent daily bars for `symbol`, oldest first.
    async fn fetch_candles(&self, symbol: &str, lookback_days: usize) -> Result<Vec<Candle>, ProviderError>;
}

#[async_trait]
impl<P: MarketDataProvider + ?Sized> MarketDataProvider for Arc<P> {
    async fn fetch_candles(&self, symbol: &str, lookback_days: usize) -> Result<Vec<Candle>, ProviderError> {
        (**self).fetch_candles(symbol, lookback_days).await
    }
}

/// Keep the trailing `lookback_days` bars.
pub(crate) fn tail(mut candles: Vec<Candle>, lookback_days: usize) -> Vec<Candle> {
    if candles.len() > lookback_days {
        candles.drain(..candles.len() - lookback_days);
    }
    candles
}

/// Serves pre-loaded bars. Optional artificial latency for exercising timeouts.
#[derive(Debug, Default)]
pub struct InMemoryProvider {
    series: HashMap<String, Vec<Candle>>,
    latency: Option<Duration>,
    fetches: AtomicUsize,
}

impl InMemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_series(mut self, symbol: impl Into<String>, candles: Vec<Candle>) -> Self {
        self.insert(symbol, candles);
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn insert(&mut self, symbol: impl Into<String>, candles: Vec<Candle>) {
        self.series.insert(symbol.into(), candles);
    }

    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.series.keys().cloned().collect();
        symbols.sort();
        symbols
    }

    /// Number of `fetch_candles` calls served so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl MarketDataProvider for InMemoryProvider {
    async fn fetch_candles(&self, symbol: &str, lookback_days: usize) -> Result<Vec<Candle>, ProviderError> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let candles = self
            .series
            .get(symbol)
            .ok_or_else(|| ProviderError::SymbolNotFound(symbol.to_string()))?;
        Ok(tail(candles.clone(), lookback_days))
    }
}
