// Market data sources
mod csv_provider;
mod provider;

pub mod synthetic;

pub use csv_provider::{CsvProvider, read_candles, write_candles};
pub use provider::{InMemoryProvider, MarketDataProvider};
