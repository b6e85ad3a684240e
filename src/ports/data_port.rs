//! Candle history access port.

use crate::domain::candle::Candle;
use crate::domain::error::EngineError;

pub trait CandleSource {
    /// All candles for a symbol and timeframe, oldest first.
    fn fetch_candles(&self, symbol: &str, timeframe: &str) -> Result<Vec<Candle>, EngineError>;

    /// Symbols with data for the given timeframe, sorted.
    fn list_symbols(&self, timeframe: &str) -> Result<Vec<String>, EngineError>;
}
