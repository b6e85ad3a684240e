//! Concrete adapter implementations for ports.

pub mod candle_feed;
pub mod csv_adapter;
pub mod file_config_adapter;
pub mod project_store;
pub mod regime_config_adapter;
