//! Indicator source port for the regime monitor.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Indicator name to value, e.g. `rsi -> 61.2`.
pub type IndicatorSnapshot = BTreeMap<String, f64>;

/// Indicators as of a fully completed bar.
#[derive(Debug, Clone, PartialEq)]
pub struct ClosedBar {
    pub bar_time: DateTime<Utc>,
    pub indicators: IndicatorSnapshot,
}

/// What the feed knows right now: the in-progress bar and, when at least one
/// bar has completed, the most recent closed one.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorFrame {
    pub live_bar_time: DateTime<Utc>,
    pub live: IndicatorSnapshot,
    pub closed: Option<ClosedBar>,
}

pub trait IndicatorFeed: Send + Sync {
    /// `None` when there is not enough data to compute indicators.
    fn frame(&self) -> Option<IndicatorFrame>;
}
