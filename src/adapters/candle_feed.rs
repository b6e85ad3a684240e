//! Indicator feed over an in-memory candle series.
//!
//! The last candle is the live (in-progress) bar; the one before it is the
//! most recent closed bar.

use crate::domain::candle::Candle;
use crate::domain::indicator::atr::calculate_atr;
use crate::domain::indicator::bollinger::{calculate_bollinger, width_pct};
use crate::domain::indicator::ema::calculate_ema;
use crate::domain::indicator::roc::calculate_roc;
use crate::domain::indicator::rsi::calculate_rsi;
use crate::domain::indicator::sma::calculate_sma;
use crate::domain::indicator::stddev::calculate_stddev;
use crate::domain::indicator::IndicatorSeries;
use crate::ports::indicator_port::{ClosedBar, IndicatorFeed, IndicatorFrame, IndicatorSnapshot};
use std::sync::{PoisonError, RwLock};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeedParams {
    pub ema_fast: usize,
    pub ema_slow: usize,
    pub rsi: usize,
    pub atr: usize,
    pub bollinger: usize,
    pub bollinger_mult_x100: u32,
    pub roc: usize,
    pub sma: usize,
    pub stddev: usize,
}

impl Default for FeedParams {
    fn default() -> Self {
        Self {
            ema_fast: 12,
            ema_slow: 26,
            rsi: 14,
            atr: 14,
            bollinger: 20,
            bollinger_mult_x100: 200,
            roc: 10,
            sma: 50,
            stddev: 20,
        }
    }
}

struct Computed {
    ema_fast: IndicatorSeries,
    ema_slow: IndicatorSeries,
    rsi: IndicatorSeries,
    atr: IndicatorSeries,
    bollinger: IndicatorSeries,
    roc: IndicatorSeries,
    sma: IndicatorSeries,
    stddev: IndicatorSeries,
}

impl Computed {
    fn new(candles: &[Candle], p: &FeedParams) -> Self {
        Self {
            ema_fast: calculate_ema(candles, p.ema_fast),
            ema_slow: calculate_ema(candles, p.ema_slow),
            rsi: calculate_rsi(candles, p.rsi),
            atr: calculate_atr(candles, p.atr),
            bollinger: calculate_bollinger(candles, p.bollinger, p.bollinger_mult_x100),
            roc: calculate_roc(candles, p.roc),
            sma: calculate_sma(candles, p.sma),
            stddev: calculate_stddev(candles, p.stddev),
        }
    }

    /// Only indicators past their warmup appear in the snapshot.
    fn snapshot_at(&self, i: usize, close: f64) -> IndicatorSnapshot {
        let mut snap = IndicatorSnapshot::new();
        let fast = self.ema_fast.valid_at(i).map(|v| v.primary());
        let slow = self.ema_slow.valid_at(i).map(|v| v.primary());
        if let Some(v) = fast {
            snap.insert("ema_fast".into(), v);
        }
        if let Some(v) = slow {
            snap.insert("ema_slow".into(), v);
        }
        if let (Some(f), Some(s)) = (fast, slow) {
            if s != 0.0 {
                snap.insert("ema_spread_pct".into(), (f - s) / s * 100.0);
            }
        }
        if let Some(v) = self.rsi.valid_at(i) {
            snap.insert("rsi".into(), v.primary());
        }
        if let Some(v) = self.atr.valid_at(i) {
            snap.insert("atr".into(), v.primary());
            if close != 0.0 {
                snap.insert("atr_pct".into(), v.primary() / close * 100.0);
            }
        }
        if let Some(v) = self.bollinger.valid_at(i) {
            snap.insert("bb_width_pct".into(), width_pct(v));
        }
        if let Some(v) = self.roc.valid_at(i) {
            snap.insert("roc".into(), v.primary());
        }
        if let Some(v) = self.sma.valid_at(i) {
            snap.insert("sma".into(), v.primary());
            if v.primary() != 0.0 {
                snap.insert("price_vs_sma_pct".into(), (close - v.primary()) / v.primary() * 100.0);
            }
        }
        if let Some(v) = self.stddev.valid_at(i) {
            snap.insert("stddev".into(), v.primary());
        }
        snap
    }
}

pub struct CandleSeriesFeed {
    params: FeedParams,
    candles: RwLock<Vec<Candle>>,
}

impl CandleSeriesFeed {
    pub fn new(params: FeedParams) -> Self {
        Self {
            params,
            candles: RwLock::new(Vec::new()),
        }
    }

    pub fn from_candles(params: FeedParams, candles: Vec<Candle>) -> Self {
        Self {
            params,
            candles: RwLock::new(candles),
        }
    }

    /// Start a new bar; the previous live bar becomes closed.
    pub fn push(&self, candle: Candle) {
        self.candles
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(candle);
    }

    /// Repaint the live bar, or start the series if it is empty.
    pub fn update_live(&self, candle: Candle) {
        let mut candles = self.candles.write().unwrap_or_else(PoisonError::into_inner);
        match candles.last_mut() {
            Some(last) => *last = candle,
            None => candles.push(candle),
        }
    }

    pub fn len(&self) -> usize {
        self.candles.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl IndicatorFeed for CandleSeriesFeed {
    fn frame(&self) -> Option<IndicatorFrame> {
        let candles = self.candles.read().unwrap_or_else(PoisonError::into_inner);
        let live_index = candles.len().checked_sub(1)?;
        let computed = Computed::new(&candles, &self.params);
        let live = &candles[live_index];
        let closed = live_index.checked_sub(1).map(|i| ClosedBar {
            bar_time: candles[i].time,
            indicators: computed.snapshot_at(i, candles[i].close),
        });
        Some(IndicatorFrame {
            live_bar_time: live.time,
            live: computed.snapshot_at(live_index, live.close),
            closed,
        })
    }
}
