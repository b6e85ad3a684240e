//! Population standard deviation over n closing prices.
//! Warmup: first (n-1) bars are invalid.

use crate::domain::candle::Candle;
use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType, IndicatorValue};

/// (mean, population stddev) of the closes in `window`.
pub(crate) fn mean_and_stddev(window: &[Candle]) -> (f64, f64) {
    let n = window.len() as f64;
    let mean = window.iter().map(|c| c.close).sum::<f64>() / n;
    let variance = window
        .iter()
        .map(|c| {
            let diff = c.close - mean;
            diff * diff
        })
        .sum::<f64>()
        / n;
    (mean, variance.sqrt())
}

pub fn calculate_stddev(candles: &[Candle], period: usize) -> IndicatorSeries {
    if period == 0 {
        return IndicatorSeries::empty(IndicatorType::Stddev(period));
    }

    let values = candles
        .iter()
        .enumerate()
        .map(|(i, candle)| {
            let valid = i + 1 >= period;
            let value = if valid {
                mean_and_stddev(&candles[i + 1 - period..=i]).1
            } else {
                0.0
            };
            IndicatorPoint {
                time: candle.time,
                valid,
                value: IndicatorValue::Simple(value),
            }
        })
        .collect();

    IndicatorSeries {
        indicator_type: IndicatorType::Stddev(period),
        values,
    }
}
