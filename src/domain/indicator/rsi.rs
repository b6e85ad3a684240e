//! RSI (Relative Strength Index) with Wilder's smoothing.
//!
//! - First average: simple mean of gains/losses over the first n changes
//! - Subsequent: avg = (prev_avg * (n-1) + current) / n
//!
//! RSI = 100 - (100 / (1 + avg_gain / avg_loss)); 100 when avg_loss == 0.
//! Warmup: first n bars are invalid.

use crate::domain::candle::Candle;
use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType, IndicatorValue};

fn rsi_from(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        100.0
    } else {
        100.0 - (100.0 / (1.0 + avg_gain / avg_loss))
    }
}

pub fn calculate_rsi(candles: &[Candle], period: usize) -> IndicatorSeries {
    let invalid = |c: &Candle| IndicatorPoint {
        time: c.time,
        valid: false,
        value: IndicatorValue::Simple(0.0),
    };

    if period == 0 || candles.len() < 2 {
        return IndicatorSeries {
            indicator_type: IndicatorType::Rsi(period),
            values: candles.iter().map(invalid).collect(),
        };
    }

    let mut values = Vec::with_capacity(candles.len());
    values.push(invalid(&candles[0]));

    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;

    for (i, window) in candles.windows(2).enumerate() {
        let change = window[1].close - window[0].close;
        let gain = change.max(0.0);
        let loss = (-change).max(0.0);

        if i + 1 < period {
            avg_gain += gain;
            avg_loss += loss;
            values.push(invalid(&window[1]));
            continue;
        }
        if i + 1 == period {
            avg_gain = (avg_gain + gain) / period as f64;
            avg_loss = (avg_loss + loss) / period as f64;
        } else {
            avg_gain = (avg_gain * (period - 1) as f64 + gain) / period as f64;
            avg_loss = (avg_loss * (period - 1) as f64 + loss) / period as f64;
        }
        values.push(IndicatorPoint {
            time: window[1].time,
            valid: true,
            value: IndicatorValue::Simple(rsi_from(avg_gain, avg_loss)),
        });
    }

    IndicatorSeries {
        indicator_type: IndicatorType::Rsi(period),
        values,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::indicator::test_support::make_candles;

    #[test]
    fn rsi_warmup_period() {
        let prices: Vec<f64> = (1..=15).map(|i| 100.0 + (i as f64 % 5.0) * 2.0).collect();
        let series = calculate_rsi(&make_candles(&prices), 14);
        assert_eq!(series.values.len(), 15);
        for i in 0..14 {
            assert!(!series.values[i].valid, "bar {} should be invalid", i);
        }
        assert!(series.values[14].valid);
    }

    #[test]
    fn rsi_all_gains_is_100() {
        let prices: Vec<f64> = (0..15).map(|i| 100.0 + i as f64).collect();
        let series = calculate_rsi(&make_candles(&prices), 14);
        assert!((series.values[14].value.primary() - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn rsi_all_losses_is_0() {
        let prices: Vec<f64> = (0..15).map(|i| 100.0 - i as f64).collect();
        let series = calculate_rsi(&make_candles(&prices), 14);
        assert!(series.values[14].value.primary().abs() < f64::EPSILON);
    }

    #[test]
    fn rsi_in_range() {
        let prices: Vec<f64> = (1..=40).map(|i| 100.0 + (i as f64 % 7.0 - 3.0) * 2.0).collect();
        let series = calculate_rsi(&make_candles(&prices), 14);
        for point in series.values.iter().filter(|p| p.valid) {
            let rsi = point.value.primary();
            assert!((0.0..=100.0).contains(&rsi), "RSI {} out of range", rsi);
        }
    }

    #[test]
    fn rsi_known_calculation() {
        let prices = [
            44.0, 44.25, 44.50, 43.75, 44.50, 44.25, 44.75, 45.25, 45.50, 45.25, 45.50, 46.0,
            46.25, 46.0, 46.50,
        ];
        let series = calculate_rsi(&make_candles(&prices), 14);
        let rsi = series.values[14].value.primary();
        assert!(rsi > 50.0 && rsi < 100.0, "RSI should be in bullish territory");
    }

    #[test]
    fn rsi_degenerate_inputs() {
        assert!(calculate_rsi(&[], 14).values.is_empty());
        let series = calculate_rsi(&make_candles(&[1.0, 2.0]), 0);
        assert!(series.values.iter().all(|p| !p.valid));
    }
}
