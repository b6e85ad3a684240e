//! Exponential Moving Average.
//!
//! k = 2/(n+1), seed with first SMA, then EMA[i] = C[i]*k + EMA[i-1]*(1-k).
//! Warmup: first (n-1) bars are invalid.

use crate::domain::candle::Candle;
use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType, IndicatorValue};

pub fn calculate_ema(candles: &[Candle], period: usize) -> IndicatorSeries {
    if period == 0 || candles.is_empty() {
        return IndicatorSeries::empty(IndicatorType::Ema(period));
    }

    let mut values = Vec::with_capacity(candles.len());
    let k = 2.0 / (period as f64 + 1.0);
    let mut ema = 0.0;
    let mut sum = 0.0;

    for (i, candle) in candles.iter().enumerate() {
        let valid = i + 1 >= period;
        if i + 1 < period {
            sum += candle.close;
        } else if i + 1 == period {
            sum += candle.close;
            ema = sum / period as f64;
        } else {
            ema = candle.close * k + ema * (1.0 - k);
        }
        values.push(IndicatorPoint {
            time: candle.time,
            valid,
            value: IndicatorValue::Simple(if valid { ema } else { 0.0 }),
        });
    }

    IndicatorSeries {
        indicator_type: IndicatorType::Ema(period),
        values,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::indicator::test_support::make_candles;

    #[test]
    fn ema_warmup() {
        let series = calculate_ema(&make_candles(&[10.0, 20.0, 30.0, 40.0, 50.0]), 3);
        assert!(!series.values[0].valid);
        assert!(!series.values[1].valid);
        assert!(series.values[2..].iter().all(|p| p.valid));
    }

    #[test]
    fn ema_seed_is_sma() {
        let series = calculate_ema(&make_candles(&[10.0, 20.0, 30.0]), 3);
        let expected_sma = (10.0 + 20.0 + 30.0) / 3.0;
        assert!((series.values[2].value.primary() - expected_sma).abs() < f64::EPSILON);
    }

    #[test]
    fn ema_recursive_calculation() {
        let series = calculate_ema(&make_candles(&[10.0, 20.0, 30.0, 40.0, 50.0]), 3);
        let k = 2.0 / 4.0;
        let sma = 20.0;
        let ema_3 = 40.0 * k + sma * (1.0 - k);
        let ema_4 = 50.0 * k + ema_3 * (1.0 - k);
        assert!((series.values[3].value.primary() - ema_3).abs() < f64::EPSILON);
        assert!((series.values[4].value.primary() - ema_4).abs() < f64::EPSILON);
    }

    #[test]
    fn ema_period_1_tracks_close() {
        let series = calculate_ema(&make_candles(&[10.0, 20.0]), 1);
        assert!((series.values[1].value.primary() - 20.0).abs() < f64::EPSILON);
    }

    #[test]
    fn ema_degenerate_inputs() {
        assert!(calculate_ema(&[], 3).values.is_empty());
        assert!(calculate_ema(&make_candles(&[1.0]), 0).values.is_empty());
    }
}
