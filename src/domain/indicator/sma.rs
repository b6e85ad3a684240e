//! Simple Moving Average: mean of the last n closes.
//! Warmup: first (n-1) bars are invalid.

use crate::domain::candle::Candle;
use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType, IndicatorValue};

pub fn calculate_sma(candles: &[Candle], period: usize) -> IndicatorSeries {
    if period == 0 {
        return IndicatorSeries::empty(IndicatorType::Sma(period));
    }

    let mut values = Vec::with_capacity(candles.len());
    let mut sum = 0.0;

    for (i, candle) in candles.iter().enumerate() {
        sum += candle.close;
        if i >= period {
            sum -= candles[i - period].close;
        }
        let valid = i + 1 >= period;
        values.push(IndicatorPoint {
            time: candle.time,
            valid,
            value: IndicatorValue::Simple(if valid { sum / period as f64 } else { 0.0 }),
        });
    }

    IndicatorSeries {
        indicator_type: IndicatorType::Sma(period),
        values,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::indicator::test_support::make_candles;
    use approx::assert_relative_eq;

    #[test]
    fn sma_window() {
        let series = calculate_sma(&make_candles(&[1.0, 2.0, 3.0, 4.0]), 3);
        assert!(!series.values[1].valid);
        assert_relative_eq!(series.values[2].value.primary(), 2.0);
        assert_relative_eq!(series.values[3].value.primary(), 3.0);
    }

    #[test]
    fn sma_period_0() {
        assert!(calculate_sma(&make_candles(&[1.0]), 0).values.is_empty());
    }
}
