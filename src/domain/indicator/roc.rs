//! ROC (Rate of Change).
//!
//! ROC(n)[i] = ((C[i] - C[i-n]) / C[i-n]) * 100, 0 when C[i-n] == 0.
//! Warmup: first n bars invalid.

use crate::domain::candle::Candle;
use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType, IndicatorValue};

pub fn calculate_roc(candles: &[Candle], period: usize) -> IndicatorSeries {
    let values = candles
        .iter()
        .enumerate()
        .map(|(i, candle)| {
            let valid = period > 0 && i >= period;
            let value = if valid {
                let prev_close = candles[i - period].close;
                if prev_close == 0.0 {
                    0.0
                } else {
                    (candle.close - prev_close) / prev_close * 100.0
                }
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
        indicator_type: IndicatorType::Roc(period),
        values,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::indicator::test_support::make_candles;

    #[test]
    fn roc_basic() {
        let series = calculate_roc(&make_candles(&[100.0, 105.0, 110.0]), 2);
        assert!(!series.values[1].valid);
        assert!((series.values[2].value.primary() - 10.0).abs() < 1e-10);
    }

    #[test]
    fn roc_zero_base() {
        let series = calculate_roc(&make_candles(&[0.0, 5.0]), 1);
        assert_eq!(series.values[1].value.primary(), 0.0);
    }
}
