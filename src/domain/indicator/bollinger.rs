//! Bollinger Bands: SMA(n) middle band, +/- multiplier x population stddev.
//! Warmup: first (period-1) bars are invalid.

use crate::domain::candle::Candle;
use crate::domain::indicator::stddev::mean_and_stddev;
use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType, IndicatorValue};

pub fn calculate_bollinger(
    candles: &[Candle],
    period: usize,
    stddev_mult_x100: u32,
) -> IndicatorSeries {
    let indicator_type = IndicatorType::Bollinger {
        period,
        stddev_mult_x100,
    };
    if period == 0 {
        return IndicatorSeries::empty(indicator_type);
    }
    let mult = stddev_mult_x100 as f64 / 100.0;

    let values = candles
        .iter()
        .enumerate()
        .map(|(i, candle)| {
            let valid = i + 1 >= period;
            let (upper, middle, lower) = if valid {
                let (middle, stddev) = mean_and_stddev(&candles[i + 1 - period..=i]);
                (middle + mult * stddev, middle, middle - mult * stddev)
            } else {
                (0.0, 0.0, 0.0)
            };
            IndicatorPoint {
                time: candle.time,
                valid,
                value: IndicatorValue::Bollinger {
                    upper,
                    middle,
                    lower,
                },
            }
        })
        .collect();

    IndicatorSeries {
        indicator_type,
        values,
    }
}

/// Band width as a percentage of the middle band; 0 for a zero middle.
pub fn width_pct(value: &IndicatorValue) -> f64 {
    match value {
        IndicatorValue::Bollinger {
            upper,
            middle,
            lower,
        } if *middle != 0.0 => (upper - lower) / middle * 100.0,
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::indicator::test_support::make_candles;

    #[test]
    fn bands_symmetric_around_sma() {
        let series = calculate_bollinger(&make_candles(&[2.0, 4.0, 6.0, 8.0]), 4, 200);
        let IndicatorValue::Bollinger {
            upper,
            middle,
            lower,
        } = series.values[3].value
        else {
            panic!("expected bands");
        };
        assert!((middle - 5.0).abs() < 1e-12);
        assert!((upper - middle - (middle - lower)).abs() < 1e-12);
        assert!((upper - middle - 2.0 * 5.0_f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn flat_prices_have_zero_width() {
        let series = calculate_bollinger(&make_candles(&[3.0; 5]), 3, 200);
        assert_eq!(width_pct(&series.values[4].value), 0.0);
        assert!(!series.values[1].valid);
    }
}
