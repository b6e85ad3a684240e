//! Average True Range with Wilder's smoothing.
//!
//! TR[0] = high - low; TR[i] = true range against the previous close.
//! Seed is the mean of the first n TRs. Warmup: first (n-1) bars invalid.

use crate::domain::candle::Candle;
use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType, IndicatorValue};

pub fn calculate_atr(candles: &[Candle], period: usize) -> IndicatorSeries {
    if period == 0 || candles.len() < period {
        return IndicatorSeries::empty(IndicatorType::Atr(period));
    }

    let mut values = Vec::with_capacity(candles.len());
    let mut atr = 0.0;
    let mut sum = 0.0;

    for (i, candle) in candles.iter().enumerate() {
        let tr = if i == 0 {
            candle.range()
        } else {
            candle.true_range(candles[i - 1].close)
        };
        let valid = i + 1 >= period;
        if i + 1 < period {
            sum += tr;
        } else if i + 1 == period {
            atr = (sum + tr) / period as f64;
        } else {
            atr = (atr * (period - 1) as f64 + tr) / period as f64;
        }
        values.push(IndicatorPoint {
            time: candle.time,
            valid,
            value: IndicatorValue::Simple(if valid { atr } else { 0.0 }),
        });
    }

    IndicatorSeries {
        indicator_type: IndicatorType::Atr(period),
        values,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};

    fn make_candle(i: i64, high: f64, low: f64, close: f64) -> Candle {
        Candle {
            time: DateTime::<Utc>::from_timestamp(i * 60, 0).unwrap(),
            open: close,
            high,
            low,
            close,
            volume: 1000.0,
        }
    }

    #[test]
    fn atr_warmup() {
        let candles: Vec<Candle> = (0..5).map(|i| make_candle(i, 110.0, 90.0, 100.0)).collect();
        let series = calculate_atr(&candles, 3);
        assert_eq!(series.values.len(), 5);
        assert!(!series.values[1].valid);
        assert!(series.values[2].valid);
        assert!((series.values[4].value.primary() - 20.0).abs() < 1e-12);
    }

    #[test]
    fn atr_seed_is_average() {
        let candles = vec![
            make_candle(0, 110.0, 100.0, 105.0),
            make_candle(1, 115.0, 105.0, 110.0),
            make_candle(2, 120.0, 110.0, 115.0),
        ];
        let series = calculate_atr(&candles, 3);
        assert!((series.values[2].value.primary() - 10.0).abs() < 1e-12);
    }

    #[test]
    fn atr_too_short() {
        let candles = vec![make_candle(0, 2.0, 1.0, 1.5)];
        assert!(calculate_atr(&candles, 3).values.is_empty());
    }
}
