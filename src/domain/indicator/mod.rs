//! Technical indicators over a candle series.
//!
//! Each calculation returns one point per input candle; points inside the
//! warmup window are marked invalid.

pub mod atr;
pub mod bollinger;
pub mod ema;
pub mod roc;
pub mod rsi;
pub mod sma;
pub mod stddev;

use chrono::{DateTime, Utc};
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorPoint {
    pub time: DateTime<Utc>,
    pub valid: bool,
    pub value: IndicatorValue,
}

#[derive(Debug, Clone, PartialEq)]
pub enum IndicatorValue {
    Simple(f64),
    Bollinger { upper: f64, middle: f64, lower: f64 },
}

impl IndicatorValue {
    /// Scalar reading; the middle band for Bollinger.
    pub fn primary(&self) -> f64 {
        match self {
            IndicatorValue::Simple(v) => *v,
            IndicatorValue::Bollinger { middle, .. } => *middle,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IndicatorType {
    Sma(usize),
    Ema(usize),
    Rsi(usize),
    Roc(usize),
    Atr(usize),
    Stddev(usize),
    Bollinger { period: usize, stddev_mult_x100: u32 },
}

#[derive(Debug, Clone)]
pub struct IndicatorSeries {
    pub indicator_type: IndicatorType,
    pub values: Vec<IndicatorPoint>,
}

impl IndicatorSeries {
    pub(crate) fn empty(indicator_type: IndicatorType) -> Self {
        Self {
            indicator_type,
            values: Vec::new(),
        }
    }

    /// Value at `index` if it is past the warmup window.
    pub fn valid_at(&self, index: usize) -> Option<&IndicatorValue> {
        self.values
            .get(index)
            .filter(|p| p.valid)
            .map(|p| &p.value)
    }
}

impl fmt::Display for IndicatorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndicatorType::Sma(period) => write!(f, "SMA({})", period),
            IndicatorType::Ema(period) => write!(f, "EMA({})", period),
            IndicatorType::Rsi(period) => write!(f, "RSI({})", period),
            IndicatorType::Roc(period) => write!(f, "ROC({})", period),
            IndicatorType::Atr(period) => write!(f, "ATR({})", period),
            IndicatorType::Stddev(period) => write!(f, "STDDEV({})", period),
            IndicatorType::Bollinger {
                period,
                stddev_mult_x100,
            } => {
                let mult = *stddev_mult_x100 as f64 / 100.0;
                write!(f, "BOLLINGER({},{})", period, mult)
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indicator_type_display() {
        assert_eq!(IndicatorType::Ema(20).to_string(), "EMA(20)");
        let boll = IndicatorType::Bollinger {
            period: 20,
            stddev_mult_x100: 200,
        };
        assert_eq!(boll.to_string(), "BOLLINGER(20,2)");
    }

    #[test]
    fn valid_at_skips_warmup() {
        let series = IndicatorSeries {
            indicator_type: IndicatorType::Sma(2),
            values: vec![
                IndicatorPoint {
                    time: DateTime::<Utc>::from_timestamp(0, 0).unwrap(),
                    valid: false,
                    value: IndicatorValue::Simple(0.0),
                },
                IndicatorPoint {
                    time: DateTime::<Utc>::from_timestamp(60, 0).unwrap(),
                    valid: true,
                    value: IndicatorValue::Simple(1.5),
                },
            ],
        };
        assert!(series.valid_at(0).is_none());
        assert_eq!(series.valid_at(1).map(|v| v.primary()), Some(1.5));
        assert!(series.valid_at(2).is_none());
    }
}
