//! `chart.*`: current and previous candle plus derived shape ratios.

use super::{catalog_of, emit, field, Field, ProvidedVariable, VariableDef, VariableProvider};
use crate::domain::candle::Candle;
use crate::domain::value::VariableValue;

pub const NAMESPACE: &str = "chart";

#[derive(Debug, Clone, PartialEq)]
pub struct ChartSnapshot {
    pub symbol: String,
    pub timeframe: String,
    pub current: Candle,
    pub previous: Option<Candle>,
}

impl ChartSnapshot {
    pub fn new(symbol: &str, timeframe: &str, current: Candle) -> Self {
        Self {
            symbol: symbol.to_string(),
            timeframe: timeframe.to_string(),
            current,
            previous: None,
        }
    }

    pub fn with_previous(mut self, previous: Candle) -> Self {
        self.previous = Some(previous);
        self
    }

    /// Last two bars of a series; `None` for an empty series.
    pub fn from_series(symbol: &str, timeframe: &str, candles: &[Candle]) -> Option<Self> {
        let (current, rest) = candles.split_last()?;
        Some(Self {
            symbol: symbol.to_string(),
            timeframe: timeframe.to_string(),
            current: current.clone(),
            previous: rest.last().cloned(),
        })
    }
}

const FIELDS: &[Field] = &[
    field("symbol", "string", None, "Instrument symbol"),
    field("timeframe", "string", None, "Bar timeframe, e.g. 15m"),
    field("price", "float", Some("price"), "Latest price (current close)"),
    field("open", "float", Some("price"), "Current bar open"),
    field("high", "float", Some("price"), "Current bar high"),
    field("low", "float", Some("price"), "Current bar low"),
    field("close", "float", Some("price"), "Current bar close"),
    field("volume", "float", Some("units"), "Current bar volume"),
    field("time", "int", Some("epoch s"), "Current bar open time"),
    field("prev_open", "float", Some("price"), "Previous bar open"),
    field("prev_high", "float", Some("price"), "Previous bar high"),
    field("prev_low", "float", Some("price"), "Previous bar low"),
    field("prev_close", "float", Some("price"), "Previous bar close"),
    field("prev_volume", "float", Some("units"), "Previous bar volume"),
    field("prev_time", "int", Some("epoch s"), "Previous bar open time"),
    field("change", "float", Some("price"), "Close minus previous close (or open)"),
    field("change_pct", "float", Some("%"), "Change relative to previous close (or open)"),
    field("range", "float", Some("price"), "High minus low"),
    field("body", "float", Some("price"), "Absolute open-close distance"),
    field("body_pct", "float", Some("%"), "Body as a share of the range"),
    field("upper_wick", "float", Some("price"), "High above the body"),
    field("lower_wick", "float", Some("price"), "Low below the body"),
    field("typical_price", "float", Some("price"), "(high + low + close) / 3"),
    field("true_range", "float", Some("price"), "Range widened by a gap from the previous close"),
    field("is_bullish", "bool", None, "Close above open"),
    field("is_bearish", "bool", None, "Close below open"),
];

fn pct(part: f64, whole: f64) -> f64 {
    if whole == 0.0 { 0.0 } else { part / whole * 100.0 }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ChartProvider;

impl VariableProvider for ChartProvider {
    type Source = ChartSnapshot;

    fn namespace(&self) -> &'static str {
        NAMESPACE
    }

    fn catalog(&self) -> Vec<VariableDef> {
        catalog_of(NAMESPACE, FIELDS)
    }

    fn provide(&self, source: Option<&ChartSnapshot>) -> Vec<ProvidedVariable> {
        let Some(chart) = source else {
            return Vec::new();
        };
        let c = &chart.current;
        let base = chart.previous.as_ref().map_or(c.open, |p| p.close);
        let true_range = chart
            .previous
            .as_ref()
            .map_or(c.range(), |p| c.true_range(p.close));

        let mut values: Vec<(&'static str, VariableValue)> = vec![
            ("symbol", chart.symbol.clone().into()),
            ("timeframe", chart.timeframe.clone().into()),
            ("price", c.close.into()),
            ("open", c.open.into()),
            ("high", c.high.into()),
            ("low", c.low.into()),
            ("close", c.close.into()),
            ("volume", c.volume.into()),
            ("time", c.time.timestamp().into()),
            ("change", (c.close - base).into()),
            ("change_pct", pct(c.close - base, base).into()),
            ("range", c.range().into()),
            ("body", c.body().into()),
            ("body_pct", pct(c.body(), c.range()).into()),
            ("upper_wick", c.upper_wick().into()),
            ("lower_wick", c.lower_wick().into()),
            ("typical_price", c.typical_price().into()),
            ("true_range", true_range.into()),
            ("is_bullish", c.is_bullish().into()),
            ("is_bearish", c.is_bearish().into()),
        ];
        if let Some(p) = &chart.previous {
            values.extend([
                ("prev_open", p.open.into()),
                ("prev_high", p.high.into()),
                ("prev_low", p.low.into()),
                ("prev_close", p.close.into()),
                ("prev_volume", p.volume.into()),
                ("prev_time", p.time.timestamp().into()),
            ]);
        }
        emit(NAMESPACE, FIELDS, values)
    }
}
