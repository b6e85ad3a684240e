//! `trade.*`: the position in progress and its running performance.

use super::{catalog_of, emit, field, Field, ProvidedVariable, VariableDef, VariableProvider};
use crate::domain::value::VariableValue;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const NAMESPACE: &str = "trade";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Long => "long",
            Side::Short => "short",
        }
    }

    fn direction(&self) -> f64 {
        match self {
            Side::Long => 1.0,
            Side::Short => -1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeState {
    pub side: Side,
    pub entry_price: f64,
    pub quantity: f64,
    pub current_price: f64,
    #[serde(default)]
    pub stop_loss: Option<f64>,
    #[serde(default)]
    pub take_profit: Option<f64>,
    pub entry_time: DateTime<Utc>,
    #[serde(default)]
    pub bars_in_trade: i64,
    #[serde(default)]
    pub max_favorable_pct: f64,
    #[serde(default)]
    pub max_adverse_pct: f64,
}

impl TradeState {
    pub fn unrealized_pnl(&self) -> f64 {
        (self.current_price - self.entry_price) * self.quantity * self.side.direction()
    }

    pub fn pnl_pct(&self) -> f64 {
        if self.entry_price == 0.0 {
            return 0.0;
        }
        (self.current_price - self.entry_price) / self.entry_price * 100.0 * self.side.direction()
    }

    /// Percent move from the current price to `level`, positive when the
    /// level lies in the trade's favour.
    fn distance_pct(&self, level: f64) -> f64 {
        if self.current_price == 0.0 {
            return 0.0;
        }
        (level - self.current_price) / self.current_price * 100.0 * self.side.direction()
    }
}

const FIELDS: &[Field] = &[
    field("is_open", "bool", None, "A position is open"),
    field("side", "string", None, "long or short"),
    field("entry_price", "float", Some("price"), "Average entry price"),
    field("quantity", "float", Some("units"), "Position size"),
    field("current_price", "float", Some("price"), "Mark price"),
    field("stop_loss", "float", Some("price"), "Active stop level"),
    field("take_profit", "float", Some("price"), "Active target level"),
    field("distance_to_stop_pct", "float", Some("%"), "Signed distance to the stop"),
    field("distance_to_tp_pct", "float", Some("%"), "Signed distance to the target"),
    field("unrealized_pnl", "float", Some("quote"), "Open profit or loss"),
    field("pnl_pct", "float", Some("%"), "Open profit or loss relative to entry"),
    field("entry_time", "int", Some("epoch s"), "Entry time"),
    field("bars_in_trade", "int", Some("bars"), "Bars since entry"),
    field("max_favorable_pct", "float", Some("%"), "Best excursion so far"),
    field("max_adverse_pct", "float", Some("%"), "Worst excursion so far"),
];

#[derive(Debug, Default, Clone, Copy)]
pub struct TradeProvider;

impl VariableProvider for TradeProvider {
    type Source = TradeState;

    fn namespace(&self) -> &'static str {
        NAMESPACE
    }

    fn catalog(&self) -> Vec<VariableDef> {
        catalog_of(NAMESPACE, FIELDS)
    }

    fn provide(&self, source: Option<&TradeState>) -> Vec<ProvidedVariable> {
        let Some(trade) = source else {
            return Vec::new();
        };
        let mut values: Vec<(&'static str, VariableValue)> = vec![
            ("is_open", true.into()),
            ("side", trade.side.as_str().into()),
            ("entry_price", trade.entry_price.into()),
            ("quantity", trade.quantity.into()),
            ("current_price", trade.current_price.into()),
            ("unrealized_pnl", trade.unrealized_pnl().into()),
            ("pnl_pct", trade.pnl_pct().into()),
            ("entry_time", trade.entry_time.timestamp().into()),
            ("bars_in_trade", trade.bars_in_trade.into()),
            ("max_favorable_pct", trade.max_favorable_pct.into()),
            ("max_adverse_pct", trade.max_adverse_pct.into()),
        ];
        if let Some(stop) = trade.stop_loss {
            values.push(("stop_loss", stop.into()));
            values.push(("distance_to_stop_pct", trade.distance_pct(stop).into()));
        }
        if let Some(target) = trade.take_profit {
            values.push(("take_profit", target.into()));
            values.push(("distance_to_tp_pct", trade.distance_pct(target).into()));
        }
        emit(NAMESPACE, FIELDS, values)
    }
}
