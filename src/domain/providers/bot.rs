//! `bot.*`: trading configuration (risk, SL/TP, trailing stop, session,
//! AI validation).

use super::{catalog_of, emit, field, Field, ProvidedVariable, VariableDef, VariableProvider};
use crate::domain::value::VariableValue;
use crate::ports::config_port::ConfigPort;
use serde::{Deserialize, Serialize};

pub const NAMESPACE: &str = "bot";
pub const SECTION: &str = "bot";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    pub symbol: String,
    pub timeframe: String,
    pub paper_mode: bool,
    pub leverage: i64,
    pub order_type: String,
    pub risk_per_trade_pct: f64,
    pub max_daily_loss_pct: f64,
    pub max_open_positions: i64,
    pub max_trades_per_day: i64,
    pub cooldown_bars: i64,
    pub min_volume: f64,
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,
    pub use_atr_stop: bool,
    pub atr_multiplier: f64,
    pub trailing_stop_enabled: bool,
    pub trailing_stop_pct: f64,
    pub trailing_activation_pct: f64,
    pub break_even_enabled: bool,
    pub break_even_trigger_pct: f64,
    pub session_enabled: bool,
    pub session_start: String,
    pub session_end: String,
    pub ai_validation_enabled: bool,
    pub ai_confidence_threshold: f64,
    pub ai_provider: String,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            symbol: "BTCUSDT".to_string(),
            timeframe: "15m".to_string(),
            paper_mode: true,
            leverage: 1,
            order_type: "market".to_string(),
            risk_per_trade_pct: 1.0,
            max_daily_loss_pct: 5.0,
            max_open_positions: 1,
            max_trades_per_day: 10,
            cooldown_bars: 0,
            min_volume: 0.0,
            stop_loss_pct: 2.0,
            take_profit_pct: 4.0,
            use_atr_stop: false,
            atr_multiplier: 2.0,
            trailing_stop_enabled: false,
            trailing_stop_pct: 1.0,
            trailing_activation_pct: 1.5,
            break_even_enabled: false,
            break_even_trigger_pct: 1.0,
            session_enabled: false,
            session_start: "00:00".to_string(),
            session_end: "23:59".to_string(),
            ai_validation_enabled: false,
            ai_confidence_threshold: 0.7,
            ai_provider: "none".to_string(),
        }
    }
}

impl BotConfig {
    /// Read the `[bot]` section; absent keys keep their defaults.
    pub fn from_config(config: &dyn ConfigPort) -> Self {
        let d = Self::default();
        let string = |key: &str, default: String| config.get_string(SECTION, key).unwrap_or(default);
        let int = |key: &str, default: i64| config.get_int(SECTION, key, default);
        let double = |key: &str, default: f64| config.get_double(SECTION, key, default);
        let boolean = |key: &str, default: bool| config.get_bool(SECTION, key, default);
        Self {
            symbol: string("symbol", d.symbol),
            timeframe: string("timeframe", d.timeframe),
            paper_mode: boolean("paper_mode", d.paper_mode),
            leverage: int("leverage", d.leverage),
            order_type: string("order_type", d.order_type),
            risk_per_trade_pct: double("risk_per_trade_pct", d.risk_per_trade_pct),
            max_daily_loss_pct: double("max_daily_loss_pct", d.max_daily_loss_pct),
            max_open_positions: int("max_open_positions", d.max_open_positions),
            max_trades_per_day: int("max_trades_per_day", d.max_trades_per_day),
            cooldown_bars: int("cooldown_bars", d.cooldown_bars),
            min_volume: double("min_volume", d.min_volume),
            stop_loss_pct: double("stop_loss_pct", d.stop_loss_pct),
            take_profit_pct: double("take_profit_pct", d.take_profit_pct),
            use_atr_stop: boolean("use_atr_stop", d.use_atr_stop),
            atr_multiplier: double("atr_multiplier", d.atr_multiplier),
            trailing_stop_enabled: boolean("trailing_stop_enabled", d.trailing_stop_enabled),
            trailing_stop_pct: double("trailing_stop_pct", d.trailing_stop_pct),
            trailing_activation_pct: double("trailing_activation_pct", d.trailing_activation_pct),
            break_even_enabled: boolean("break_even_enabled", d.break_even_enabled),
            break_even_trigger_pct: double("break_even_trigger_pct", d.break_even_trigger_pct),
            session_enabled: boolean("session_enabled", d.session_enabled),
            session_start: string("session_start", d.session_start),
            session_end: string("session_end", d.session_end),
            ai_validation_enabled: boolean("ai_validation_enabled", d.ai_validation_enabled),
            ai_confidence_threshold: double("ai_confidence_threshold", d.ai_confidence_threshold),
            ai_provider: string("ai_provider", d.ai_provider),
        }
    }
}

const FIELDS: &[Field] = &[
    field("symbol", "string", None, "Traded symbol"),
    field("timeframe", "string", None, "Bot timeframe"),
    field("paper_mode", "bool", None, "Simulated orders only"),
    field("leverage", "int", Some("x"), "Position leverage"),
    field("order_type", "string", None, "market or limit"),
    field("risk_per_trade_pct", "float", Some("%"), "Equity risked per trade"),
    field("max_daily_loss_pct", "float", Some("%"), "Daily loss limit"),
    field("max_open_positions", "int", None, "Concurrent position limit"),
    field("max_trades_per_day", "int", None, "Daily trade limit"),
    field("cooldown_bars", "int", Some("bars"), "Bars to wait after a close"),
    field("min_volume", "float", Some("units"), "Minimum bar volume to trade"),
    field("stop_loss_pct", "float", Some("%"), "Stop-loss distance"),
    field("take_profit_pct", "float", Some("%"), "Take-profit distance"),
    field("use_atr_stop", "bool", None, "Stop distance from ATR instead of percent"),
    field("atr_multiplier", "float", Some("x"), "ATR multiple for the stop"),
    field("trailing_stop_enabled", "bool", None, "Trailing stop active"),
    field("trailing_stop_pct", "float", Some("%"), "Trailing distance"),
    field("trailing_activation_pct", "float", Some("%"), "Profit that arms the trailing stop"),
    field("break_even_enabled", "bool", None, "Move stop to entry after trigger"),
    field("break_even_trigger_pct", "float", Some("%"), "Profit that triggers break-even"),
    field("session_enabled", "bool", None, "Trading restricted to a session window"),
    field("session_start", "string", Some("HH:MM"), "Session start (UTC)"),
    field("session_end", "string", Some("HH:MM"), "Session end (UTC)"),
    field("ai_validation_enabled", "bool", None, "Signals confirmed by an AI validator"),
    field("ai_confidence_threshold", "float", None, "Minimum validator confidence"),
    field("ai_provider", "string", None, "Validator backend"),
];

#[derive(Debug, Default, Clone, Copy)]
pub struct BotProvider;

impl VariableProvider for BotProvider {
    type Source = BotConfig;

    fn namespace(&self) -> &'static str {
        NAMESPACE
    }

    fn catalog(&self) -> Vec<VariableDef> {
        catalog_of(NAMESPACE, FIELDS)
    }

    fn provide(&self, source: Option<&BotConfig>) -> Vec<ProvidedVariable> {
        let Some(bot) = source else {
            return Vec::new();
        };
        let values: Vec<(&'static str, VariableValue)> = vec![
            ("symbol", bot.symbol.clone().into()),
            ("timeframe", bot.timeframe.clone().into()),
            ("paper_mode", bot.paper_mode.into()),
            ("leverage", bot.leverage.into()),
            ("order_type", bot.order_type.clone().into()),
            ("risk_per_trade_pct", bot.risk_per_trade_pct.into()),
            ("max_daily_loss_pct", bot.max_daily_loss_pct.into()),
            ("max_open_positions", bot.max_open_positions.into()),
            ("max_trades_per_day", bot.max_trades_per_day.into()),
            ("cooldown_bars", bot.cooldown_bars.into()),
            ("min_volume", bot.min_volume.into()),
            ("stop_loss_pct", bot.stop_loss_pct.into()),
            ("take_profit_pct", bot.take_profit_pct.into()),
            ("use_atr_stop", bot.use_atr_stop.into()),
            ("atr_multiplier", bot.atr_multiplier.into()),
            ("trailing_stop_enabled", bot.trailing_stop_enabled.into()),
            ("trailing_stop_pct", bot.trailing_stop_pct.into()),
            ("trailing_activation_pct", bot.trailing_activation_pct.into()),
            ("break_even_enabled", bot.break_even_enabled.into()),
            ("break_even_trigger_pct", bot.break_even_trigger_pct.into()),
            ("session_enabled", bot.session_enabled.into()),
            ("session_start", bot.session_start.clone().into()),
            ("session_end", bot.session_end.clone().into()),
            ("ai_validation_enabled", bot.ai_validation_enabled.into()),
            ("ai_confidence_threshold", bot.ai_confidence_threshold.into()),
            ("ai_provider", bot.ai_provider.clone().into()),
        ];
        emit(NAMESPACE, FIELDS, values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::file_config_adapter::FileConfigAdapter;

    #[test]
    fn absent_bot_is_empty() {
        assert!(BotProvider.provide(None).is_empty());
    }

    #[test]
    fn every_field_is_emitted() {
        let vars = BotProvider.provide(Some(&BotConfig::default()));
        assert_eq!(vars.len(), FIELDS.len());
        assert_eq!(BotProvider.catalog().len(), FIELDS.len());
        let paper = vars.iter().find(|v| v.name() == "bot.paper_mode").unwrap();
        assert_eq!(paper.value, VariableValue::Bool(true));
    }

    #[test]
    fn reads_bot_section() {
        let ini = "[bot]\nsymbol = ETHUSDT\npaper_mode = false\nleverage = 3\nstop_loss_pct = 1.5\n";
        let config = FileConfigAdapter::from_string(ini).unwrap();
        let bot = BotConfig::from_config(&config);
        assert_eq!(bot.symbol, "ETHUSDT");
        assert!(!bot.paper_mode);
        assert_eq!(bot.leverage, 3);
        assert_eq!(bot.stop_loss_pct, 1.5);
        assert_eq!(bot.take_profit_pct, BotConfig::default().take_profit_pct);
    }

    #[test]
    fn deserializes_partial_json() {
        let bot: BotConfig = serde_json::from_str(r#"{"symbol": "SOLUSDT", "leverage": 5}"#).unwrap();
        assert_eq!(bot.symbol, "SOLUSDT");
        assert_eq!(bot.leverage, 5);
        assert!(bot.paper_mode);
    }
}
