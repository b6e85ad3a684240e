#![allow(dead_code)]

use chrono::{DateTime, Utc};
use std::io::Write;
use std::sync::Mutex;
pub use tradecel::domain::candle::Candle;
use tradecel::domain::project_vars::{ProjectVariable, ProjectVariables};
use tradecel::ports::indicator_port::{ClosedBar, IndicatorFeed, IndicatorFrame, IndicatorSnapshot};

pub const BAR_SECS: i64 = 900;

pub fn at(bar: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(1_704_067_200 + bar * BAR_SECS, 0).unwrap()
}

pub fn make_candle(bar: i64, open: f64, close: f64) -> Candle {
    Candle {
        time: at(bar),
        open,
        high: open.max(close) * 1.002,
        low: open.min(close) * 0.998,
        close,
        volume: 100.0 + bar as f64,
    }
}

/// Steady uptrend: each close 1% above the last.
pub fn rising_candles(n: i64) -> Vec<Candle> {
    (0..n)
        .map(|i| {
            let close = 100.0 * 1.01_f64.powi(i as i32);
            make_candle(i, close / 1.01, close)
        })
        .collect()
}

/// Alternating closes around 100, no trend.
pub fn flat_candles(n: i64) -> Vec<Candle> {
    (0..n)
        .map(|i| {
            let close = if i % 2 == 0 { 100.2 } else { 99.8 };
            make_candle(i, 100.0, close)
        })
        .collect()
}

pub fn candles_csv(candles: &[Candle]) -> String {
    let mut out = String::from("time,open,high,low,close,volume\n");
    for c in candles {
        out.push_str(&format!(
            "{},{},{},{},{},{}\n",
            c.time.timestamp(),
            c.open,
            c.high,
            c.low,
            c.close,
            c.volume
        ));
    }
    out
}

pub fn write_temp(content: &str, suffix: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

pub const BOT_INI: &str = r#"
[engine]
expression_cache_capacity = 32
project_cache_capacity = 8

[bot]
symbol = BTCUSDT
timeframe = 15m
paper_mode = true
leverage = 3
risk_per_trade_pct = 1.5
stop_loss_pct = 2
take_profit_pct = 4
session_start = 08:00
session_end = 20:00

[strategy]
name = Breakout
direction = long
entry_expression = chart.close > cfg.level && bot.paper_mode

[strategy.params]
level = 100
atr_mult = 2.5
"#;

pub fn sample_project() -> ProjectVariables {
    let mut vars = ProjectVariables::new("alpha");
    vars.add_variable(
        ProjectVariable::new("entry_level", 95_000.0)
            .unwrap()
            .with_unit("USDT")
            .with_category("levels")
            .with_description("Breakout level"),
    )
    .unwrap();
    vars.add_variable(ProjectVariable::new("max_trades", 3i64).unwrap().with_tags(&["risk"]))
        .unwrap();
    vars.add_variable(ProjectVariable::new("use_filter", true).unwrap()).unwrap();
    vars
}

/// Indicator feed returning whatever frame the test scripted last.
pub struct MockFeed {
    frame: Mutex<Option<IndicatorFrame>>,
}

impl MockFeed {
    pub fn new() -> Self {
        Self {
            frame: Mutex::new(None),
        }
    }

    pub fn set(&self, live_bar: i64, live: &[(&str, f64)], closed: Option<(i64, &[(&str, f64)])>) {
        let snap = |pairs: &[(&str, f64)]| -> IndicatorSnapshot {
            pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
        };
        *self.frame.lock().unwrap() = Some(IndicatorFrame {
            live_bar_time: at(live_bar),
            live: snap(live),
            closed: closed.map(|(bar, pairs)| ClosedBar {
                bar_time: at(bar),
                indicators: snap(pairs),
            }),
        });
    }
}

impl IndicatorFeed for MockFeed {
    fn frame(&self) -> Option<IndicatorFrame> {
        self.frame.lock().unwrap().clone()
    }
}
