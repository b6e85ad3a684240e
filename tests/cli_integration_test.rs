//! CLI integration tests.
//!
//! Tests cover:
//! - Config loading and validation through `load_config`
//! - Each subcommand against real files on disk
//! - Exit codes for compile, config and project-file failures

mod common;

use clap::Parser;
use common::*;
use std::fs;
use std::process::ExitCode;
use tempfile::TempDir;
use tradecel::adapters::project_store::{variables_path, ProjectVariableStore};
use tradecel::cli::{self, Cli};
use tradecel::domain::config_validation::{validate_bot_config, validate_strategy_config};
use tradecel::domain::error::EngineError;
use tradecel::domain::value::VariableValue;

// ExitCode has no PartialEq; compare the Debug form.
fn same(a: ExitCode, b: ExitCode) -> bool {
    format!("{a:?}") == format!("{b:?}")
}

fn run(args: &[&str]) -> ExitCode {
    let mut full = vec!["tradecel"];
    full.extend_from_slice(args);
    cli::run(Cli::parse_from(full))
}

mod config_loading {
    use super::*;

    #[test]
    fn bot_ini_is_valid() {
        let file = write_temp(BOT_INI, ".ini");
        let config = cli::load_config(file.path()).unwrap();
        assert!(config.validate().is_ok());
        assert!(validate_bot_config(&config).is_ok());
        assert!(validate_strategy_config(&config).is_ok());
        let engine = config.engine_config().unwrap();
        assert_eq!(engine.expression_cache_capacity, 32);
        assert_eq!(engine.project_cache_capacity, 8);
    }

    #[test]
    fn missing_config_is_parse_error() {
        let err = cli::load_config(std::path::Path::new("/nonexistent/bot.ini")).unwrap_err();
        assert!(matches!(err, EngineError::ConfigParse { .. }));
        assert!(same((&err).into(), ExitCode::from(2)));
    }
}

mod validate_command {
    use super::*;

    #[test]
    fn clean_expression_succeeds() {
        assert!(same(run(&["validate", "chart.price > 90000 && bot.paper_mode"]), ExitCode::SUCCESS));
    }

    #[test]
    fn unknown_function_fails() {
        assert!(same(run(&["validate", "mystery(1) > 0"]), ExitCode::from(4)));
        assert!(same(
            run(&["validate", "mystery(1) > 0", "--function", "mystery"]),
            ExitCode::SUCCESS
        ));
    }
}

mod eval_command {
    use super::*;

    #[test]
    fn eval_with_config_candles_and_vars() {
        let dir = TempDir::new().unwrap();
        let ini = write_temp(BOT_INI, ".ini");
        let candles = dir.path().join("btc.csv");
        fs::write(&candles, candles_csv(&rising_candles(40))).unwrap();
        let vars = variables_path(dir.path(), "alpha");
        ProjectVariableStore::default().save(&vars, &sample_project()).unwrap();

        let code = run(&[
            "eval",
            "chart.close > cfg.level && max_trades == 3 && indicators.rsi > 50",
            "--config",
            ini.path().to_str().unwrap(),
            "--candles",
            candles.to_str().unwrap(),
            "--vars",
            vars.to_str().unwrap(),
        ]);
        assert!(same(code, ExitCode::SUCCESS));
    }

    #[test]
    fn eval_defaults_to_entry_expression() {
        let ini = write_temp(BOT_INI, ".ini");
        let code = run(&[
            "eval",
            "--config",
            ini.path().to_str().unwrap(),
            "--set",
            "chart.close=150",
        ]);
        assert!(same(code, ExitCode::SUCCESS));
    }

    #[test]
    fn indicator_file_feeds_namespace() {
        let file = write_temp(r#"{"rsi14": 72.5, "trend": "up"}"#, ".json");
        let path = file.path().to_str().unwrap();
        let code = run(&["eval", "indicators.rsi14 > 70 && indicators.trend == 'up'", "--indicators", path]);
        assert!(same(code, ExitCode::SUCCESS));

        let list = write_temp("[1, 2]", ".json");
        let code = run(&["eval", "1 == 1", "--indicators", list.path().to_str().unwrap()]);
        assert!(same(code, ExitCode::from(6)));
    }

    #[test]
    fn eval_without_entry_expression_is_config_error() {
        assert!(same(run(&["eval"]), ExitCode::from(2)));
    }

    #[test]
    fn syntax_error_exit_code() {
        assert!(same(run(&["eval", "1 +"]), ExitCode::from(4)));
    }

    #[test]
    fn unknown_variable_exit_code() {
        assert!(same(run(&["eval", "chart.price > 1"]), ExitCode::from(5)));
    }

    #[test]
    fn invalid_bot_section_is_rejected() {
        let ini = write_temp("[bot]\nleverage = 0\n", ".ini");
        let code = run(&["eval", "1 == 1", "--config", ini.path().to_str().unwrap()]);
        assert!(same(code, ExitCode::from(2)));
    }
}

mod vars_command {
    use super::*;

    #[test]
    fn set_show_remove_cycle() {
        let dir = TempDir::new().unwrap();
        let path = variables_path(dir.path(), "beta");
        let p = path.to_str().unwrap();

        assert!(same(
            run(&["vars", "set", p, "entry_level", "95000", "--type", "float", "--unit", "USDT"]),
            ExitCode::SUCCESS
        ));
        assert!(same(run(&["vars", "set", p, "entry_level", "96000"]), ExitCode::SUCCESS));
        assert!(same(run(&["vars", "check", p]), ExitCode::SUCCESS));
        assert!(same(run(&["vars", "show", p]), ExitCode::SUCCESS));

        let loaded = ProjectVariableStore::default().load(&path).unwrap();
        assert_eq!(loaded.project_name, "beta");
        let var = loaded.get("entry_level").unwrap();
        assert_eq!(var.value, VariableValue::Float(96_000.0));
        assert_eq!(var.unit.as_deref(), Some("USDT"));

        assert!(same(run(&["vars", "remove", p, "entry_level"]), ExitCode::SUCCESS));
        let loaded = ProjectVariableStore::default().load(&path).unwrap();
        assert!(loaded.is_empty());
    }

    #[test]
    fn reserved_prefix_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = variables_path(dir.path(), "gamma");
        let code = run(&["vars", "set", path.to_str().unwrap(), "regime", "1"]);
        assert!(same(code, ExitCode::from(3)));
        assert!(!path.exists());
    }

    #[test]
    fn check_reports_malformed_file() {
        let dir = TempDir::new().unwrap();
        let path = variables_path(dir.path(), "broken");
        fs::write(&path, "{\"version\": \"1.0\"").unwrap();
        assert!(same(run(&["vars", "check", path.to_str().unwrap()]), ExitCode::from(3)));
    }

    #[test]
    fn check_rejects_wrong_file_name() {
        let file = write_temp("{}", ".json");
        assert!(same(run(&["vars", "check", file.path().to_str().unwrap()]), ExitCode::from(3)));
    }
}

mod other_commands {
    use super::*;

    #[test]
    fn functions_lists() {
        assert!(same(run(&["functions"]), ExitCode::SUCCESS));
        assert!(same(run(&["functions", "--category", "math"]), ExitCode::SUCCESS));
    }

    #[test]
    fn regime_on_candles() {
        let dir = TempDir::new().unwrap();
        let candles = dir.path().join("btc.csv");
        fs::write(&candles, candles_csv(&rising_candles(60))).unwrap();
        assert!(same(
            run(&["regime", "--candles", candles.to_str().unwrap()]),
            ExitCode::SUCCESS
        ));
    }

    #[test]
    fn regime_with_bad_rules_file() {
        let dir = TempDir::new().unwrap();
        let candles = dir.path().join("btc.csv");
        fs::write(&candles, candles_csv(&rising_candles(5))).unwrap();
        let rules = write_temp("{\"rules\": []}", ".json");
        let code = run(&[
            "regime",
            "--candles",
            candles.to_str().unwrap(),
            "--rules",
            rules.path().to_str().unwrap(),
        ]);
        assert!(same(code, ExitCode::from(2)));
    }

    #[test]
    fn variables_without_sources() {
        assert!(same(run(&["variables"]), ExitCode::SUCCESS));
    }
}
