//! CLI definition and dispatch.

use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use crate::adapters::candle_feed::{CandleSeriesFeed, FeedParams};
use crate::adapters::csv_adapter::read_candles;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::project_store::{check_file_name, ProjectVariableStore};
use crate::adapters::regime_config_adapter::load_rules;
use crate::domain::config_validation::EngineConfig;
use crate::domain::context_builder::ContextSources;
use crate::domain::engine::ExpressionEngine;
use crate::domain::error::{EngineError, ProjectStoreError};
use crate::domain::project_vars::{ProjectVariable, ProjectVariables};
use crate::domain::providers::dynamic::{values_from_json, DynamicValues};
use crate::domain::providers::{BotConfig, ChartSnapshot, StrategyConfig};
use crate::domain::regime::{default_classifier, RegimeClassifier, RegimeSnapshot};
use crate::domain::regime_monitor::RegimeMonitor;
use crate::domain::validator::Severity;
use crate::domain::value::{VariableType, VariableValue};
use crate::ports::indicator_port::IndicatorFeed;

#[derive(Parser, Debug)]
#[command(name = "tradecel", about = "Trading rule expression toolkit")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Check an expression for syntax and unknown functions
    Validate {
        expression: String,
        /// Extra function names to accept
        #[arg(long = "function")]
        functions: Vec<String>,
    },
    /// Evaluate an expression (default: the strategy's entry expression)
    Eval {
        expression: Option<String>,
        #[command(flatten)]
        sources: SourceArgs,
    },
    /// List the variables the given sources provide
    Variables {
        #[command(flatten)]
        sources: SourceArgs,
    },
    /// Inspect or edit a project variable file
    Vars {
        #[command(subcommand)]
        command: VarsCommand,
    },
    /// List built-in functions
    Functions {
        #[arg(long)]
        category: Option<String>,
    },
    /// Classify the market regime of a candle series
    Regime {
        #[arg(long)]
        candles: PathBuf,
        /// JSON rule file; the built-in rules when omitted
        #[arg(long)]
        rules: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
pub enum VarsCommand {
    /// Validate a variable file without loading it into any cache
    Check { path: PathBuf },
    /// Print the variables in a file
    Show {
        path: PathBuf,
        #[arg(long)]
        category: Option<String>,
    },
    /// Add a variable or update its value, creating the file if needed
    Set {
        path: PathBuf,
        name: String,
        /// JSON literal; bare text is taken as a string
        value: String,
        #[arg(long = "type")]
        var_type: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        unit: Option<String>,
    },
    /// Remove a variable
    Remove { path: PathBuf, name: String },
}

#[derive(Args, Debug, Default)]
pub struct SourceArgs {
    /// INI file with [engine], [bot], [strategy] and [strategy.params]
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// CSV candles (time,open,high,low,close,volume)
    #[arg(long)]
    pub candles: Option<PathBuf>,
    /// Project variable file
    #[arg(long)]
    pub vars: Option<PathBuf>,
    /// JSON object of indicator values, merged over those computed from candles
    #[arg(long)]
    pub indicators: Option<PathBuf>,
    /// Runtime override, repeatable
    #[arg(long = "set", value_name = "NAME=VALUE", value_parser = parse_override)]
    pub overrides: Vec<(String, VariableValue)>,
}

fn parse_override(raw: &str) -> Result<(String, VariableValue), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{}'", raw))?;
    let name = name.trim();
    if name.is_empty() {
        return Err("override name is empty".to_string());
    }
    Ok((name.to_string(), VariableValue::parse_literal(value)))
}

pub fn run(cli: Cli) -> ExitCode {
    let result = match cli.command {
        Command::Validate {
            expression,
            functions,
        } => return run_validate(&expression, &functions),
        Command::Eval {
            expression,
            sources,
        } => run_eval(expression.as_deref(), &sources),
        Command::Variables { sources } => run_variables(&sources),
        Command::Vars { command } => run_vars(command),
        Command::Functions { category } => run_functions(category.as_deref()),
        Command::Regime { candles, rules } => run_regime(&candles, rules.as_deref()),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, EngineError> {
    FileConfigAdapter::load(path)
}

fn load_classifier(rules: Option<&Path>) -> Result<RegimeClassifier, EngineError> {
    match rules {
        Some(path) => load_rules(path),
        None => Ok(default_classifier()),
    }
}

/// Everything an evaluation needs, assembled from command-line sources.
struct Session {
    engine: ExpressionEngine,
    sources: ContextSources,
    strategy: Option<StrategyConfig>,
}

fn open_session(args: &SourceArgs) -> Result<Session, EngineError> {
    let config = args.config.as_deref().map(load_config).transpose()?;
    let engine_config = match &config {
        Some(c) => {
            c.validate()?;
            c.engine_config()?
        }
        None => EngineConfig::default(),
    };
    let store = Arc::new(ProjectVariableStore::new(engine_config.project_cache_capacity));
    let engine = ExpressionEngine::from_config(&engine_config).with_store(store);

    let mut sources = ContextSources::new().with_clock(Utc::now());
    let mut bot = None;
    let mut strategy = None;
    if let Some(c) = &config {
        let b = BotConfig::from_config(c);
        let s = StrategyConfig::from_config(c);
        sources = sources.with_bot(b.clone()).with_cfg(s.clone());
        bot = Some(b);
        strategy = Some(s);
    }

    let mut indicators = DynamicValues::new();
    if let Some(path) = &args.candles {
        let candles = read_candles(path)?;
        let (symbol, timeframe) = match &bot {
            Some(b) => (b.symbol.clone(), b.timeframe.clone()),
            None => (file_stem(path), String::new()),
        };
        if let Some(chart) = ChartSnapshot::from_series(&symbol, &timeframe, &candles) {
            sources = sources.with_chart(chart);
        }

        let rules = engine_config.regime_rules.as_deref().map(Path::new);
        let feed = Arc::new(CandleSeriesFeed::from_candles(FeedParams::default(), candles));
        let monitor = Arc::new(RegimeMonitor::new(load_classifier(rules)?).with_feed(feed.clone()));
        monitor.trigger();
        if let Some(frame) = feed.frame() {
            indicators.extend(
                frame
                    .live
                    .into_iter()
                    .map(|(k, v)| (k, VariableValue::Float(v))),
            );
        }
        sources = sources
            .with_regime(monitor.state().to_variables())
            .with_host(monitor);
    }

    if let Some(path) = &args.indicators {
        indicators.extend(read_indicators(path)?);
    }
    if !indicators.is_empty() {
        sources = sources.with_indicators(indicators);
    }

    if let Some(path) = &args.vars {
        sources = sources.with_project_path(path.clone());
    }
    for (name, value) in &args.overrides {
        sources = sources.with_override(name, value.clone());
    }

    Ok(Session {
        engine,
        sources,
        strategy,
    })
}

fn read_indicators(path: &Path) -> Result<DynamicValues, EngineError> {
    let raw = fs::read_to_string(path)?;
    let json: serde_json::Value = serde_json::from_str(&raw)
        .map_err(|e| EngineError::Data {
            reason: format!("{}: {}", path.display(), e),
        })?;
    values_from_json(&json).ok_or_else(|| EngineError::Data {
        reason: format!("{}: expected a JSON object", path.display()),
    })
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn run_validate(expression: &str, functions: &[String]) -> ExitCode {
    let engine = ExpressionEngine::new();
    let errors = engine.validate(expression, functions);
    if errors.is_empty() {
        println!("ok");
        return ExitCode::SUCCESS;
    }
    let lines: Vec<&str> = expression.lines().collect();
    for err in &errors {
        if let Some(line) = lines.get(err.line.saturating_sub(1)) {
            println!("{}", line);
            println!("{}^", " ".repeat(err.column.saturating_sub(1)));
        }
        println!("{}", err);
    }
    if errors.iter().any(|e| e.severity == Severity::Error) {
        ExitCode::from(4)
    } else {
        ExitCode::SUCCESS
    }
}

fn run_eval(expression: Option<&str>, args: &SourceArgs) -> Result<(), EngineError> {
    let session = open_session(args)?;
    let source = match expression {
        Some(e) => e.to_string(),
        None => session
            .strategy
            .as_ref()
            .map(|s| s.entry_expression.clone())
            .filter(|e| !e.trim().is_empty())
            .ok_or_else(|| EngineError::ConfigMissing {
                section: "strategy".to_string(),
                key: "entry_expression".to_string(),
            })?,
    };
    let context = session.engine.build_context(&session.sources)?;
    let compiled = session.engine.get_or_compile(&source).map_err(|e| {
        eprintln!("{}", e.display_with_context(&source));
        EngineError::from(e)
    })?;
    let value = session.engine.evaluate_compiled(&compiled, &context)?;
    println!("{}", value);
    Ok(())
}

fn run_variables(args: &SourceArgs) -> Result<(), EngineError> {
    let session = open_session(args)?;
    let catalog = session.engine.get_available_variables(&session.sources)?;
    for info in catalog.values() {
        let value = if info.value.is_null() {
            "-".to_string()
        } else {
            info.value.to_string()
        };
        let unit = info.unit.as_deref().unwrap_or("");
        println!(
            "{:<32} {:<8} {:<10} {:<20} {}",
            info.name, info.type_name, info.source, value, unit
        );
    }
    Ok(())
}

fn run_vars(command: VarsCommand) -> Result<(), EngineError> {
    let store = ProjectVariableStore::default();
    match command {
        VarsCommand::Check { path } => {
            check_file_name(&path)?;
            let vars = store.validate_file(&path)?;
            println!(
                "ok: project '{}' (version {}), {} variables",
                vars.project_name,
                vars.version,
                vars.len()
            );
        }
        VarsCommand::Show { path, category } => {
            let vars = store.load(&path)?;
            let selected: Vec<&ProjectVariable> = match category.as_deref() {
                Some(c) => vars.by_category(c),
                None => vars.iter().collect(),
            };
            for var in selected {
                println!(
                    "{:<24} {:<7} {:<20} {:<8} {:<12} {}",
                    var.name,
                    var.var_type,
                    var.value,
                    var.unit.as_deref().unwrap_or(""),
                    var.category,
                    var.description
                );
            }
        }
        VarsCommand::Set {
            path,
            name,
            value,
            var_type,
            description,
            category,
            unit,
        } => {
            check_file_name(&path)?;
            let mut vars = match store.validate_file(&path) {
                Ok(v) => v,
                Err(ProjectStoreError::NotFound { .. }) => ProjectVariables::new(&project_name(&path)),
                Err(e) => return Err(e.into()),
            };
            let value = parse_value(&value);
            if vars.contains(&name) {
                vars.update_value(&name, value)?;
            } else {
                let mut var = match var_type.as_deref() {
                    Some(t) => {
                        let declared = VariableType::parse(t).ok_or_else(|| EngineError::ConfigInvalid {
                            section: "vars".to_string(),
                            key: "type".to_string(),
                            reason: format!("unknown variable type '{}'", t),
                        })?;
                        ProjectVariable::typed(&name, declared, value)?
                    }
                    None => ProjectVariable::new(&name, value)?,
                };
                if let Some(d) = &description {
                    var = var.with_description(d);
                }
                if let Some(c) = &category {
                    var = var.with_category(c);
                }
                if let Some(u) = &unit {
                    var = var.with_unit(u);
                }
                vars.add_variable(var)?;
            }
            store.save(&path, &vars)?;
            println!("saved {} to {}", name, path.display());
        }
        VarsCommand::Remove { path, name } => {
            let mut vars = store.validate_file(&path)?;
            vars.remove_variable(&name)?;
            store.save(&path, &vars)?;
            println!("removed {} from {}", name, path.display());
        }
    }
    Ok(())
}

fn project_name(path: &Path) -> String {
    let file = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    file.strip_suffix(crate::domain::project_vars::FILE_SUFFIX)
        .unwrap_or(&file)
        .to_string()
}

/// JSON literal when it parses, otherwise the raw text as a string.
fn parse_value(raw: &str) -> VariableValue {
    serde_json::from_str::<serde_json::Value>(raw)
        .map(|v| VariableValue::from_json(&v))
        .unwrap_or_else(|_| VariableValue::String(raw.to_string()))
}

fn run_functions(category: Option<&str>) -> Result<(), EngineError> {
    let engine = ExpressionEngine::new();
    for (cat, specs) in engine.functions().by_category() {
        if category.is_some_and(|c| c != cat.as_str()) {
            continue;
        }
        println!("[{}]", cat);
        for spec in specs {
            if let Some(line) = engine.functions().describe(&spec.name) {
                println!("  {}", line);
            }
        }
    }
    Ok(())
}

fn print_snapshot(title: &str, snapshot: &RegimeSnapshot) {
    let at = snapshot
        .bar_time
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| "-".to_string());
    println!("{:<12} {} (priority {}, bar {})", title, snapshot.label, snapshot.priority, at);
}

fn run_regime(candles: &Path, rules: Option<&Path>) -> Result<(), EngineError> {
    let series = read_candles(candles)?;
    let feed = Arc::new(CandleSeriesFeed::from_candles(FeedParams::default(), series));
    let monitor = RegimeMonitor::new(load_classifier(rules)?).with_feed(feed);
    if !monitor.trigger() {
        return Err(EngineError::Data {
            reason: format!("no candles in {}", candles.display()),
        });
    }
    let state = monitor.state();
    print_snapshot("current", &state.current);
    print_snapshot("last_closed", &state.last_closed);
    println!("{:<12} {}", "changed", state.changed());
    for (name, value) in &state.last_closed.indicators {
        println!("  {:<16} {:.4}", name, value);
    }
    Ok(())
}
