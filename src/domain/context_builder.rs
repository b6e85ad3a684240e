//! Context builder: merges every provider into one evaluation context.
//!
//! Layers are applied from least to most specific so later layers win on a
//! name collision: chart, bot, cfg, trade, project, indicators, regime,
//! overrides. Absent sources contribute nothing; the only error surfaced is a
//! malformed project variable file that is present on disk.

use crate::domain::context::{EvaluationContext, VariableInfo};
use crate::domain::error::{ProjectStoreError, VariableValidationError};
use crate::domain::lru::CacheStats;
use crate::domain::project_vars::ProjectVariables;
use crate::domain::providers::dynamic::DynamicValues;
use crate::domain::providers::{
    BotConfig, BotProvider, CfgProvider, ChartProvider, ChartSnapshot, DynamicProvider,
    ProjectProvider, ProvidedVariable, StrategyConfig, TradeProvider, TradeState,
    VariableProvider,
};
use crate::domain::value::VariableValue;
use crate::ports::host_port::RegimeHost;
use crate::ports::variable_store_port::VariableStorePort;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

/// Where project variables come from for one build.
#[derive(Debug, Clone)]
pub enum ProjectSource {
    /// Loaded through the variable store (cached by path and mtime).
    Path(PathBuf),
    /// Already in memory, e.g. an editor's unsaved state.
    Loaded(Arc<ProjectVariables>),
}

/// Everything a caller may have on hand. Every field is optional.
#[derive(Clone, Default)]
pub struct ContextSources {
    pub chart: Option<ChartSnapshot>,
    pub bot: Option<BotConfig>,
    pub cfg: Option<StrategyConfig>,
    pub trade: Option<TradeState>,
    pub project: Option<ProjectSource>,
    pub indicators: Option<DynamicValues>,
    pub regime: Option<DynamicValues>,
    pub overrides: BTreeMap<String, VariableValue>,
    pub host: Option<Arc<dyn RegimeHost>>,
    pub clock: Option<DateTime<Utc>>,
}

impl fmt::Debug for ContextSources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextSources")
            .field("chart", &self.chart.is_some())
            .field("bot", &self.bot.is_some())
            .field("cfg", &self.cfg.is_some())
            .field("trade", &self.trade.is_some())
            .field("project", &self.project)
            .field("indicators", &self.indicators.as_ref().map(|m| m.len()))
            .field("regime", &self.regime.as_ref().map(|m| m.len()))
            .field("overrides", &self.overrides.len())
            .field("host", &self.host.is_some())
            .finish()
    }
}

impl ContextSources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_chart(mut self, chart: ChartSnapshot) -> Self {
        self.chart = Some(chart);
        self
    }

    pub fn with_bot(mut self, bot: BotConfig) -> Self {
        self.bot = Some(bot);
        self
    }

    pub fn with_cfg(mut self, cfg: StrategyConfig) -> Self {
        self.cfg = Some(cfg);
        self
    }

    pub fn with_trade(mut self, trade: TradeState) -> Self {
        self.trade = Some(trade);
        self
    }

    pub fn with_project_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.project = Some(ProjectSource::Path(path.into()));
        self
    }

    pub fn with_project(mut self, project: Arc<ProjectVariables>) -> Self {
        self.project = Some(ProjectSource::Loaded(project));
        self
    }

    pub fn with_indicators(mut self, indicators: DynamicValues) -> Self {
        self.indicators = Some(indicators);
        self
    }

    pub fn with_regime(mut self, regime: DynamicValues) -> Self {
        self.regime = Some(regime);
        self
    }

    pub fn with_override(mut self, name: &str, value: impl Into<VariableValue>) -> Self {
        self.overrides.insert(name.to_string(), value.into());
        self
    }

    pub fn with_host(mut self, host: Arc<dyn RegimeHost>) -> Self {
        self.host = Some(host);
        self
    }

    pub fn with_clock(mut self, clock: DateTime<Utc>) -> Self {
        self.clock = Some(clock);
        self
    }
}

/// A built context plus per-variable metadata and the layer it came from.
#[derive(Debug, Clone)]
pub struct ContextWithMetadata {
    pub context: EvaluationContext,
    pub variables: BTreeMap<String, VariableInfo>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BuilderStats {
    pub builds: u64,
    /// `None` when no variable store is attached.
    pub project_cache: Option<CacheStats>,
}

pub struct ContextBuilder {
    store: Option<Arc<dyn VariableStorePort>>,
    builds: AtomicU64,
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextBuilder {
    /// Builder without a variable store; project paths degrade to nothing.
    pub fn new() -> Self {
        Self {
            store: None,
            builds: AtomicU64::new(0),
        }
    }

    pub fn with_store(store: Arc<dyn VariableStorePort>) -> Self {
        Self {
            store: Some(store),
            builds: AtomicU64::new(0),
        }
    }

    pub fn store(&self) -> Option<&Arc<dyn VariableStorePort>> {
        self.store.as_ref()
    }

    pub fn build(&self, sources: &ContextSources) -> Result<EvaluationContext, VariableValidationError> {
        Ok(self.build_with_metadata(sources)?.context)
    }

    pub fn build_with_metadata(
        &self,
        sources: &ContextSources,
    ) -> Result<ContextWithMetadata, VariableValidationError> {
        self.builds.fetch_add(1, Ordering::Relaxed);
        let project = self.project_variables(sources.project.as_ref())?;

        let layers: Vec<(&str, Vec<ProvidedVariable>)> = vec![
            ("chart", ChartProvider.provide(sources.chart.as_ref())),
            ("bot", BotProvider.provide(sources.bot.as_ref())),
            ("cfg", CfgProvider.provide(sources.cfg.as_ref())),
            ("trade", TradeProvider.provide(sources.trade.as_ref())),
            ("project", ProjectProvider.provide(project.as_deref())),
            ("indicators", DynamicProvider::indicators().provide(sources.indicators.as_ref())),
            ("regime", DynamicProvider::regime().provide(sources.regime.as_ref())),
        ];

        let mut variables: BTreeMap<String, VariableInfo> = BTreeMap::new();
        for (source, provided) in layers {
            if provided.is_empty() {
                debug!(source, "source absent; namespace left empty");
            }
            for var in provided {
                variables.insert(var.def.name.clone(), info(source, var));
            }
        }
        for (name, value) in &sources.overrides {
            variables.insert(
                name.clone(),
                VariableInfo {
                    name: name.clone(),
                    source: "override".to_string(),
                    type_name: value.type_name().to_string(),
                    description: "Runtime override".to_string(),
                    unit: None,
                    value: value.clone(),
                },
            );
        }

        let mut context: EvaluationContext = variables
            .iter()
            .map(|(name, info)| (name.clone(), info.value.clone()))
            .collect();
        context.set_host(sources.host.clone());
        context.set_clock(sources.clock);
        debug!(variables = context.len(), "evaluation context built");
        Ok(ContextWithMetadata { context, variables })
    }

    /// Catalog of every name the sources can provide, for autocomplete. Names
    /// of absent static providers are listed with a `Null` value.
    pub fn available_variables(
        &self,
        sources: &ContextSources,
    ) -> Result<BTreeMap<String, VariableInfo>, VariableValidationError> {
        let mut catalog: BTreeMap<String, VariableInfo> = BTreeMap::new();
        let static_defs = [
            ("chart", ChartProvider.catalog()),
            ("bot", BotProvider.catalog()),
            ("cfg", CfgProvider.catalog()),
            ("trade", TradeProvider.catalog()),
        ];
        for (source, defs) in static_defs {
            for def in defs {
                catalog.insert(
                    def.name.clone(),
                    VariableInfo {
                        name: def.name,
                        source: source.to_string(),
                        type_name: def.type_name,
                        description: def.description,
                        unit: def.unit,
                        value: VariableValue::Null,
                    },
                );
            }
        }
        catalog.extend(self.build_with_metadata(sources)?.variables);
        Ok(catalog)
    }

    pub fn stats(&self) -> BuilderStats {
        BuilderStats {
            builds: self.builds.load(Ordering::Relaxed),
            project_cache: self.store.as_ref().map(|s| s.stats()),
        }
    }

    fn project_variables(
        &self,
        source: Option<&ProjectSource>,
    ) -> Result<Option<Arc<ProjectVariables>>, VariableValidationError> {
        let path = match source {
            None => return Ok(None),
            Some(ProjectSource::Loaded(vars)) => return Ok(Some(Arc::clone(vars))),
            Some(ProjectSource::Path(path)) => path,
        };
        let Some(store) = &self.store else {
            warn!(path = %path.display(), "no variable store attached; project variables skipped");
            return Ok(None);
        };
        match store.load(path) {
            Ok(vars) => Ok(Some(vars)),
            Err(ProjectStoreError::Invalid(err)) => Err(err),
            Err(err) => {
                warn!(error = %err, "project variables unavailable");
                Ok(None)
            }
        }
    }
}

fn info(source: &str, var: ProvidedVariable) -> VariableInfo {
    VariableInfo {
        name: var.def.name,
        source: source.to_string(),
        type_name: var.def.type_name,
        description: var.def.description,
        unit: var.def.unit,
        value: var.value,
    }
}
