//! Expression engine: one registry, one compile cache and one context
//! builder per host session.
//!
//! Nothing here is process-global, so two engines with different custom
//! functions can live side by side.

use crate::domain::cache::ExpressionCache;
use crate::domain::compiler::CompiledExpression;
use crate::domain::config_validation::EngineConfig;
use crate::domain::context::{EvaluationContext, VariableInfo};
use crate::domain::context_builder::{BuilderStats, ContextBuilder, ContextSources, ContextWithMetadata};
use crate::domain::error::{
    CompileError, DuplicateFunctionError, EngineError, EvaluationError, VariableValidationError,
};
use crate::domain::eval;
use crate::domain::functions::{CallEnv, FunctionRegistry, FunctionSpec};
use crate::domain::lru::CacheStats;
use crate::domain::validator::{self, Severity, ValidationError};
use crate::domain::value::VariableValue;
use crate::ports::variable_store_port::VariableStorePort;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

pub const E_TIMEOUT: &str = "E_TIMEOUT";

pub struct ExpressionEngine {
    registry: FunctionRegistry,
    cache: ExpressionCache,
    builder: ContextBuilder,
    eval_timeout: Option<Duration>,
    validation_timeout: Option<Duration>,
}

impl Default for ExpressionEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ExpressionEngine {
    /// Built-in functions, default cache size, no project store, no timeouts.
    pub fn new() -> Self {
        Self::from_config(&EngineConfig::default())
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            registry: FunctionRegistry::with_builtins(),
            cache: ExpressionCache::new(config.expression_cache_capacity),
            builder: ContextBuilder::new(),
            eval_timeout: config.eval_timeout,
            validation_timeout: config.validation_timeout,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn VariableStorePort>) -> Self {
        self.builder = ContextBuilder::with_store(store);
        self
    }

    pub fn with_eval_timeout(mut self, timeout: Duration) -> Self {
        self.eval_timeout = Some(timeout);
        self
    }

    pub fn with_validation_timeout(mut self, timeout: Duration) -> Self {
        self.validation_timeout = Some(timeout);
        self
    }

    // -- registry --

    pub fn register_function<F>(
        &mut self,
        spec: FunctionSpec,
        native: F,
        overwrite: bool,
    ) -> Result<(), DuplicateFunctionError>
    where
        F: Fn(&[VariableValue], &CallEnv<'_>) -> Result<VariableValue, EvaluationError>
            + Send
            + Sync
            + 'static,
    {
        self.registry.register(spec, native, overwrite)
    }

    pub fn functions(&self) -> &FunctionRegistry {
        &self.registry
    }

    // -- compilation --

    /// Compile through the cache. Do not hold on to the result across calls;
    /// ask again and let the cache decide.
    pub fn get_or_compile(&self, source: &str) -> Result<Arc<CompiledExpression>, CompileError> {
        self.cache.get_or_compile(source)
    }

    pub fn compile(&self, source: &str) -> Result<Arc<CompiledExpression>, CompileError> {
        self.get_or_compile(source)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    // -- validation --

    /// Check `source` against the registry plus `extra_functions`. Applies the
    /// configured validation timeout, reporting an overrun as an error entry.
    pub fn validate(&self, source: &str, extra_functions: &[String]) -> Vec<ValidationError> {
        match self.validation_timeout {
            Some(timeout) => self.validate_with_timeout(source, extra_functions, timeout),
            None => validator::validate(source, self.registry.names(), extra_functions),
        }
    }

    pub fn validate_with_timeout(
        &self,
        source: &str,
        extra_functions: &[String],
        timeout: Duration,
    ) -> Vec<ValidationError> {
        match validator::validate_with_timeout(source, self.registry.names(), extra_functions, timeout) {
            Ok(errors) => errors,
            Err(err) => {
                warn!(error = %err, "validation aborted");
                vec![ValidationError {
                    line: 1,
                    column: 1,
                    severity: Severity::Error,
                    code: E_TIMEOUT,
                    message: err.to_string(),
                }]
            }
        }
    }

    /// Whether `source` validates with no error-severity entries.
    pub fn is_valid(&self, source: &str, extra_functions: &[String]) -> bool {
        !self
            .validate(source, extra_functions)
            .iter()
            .any(|e| e.severity == Severity::Error)
    }

    // -- evaluation --

    pub fn evaluate_compiled(
        &self,
        compiled: &CompiledExpression,
        context: &EvaluationContext,
    ) -> Result<VariableValue, EvaluationError> {
        eval::evaluate(compiled, context, &self.registry, self.eval_timeout)
    }

    pub fn evaluate_compiled_with_timeout(
        &self,
        compiled: &CompiledExpression,
        context: &EvaluationContext,
        timeout: Duration,
    ) -> Result<VariableValue, EvaluationError> {
        eval::evaluate(compiled, context, &self.registry, Some(timeout))
    }

    /// Compile (cached) and evaluate.
    pub fn evaluate(&self, source: &str, context: &EvaluationContext) -> Result<VariableValue, EngineError> {
        let compiled = self.get_or_compile(source)?;
        Ok(self.evaluate_compiled(&compiled, context)?)
    }

    /// Build a context from `sources`, then evaluate.
    pub fn evaluate_with_sources(
        &self,
        source: &str,
        sources: &ContextSources,
    ) -> Result<VariableValue, EngineError> {
        let compiled = self.get_or_compile(source)?;
        let context = self.build_context(sources)?;
        Ok(self.evaluate_compiled(&compiled, &context)?)
    }

    /// Evaluate and require a boolean result.
    pub fn evaluate_bool(&self, source: &str, context: &EvaluationContext) -> Result<bool, EngineError> {
        match self.evaluate(source, context)? {
            VariableValue::Bool(b) => Ok(b),
            other => Err(EvaluationError::type_mismatch("condition", "bool", other.type_name()).into()),
        }
    }

    // -- context --

    pub fn build_context(&self, sources: &ContextSources) -> Result<EvaluationContext, VariableValidationError> {
        self.builder.build(sources)
    }

    pub fn build_context_with_metadata(
        &self,
        sources: &ContextSources,
    ) -> Result<ContextWithMetadata, VariableValidationError> {
        self.builder.build_with_metadata(sources)
    }

    pub fn get_available_variables(
        &self,
        sources: &ContextSources,
    ) -> Result<BTreeMap<String, VariableInfo>, VariableValidationError> {
        self.builder.available_variables(sources)
    }

    /// Referenced variable paths that `context` cannot resolve.
    pub fn undefined_variables(
        &self,
        source: &str,
        context: &EvaluationContext,
    ) -> Result<Vec<String>, CompileError> {
        let compiled = self.get_or_compile(source)?;
        Ok(compiled
            .variables()
            .iter()
            .filter(|name| context.lookup(name).is_none())
            .cloned()
            .collect())
    }

    pub fn builder_stats(&self) -> BuilderStats {
        self.builder.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::functions::{Arity, Category, ParamType};
    use crate::domain::providers::BotConfig;
    use crate::domain::validator::E_UNKNOWN_FUNCTION;

    fn ctx(entries: &[(&str, VariableValue)]) -> EvaluationContext {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn boundary_expression() {
        let engine = ExpressionEngine::new();
        let expr = "chart.price > 90000 and bot.paper_mode";
        let high = ctx(&[
            ("chart.price", VariableValue::Float(95_000.0)),
            ("bot.paper_mode", VariableValue::Bool(true)),
        ]);
        let low = ctx(&[
            ("chart.price", VariableValue::Float(80_000.0)),
            ("bot.paper_mode", VariableValue::Bool(true)),
        ]);
        assert_eq!(engine.evaluate(expr, &high).unwrap(), VariableValue::Bool(true));
        assert_eq!(engine.evaluate(expr, &low).unwrap(), VariableValue::Bool(false));
        let stats = engine.cache_stats();
        assert_eq!((stats.hits, stats.misses), (1, 1));
    }

    #[test]
    fn compile_error_surfaces_as_engine_error() {
        let engine = ExpressionEngine::new();
        let err = engine.evaluate("1 +", &EvaluationContext::new()).unwrap_err();
        assert!(matches!(err, EngineError::Compile(_)));
    }

    #[test]
    fn evaluation_error_is_not_swallowed() {
        let engine = ExpressionEngine::new();
        let err = engine.evaluate("missing > 1", &EvaluationContext::new()).unwrap_err();
        assert!(matches!(
            err,
            EngineError::Evaluation(EvaluationError::UnknownVariable { .. })
        ));
    }

    #[test]
    fn evaluate_bool_rejects_non_bool() {
        let engine = ExpressionEngine::new();
        let err = engine.evaluate_bool("1 + 1", &EvaluationContext::new()).unwrap_err();
        assert!(matches!(err, EngineError::Evaluation(EvaluationError::TypeMismatch { .. })));
    }

    #[test]
    fn custom_function_per_engine() {
        let mut engine = ExpressionEngine::new();
        let spec = FunctionSpec::new("double_it", Category::Math)
            .params(&[ParamType::Number])
            .arity(Arity::Exact(1));
        engine
            .register_function(
                spec.clone(),
                |args, _| Ok(VariableValue::Float(args[0].as_f64().unwrap_or(0.0) * 2.0)),
                false,
            )
            .unwrap();
        assert!(engine.register_function(spec, |_, _| Ok(VariableValue::Null), false).is_err());

        let ctx = EvaluationContext::new();
        assert_eq!(engine.evaluate("double_it(2)", &ctx).unwrap(), VariableValue::Float(4.0));

        let other = ExpressionEngine::new();
        assert!(other.evaluate("double_it(2)", &ctx).is_err());
        assert!(!other.functions().contains("double_it"));
    }

    #[test]
    fn validate_uses_registry_and_extras() {
        let engine = ExpressionEngine::new();
        assert!(engine.is_valid("clamp(chart.price, 0, 1) > 0.5", &[]));
        let errors = engine.validate("rsi14(chart.close) > 50", &[]);
        assert!(errors.iter().any(|e| e.code == E_UNKNOWN_FUNCTION));
        assert!(engine.is_valid("rsi14(chart.close) > 50", &["rsi14".to_string()]));
    }

    #[test]
    fn evaluate_with_sources_builds_context() {
        let engine = ExpressionEngine::new();
        let sources = ContextSources::new()
            .with_bot(BotConfig::default())
            .with_override("threshold", 2i64);
        let result = engine
            .evaluate_with_sources("bot.paper_mode && threshold == 2", &sources)
            .unwrap();
        assert_eq!(result, VariableValue::Bool(true));
        assert_eq!(engine.builder_stats().builds, 1);
    }

    #[test]
    fn undefined_variables_lists_missing_paths() {
        let engine = ExpressionEngine::new();
        let ctx = ctx(&[("chart.price", VariableValue::Float(1.0))]);
        let missing = engine
            .undefined_variables("chart.price > entry_level && bot.paper_mode", &ctx)
            .unwrap();
        assert_eq!(missing, vec!["bot.paper_mode", "entry_level"]);
    }

    #[test]
    fn cache_capacity_from_config() {
        let config = EngineConfig {
            expression_cache_capacity: 2,
            ..EngineConfig::default()
        };
        let engine = ExpressionEngine::from_config(&config);
        for src in ["1", "2", "3"] {
            engine.get_or_compile(src).unwrap();
        }
        let stats = engine.cache_stats();
        assert_eq!(stats.size, stats.maxsize);
        engine.get_or_compile("1").unwrap();
        assert_eq!(engine.cache_stats().misses, 4);
        engine.clear_cache();
        assert_eq!(engine.cache_stats().size, 0);
    }

    #[test]
    fn zero_timeout_aborts_large_comprehension() {
        let engine = ExpressionEngine::new();
        let items: Vec<VariableValue> = (0..200_000).map(VariableValue::Int).collect();
        let ctx = ctx(&[("xs", VariableValue::List(items))]);
        let compiled = engine.compile("xs.all(x, x >= 0)").unwrap();
        let err = engine
            .evaluate_compiled_with_timeout(&compiled, &ctx, Duration::ZERO)
            .unwrap_err();
        assert!(matches!(err, EvaluationError::Timeout { .. }));
    }

    #[test]
    fn timeout_reaches_inside_builtins() {
        // one call node: the work happens inside `distinct`, not the evaluator
        let rows: Vec<VariableValue> = (0..30_000)
            .map(|v| VariableValue::List(vec![VariableValue::Int(v)]))
            .collect();
        let ctx = ctx(&[("rows", VariableValue::List(rows))]);
        let engine = ExpressionEngine::new();
        let compiled = engine.compile("distinct(rows)").unwrap();
        let started = std::time::Instant::now();
        let err = engine
            .evaluate_compiled_with_timeout(&compiled, &ctx, Duration::from_millis(20))
            .unwrap_err();
        assert!(matches!(err, EvaluationError::Timeout { limit_ms: 20 }));
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
