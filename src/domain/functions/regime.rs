//! Regime-interaction built-ins. These are impure: they go through the host
//! capability in the context and return neutral values when none is attached.

use super::{Category, FunctionRegistry, FunctionSpec};
use crate::domain::value::VariableValue;

/// Label reported when no classification is available.
pub const UNKNOWN_REGIME: &str = "UNKNOWN";

fn spec(name: &str) -> FunctionSpec {
    FunctionSpec::new(name, Category::Regime).host()
}

pub(crate) fn register(registry: &mut FunctionRegistry) {
    registry.insert(
        spec("trigger_regime_analysis")
            .returns("bool")
            .describe("Recompute the regime for the attached chart; false without a host"),
        |_, env| {
            Ok(VariableValue::Bool(
                env.host().is_some_and(|host| host.trigger_regime_analysis()),
            ))
        },
    );

    registry.insert(
        spec("last_closed_regime")
            .returns("string")
            .describe("Regime of the last closed bar; UNKNOWN without a host"),
        |_, env| {
            Ok(VariableValue::String(
                env.host()
                    .map(|host| host.last_closed_regime())
                    .unwrap_or_else(|| UNKNOWN_REGIME.to_string()),
            ))
        },
    );

    registry.insert(
        spec("current_regime")
            .returns("string")
            .describe("Regime of the live bar; UNKNOWN without a host"),
        |_, env| {
            Ok(VariableValue::String(
                env.host()
                    .map(|host| host.current_regime())
                    .unwrap_or_else(|| UNKNOWN_REGIME.to_string()),
            ))
        },
    );

    registry.insert(
        spec("new_regime_detected")
            .returns("bool")
            .describe("The last two closed bars carry different regimes; false without a host"),
        |_, env| {
            Ok(VariableValue::Bool(
                env.host().is_some_and(|host| host.new_regime_detected()),
            ))
        },
    );
}
