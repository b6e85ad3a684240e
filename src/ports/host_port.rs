//! Host capability port for impure regime built-ins.

/// Externally-owned handle to live regime state, carried in the evaluation
/// context so impure functions never reach for globals.
pub trait RegimeHost: Send + Sync {
    /// Recompute the regime for the attached series. Returns `false` when no
    /// data source is attached.
    fn trigger_regime_analysis(&self) -> bool;

    /// Label of the most recently closed bar.
    fn last_closed_regime(&self) -> String;

    /// Whether the last two closed bars carried different labels.
    fn new_regime_detected(&self) -> bool;

    /// Label computed from the live (possibly open) bar.
    fn current_regime(&self) -> String;
}
