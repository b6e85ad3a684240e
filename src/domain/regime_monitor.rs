//! Live regime state with bar-close semantics.
//!
//! The published state is an `Arc<RegimeState>` behind a lock that is held
//! only to clone or replace the pointer, so readers always see a complete
//! snapshot pair. `last_closed` moves only when the feed reports a newer
//! closed bar.

use crate::domain::providers::dynamic::DynamicValues;
use crate::domain::regime::{regime_changed, ComputedAt, RegimeClassifier, RegimeSnapshot};
use crate::domain::value::VariableValue;
use crate::ports::host_port::RegimeHost;
use crate::ports::indicator_port::IndicatorFeed;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq)]
pub struct RegimeState {
    pub current: RegimeSnapshot,
    pub last_closed: RegimeSnapshot,
    /// Closed snapshot before `last_closed`, once two bars have closed.
    pub previous_closed: Option<RegimeSnapshot>,
}

impl RegimeState {
    fn initial() -> Self {
        Self {
            current: RegimeSnapshot::unknown(ComputedAt::Live),
            last_closed: RegimeSnapshot::unknown(ComputedAt::BarClose),
            previous_closed: None,
        }
    }

    pub fn changed(&self) -> bool {
        let last = self.last_closed.bar_time.map(|_| &self.last_closed);
        regime_changed(self.previous_closed.as_ref(), last)
    }

    /// Values for the `regime.*` namespace.
    pub fn to_variables(&self) -> DynamicValues {
        DynamicValues::from([
            ("current".to_string(), VariableValue::from(self.current.label.as_str())),
            ("current_priority".to_string(), VariableValue::Int(self.current.priority)),
            ("last_closed".to_string(), VariableValue::from(self.last_closed.label.as_str())),
            ("priority".to_string(), VariableValue::Int(self.last_closed.priority)),
            ("changed".to_string(), VariableValue::Bool(self.changed())),
        ])
    }
}

pub struct RegimeMonitor {
    classifier: RegimeClassifier,
    feed: RwLock<Option<Arc<dyn IndicatorFeed>>>,
    state: RwLock<Arc<RegimeState>>,
    /// Serializes triggers; readers never take it.
    trigger: Mutex<()>,
}

impl RegimeMonitor {
    pub fn new(classifier: RegimeClassifier) -> Self {
        Self {
            classifier,
            feed: RwLock::new(None),
            state: RwLock::new(Arc::new(RegimeState::initial())),
            trigger: Mutex::new(()),
        }
    }

    pub fn with_feed(self, feed: Arc<dyn IndicatorFeed>) -> Self {
        self.attach_feed(feed);
        self
    }

    pub fn attach_feed(&self, feed: Arc<dyn IndicatorFeed>) {
        *self.feed.write().unwrap_or_else(PoisonError::into_inner) = Some(feed);
    }

    pub fn detach_feed(&self) {
        *self.feed.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn classifier(&self) -> &RegimeClassifier {
        &self.classifier
    }

    /// The published state; cheap to call from any thread.
    pub fn state(&self) -> Arc<RegimeState> {
        Arc::clone(&self.state.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Recompute from the attached feed and publish. Returns whether the
    /// published state changed: `false` when no feed is attached, when it has
    /// no data, or when a repeat call within the same bar computes the same
    /// snapshots.
    pub fn trigger(&self) -> bool {
        let _serial = self.trigger.lock().unwrap_or_else(PoisonError::into_inner);
        let feed = self
            .feed
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let Some(feed) = feed else {
            return false;
        };
        let Some(frame) = feed.frame() else {
            debug!("indicator feed has no data yet");
            return false;
        };

        let old = self.state();
        let current = self
            .classifier
            .snapshot(frame.live, ComputedAt::Live, frame.live_bar_time);

        let mut next = RegimeState {
            current,
            last_closed: old.last_closed.clone(),
            previous_closed: old.previous_closed.clone(),
        };
        if let Some(closed) = frame.closed {
            let is_newer = old
                .last_closed
                .bar_time
                .is_none_or(|t| closed.bar_time > t);
            if is_newer {
                let snapshot = self.classifier.snapshot(
                    closed.indicators,
                    ComputedAt::BarClose,
                    closed.bar_time,
                );
                if snapshot.label != old.last_closed.label {
                    info!(
                        from = %old.last_closed.label,
                        to = %snapshot.label,
                        bar_time = %closed.bar_time,
                        "regime changed on bar close"
                    );
                }
                next.previous_closed = old.last_closed.bar_time.map(|_| old.last_closed.clone());
                next.last_closed = snapshot;
            }
        }

        let updated = next != *old;
        if updated {
            *self.state.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(next);
        }
        updated
    }
}

impl RegimeHost for RegimeMonitor {
    fn trigger_regime_analysis(&self) -> bool {
        self.trigger()
    }

    fn last_closed_regime(&self) -> String {
        self.state().last_closed.label.clone()
    }

    fn new_regime_detected(&self) -> bool {
        self.state().changed()
    }

    fn current_regime(&self) -> String {
        self.state().current.label.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::functions::regime::UNKNOWN_REGIME;
    use crate::domain::regime::default_classifier;
    use crate::ports::indicator_port::{ClosedBar, IndicatorFrame, IndicatorSnapshot};
    use chrono::{DateTime, Utc};

    struct ScriptedFeed {
        frame: Mutex<Option<IndicatorFrame>>,
    }

    impl ScriptedFeed {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                frame: Mutex::new(None),
            })
        }

        fn set(&self, live_t: i64, live_spread: f64, closed: Option<(i64, f64)>) {
            let spread = |v: f64| -> IndicatorSnapshot {
                IndicatorSnapshot::from([("ema_spread_pct".to_string(), v)])
            };
            *self.frame.lock().unwrap() = Some(IndicatorFrame {
                live_bar_time: at(live_t),
                live: spread(live_spread),
                closed: closed.map(|(t, v)| ClosedBar {
                    bar_time: at(t),
                    indicators: spread(v),
                }),
            });
        }
    }

    impl IndicatorFeed for ScriptedFeed {
        fn frame(&self) -> Option<IndicatorFrame> {
            self.frame.lock().unwrap().clone()
        }
    }

    fn at(t: i64) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(t, 0).unwrap()
    }

    #[test]
    fn no_feed_is_noop() {
        let monitor = RegimeMonitor::new(default_classifier());
        let before = monitor.state();
        assert!(!monitor.trigger_regime_analysis());
        assert!(Arc::ptr_eq(&before, &monitor.state()));
        assert_eq!(monitor.last_closed_regime(), UNKNOWN_REGIME);
    }

    #[test]
    fn empty_feed_is_noop() {
        let monitor = RegimeMonitor::new(default_classifier()).with_feed(ScriptedFeed::new());
        assert!(!monitor.trigger());
    }

    #[test]
    fn live_repaints_closed_is_frozen() {
        let feed = ScriptedFeed::new();
        let monitor = RegimeMonitor::new(default_classifier()).with_feed(feed.clone());

        feed.set(60, 0.5, Some((0, 0.0)));
        assert!(monitor.trigger());
        assert_eq!(monitor.current_regime(), "TREND_BULL");
        assert_eq!(monitor.last_closed_regime(), "RANGE");

        // same bar, live value moves; closed bar must not
        feed.set(60, -0.5, Some((0, 0.9)));
        assert!(monitor.trigger());
        assert_eq!(monitor.current_regime(), "TREND_BEAR");
        assert_eq!(monitor.last_closed_regime(), "RANGE");
    }

    #[test]
    fn repeated_trigger_within_bar_is_idempotent() {
        let feed = ScriptedFeed::new();
        let monitor = RegimeMonitor::new(default_classifier()).with_feed(feed.clone());
        feed.set(60, 0.5, Some((0, 0.0)));
        assert!(monitor.trigger());
        let first = monitor.state();
        assert!(!monitor.trigger());
        assert!(Arc::ptr_eq(&first, &monitor.state()));
        assert_eq!(first.last_closed.label, monitor.last_closed_regime());
    }

    #[test]
    fn new_regime_detected_on_close() {
        let feed = ScriptedFeed::new();
        let monitor = RegimeMonitor::new(default_classifier()).with_feed(feed.clone());
        feed.set(60, 0.0, Some((0, 0.0)));
        monitor.trigger();
        assert!(!monitor.new_regime_detected());

        feed.set(120, 0.5, Some((60, 0.5)));
        monitor.trigger();
        assert!(monitor.new_regime_detected());
        assert_eq!(monitor.last_closed_regime(), "TREND_BULL");

        feed.set(180, 0.5, Some((120, 0.5)));
        monitor.trigger();
        assert!(!monitor.new_regime_detected());
    }

    #[test]
    fn exports_regime_namespace() {
        let feed = ScriptedFeed::new();
        let monitor = RegimeMonitor::new(default_classifier()).with_feed(feed.clone());
        feed.set(60, 0.5, Some((0, 0.0)));
        monitor.trigger();
        let vars = monitor.state().to_variables();
        assert_eq!(vars["current"], VariableValue::from("TREND_BULL"));
        assert_eq!(vars["last_closed"], VariableValue::from("RANGE"));
        assert_eq!(vars["priority"], VariableValue::Int(50));
        assert_eq!(vars["changed"], VariableValue::Bool(false));
    }

    #[test]
    fn detach_feed_stops_updates() {
        let feed = ScriptedFeed::new();
        let monitor = RegimeMonitor::new(default_classifier()).with_feed(feed.clone());
        feed.set(60, 0.5, Some((0, 0.0)));
        monitor.trigger();
        monitor.detach_feed();
        assert!(!monitor.trigger());
        assert_eq!(monitor.current_regime(), "TREND_BULL");
    }
}
