//! Clock-window triggers
//!
//! A [`ClockTrigger`] drives an item to a target state while the clock is
//! inside a window that opens at `start` and repeats every day, hour or
//! minute (or not at all).

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use hydro_core::{format_hms, Clock, Item};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::trigger::{new_trigger_id, Latch, Trigger, TriggerError, TriggerResult};

/// Default window length
pub const DEFAULT_WINDOW: std::time::Duration = std::time::Duration::from_secs(60);

/// How a clock window repeats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepeatBy {
    /// A single window; the trigger is pruned once the window has passed
    #[default]
    None,
    /// A single window; pruned once the action has run or the window has passed
    Once,
    Day,
    Hour,
    Minute,
}

impl RepeatBy {
    /// Distance between window openings, if the window repeats
    pub fn period(self) -> Option<Duration> {
        match self {
            RepeatBy::None | RepeatBy::Once => None,
            RepeatBy::Day => Some(Duration::days(1)),
            RepeatBy::Hour => Some(Duration::hours(1)),
            RepeatBy::Minute => Some(Duration::minutes(1)),
        }
    }

    /// Clamp a fallback window so it closes before the next opening
    ///
    /// Explicit windows are never clamped; [`ClockTrigger::new`] rejects them
    /// when they do not fit.
    pub fn fit_window(self, window: std::time::Duration) -> std::time::Duration {
        match self.period().and_then(|p| p.to_std().ok()) {
            Some(period) if window >= period => period - std::time::Duration::from_secs(1),
            _ => window,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RepeatBy::None => "none",
            RepeatBy::Once => "once",
            RepeatBy::Day => "day",
            RepeatBy::Hour => "hour",
            RepeatBy::Minute => "minute",
        }
    }
}

impl fmt::Display for RepeatBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RepeatBy {
    type Err = TriggerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(RepeatBy::None),
            "once" => Ok(RepeatBy::Once),
            "day" => Ok(RepeatBy::Day),
            "hour" => Ok(RepeatBy::Hour),
            "minute" => Ok(RepeatBy::Minute),
            other => Err(TriggerError::InvalidConfig(format!(
                "unknown repeat policy '{other}' (expected none, once, day, hour or minute)"
            ))),
        }
    }
}

/// Sets an item to a target state once per window occurrence
///
/// The condition holds while `now` is between the latest window opening
/// (`start + k * period`) and that opening plus `window`, both ends included.
/// Nothing holds before `start`. A reading that lands in a later occurrence
/// than the previous one re-arms the latch, even if no poll fell between
/// the two windows.
#[derive(Debug)]
pub struct ClockTrigger {
    id: String,
    latch: Latch,
    item: Arc<dyn Item>,
    target_state: String,
    clock: Arc<dyn Clock>,
    start: DateTime<Utc>,
    window: Duration,
    repeat_by: RepeatBy,
    executed: AtomicBool,
    /// Opening (ms since epoch) of the occurrence last seen open
    last_open: AtomicI64,
}

impl ClockTrigger {
    /// Create a clock trigger
    ///
    /// Fails if the window is zero, or not shorter than the repeat period.
    pub fn new(
        item: Arc<dyn Item>,
        target_state: impl Into<String>,
        clock: Arc<dyn Clock>,
        start: DateTime<Utc>,
        window: std::time::Duration,
        repeat_by: RepeatBy,
    ) -> TriggerResult<Self> {
        if window.is_zero() {
            return Err(TriggerError::InvalidConfig(
                "clock window must be longer than zero".to_string(),
            ));
        }
        let window = Duration::from_std(window).map_err(|_| {
            TriggerError::InvalidConfig(format!("clock window {window:?} is out of range"))
        })?;
        if let Some(period) = repeat_by.period() {
            // The closing edge is inclusive, so a full-period window never closes
            if window >= period {
                return Err(TriggerError::InvalidConfig(format!(
                    "clock window {} must be shorter than its repeat period ({repeat_by})",
                    window
                )));
            }
        }

        Ok(Self {
            id: new_trigger_id(),
            latch: Latch::new(),
            item,
            target_state: target_state.into(),
            clock,
            start,
            window,
            repeat_by,
            executed: AtomicBool::new(false),
            last_open: AtomicI64::new(i64::MIN),
        })
    }

    /// Opening of the latest window at or before `now`
    pub fn occurrence_at(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if now < self.start {
            return None;
        }
        match self.repeat_by.period() {
            None => Some(self.start),
            Some(period) => {
                let elapsed = (now - self.start).num_milliseconds();
                let into_period = elapsed % period.num_milliseconds();
                Some(now - Duration::milliseconds(into_period))
            }
        }
    }

    /// Whether a non-repeating window has closed
    fn window_passed(&self, now: DateTime<Utc>) -> bool {
        now > self.start + self.window
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn repeat_by(&self) -> RepeatBy {
        self.repeat_by
    }

    pub fn target_state(&self) -> &str {
        &self.target_state
    }
}

impl Trigger for ClockTrigger {
    fn id(&self) -> &str {
        &self.id
    }

    fn describe(&self) -> String {
        format!(
            "clock {} -> {} at {} for {} (repeat {})",
            self.item.id(),
            self.target_state,
            self.start.format("%Y-%m-%d %H:%M:%S"),
            self.window
                .to_std()
                .map(format_hms)
                .unwrap_or_else(|_| self.window.to_string()),
            self.repeat_by
        )
    }

    fn conditions_met(&self) -> bool {
        let now = self.clock.now();
        let Some(opened) = self.occurrence_at(now) else {
            return false;
        };
        if now - opened > self.window {
            return false;
        }
        let opened = opened.timestamp_millis();
        let previous = self.last_open.swap(opened, Ordering::AcqRel);
        if previous != i64::MIN && previous != opened {
            self.latch.release();
        }
        true
    }

    fn latch(&self) -> &Latch {
        &self.latch
    }

    fn should_not_remain(&self) -> bool {
        match self.repeat_by {
            RepeatBy::None => self.window_passed(self.clock.now()),
            RepeatBy::Once => {
                self.executed.load(Ordering::Acquire) || self.window_passed(self.clock.now())
            }
            RepeatBy::Day | RepeatBy::Hour | RepeatBy::Minute => false,
        }
    }

    fn execute(&self) -> TriggerResult<()> {
        // One attempt per firing, whether or not the item accepts it
        self.executed.store(true, Ordering::Release);
        self.item.set_state(&self.target_state)?;
        info!(
            trigger = %self.id,
            item = %self.item.id(),
            state = %self.target_state,
            "Clock trigger applied state"
        );
        Ok(())
    }
}
