//! Shared helpers for controller integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use std::time::{Duration, Instant};

use hydro_core::{SimulatedItem, StatusSource};
use hydro_triggers::{Latch, Trigger, TriggerResult};

static TRACING: Once = Once::new();

/// Route engine logs to the test harness output
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
            )
            .with_test_writer()
            .try_init();
    });
}

pub fn item(id: &str, initial: &str) -> Arc<SimulatedItem> {
    Arc::new(SimulatedItem::new(id.parse().unwrap(), initial))
}

/// Poll `cond` until it holds or `timeout` elapses
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    cond()
}

/// Status source that counts how many poll cycles have read it
#[derive(Debug, Default)]
pub struct CycleCounter {
    cycles: AtomicUsize,
}

impl CycleCounter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn cycles(&self) -> usize {
        self.cycles.load(Ordering::SeqCst)
    }

    /// Block until at least `n` more full cycles have completed
    pub fn wait_cycles(&self, n: usize) {
        let target = self.cycles() + n;
        assert!(
            wait_until(Duration::from_secs(5), || self.cycles() >= target),
            "poller did not complete {n} cycles"
        );
    }
}

impl StatusSource for CycleCounter {
    fn label(&self) -> String {
        "cycles".to_string()
    }

    fn status(&self) -> String {
        (self.cycles.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }
}

/// Trigger whose condition, lifetime and action are driven by the test
#[derive(Debug)]
pub struct ScriptedTrigger {
    name: String,
    latch: Latch,
    condition: AtomicBool,
    exhausted: AtomicBool,
    action_delay: Duration,
    executions: AtomicUsize,
}

impl ScriptedTrigger {
    pub fn new(name: &str, condition: bool) -> Arc<Self> {
        Self::with_delay(name, condition, Duration::ZERO)
    }

    /// An action that takes `delay` to run
    pub fn with_delay(name: &str, condition: bool, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            latch: Latch::new(),
            condition: AtomicBool::new(condition),
            exhausted: AtomicBool::new(false),
            action_delay: delay,
            executions: AtomicUsize::new(0),
        })
    }

    pub fn set_condition(&self, condition: bool) {
        self.condition.store(condition, Ordering::SeqCst);
    }

    pub fn exhaust(&self) {
        self.exhausted.store(true, Ordering::SeqCst);
    }

    pub fn executions(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }
}

impl Trigger for ScriptedTrigger {
    fn id(&self) -> &str {
        &self.name
    }

    fn describe(&self) -> String {
        format!("scripted {}", self.name)
    }

    fn conditions_met(&self) -> bool {
        self.condition.load(Ordering::SeqCst)
    }

    fn latch(&self) -> &Latch {
        &self.latch
    }

    fn should_not_remain(&self) -> bool {
        self.exhausted.load(Ordering::SeqCst)
    }

    fn execute(&self) -> TriggerResult<()> {
        if !self.action_delay.is_zero() {
            std::thread::sleep(self.action_delay);
        }
        self.executions.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
