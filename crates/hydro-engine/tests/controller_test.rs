//! End-to-end tests for the controller: real threads, manual clocks

mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use common::{init_tracing, item, wait_until, CycleCounter, ScriptedTrigger};
use hydro_core::{Clock, Connectivity, Device, Item, ManualClock, SimulatedBoard, SimulatedItem};
use hydro_engine::{Controller, ControllerSettings, DeviceController, EngineError, TriggerGroup};
use hydro_triggers::SharedTrigger;

const TIMEOUT: Duration = Duration::from_secs(5);

fn fast_controller(name: &str) -> (Controller, Arc<CycleCounter>) {
    init_tracing();
    let counter = CycleCounter::new();
    let controller = Controller::new(
        name,
        ControllerSettings {
            poll_interval: Duration::from_millis(1),
            ..ControllerSettings::default()
        },
    )
    .with_status(counter.clone());
    (controller, counter)
}

// ============================================================================
// Lifecycle
// ============================================================================

#[test]
fn test_start_twice_and_stop_twice() {
    let (mut controller, counter) = fast_controller("lifecycle");

    controller.start().unwrap();
    assert!(controller.is_running());
    assert!(matches!(
        controller.start(),
        Err(EngineError::AlreadyRunning(ref name)) if name == "lifecycle"
    ));

    counter.wait_cycles(1);
    assert!(controller.is_healthy());
    controller.stop().unwrap();
    assert!(!controller.is_running());
    assert!(!controller.is_healthy());
    assert!(matches!(controller.stop(), Err(EngineError::NotRunning(_))));
}

#[test]
fn test_restart_keeps_registered_triggers() {
    let (mut controller, counter) = fast_controller("restart");
    let persistent = ScriptedTrigger::new("persistent", false);
    controller.add_trigger(persistent.clone());

    controller.start().unwrap();
    counter.wait_cycles(2);
    controller.stop().unwrap();
    assert_eq!(controller.triggers().unwrap().ids(), vec!["persistent"]);

    // Registered while stopped, picked up after the restart
    let late = ScriptedTrigger::new("late", true);
    controller.add_trigger(late.clone());
    persistent.set_condition(true);

    controller.start().unwrap();
    assert!(wait_until(TIMEOUT, || {
        persistent.executions() == 1 && late.executions() == 1
    }));
    controller.stop().unwrap();
    assert_eq!(controller.triggers().unwrap().ids(), vec!["persistent", "late"]);
}

#[test]
fn test_stop_runs_already_queued_actions() {
    let (mut controller, counter) = fast_controller("drain");
    let slow = ScriptedTrigger::with_delay("slow", true, Duration::from_millis(100));
    let fast = ScriptedTrigger::new("fast", true);
    controller.add_trigger(slow.clone());
    controller.add_trigger(fast.clone());

    controller.start().unwrap();
    counter.wait_cycles(3);
    controller.stop().unwrap();

    assert_eq!(slow.executions(), 1);
    assert_eq!(fast.executions(), 1);
    assert_eq!(controller.dispatch_stats().executed, 2);
}

#[test]
fn test_duplicate_registration_stops_poller() {
    let (mut controller, _counter) = fast_controller("duplicate");
    let twice: SharedTrigger = ScriptedTrigger::new("twice", false);
    controller.add_trigger(twice.clone());
    controller.add_trigger(twice);

    controller.start().unwrap();
    assert!(wait_until(TIMEOUT, || !controller.is_healthy()));
    assert!(controller.is_running());

    let err = controller.stop().unwrap_err();
    assert!(matches!(err, EngineError::DuplicateTrigger { ref id, .. } if id == "twice"));
    assert!(err.is_invariant_violation());

    // The controller can be started again with an empty set
    assert!(controller.triggers().unwrap().is_empty());
    controller.start().unwrap();
    controller.stop().unwrap();
}

#[test]
fn test_drop_stops_running_controller() {
    let (mut controller, counter) = fast_controller("dropped");
    let handle = controller.handle();
    controller.start().unwrap();
    counter.wait_cycles(1);

    drop(controller);
    assert!(!handle.is_alive());
    assert!(matches!(
        handle.add_trigger(ScriptedTrigger::new("orphan", true)),
        Err(EngineError::ControllerDropped(ref name)) if name == "dropped"
    ));
}

// ============================================================================
// Firing semantics
// ============================================================================

#[test]
fn test_set_fires_once_and_is_pruned() {
    init_tracing();
    let counter = CycleCounter::new();
    let mut controller = Controller::new(
        "instant",
        ControllerSettings {
            poll_interval: Duration::ZERO,
            ..ControllerSettings::default()
        },
    )
    .with_status(counter.clone());
    let pump = item("switch.pump", "OFF");

    controller.start().unwrap();
    controller.set(pump.clone(), "ON");
    assert!(wait_until(TIMEOUT, || pump.state() == "ON"));
    counter.wait_cycles(5);
    controller.stop().unwrap();

    assert_eq!(pump.write_count(), 1);
    assert!(controller.triggers().unwrap().is_empty());
}

#[test]
fn test_failing_action_does_not_stop_dispatch() {
    let (mut controller, _counter) = fast_controller("failures");
    let pump = Arc::new(
        SimulatedItem::new("switch.pump".parse().unwrap(), "OFF").with_allowed_states(["ON", "OFF"]),
    );
    let offline = item("switch.fan", "OFF");
    offline.set_available(false);

    controller.set(pump.clone(), "PURPLE");
    controller.set(offline.clone(), "ON");
    controller.set(pump.clone(), "ON");
    controller.start().unwrap();

    assert!(wait_until(TIMEOUT, || controller.dispatch_stats().attempted() == 3));
    controller.stop().unwrap();

    let stats = controller.dispatch_stats();
    assert_eq!(stats.executed, 1);
    assert_eq!(stats.failed, 2);
    assert_eq!(pump.state(), "ON");
    assert_eq!(offline.state(), "OFF");
    // One attempt each, even when it failed
    assert!(controller.triggers().unwrap().is_empty());
}

#[test]
fn test_hourly_schedule_fires_once_per_window() {
    let (mut controller, counter) = fast_controller("hourly");
    let clock = Arc::new(ManualClock::at(Utc.with_ymd_and_hms(2024, 6, 1, 11, 59, 0).unwrap()));
    let lamp = item("light.grow_1", "LOW");
    let start = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();

    controller
        .schedule_every_hour(
            lamp.clone(),
            "HIGH",
            clock.clone(),
            start,
            Some(Duration::from_secs(10)),
        )
        .unwrap();
    controller.start().unwrap();

    // Before the first occurrence
    counter.wait_cycles(3);
    assert_eq!(lamp.write_count(), 0);

    // Inside the window
    clock.set(start + chrono::Duration::seconds(5));
    assert!(wait_until(TIMEOUT, || lamp.state() == "HIGH"));

    // Someone flips it back while still inside the window: no second firing
    lamp.set_state("LOW").unwrap();
    counter.wait_cycles(3);
    assert_eq!(lamp.state(), "LOW");
    assert_eq!(lamp.write_count(), 2);

    // Window passes, latch releases
    clock.set(start + chrono::Duration::seconds(30));
    counter.wait_cycles(2);

    // Next hour, exactly at the occurrence
    clock.set(start + chrono::Duration::hours(1));
    assert!(wait_until(TIMEOUT, || lamp.state() == "HIGH"));
    controller.stop().unwrap();

    assert_eq!(lamp.write_count(), 3);
    assert_eq!(controller.triggers().unwrap().len(), 1);
    assert_eq!(clock.now(), start + chrono::Duration::hours(1));
}

#[test]
fn test_once_schedule_is_pruned_after_firing() {
    let (mut controller, counter) = fast_controller("once");
    let clock = Arc::new(ManualClock::at(Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap()));
    let valve = item("valve.drain", "CLOSED");

    controller
        .schedule_once(valve.clone(), "OPEN", clock.clone(), clock.now(), None)
        .unwrap();
    controller.start().unwrap();

    assert!(wait_until(TIMEOUT, || valve.state() == "OPEN"));
    counter.wait_cycles(3);
    controller.stop().unwrap();

    assert!(controller.triggers().unwrap().is_empty());
}

// ============================================================================
// Groups and handles
// ============================================================================

#[test]
fn test_group_registers_all_triggers() {
    let (mut controller, counter) = fast_controller("groups");
    let a = ScriptedTrigger::new("bed_1_pump", true);
    let b = ScriptedTrigger::new("bed_1_light", true);
    let group = Arc::new(TriggerGroup::new("bed_1").with_trigger(a.clone()).with_trigger(b.clone()));

    controller.add_group(group.clone()).unwrap();
    assert_eq!(group.controller().unwrap().name(), "groups");
    assert!(Arc::ptr_eq(&controller.group("bed_1").unwrap(), &group));

    controller.start().unwrap();
    assert!(wait_until(TIMEOUT, || a.executions() == 1 && b.executions() == 1));

    group.remove_all().unwrap();
    counter.wait_cycles(2);
    controller.stop().unwrap();

    assert!(controller.triggers().unwrap().is_empty());
    assert_eq!(a.executions(), 1);
    assert_eq!(b.executions(), 1);
}

#[test]
fn test_handle_registers_from_another_thread() {
    let (mut controller, _counter) = fast_controller("handle");
    let handle = controller.handle();
    let t = ScriptedTrigger::new("remote", true);

    controller.start().unwrap();
    std::thread::spawn({
        let t = t.clone();
        move || handle.add_trigger(t).unwrap()
    })
    .join()
    .unwrap();

    assert!(wait_until(TIMEOUT, || t.executions() == 1));
    controller.stop().unwrap();
}

// ============================================================================
// Device controller
// ============================================================================

#[test]
fn test_device_controller_connectivity() {
    let (controller, counter) = fast_controller("device");
    let board = Arc::new(SimulatedBoard::new("arduino"));
    let mut dc = DeviceController::new(controller, board.clone());

    let pump = item("switch.pump", "OFF");
    dc.controller().set(pump.clone(), "ON");

    dc.start().unwrap();
    assert_eq!(board.connectivity(), Connectivity::Connected);
    assert!(wait_until(TIMEOUT, || pump.state() == "ON"));
    counter.wait_cycles(1);

    dc.stop().unwrap();
    assert_eq!(board.connectivity(), Connectivity::Disconnected);
}
