//! Operator-driven runs over virtual time.
//!
//! These run the full execute/complete loop through `Driver` and check that
//! the operator keeps the station busy, repairs faults and vents pressure.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use station_control::{Driver, OperatorController, OperatorPolicy};
use station_core::test_fixtures::{alert_config, base_config, cycle_draws, scripted_engine};
use station_core::*;

#[test]
fn seeded_run_produces_requested_cycles() {
    let engine = StationEngine::new(
        base_config(),
        BoxMuller::new(ChaCha8Rng::seed_from_u64(42)),
        0,
    )
    .unwrap();
    let mut driver = Driver::new(engine, OperatorController::default(), 0);

    let mut completed = 0u64;
    let produced = driver
        .run_cycles(1_000, |_, events| {
            completed += events
                .iter()
                .filter(|e| matches!(e.event, Event::CycleCompleted { .. }))
                .count() as u64;
        })
        .unwrap();

    assert_eq!(produced, 1_000);
    assert_eq!(completed, 1_000);
    let metrics = driver.engine().metrics();
    assert!(metrics.number_of_manufactured_products > 900);
    assert_eq!(driver.source().next_serial_number(), 1_001);
    // at least the default cycle time per product
    assert!(driver.now_ms() >= 1_000 * 3_500);
}

#[test]
fn operator_repairs_fault_after_repair_time() {
    let mut engine = scripted_engine(base_config());
    engine.normals_mut().extend(cycle_draws(CycleOutcome::Fault));
    engine.normals_mut().extend(cycle_draws(CycleOutcome::Done));
    let policy = OperatorPolicy {
        fault_repair_ms: 30_000,
        ..OperatorPolicy::default()
    };
    let mut driver = Driver::new(engine, OperatorController::new(policy), 0);

    // execute, fault at 5 s
    driver.step().unwrap();
    assert_eq!(driver.engine().status(), StationStatus::Fault);
    assert_eq!(driver.now_ms(), 5_000);

    // operator notes the fault and sleeps until the repair is done
    let events = driver.step().unwrap().unwrap();
    assert!(events.is_empty());
    assert_eq!(driver.now_ms(), 35_000);

    // reset, then the next serial runs to completion
    let events = driver.step().unwrap().unwrap();
    assert!(events.iter().any(|e| matches!(
        e.event,
        Event::StationReset {
            faulty_time_ms: 30_000
        }
    )));
    assert_eq!(driver.engine().status(), StationStatus::Done);
    assert_eq!(driver.engine().metrics().product_serial_number, 2);
    assert_eq!(driver.now_ms(), 42_000);
}

#[test]
fn operator_vents_high_pressure() {
    let mut engine = scripted_engine(alert_config());
    // +1000 mbar per cycle: 3500, 4500, 5500, then pinned at 7000
    for _ in 0..4 {
        engine.normals_mut().extend([0.0, 0.0, 0.0, 20.0]);
    }
    let mut driver = Driver::new(engine, OperatorController::default(), 0);
    let mut vented = false;
    driver
        .run_cycles(5, |_, events| {
            vented |= events.iter().any(|e| {
                matches!(
                    e.event,
                    Event::PressureReleased {
                        trigger: ReleaseTrigger::Valve
                    }
                )
            });
        })
        .unwrap();

    assert!(vented);
    assert!(driver.engine().metrics().pressure_mbar < 6_000.0);
    // the timer armed at 28 s is still pending after the valve
    assert_eq!(
        driver.engine().pressure_model().release_due_ms(),
        Some(148_000)
    );
}
