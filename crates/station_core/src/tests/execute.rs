use super::*;

fn planned(events: &[EventEnvelope]) -> Option<(u64, bool)> {
    events.iter().find_map(|e| match e.event {
        Event::CycleStarted {
            planned_cycle_time_ms,
            station_failure,
            ..
        } => Some((planned_cycle_time_ms, station_failure)),
        _ => None,
    })
}

#[test]
fn ideal_cycle_time_below_floor_is_clamped_at_execute() {
    let mut engine = scripted_engine(base_config());
    script(&mut engine, cycle_draws(CycleOutcome::Done));
    engine.set_ideal_cycle_time(1_000);
    // stored raw until the next cycle starts
    assert_eq!(engine.metrics().ideal_cycle_time_ms, 1_000);

    let events = engine.execute(1, 0).unwrap();
    assert_eq!(engine.metrics().ideal_cycle_time_ms, 3_500);
    assert!(events.iter().any(|e| matches!(
        e.event,
        Event::IdealCycleTimeClamped {
            requested_ms: 1_000,
            clamped_ms: 3_500
        }
    )));
    assert_eq!(planned(&events), Some((3_500, false)));

    let events = engine.advance(3_500);
    let (outcome, actual, energy) = completion(&events).unwrap();
    assert_eq!(outcome, CycleOutcome::Done);
    assert_eq!(actual, 3_500);
    // modifier is e at the floor
    let expected = 150.0 * std::f64::consts::E * 3.5 / 3_600.0;
    assert!((energy - expected).abs() < 1e-12, "energy {energy}");
}

#[test]
fn zero_ideal_cycle_time_never_reaches_formulas() {
    let mut engine = scripted_engine(base_config());
    script(&mut engine, cycle_draws(CycleOutcome::Done));
    engine.set_ideal_cycle_time(0);
    let (done_at, events) = run_cycle(&mut engine, 1, 0);
    assert_eq!(done_at, 3_500);
    let (_, _, energy) = completion(&events).unwrap();
    assert!(energy.is_finite());
    assert!(engine.metrics().pressure_mbar.is_finite());
}

#[test]
fn ideal_cycle_time_above_floor_is_kept() {
    let mut engine = scripted_engine(base_config());
    script(&mut engine, cycle_draws(CycleOutcome::Done));
    engine.set_ideal_cycle_time(5_000);

    let events = engine.execute(1, 1_000).unwrap();
    assert!(!events
        .iter()
        .any(|e| matches!(e.event, Event::IdealCycleTimeClamped { .. })));
    assert_eq!(engine.pending_cycle().map(|c| c.due_ms), Some(6_000));

    let events = engine.advance(6_000);
    let (_, actual, energy) = completion(&events).unwrap();
    assert_eq!(actual, 5_000);
    let expected = 150.0 * (7_000.0f64 / 5_000.0 - 1.0).exp() * 5.0 / 3_600.0;
    assert!((energy - expected).abs() < 1e-12, "energy {energy}");
    assert!((engine.metrics().energy_consumption_kwh - energy).abs() < f64::EPSILON);
}

#[test]
fn jitter_lengthens_cycle_by_magnitude() {
    for z in [1.0, -1.0] {
        let mut engine = scripted_engine(base_config());
        // jitter stddev is 0.1, so one sigma is a 10% overrun either way
        script(&mut engine, [z, 0.0, 0.0, 0.0]);
        let events = engine.execute(1, 0).unwrap();
        assert_eq!(planned(&events), Some((7_700, false)), "z={z}");
    }
}

#[test]
fn failing_cycle_uses_failure_cycle_time() {
    let mut engine = scripted_engine(base_config());
    script(&mut engine, [0.0, 3.5, 1.0, 0.0]);
    let events = engine.execute(1, 0).unwrap();
    assert_eq!(planned(&events), Some((10_000, true)));
    assert!(engine.pending_cycle().is_some_and(|c| c.station_failure));

    let events = engine.advance(10_000);
    assert_eq!(
        completion(&events).map(|(outcome, actual, _)| (outcome, actual)),
        Some((CycleOutcome::Fault, 10_000))
    );
    // jitter, failure, overrun, pressure: no discard roll on failure
    assert_eq!(engine.normals_mut().drawn(), 4);
}

#[test]
fn failure_threshold_is_strict() {
    let mut engine = scripted_engine(base_config());
    script(&mut engine, [0.0, 3.0, 2.0, 0.0]);
    let (_, events) = run_cycle(&mut engine, 1, 0);
    assert_eq!(
        completion(&events).map(|(outcome, _, _)| outcome),
        Some(CycleOutcome::Done)
    );
}

#[test]
fn discard_roll_discards_product() {
    let mut engine = scripted_engine(base_config());
    script(&mut engine, cycle_draws(CycleOutcome::Discarded));
    let (_, events) = run_cycle(&mut engine, 1, 0);
    let metrics = engine.metrics();
    assert_eq!(metrics.status, StationStatus::Discarded);
    assert_eq!(metrics.number_of_discarded_products, 1);
    assert_eq!(metrics.number_of_manufactured_products, 0);
    assert!(!engine.fault_clock().is_running());
    assert_eq!(
        completion(&events).map(|(outcome, _, _)| outcome),
        Some(CycleOutcome::Discarded)
    );
}

#[test]
fn overlapping_execute_is_rejected() {
    let mut engine = scripted_engine(base_config());
    script(&mut engine, cycle_draws(CycleOutcome::Done));
    engine.execute(1, 0).unwrap();
    let drawn = engine.normals_mut().drawn();

    let err = engine.execute(2, 100).unwrap_err();
    assert!(matches!(err, StationError::CycleInProgress { serial_number: 1 }));
    assert_eq!(engine.metrics().product_serial_number, 1);
    assert_eq!(engine.pending_cycle().map(|c| c.serial_number), Some(1));
    assert_eq!(engine.normals_mut().drawn(), drawn);

    engine.advance(7_000);
    assert_eq!(engine.metrics().number_of_manufactured_products, 1);
}

#[test]
fn execute_accepted_from_every_idle_status() {
    let mut engine = scripted_engine(base_config());
    let mut now = 0;
    for (serial, outcome) in [
        CycleOutcome::Done,
        CycleOutcome::Discarded,
        CycleOutcome::Fault,
        CycleOutcome::Done,
    ]
    .into_iter()
    .enumerate()
    {
        script(&mut engine, cycle_draws(outcome));
        now = run_cycle(&mut engine, serial as u64, now).0;
        assert_eq!(engine.status(), outcome.status());
    }
    let metrics = engine.metrics();
    assert_eq!(metrics.number_of_manufactured_products, 2);
    assert_eq!(metrics.number_of_discarded_products, 2);
    assert_eq!(metrics.total_products(), 4);
}

#[test]
fn reset_cancels_cycle_in_flight() {
    let mut engine = scripted_engine(base_config());
    script(&mut engine, cycle_draws(CycleOutcome::Done));
    engine.execute(1, 0).unwrap();
    engine.reset(100);

    assert!(engine.pending_cycle().is_none());
    assert_eq!(engine.next_deadline_ms(), None);
    let events = engine.advance(100_000);
    assert!(completion(&events).is_none());

    let metrics = engine.metrics();
    assert_eq!(metrics.status, StationStatus::Ready);
    assert_eq!(metrics.total_products(), 0);

    // a fresh cycle can start straight away
    assert!(engine.execute(2, 200).is_ok());
}

#[test]
fn late_advance_completes_at_deadline() {
    let mut engine = scripted_engine(base_config());
    script(&mut engine, cycle_draws(CycleOutcome::Done));
    engine.execute(1, 0).unwrap();

    let events = engine.advance(60_000);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].at_ms, 7_000);
    assert_eq!(engine.metrics().actual_cycle_time_ms, 7_000);
}

#[test]
fn apply_dispatches_commands() {
    let mut engine = scripted_engine(base_config());
    script(&mut engine, cycle_draws(CycleOutcome::Done));

    let events = engine
        .apply(
            &Command::SetIdealCycleTime {
                ideal_cycle_time_ms: 4_000,
            },
            0,
        )
        .unwrap();
    assert!(events.is_empty());

    engine.apply(&Command::Execute { serial_number: 9 }, 0).unwrap();
    assert_eq!(engine.pending_cycle().map(|c| c.due_ms), Some(4_000));

    let events = engine.apply(&Command::Reset, 10).unwrap();
    assert!(matches!(events[0].event, Event::StationReset { .. }));

    let events = engine.apply(&Command::OpenPressureReleaseValve, 20).unwrap();
    assert!(matches!(
        events[0].event,
        Event::PressureReleased {
            trigger: ReleaseTrigger::Valve
        }
    ));
}

#[test]
fn event_ids_are_sequential() {
    let mut engine = scripted_engine(base_config());
    script(&mut engine, cycle_draws(CycleOutcome::Done));
    let mut events = engine.execute(1, 0).unwrap();
    events.extend(engine.advance(7_000));
    events.extend(engine.reset(8_000));

    let ids: Vec<&str> = events.iter().map(|e| e.id.0.as_str()).collect();
    assert_eq!(ids, ["evt_000000", "evt_000001", "evt_000002"]);
}

#[test]
fn seeded_cycle_times_are_never_short() {
    let mut engine = seeded_engine(base_config(), 99);
    let mut now = 0;
    for serial in 0..2_000 {
        if serial % 500 == 0 {
            engine.set_ideal_cycle_time(3_500 + serial * 3);
        }
        let ideal = engine.metrics().ideal_cycle_time_ms.max(3_500);
        let events = engine.execute(serial, now).unwrap();
        let (planned_ms, failure) = planned(&events).unwrap();
        if failure {
            assert!(planned_ms >= 5_000);
        } else {
            assert!(planned_ms >= ideal, "{planned_ms} < {ideal}");
        }

        now += planned_ms;
        let events = engine.advance(now);
        let (_, actual, energy) = completion(&events).unwrap();
        assert_eq!(actual, planned_ms);
        assert!(energy.is_finite() && energy >= 0.0);
    }
}
