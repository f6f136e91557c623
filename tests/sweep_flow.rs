use hil_attack_sweep::{
    monitor::envelope::EnvelopeMonitor,
    sweep::{
        attack::AttackTable,
        controller::{RUN_HORIZON_S, RunState, RunTracker, SweepPlan, TimeoutPolicy},
        results::{Metric, ResultSink, SweepResult},
    },
    telemetry::{
        codec::{TelemetryFrame, decode},
        fdm::{FdmPacket, Field, Unit},
    },
    utils::export::{CsvResultStore, RESULTS_FILE},
};

/// Engine stand-in: level flight over the theater center, rolling hard
/// once the gyro noise attack is active and the accel gain is cut.
fn scripted_frame(outer_value: f64, inner_value: f64, t: f64) -> TelemetryFrame {
    let mission = EnvelopeMonitor::default().mission;
    let mut f = TelemetryFrame {
        lat: mission.theater_lat,
        lon: mission.theater_lon,
        alt: 300.0,
        az: -9.8,
        ..TelemetryFrame::default()
    };
    if outer_value > 0.0 && inner_value < 1.0 && t >= 20.0 {
        f.p = 4.0;
    }
    f
}

fn fly(plan: &SweepPlan, policy: TimeoutPolicy) -> SweepResult {
    let mut monitor = EnvelopeMonitor::default();
    // keep the scripted vehicle clear of the target window check
    monitor.mission.target_start = f64::INFINITY;
    let mut tracker = RunTracker::new(monitor, RUN_HORIZON_S, policy);
    let mut result = SweepResult::new(plan);

    for point in plan.points() {
        tracker.reset();
        tracker.start();
        let mut t = 0.0;
        let outcome = loop {
            let frame = scripted_frame(point.outer_value, point.inner_value, t);
            tracker.observe(Some(&frame), t);
            if let Some(outcome) = tracker.record() {
                break outcome;
            }
            t += 0.25;
        };
        assert_eq!(tracker.state(), RunState::Recorded);
        result.record(&point, outcome);
    }
    result.finish().unwrap()
}

fn plan() -> SweepPlan {
    let table = AttackTable::builtin();
    SweepPlan::new(
        table.get("imuGyroNoise").unwrap().with_values(vec![0.0, 0.01]),
        table.get("gainAccelX").unwrap().with_values(vec![1.0, 0.5, 0.0]),
    )
}

#[test]
fn two_by_three_sweep_fills_every_cell() {
    let plan = plan();
    let result = fly(&plan, TimeoutPolicy::RecordAsFailure);

    let flight = result.table(Metric::FlightFail).unwrap();
    let mission = result.table(Metric::MissionFail).unwrap();
    assert_eq!(flight.shape(), (2, 3));
    assert_eq!(mission.shape(), (2, 3));

    for inner in 0..3 {
        // clean row: every run reaches the horizon
        assert_eq!(flight.get(0, inner), Some(&[RUN_HORIZON_S][..]));
        assert_eq!(mission.get(0, inner), Some(&[RUN_HORIZON_S][..]));
    }
    assert_eq!(flight.get(1, 0), Some(&[RUN_HORIZON_S][..]));
    for inner in 1..3 {
        assert_eq!(flight.get(1, inner), Some(&[20.0][..]));
        assert_eq!(mission.get(1, inner), Some(&[20.0][..]));
    }
}

#[test]
fn clean_timeout_counts_as_success_when_configured() {
    let plan = plan();
    let result = fly(&plan, TimeoutPolicy::RecordAsSuccess);
    let flight = result.table(Metric::FlightFail).unwrap();
    assert_eq!(flight.get(0, 0), Some(&[][..]));
    assert_eq!(flight.get(1, 2), Some(&[20.0][..]));
}

#[test]
fn horizon_run_records_horizon_for_both_metrics() {
    let mut tracker = RunTracker::new(EnvelopeMonitor::default(), RUN_HORIZON_S, TimeoutPolicy::default());
    tracker.start();

    // decoded from a real frame: on the target all the time, never violating
    let mission = EnvelopeMonitor::default().mission;
    let mut pkt = FdmPacket::default();
    pkt.set(Field::Latitude, mission.target_lat, Unit::Degrees);
    pkt.set(Field::Longitude, mission.target_lon, Unit::Degrees);
    pkt.set(Field::Altitude, 250.0, Unit::Meters);
    let mut perturbation = plan().nominal_perturbation();

    let mut t = 0.0;
    while tracker.state() == RunState::Running {
        let frame = decode(pkt.as_bytes(), &mut perturbation, t).unwrap().truth;
        tracker.observe(Some(&frame), t);
        t += 1.0;
    }
    let outcome = tracker.record().unwrap();
    assert_eq!(outcome.flight_fail, vec![80.0]);
    assert_eq!(outcome.mission_fail, vec![80.0]);
}

#[test]
fn finished_sweep_persists_to_fixed_file() {
    let result = fly(&plan(), TimeoutPolicy::RecordAsFailure);
    let dir = std::env::temp_dir().join(format!("hil_attack_sweep_flow_{}", std::process::id()));
    let mut store = CsvResultStore::new(&dir);
    store.consume(&result).unwrap();

    let text = std::fs::read_to_string(dir.join(RESULTS_FILE)).unwrap();
    // header + 2 metrics x 6 cells
    assert_eq!(text.lines().count(), 13);
    std::fs::remove_dir_all(&dir).ok();
}
