//! Session aggregation tests

use race_engineer::session::{SessionAggregator, SessionSnapshot};
use race_engineer::telemetry::TelemetryPacket;

mod common;

use common::{lap_packet, participants_packet, session_packet, status_packet, telemetry_packet};

fn replay(packets: &[TelemetryPacket]) -> SessionSnapshot {
    let mut aggregator = SessionAggregator::new();
    for packet in packets {
        aggregator.apply(packet);
    }
    (*aggregator.snapshot()).clone()
}

#[test]
fn test_last_write_wins_regardless_of_unrelated_kinds() {
    let a = replay(&[
        telemetry_packet(1, 200, 80),
        status_packet(2, 40.0),
        lap_packet(3, 2, 1, 7, 0),
        telemetry_packet(4, 250, 85),
    ]);
    let b = replay(&[
        status_packet(1, 40.0),
        telemetry_packet(2, 200, 80),
        telemetry_packet(3, 250, 85),
        lap_packet(4, 2, 1, 7, 0),
    ]);

    for snapshot in [&a, &b] {
        let car = snapshot.player_telemetry().unwrap();
        assert_eq!(car.speed_kph, 250);
        assert_eq!(car.tyres_surface_temperature, [85; 4]);
        assert!((car.fuel_in_tank - 40.0).abs() < f32::EPSILON);
        assert_eq!(snapshot.player_lap().unwrap().position, 7);
    }
}

#[test]
fn test_status_does_not_touch_telemetry_fields() {
    let snapshot = replay(&[telemetry_packet(1, 305, 99), status_packet(2, 12.0)]);
    let car = snapshot.player_telemetry().unwrap();
    assert_eq!(car.speed_kph, 305);
    assert!(car.has_status);
}

#[test]
fn test_session_change_resets_everything() {
    let mut aggregator = SessionAggregator::new();
    aggregator.apply(&participants_packet(1, &["PLAYER", "RIVAL"]));
    aggregator.apply(&lap_packet(2, 6, 2, 3, 90_100));
    aggregator.apply(&telemetry_packet(3, 280, 101));
    assert_eq!(aggregator.snapshot().driver_name(1), Some("RIVAL"));

    let outcome = aggregator.apply(&session_packet(common::SESSION + 1, 1, 3));
    assert!(outcome.session_changed);

    let snapshot = aggregator.snapshot();
    assert_eq!(snapshot.session.session_uid, common::SESSION + 1);
    assert!(snapshot.player_lap().is_none());
    assert!(snapshot.player_telemetry().is_none());
    assert!(snapshot.participants.is_empty());
    assert_eq!(snapshot.session.weather_label(), "light rain");
}

#[test]
fn test_lap_completion_reports_personal_best() {
    let mut aggregator = SessionAggregator::new();
    aggregator.apply(&lap_packet(1, 1, 2, 4, 0));

    let first = aggregator.apply(&lap_packet(2, 2, 0, 4, 92_000)).lap_completed.unwrap();
    assert_eq!(first.lap_number, 1);
    assert!(first.personal_best);

    let slower = aggregator.apply(&lap_packet(3, 3, 0, 4, 93_500)).lap_completed.unwrap();
    assert!(!slower.personal_best);

    let faster = aggregator.apply(&lap_packet(4, 4, 0, 3, 91_250)).lap_completed.unwrap();
    assert!(faster.personal_best);
    assert_eq!(aggregator.snapshot().player_lap().unwrap().best_lap_ms, Some(91_250));
}

#[test]
fn test_frame_regression_still_applied() {
    let mut aggregator = SessionAggregator::new();
    aggregator.apply(&telemetry_packet(50, 200, 90));
    let outcome = aggregator.apply(&telemetry_packet(10, 150, 90));
    assert!(outcome.frame_regressed);
    assert_eq!(aggregator.snapshot().player_telemetry().unwrap().speed_kph, 150);
}

#[test]
fn test_snapshot_atomic_under_concurrent_application() {
    let mut aggregator = SessionAggregator::new();
    let handle = aggregator.handle();

    std::thread::scope(|scope| {
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let handle = handle.clone();
                scope.spawn(move || {
                    for _ in 0..2_000 {
                        let snapshot = handle.current();
                        if let Some(car) = snapshot.player_telemetry() {
                            // Every field of a packet lands together
                            let tyres = car.tyres_surface_temperature;
                            assert!(tyres.iter().all(|t| *t == tyres[0]));
                            assert_eq!(car.speed_kph, u16::from(tyres[0]));
                        }
                    }
                })
            })
            .collect();

        for round in 0..20u32 {
            for v in 0..=255u8 {
                aggregator.apply(&telemetry_packet(round * 256 + u32::from(v), u16::from(v), v));
            }
        }

        for reader in readers {
            reader.join().unwrap();
        }
    });
}
