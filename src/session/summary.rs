//! Compact situational summary handed to remote providers

use serde_json::{Value, json};

use super::state::SessionSnapshot;
use crate::telemetry::Wheel;

/// Format a lap time as `m:ss.SSS`; zero means no time yet
#[must_use]
pub fn format_lap_time(ms: u32) -> String {
    if ms == 0 {
        return "N/A".to_string();
    }
    let minutes = ms / 60_000;
    let seconds = (ms % 60_000) / 1000;
    let millis = ms % 1000;
    format!("{minutes}:{seconds:02}.{millis:03}")
}

/// Milliseconds as seconds with one decimal, for speech
#[must_use]
pub fn format_gap(ms: u32) -> String {
    format!("{}.{}", ms / 1000, (ms % 1000) / 100)
}

fn round(value: f32, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (f64::from(value) * factor).round() / factor
}

fn per_wheel<T: Copy + Into<f64>>(values: [T; 4], places: i32) -> Value {
    let mut map = serde_json::Map::new();
    for wheel in Wheel::ALL {
        let raw: f64 = values[wheel as usize].into();
        let factor = 10f64.powi(places);
        map.insert(
            wheel.label().replace(' ', "_"),
            json!((raw * factor).round() / factor),
        );
    }
    Value::Object(map)
}

/// JSON view of the player's situation: telemetry, lap, g-forces, session
#[must_use]
pub fn context_summary(snapshot: &SessionSnapshot) -> Value {
    let mut root = serde_json::Map::new();

    if !snapshot.has_data() {
        root.insert("status".into(), json!("no telemetry received yet"));
        return Value::Object(root);
    }

    if let Some(car) = snapshot.player_telemetry() {
        root.insert(
            "telemetry".into(),
            json!({
                "speed_kph": car.speed_kph,
                "gear": car.gear,
                "rpm": car.engine_rpm,
                "throttle_pct": round(car.throttle * 100.0, 1),
                "brake_pct": round(car.brake * 100.0, 1),
                "drs_open": car.drs_open,
                "tyre_surface_temp_c": per_wheel(car.tyres_surface_temperature, 0),
                "tyre_avg_temp_c": round(car.avg_tyre_temperature(), 1),
                "brake_temp_c": per_wheel(car.brakes_temperature, 0),
                "brake_avg_temp_c": round(car.avg_brake_temperature(), 1),
                "tyre_pressure_psi": per_wheel(car.tyres_pressure, 2),
                "engine_temp_c": car.engine_temperature,
            }),
        );
    }

    if let Some(car) = snapshot.player_car() {
        if car.has_status {
            root.insert(
                "car_status".into(),
                json!({
                    "fuel_kg": round(car.fuel_in_tank, 1),
                    "fuel_remaining_laps": round(car.fuel_remaining_laps, 1),
                    "compound": car.compound_label(),
                    "tyre_age_laps": car.tyres_age_laps,
                    "drs_allowed": car.drs_allowed,
                }),
            );
        }
        if car.has_damage {
            root.insert(
                "damage".into(),
                json!({
                    "tyre_wear_pct": per_wheel(car.tyres_wear, 1),
                    "front_wing_pct": car.front_left_wing_damage.max(car.front_right_wing_damage),
                    "rear_wing_pct": car.rear_wing_damage,
                    "floor_pct": car.floor_damage,
                    "gearbox_pct": car.gear_box_damage,
                    "engine_pct": car.engine_damage,
                }),
            );
        }
        if car.has_motion {
            root.insert(
                "g_forces".into(),
                json!({
                    "lateral": round(car.g_force_lateral, 2),
                    "longitudinal": round(car.g_force_longitudinal, 2),
                    "vertical": round(car.g_force_vertical, 2),
                }),
            );
        }
    }

    if let Some(lap) = snapshot.player_lap() {
        root.insert(
            "lap".into(),
            json!({
                "lap_number": lap.lap_number,
                "position": lap.position,
                "sector": lap.sector.saturating_add(1),
                "lap_distance_m": round(lap.lap_distance, 1),
                "current_lap": format_lap_time(lap.current_lap_ms),
                "last_lap": format_lap_time(lap.last_lap_ms),
                "best_lap": format_lap_time(lap.best_lap_ms.unwrap_or(0)),
                "gap_ahead_s": f64::from(lap.delta_to_car_in_front_ms) / 1000.0,
                "gap_leader_s": f64::from(lap.delta_to_leader_ms) / 1000.0,
                "pit_stops": lap.pit_stops,
                "penalties_s": lap.penalties_s,
                "warnings": lap.warnings,
            }),
        );
    }

    let session = &snapshot.session;
    if session.received {
        root.insert(
            "session".into(),
            json!({
                "weather": session.weather_label(),
                "track_temp_c": session.track_temperature,
                "air_temp_c": session.air_temperature,
                "total_laps": session.total_laps,
                "time_left_s": session.session_time_left,
                "safety_car": session.safety_car_label(),
                "cars": snapshot.car_count(),
            }),
        );
    }

    Value::Object(root)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_lap_time() {
        assert_eq!(format_lap_time(0), "N/A");
        assert_eq!(format_lap_time(83_456), "1:23.456");
        assert_eq!(format_lap_time(5_007), "0:05.007");
    }

    #[test]
    fn test_format_gap() {
        assert_eq!(format_gap(1_250), "1.2");
        assert_eq!(format_gap(0), "0.0");
    }

    #[test]
    fn test_empty_snapshot_summary() {
        let summary = context_summary(&SessionSnapshot::empty(22));
        assert_eq!(summary["status"], "no telemetry received yet");
    }

    #[test]
    fn test_summary_labels_wheels_by_position() {
        let mut snap = SessionSnapshot::empty(22);
        snap.packets_applied = 1;
        snap.cars[0].has_telemetry = true;
        snap.cars[0].tyres_surface_temperature = [90, 91, 95, 96];

        let summary = context_summary(&snap);
        assert_eq!(summary["telemetry"]["tyre_surface_temp_c"]["front_left"], 95.0);
        assert_eq!(summary["telemetry"]["tyre_surface_temp_c"]["rear_right"], 91.0);
        assert!(summary.get("lap").is_none());
    }
}
