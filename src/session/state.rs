//! Live session model, merged from decoded packets

use std::collections::VecDeque;

use serde::Serialize;

use crate::telemetry::packet::{
    CarDamageData, CarMotion, CarStatusData, CarTelemetryData, EventDetail,
    FinalClassificationData, LapData, ParticipantData, SessionData, WeatherForecastSample,
};
use crate::telemetry::{PacketHeader, Wheel};

/// Session-wide fields owned by the session packet
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionState {
    pub session_uid: u64,
    pub track_id: i8,
    pub session_type: u8,
    pub weather: u8,
    pub track_temperature: i8,
    pub air_temperature: i8,
    pub total_laps: u8,
    pub track_length: u16,
    pub session_time_left: u16,
    pub session_duration: u16,
    /// Latest header timestamp, seconds since session start
    pub session_time: f32,
    pub safety_car_status: u8,
    pub pit_speed_limit: u8,
    pub game_paused: bool,
    pub pit_stop_window_ideal_lap: u8,
    pub pit_stop_window_latest_lap: u8,
    pub forecast: Vec<WeatherForecastSample>,
    /// Set once a session packet has been merged
    pub received: bool,
}

impl SessionState {
    pub(super) fn merge(&mut self, data: &SessionData) {
        self.track_id = data.track_id;
        self.session_type = data.session_type;
        self.weather = data.weather;
        self.track_temperature = data.track_temperature;
        self.air_temperature = data.air_temperature;
        self.total_laps = data.total_laps;
        self.track_length = data.track_length;
        self.session_time_left = data.session_time_left;
        self.session_duration = data.session_duration;
        self.safety_car_status = data.safety_car_status;
        self.pit_speed_limit = data.pit_speed_limit;
        self.game_paused = data.game_paused != 0;
        self.pit_stop_window_ideal_lap = data.pit_stop_window_ideal_lap;
        self.pit_stop_window_latest_lap = data.pit_stop_window_latest_lap;
        self.forecast.clone_from(&data.weather_forecast);
        self.received = true;
    }

    /// Human label for the weather code
    #[must_use]
    pub const fn weather_label(&self) -> &'static str {
        weather_label(self.weather)
    }

    /// Human label for the safety car status
    #[must_use]
    pub const fn safety_car_label(&self) -> Option<&'static str> {
        match self.safety_car_status {
            1 => Some("full safety car"),
            2 => Some("virtual safety car"),
            3 => Some("formation lap"),
            _ => None,
        }
    }
}

#[must_use]
pub const fn weather_label(code: u8) -> &'static str {
    match code {
        0 => "clear",
        1 => "light cloud",
        2 => "overcast",
        3 => "light rain",
        4 => "heavy rain",
        5 => "storm",
        _ => "unknown",
    }
}

/// Per-car live values; each field group is owned by one packet kind
#[derive(Debug, Clone, Default, Serialize)]
pub struct CarState {
    // Car telemetry
    pub speed_kph: u16,
    pub gear: i8,
    pub engine_rpm: u16,
    pub throttle: f32,
    pub brake: f32,
    pub drs_open: bool,
    pub tyres_surface_temperature: [u8; 4],
    pub tyres_inner_temperature: [u8; 4],
    pub tyres_pressure: [f32; 4],
    pub brakes_temperature: [u16; 4],
    pub engine_temperature: u16,
    pub has_telemetry: bool,

    // Car status
    pub fuel_in_tank: f32,
    pub fuel_capacity: f32,
    pub fuel_remaining_laps: f32,
    pub actual_tyre_compound: u8,
    pub visual_tyre_compound: u8,
    pub tyres_age_laps: u8,
    pub drs_allowed: bool,
    pub fia_flag: i8,
    pub ers_store_energy: f32,
    pub ers_deploy_mode: u8,
    pub has_status: bool,

    // Car damage
    pub tyres_wear: [f32; 4],
    pub tyres_damage: [u8; 4],
    pub brakes_damage: [u8; 4],
    pub front_left_wing_damage: u8,
    pub front_right_wing_damage: u8,
    pub rear_wing_damage: u8,
    pub floor_damage: u8,
    pub gear_box_damage: u8,
    pub engine_damage: u8,
    pub drs_fault: bool,
    pub ers_fault: bool,
    pub has_damage: bool,

    // Motion
    pub g_force_lateral: f32,
    pub g_force_longitudinal: f32,
    pub g_force_vertical: f32,
    pub yaw: f32,
    pub world_position: [f32; 3],
    pub has_motion: bool,
}

impl CarState {
    pub(super) fn merge_telemetry(&mut self, t: &CarTelemetryData) {
        self.speed_kph = t.speed;
        self.gear = t.gear;
        self.engine_rpm = t.engine_rpm;
        self.throttle = t.throttle;
        self.brake = t.brake;
        self.drs_open = t.drs != 0;
        self.tyres_surface_temperature = t.tyres_surface_temperature;
        self.tyres_inner_temperature = t.tyres_inner_temperature;
        self.tyres_pressure = t.tyres_pressure;
        self.brakes_temperature = t.brakes_temperature;
        self.engine_temperature = t.engine_temperature;
        self.has_telemetry = true;
    }

    pub(super) fn merge_status(&mut self, s: &CarStatusData) {
        self.fuel_in_tank = s.fuel_in_tank;
        self.fuel_capacity = s.fuel_capacity;
        self.fuel_remaining_laps = s.fuel_remaining_laps;
        self.actual_tyre_compound = s.actual_tyre_compound;
        self.visual_tyre_compound = s.visual_tyre_compound;
        self.tyres_age_laps = s.tyres_age_laps;
        self.drs_allowed = s.drs_allowed != 0;
        self.fia_flag = s.vehicle_fia_flags;
        self.ers_store_energy = s.ers_store_energy;
        self.ers_deploy_mode = s.ers_deploy_mode;
        self.has_status = true;
    }

    pub(super) fn merge_damage(&mut self, d: &CarDamageData) {
        self.tyres_wear = d.tyres_wear;
        self.tyres_damage = d.tyres_damage;
        self.brakes_damage = d.brakes_damage;
        self.front_left_wing_damage = d.front_left_wing_damage;
        self.front_right_wing_damage = d.front_right_wing_damage;
        self.rear_wing_damage = d.rear_wing_damage;
        self.floor_damage = d.floor_damage;
        self.gear_box_damage = d.gear_box_damage;
        self.engine_damage = d.engine_damage;
        self.drs_fault = d.drs_fault != 0;
        self.ers_fault = d.ers_fault != 0;
        self.has_damage = true;
    }

    pub(super) fn merge_motion(&mut self, m: &CarMotion) {
        self.g_force_lateral = m.g_force_lateral;
        self.g_force_longitudinal = m.g_force_longitudinal;
        self.g_force_vertical = m.g_force_vertical;
        self.yaw = m.yaw;
        self.world_position = m.world_position;
        self.has_motion = true;
    }

    /// Surface temperature of one wheel, °C
    #[must_use]
    pub const fn tyre_temperature(&self, wheel: Wheel) -> u8 {
        self.tyres_surface_temperature[wheel as usize]
    }

    /// Mean tyre surface temperature, °C
    #[must_use]
    pub fn avg_tyre_temperature(&self) -> f32 {
        mean(self.tyres_surface_temperature.map(f32::from))
    }

    /// Mean brake temperature, °C
    #[must_use]
    pub fn avg_brake_temperature(&self) -> f32 {
        mean(self.brakes_temperature.map(f32::from))
    }

    /// Mean tyre pressure, PSI
    #[must_use]
    pub fn avg_tyre_pressure(&self) -> f32 {
        mean(self.tyres_pressure)
    }

    /// Most worn tyre and its wear percentage
    #[must_use]
    pub fn worst_tyre_wear(&self) -> (Wheel, f32) {
        Wheel::ALL
            .into_iter()
            .map(|w| (w, self.tyres_wear[w as usize]))
            .fold((Wheel::FrontLeft, f32::MIN), |best, cur| {
                if cur.1 > best.1 { cur } else { best }
            })
    }

    /// Name of the fitted compound
    #[must_use]
    pub const fn compound_label(&self) -> &'static str {
        match self.visual_tyre_compound {
            16 => "soft",
            17 => "medium",
            18 => "hard",
            7 => "intermediate",
            8 => "wet",
            _ => "unknown compound",
        }
    }
}

fn mean(values: [f32; 4]) -> f32 {
    values.iter().sum::<f32>() / 4.0
}

/// Per-car lap progress, owned by the lap data packet
#[derive(Debug, Clone, Default, Serialize)]
pub struct LapRecord {
    pub lap_number: u8,
    /// Zero-based sector index as sent by the game
    pub sector: u8,
    pub sector1_ms: u32,
    pub sector2_ms: u32,
    pub current_lap_ms: u32,
    pub last_lap_ms: u32,
    pub best_lap_ms: Option<u32>,
    pub position: u8,
    pub delta_to_car_in_front_ms: u32,
    pub delta_to_leader_ms: u32,
    pub pit_stops: u8,
    pub pit_status: u8,
    pub penalties_s: u8,
    pub warnings: u8,
    pub lap_distance: f32,
    pub current_lap_invalid: bool,
    pub result_status: u8,
    pub received: bool,
}

impl LapRecord {
    pub(super) fn merge(&mut self, lap: &LapData) {
        self.lap_number = lap.current_lap_num;
        self.sector = lap.sector;
        self.sector1_ms = lap.sector1_ms();
        self.sector2_ms = lap.sector2_ms();
        self.current_lap_ms = lap.current_lap_time_ms;
        self.last_lap_ms = lap.last_lap_time_ms;
        self.position = lap.car_position;
        self.delta_to_car_in_front_ms = lap.delta_to_car_in_front_ms();
        self.delta_to_leader_ms = lap.delta_to_race_leader_ms();
        self.pit_stops = lap.num_pit_stops;
        self.pit_status = lap.pit_status;
        self.penalties_s = lap.penalties;
        self.warnings = lap.total_warnings;
        self.lap_distance = lap.lap_distance;
        self.current_lap_invalid = lap.current_lap_invalid != 0;
        self.result_status = lap.result_status;
        self.received = true;
    }

    /// Record a completed lap time, returning whether it is a new best
    pub(super) fn record_completed(&mut self, lap_ms: u32) -> bool {
        if lap_ms == 0 {
            return false;
        }
        match self.best_lap_ms {
            Some(best) if best <= lap_ms => false,
            _ => {
                self.best_lap_ms = Some(lap_ms);
                true
            }
        }
    }
}

/// Roster entry from the participants packet
#[derive(Debug, Clone, Default, Serialize)]
pub struct Participant {
    pub car_index: u8,
    pub name: String,
    pub team_id: u8,
    pub ai_controlled: bool,
    pub race_number: u8,
    pub nationality: u8,
}

impl Participant {
    pub(super) fn from_wire(car_index: u8, p: &ParticipantData) -> Self {
        Self {
            car_index,
            name: p.name.clone(),
            team_id: p.team_id,
            ai_controlled: p.ai_controlled != 0,
            race_number: p.race_number,
            nationality: p.nationality,
        }
    }
}

/// One entry of the event ring
#[derive(Debug, Clone, Serialize)]
pub struct RaceEvent {
    pub code: String,
    pub session_time: f32,
    pub car_index: Option<u8>,
    pub detail: EventDetail,
}

/// Immutable, point-in-time view of the whole session
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionSnapshot {
    pub session: SessionState,
    pub player_car_index: u8,
    /// Cars in play; always `car_count` entries
    pub cars: Vec<CarState>,
    pub laps: Vec<LapRecord>,
    pub participants: Vec<Participant>,
    pub classification: Vec<FinalClassificationData>,
    pub events: VecDeque<RaceEvent>,
    pub last_frame: u32,
    pub packets_applied: u64,
}

impl SessionSnapshot {
    /// Empty snapshot sized for a full grid
    #[must_use]
    pub fn empty(car_count: usize) -> Self {
        Self {
            cars: vec![CarState::default(); car_count],
            laps: vec![LapRecord::default(); car_count],
            ..Self::default()
        }
    }

    /// Number of cars currently in play
    #[must_use]
    pub fn car_count(&self) -> usize {
        self.cars.len()
    }

    /// True once any packet has been merged
    #[must_use]
    pub const fn has_data(&self) -> bool {
        self.packets_applied > 0
    }

    #[must_use]
    pub fn player_car(&self) -> Option<&CarState> {
        self.cars.get(usize::from(self.player_car_index))
    }

    #[must_use]
    pub fn player_lap(&self) -> Option<&LapRecord> {
        self.laps
            .get(usize::from(self.player_car_index))
            .filter(|lap| lap.received)
    }

    /// Car telemetry for the player, once a telemetry packet has arrived
    #[must_use]
    pub fn player_telemetry(&self) -> Option<&CarState> {
        self.player_car().filter(|car| car.has_telemetry)
    }

    /// Driver name for a car slot
    #[must_use]
    pub fn driver_name(&self, car_index: u8) -> Option<&str> {
        self.participants
            .iter()
            .find(|p| p.car_index == car_index)
            .map(|p| p.name.as_str())
            .filter(|name| !name.is_empty())
    }

    /// Car index and lap record of the car at a race position
    #[must_use]
    pub fn car_at_position(&self, position: u8) -> Option<(u8, &LapRecord)> {
        self.laps
            .iter()
            .enumerate()
            .find(|(_, lap)| lap.received && lap.position == position)
            .and_then(|(idx, lap)| u8::try_from(idx).ok().map(|idx| (idx, lap)))
    }

    pub(super) fn resize(&mut self, car_count: usize) {
        self.cars.resize_with(car_count, CarState::default);
        self.laps.resize_with(car_count, LapRecord::default);
    }

    pub(super) fn header_seen(&mut self, header: &PacketHeader) {
        self.session.session_uid = header.session_uid;
        self.session.session_time = header.session_time;
        self.player_car_index = header.player_car_index;
        self.last_frame = header.frame_identifier;
        self.packets_applied += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_best_lap_only_improves() {
        let mut lap = LapRecord::default();
        assert!(lap.record_completed(90_000));
        assert!(!lap.record_completed(91_000));
        assert!(lap.record_completed(89_500));
        assert!(!lap.record_completed(0));
        assert_eq!(lap.best_lap_ms, Some(89_500));
    }

    #[test]
    fn test_worst_tyre_wear_uses_wire_order() {
        let car = CarState {
            // RL, RR, FL, FR
            tyres_wear: [10.0, 12.0, 31.5, 20.0],
            ..CarState::default()
        };
        assert_eq!(car.worst_tyre_wear(), (Wheel::FrontLeft, 31.5));
    }

    #[test]
    fn test_player_lap_requires_data() {
        let mut snap = SessionSnapshot::empty(22);
        assert!(snap.player_lap().is_none());
        snap.laps[0].received = true;
        assert!(snap.player_lap().is_some());
    }
}
