//! Typed F1 25 telemetry packets
//!
//! Field names follow the game's published UDP format (packet format 2025)
//! minus the `m_` prefix. Values are wire units: no conversion happens here.

use serde::Serialize;

/// Packet format version this crate decodes
pub const SUPPORTED_FORMAT: u16 = 2025;

/// Size of the common header in bytes
pub const HEADER_SIZE: usize = 29;

/// Car slots present in every per-car array
pub const MAX_CARS: usize = 22;

/// Marshal zone slots in the session packet
pub const MAX_MARSHAL_ZONES: usize = 21;

/// Weather forecast slots in the session packet
pub const MAX_FORECAST_SAMPLES: usize = 64;

/// Size of the event detail union
pub const EVENT_DETAIL_SIZE: usize = 12;

/// Wheel array order used by every per-wheel field on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wheel {
    RearLeft = 0,
    RearRight = 1,
    FrontLeft = 2,
    FrontRight = 3,
}

impl Wheel {
    pub const ALL: [Self; 4] = [
        Self::FrontLeft,
        Self::FrontRight,
        Self::RearLeft,
        Self::RearRight,
    ];

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::RearLeft => "rear left",
            Self::RearRight => "rear right",
            Self::FrontLeft => "front left",
            Self::FrontRight => "front right",
        }
    }
}

/// Packet-type tag from the header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PacketKind {
    Motion,
    Session,
    LapData,
    Event,
    Participants,
    CarSetups,
    CarTelemetry,
    CarStatus,
    FinalClassification,
    LobbyInfo,
    CarDamage,
    SessionHistory,
    TyreSets,
    MotionEx,
    TimeTrial,
    LapPositions,
    Unknown(u8),
}

impl PacketKind {
    #[must_use]
    pub const fn from_tag(tag: u8) -> Self {
        match tag {
            0 => Self::Motion,
            1 => Self::Session,
            2 => Self::LapData,
            3 => Self::Event,
            4 => Self::Participants,
            5 => Self::CarSetups,
            6 => Self::CarTelemetry,
            7 => Self::CarStatus,
            8 => Self::FinalClassification,
            9 => Self::LobbyInfo,
            10 => Self::CarDamage,
            11 => Self::SessionHistory,
            12 => Self::TyreSets,
            13 => Self::MotionEx,
            14 => Self::TimeTrial,
            15 => Self::LapPositions,
            other => Self::Unknown(other),
        }
    }

    #[must_use]
    pub const fn tag(self) -> u8 {
        match self {
            Self::Motion => 0,
            Self::Session => 1,
            Self::LapData => 2,
            Self::Event => 3,
            Self::Participants => 4,
            Self::CarSetups => 5,
            Self::CarTelemetry => 6,
            Self::CarStatus => 7,
            Self::FinalClassification => 8,
            Self::LobbyInfo => 9,
            Self::CarDamage => 10,
            Self::SessionHistory => 11,
            Self::TyreSets => 12,
            Self::MotionEx => 13,
            Self::TimeTrial => 14,
            Self::LapPositions => 15,
            Self::Unknown(tag) => tag,
        }
    }

    /// Full datagram size (header included) for the kinds this crate decodes
    #[must_use]
    pub const fn expected_size(self) -> Option<usize> {
        match self {
            Self::Motion => Some(1349),
            Self::Session => Some(753),
            Self::LapData => Some(1285),
            Self::Event => Some(45),
            Self::Participants => Some(1284),
            Self::CarTelemetry => Some(1352),
            Self::CarStatus => Some(1239),
            Self::FinalClassification => Some(1042),
            Self::CarDamage => Some(1041),
            _ => None,
        }
    }
}

/// Common header carried by every datagram
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PacketHeader {
    pub packet_format: u16,
    pub game_year: u8,
    pub game_major_version: u8,
    pub game_minor_version: u8,
    pub packet_version: u8,
    pub packet_id: u8,
    pub session_uid: u64,
    pub session_time: f32,
    pub frame_identifier: u32,
    pub overall_frame_identifier: u32,
    pub player_car_index: u8,
    pub secondary_player_car_index: u8,
}

impl PacketHeader {
    #[must_use]
    pub const fn kind(&self) -> PacketKind {
        PacketKind::from_tag(self.packet_id)
    }
}

/// One decoded datagram
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryPacket {
    pub header: PacketHeader,
    pub payload: Payload,
}

/// Payload variants, one per decoded packet kind
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Motion(Vec<CarMotion>),
    Session(Box<SessionData>),
    LapData(LapDataPacket),
    Event(EventPacket),
    Participants(ParticipantsPacket),
    CarTelemetry(CarTelemetryPacket),
    CarStatus(Vec<CarStatusData>),
    FinalClassification(FinalClassificationPacket),
    CarDamage(Vec<CarDamageData>),
    /// Undecoded tag or unsupported format version
    Opaque { tag: u8, bytes: Vec<u8> },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CarMotion {
    pub world_position: [f32; 3],
    pub world_velocity: [f32; 3],
    pub world_forward_dir: [i16; 3],
    pub world_right_dir: [i16; 3],
    pub g_force_lateral: f32,
    pub g_force_longitudinal: f32,
    pub g_force_vertical: f32,
    pub yaw: f32,
    pub pitch: f32,
    pub roll: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct MarshalZone {
    pub zone_start: f32,
    pub zone_flag: i8,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct WeatherForecastSample {
    pub session_type: u8,
    pub time_offset: u8,
    pub weather: u8,
    pub track_temperature: i8,
    pub track_temperature_change: i8,
    pub air_temperature: i8,
    pub air_temperature_change: i8,
    pub rain_percentage: u8,
}

/// Session packet fields this crate models; assist and rule-set flags are
/// skipped on decode and zero-filled on encode
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionData {
    pub weather: u8,
    pub track_temperature: i8,
    pub air_temperature: i8,
    pub total_laps: u8,
    pub track_length: u16,
    pub session_type: u8,
    pub track_id: i8,
    pub formula: u8,
    pub session_time_left: u16,
    pub session_duration: u16,
    pub pit_speed_limit: u8,
    pub game_paused: u8,
    pub is_spectating: u8,
    pub spectator_car_index: u8,
    pub marshal_zones: Vec<MarshalZone>,
    pub safety_car_status: u8,
    pub network_game: u8,
    pub weather_forecast: Vec<WeatherForecastSample>,
    pub forecast_accuracy: u8,
    pub ai_difficulty: u8,
    pub season_link_identifier: u32,
    pub weekend_link_identifier: u32,
    pub session_link_identifier: u32,
    pub pit_stop_window_ideal_lap: u8,
    pub pit_stop_window_latest_lap: u8,
    pub pit_stop_rejoin_position: u8,
    pub num_safety_car_periods: u8,
    pub num_virtual_safety_car_periods: u8,
    pub num_red_flag_periods: u8,
    pub sector2_lap_distance_start: f32,
    pub sector3_lap_distance_start: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LapData {
    pub last_lap_time_ms: u32,
    pub current_lap_time_ms: u32,
    pub sector1_time_ms_part: u16,
    pub sector1_time_minutes_part: u8,
    pub sector2_time_ms_part: u16,
    pub sector2_time_minutes_part: u8,
    pub delta_to_car_in_front_ms_part: u16,
    pub delta_to_car_in_front_minutes_part: u8,
    pub delta_to_race_leader_ms_part: u16,
    pub delta_to_race_leader_minutes_part: u8,
    pub lap_distance: f32,
    pub total_distance: f32,
    pub safety_car_delta: f32,
    pub car_position: u8,
    pub current_lap_num: u8,
    pub pit_status: u8,
    pub num_pit_stops: u8,
    pub sector: u8,
    pub current_lap_invalid: u8,
    pub penalties: u8,
    pub total_warnings: u8,
    pub corner_cutting_warnings: u8,
    pub num_unserved_drive_through_pens: u8,
    pub num_unserved_stop_go_pens: u8,
    pub grid_position: u8,
    pub driver_status: u8,
    pub result_status: u8,
    pub pit_lane_timer_active: u8,
    pub pit_lane_time_in_lane_ms: u16,
    pub pit_stop_timer_ms: u16,
    pub pit_stop_should_serve_pen: u8,
    pub speed_trap_fastest_speed: f32,
    pub speed_trap_fastest_lap: u8,
}

impl LapData {
    /// Sector 1 time in milliseconds
    #[must_use]
    pub fn sector1_ms(&self) -> u32 {
        u32::from(self.sector1_time_minutes_part) * 60_000 + u32::from(self.sector1_time_ms_part)
    }

    /// Sector 2 time in milliseconds
    #[must_use]
    pub fn sector2_ms(&self) -> u32 {
        u32::from(self.sector2_time_minutes_part) * 60_000 + u32::from(self.sector2_time_ms_part)
    }

    #[must_use]
    pub fn delta_to_car_in_front_ms(&self) -> u32 {
        u32::from(self.delta_to_car_in_front_minutes_part) * 60_000
            + u32::from(self.delta_to_car_in_front_ms_part)
    }

    #[must_use]
    pub fn delta_to_race_leader_ms(&self) -> u32 {
        u32::from(self.delta_to_race_leader_minutes_part) * 60_000
            + u32::from(self.delta_to_race_leader_ms_part)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LapDataPacket {
    pub cars: Vec<LapData>,
    pub time_trial_pb_car_idx: u8,
    pub time_trial_rival_car_idx: u8,
}

/// Four-character event code plus its decoded detail
#[derive(Debug, Clone, PartialEq)]
pub struct EventPacket {
    pub code: [u8; 4],
    pub detail: EventDetail,
}

impl EventPacket {
    #[must_use]
    pub fn code_str(&self) -> String {
        String::from_utf8_lossy(&self.code).into_owned()
    }
}

/// Event detail union, decoded per event code
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum EventDetail {
    SessionStarted,
    SessionEnded,
    FastestLap { vehicle_idx: u8, lap_time: f32 },
    Retirement { vehicle_idx: u8, reason: u8 },
    DrsEnabled,
    DrsDisabled { reason: u8 },
    TeamMateInPits { vehicle_idx: u8 },
    ChequeredFlag,
    RaceWinner { vehicle_idx: u8 },
    Penalty {
        penalty_type: u8,
        infringement_type: u8,
        vehicle_idx: u8,
        other_vehicle_idx: u8,
        time: u8,
        lap_num: u8,
        places_gained: u8,
    },
    SpeedTrap {
        vehicle_idx: u8,
        speed: f32,
        is_overall_fastest_in_session: u8,
        is_driver_fastest_in_session: u8,
        fastest_vehicle_idx_in_session: u8,
        fastest_speed_in_session: f32,
    },
    StartLights { num_lights: u8 },
    LightsOut,
    DriveThroughServed { vehicle_idx: u8 },
    StopGoServed { vehicle_idx: u8, stop_time: f32 },
    Flashback { frame_identifier: u32, session_time: f32 },
    Buttons { button_status: u32 },
    RedFlag,
    Overtake { overtaking_vehicle_idx: u8, being_overtaken_vehicle_idx: u8 },
    SafetyCar { safety_car_type: u8, event_type: u8 },
    Collision { vehicle1_idx: u8, vehicle2_idx: u8 },
    /// Code not in the pinned catalogue; raw union bytes kept
    Other { data: [u8; EVENT_DETAIL_SIZE] },
}

impl EventDetail {
    /// Car the event refers to, when it refers to one
    #[must_use]
    pub const fn vehicle_idx(&self) -> Option<u8> {
        match self {
            Self::FastestLap { vehicle_idx, .. }
            | Self::Retirement { vehicle_idx, .. }
            | Self::TeamMateInPits { vehicle_idx }
            | Self::RaceWinner { vehicle_idx }
            | Self::Penalty { vehicle_idx, .. }
            | Self::SpeedTrap { vehicle_idx, .. }
            | Self::DriveThroughServed { vehicle_idx }
            | Self::StopGoServed { vehicle_idx, .. } => Some(*vehicle_idx),
            Self::Overtake {
                overtaking_vehicle_idx,
                ..
            } => Some(*overtaking_vehicle_idx),
            Self::Collision { vehicle1_idx, .. } => Some(*vehicle1_idx),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LiveryColour {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ParticipantData {
    pub ai_controlled: u8,
    pub driver_id: u8,
    pub network_id: u8,
    pub team_id: u8,
    pub my_team: u8,
    pub race_number: u8,
    pub nationality: u8,
    pub name: String,
    pub your_telemetry: u8,
    pub show_online_names: u8,
    pub tech_level: u16,
    pub platform: u8,
    pub num_colours: u8,
    pub livery_colours: [LiveryColour; 4],
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParticipantsPacket {
    pub num_active_cars: u8,
    pub participants: Vec<ParticipantData>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CarTelemetryData {
    pub speed: u16,
    pub throttle: f32,
    pub steer: f32,
    pub brake: f32,
    pub clutch: u8,
    pub gear: i8,
    pub engine_rpm: u16,
    pub drs: u8,
    pub rev_lights_percent: u8,
    pub rev_lights_bit_value: u16,
    pub brakes_temperature: [u16; 4],
    pub tyres_surface_temperature: [u8; 4],
    pub tyres_inner_temperature: [u8; 4],
    pub engine_temperature: u16,
    pub tyres_pressure: [f32; 4],
    pub surface_type: [u8; 4],
}

#[derive(Debug, Clone, PartialEq)]
pub struct CarTelemetryPacket {
    pub cars: Vec<CarTelemetryData>,
    pub mfd_panel_index: u8,
    pub mfd_panel_index_secondary_player: u8,
    pub suggested_gear: i8,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CarStatusData {
    pub traction_control: u8,
    pub anti_lock_brakes: u8,
    pub fuel_mix: u8,
    pub front_brake_bias: u8,
    pub pit_limiter_status: u8,
    pub fuel_in_tank: f32,
    pub fuel_capacity: f32,
    pub fuel_remaining_laps: f32,
    pub max_rpm: u16,
    pub idle_rpm: u16,
    pub max_gears: u8,
    pub drs_allowed: u8,
    pub drs_activation_distance: u16,
    pub actual_tyre_compound: u8,
    pub visual_tyre_compound: u8,
    pub tyres_age_laps: u8,
    pub vehicle_fia_flags: i8,
    pub engine_power_ice: f32,
    pub engine_power_mguk: f32,
    pub ers_store_energy: f32,
    pub ers_deploy_mode: u8,
    pub ers_harvested_this_lap_mguk: f32,
    pub ers_harvested_this_lap_mguh: f32,
    pub ers_deployed_this_lap: f32,
    pub network_paused: u8,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct FinalClassificationData {
    pub position: u8,
    pub num_laps: u8,
    pub grid_position: u8,
    pub points: u8,
    pub num_pit_stops: u8,
    pub result_status: u8,
    pub result_reason: u8,
    pub best_lap_time_ms: u32,
    pub total_race_time: f64,
    pub penalties_time: u8,
    pub num_penalties: u8,
    pub num_tyre_stints: u8,
    pub tyre_stints_actual: [u8; 8],
    pub tyre_stints_visual: [u8; 8],
    pub tyre_stints_end_laps: [u8; 8],
}

#[derive(Debug, Clone, PartialEq)]
pub struct FinalClassificationPacket {
    pub num_cars: u8,
    pub cars: Vec<FinalClassificationData>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CarDamageData {
    pub tyres_wear: [f32; 4],
    pub tyres_damage: [u8; 4],
    pub brakes_damage: [u8; 4],
    pub tyre_blisters: [u8; 4],
    pub front_left_wing_damage: u8,
    pub front_right_wing_damage: u8,
    pub rear_wing_damage: u8,
    pub floor_damage: u8,
    pub diffuser_damage: u8,
    pub sidepod_damage: u8,
    pub drs_fault: u8,
    pub ers_fault: u8,
    pub gear_box_damage: u8,
    pub engine_damage: u8,
    pub engine_mguh_wear: u8,
    pub engine_es_wear: u8,
    pub engine_ce_wear: u8,
    pub engine_ice_wear: u8,
    pub engine_mguk_wear: u8,
    pub engine_tc_wear: u8,
    pub engine_blown: u8,
    pub engine_seized: u8,
}
