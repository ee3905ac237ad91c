//! Shared test utilities

#![allow(dead_code)]

use race_engineer::telemetry::packet::{
    CarDamageData, CarMotion, CarStatusData, CarTelemetryData, CarTelemetryPacket, EventDetail,
    EventPacket, FinalClassificationData, FinalClassificationPacket, LapData, LapDataPacket,
    MAX_CARS, PacketHeader, PacketKind, ParticipantData, ParticipantsPacket, Payload,
    SessionData, TelemetryPacket,
};

pub const SESSION: u64 = 0xF125;

/// Header for the player in car slot 0
#[must_use]
pub fn header(kind: PacketKind, session_uid: u64, frame: u32) -> PacketHeader {
    PacketHeader {
        packet_format: 2025,
        game_year: 25,
        game_major_version: 1,
        game_minor_version: 4,
        packet_version: 1,
        packet_id: kind.tag(),
        session_uid,
        session_time: f32::from(u16::try_from(frame).unwrap_or(u16::MAX)) / 60.0,
        frame_identifier: frame,
        overall_frame_identifier: frame,
        player_car_index: 0,
        secondary_player_car_index: 255,
    }
}

#[must_use]
pub fn packet(kind: PacketKind, frame: u32, payload: Payload) -> TelemetryPacket {
    TelemetryPacket {
        header: header(kind, SESSION, frame),
        payload,
    }
}

/// Lap data with the player on `lap`, in `sector`, at `position`
#[must_use]
pub fn lap_packet(frame: u32, lap: u8, sector: u8, position: u8, last_lap_ms: u32) -> TelemetryPacket {
    let mut cars = vec![LapData::default(); MAX_CARS];
    cars[0] = LapData {
        current_lap_num: lap,
        sector,
        car_position: position,
        last_lap_time_ms: last_lap_ms,
        current_lap_time_ms: 12_345,
        sector1_time_ms_part: if sector >= 1 { 28_500 } else { 0 },
        delta_to_car_in_front_ms_part: 640,
        ..LapData::default()
    };
    cars[1] = LapData {
        current_lap_num: lap,
        car_position: position.saturating_sub(1).max(1),
        ..LapData::default()
    };
    packet(
        PacketKind::LapData,
        frame,
        Payload::LapData(LapDataPacket {
            cars,
            time_trial_pb_car_idx: 255,
            time_trial_rival_car_idx: 255,
        }),
    )
}

/// Car telemetry with every player tyre at `tyre_temp` degrees
#[must_use]
pub fn telemetry_packet(frame: u32, speed: u16, tyre_temp: u8) -> TelemetryPacket {
    let mut cars = vec![CarTelemetryData::default(); MAX_CARS];
    cars[0] = CarTelemetryData {
        speed,
        gear: 7,
        engine_rpm: 11_500,
        throttle: 1.0,
        brakes_temperature: [610; 4],
        tyres_surface_temperature: [tyre_temp; 4],
        tyres_inner_temperature: [tyre_temp.saturating_add(6); 4],
        engine_temperature: 104,
        tyres_pressure: [22.5, 22.5, 23.9, 23.9],
        ..CarTelemetryData::default()
    };
    packet(
        PacketKind::CarTelemetry,
        frame,
        Payload::CarTelemetry(CarTelemetryPacket {
            cars,
            mfd_panel_index: 255,
            mfd_panel_index_secondary_player: 255,
            suggested_gear: 0,
        }),
    )
}

#[must_use]
pub fn status_packet(frame: u32, fuel_in_tank: f32) -> TelemetryPacket {
    let mut cars = vec![CarStatusData::default(); MAX_CARS];
    cars[0] = CarStatusData {
        fuel_in_tank,
        fuel_capacity: 110.0,
        fuel_remaining_laps: 1.5,
        actual_tyre_compound: 16,
        visual_tyre_compound: 16,
        tyres_age_laps: 4,
        drs_allowed: 1,
        ..CarStatusData::default()
    };
    packet(PacketKind::CarStatus, frame, Payload::CarStatus(cars))
}

#[must_use]
pub fn session_packet(session_uid: u64, frame: u32, weather: u8) -> TelemetryPacket {
    TelemetryPacket {
        header: header(PacketKind::Session, session_uid, frame),
        payload: Payload::Session(Box::new(SessionData {
            weather,
            track_temperature: 31,
            air_temperature: 22,
            total_laps: 30,
            track_length: 5_891,
            session_type: 15,
            pit_stop_window_ideal_lap: 17,
            pit_stop_window_latest_lap: 21,
            ..SessionData::default()
        })),
    }
}

#[must_use]
pub fn participants_packet(frame: u32, names: &[&str]) -> TelemetryPacket {
    packet(
        PacketKind::Participants,
        frame,
        Payload::Participants(ParticipantsPacket {
            num_active_cars: u8::try_from(names.len()).unwrap(),
            participants: names
                .iter()
                .map(|name| ParticipantData {
                    name: (*name).to_string(),
                    show_online_names: 1,
                    ..ParticipantData::default()
                })
                .collect(),
        }),
    )
}

#[must_use]
pub fn event_packet(frame: u32, code: &[u8; 4], detail: EventDetail) -> TelemetryPacket {
    packet(
        PacketKind::Event,
        frame,
        Payload::Event(EventPacket {
            code: *code,
            detail,
        }),
    )
}

/// Motion for every car, with values that differ per slot
#[must_use]
pub fn motion_packet(frame: u32) -> TelemetryPacket {
    let cars = (0..MAX_CARS)
        .map(|i| {
            let f = f32::from(u8::try_from(i).unwrap_or(u8::MAX));
            let n = i16::from(u8::try_from(i).unwrap_or(u8::MAX));
            CarMotion {
                world_position: [100.5 + f, -3.25, 2_048.0 - f],
                world_velocity: [61.0, 0.5, -f],
                world_forward_dir: [32_767, -n, 12],
                world_right_dir: [-32_768, n, -7],
                g_force_lateral: 3.8,
                g_force_longitudinal: -5.1,
                g_force_vertical: 1.02,
                yaw: 1.57,
                pitch: -0.01,
                roll: 0.003,
            }
        })
        .collect();
    packet(PacketKind::Motion, frame, Payload::Motion(cars))
}

/// Damage for every car; the player has worn, blistered tyres
#[must_use]
pub fn damage_packet(frame: u32) -> TelemetryPacket {
    let mut cars = vec![
        CarDamageData {
            tyres_wear: [12.5, 13.0, 9.75, 10.0],
            ..CarDamageData::default()
        };
        MAX_CARS
    ];
    cars[0] = CarDamageData {
        tyres_wear: [48.25, 51.5, 39.0, 40.75],
        tyres_damage: [30, 33, 21, 22],
        brakes_damage: [4, 4, 6, 6],
        tyre_blisters: [15, 18, 3, 0],
        front_left_wing_damage: 12,
        front_right_wing_damage: 7,
        rear_wing_damage: 1,
        floor_damage: 9,
        diffuser_damage: 2,
        sidepod_damage: 3,
        drs_fault: 1,
        ers_fault: 0,
        gear_box_damage: 14,
        engine_damage: 11,
        engine_mguh_wear: 20,
        engine_es_wear: 21,
        engine_ce_wear: 22,
        engine_ice_wear: 23,
        engine_mguk_wear: 24,
        engine_tc_wear: 25,
        engine_blown: 0,
        engine_seized: 1,
    };
    packet(PacketKind::CarDamage, frame, Payload::CarDamage(cars))
}

/// Final classification of a 20-car race; slots past the field stay zeroed
#[must_use]
pub fn classification_packet(frame: u32) -> TelemetryPacket {
    let mut cars = vec![FinalClassificationData::default(); MAX_CARS];
    for (i, car) in cars.iter_mut().take(20).enumerate() {
        let place = u8::try_from(i + 1).unwrap_or(u8::MAX);
        *car = FinalClassificationData {
            position: place,
            num_laps: 57,
            grid_position: 21 - place,
            points: [25, 18, 15, 12, 10, 8, 6, 4, 2, 1].get(i).copied().unwrap_or(0),
            num_pit_stops: 2,
            result_status: 3,
            result_reason: 1,
            best_lap_time_ms: 91_245 + u32::from(place) * 37,
            total_race_time: 5_412.123_456_789 + f64::from(place) * 1.5,
            penalties_time: if place == 4 { 5 } else { 0 },
            num_penalties: u8::from(place == 4),
            num_tyre_stints: 3,
            tyre_stints_actual: [16, 17, 18, 0, 0, 0, 0, 0],
            tyre_stints_visual: [16, 17, 18, 0, 0, 0, 0, 0],
            tyre_stints_end_laps: [18, 39, 255, 0, 0, 0, 0, 0],
        };
    }
    packet(
        PacketKind::FinalClassification,
        frame,
        Payload::FinalClassification(FinalClassificationPacket { num_cars: 20, cars }),
    )
}
