//! Datagram decoding
//!
//! The header is validated first; the payload is decoded only when the
//! format version matches the pinned one and the tag is a decoded kind.
//! Anything else is carried as an opaque payload.

use super::packet::{
    CarDamageData, CarMotion, CarStatusData, CarTelemetryData, CarTelemetryPacket,
    EVENT_DETAIL_SIZE, EventDetail, EventPacket, FinalClassificationData,
    FinalClassificationPacket, HEADER_SIZE, LapData, LapDataPacket, LiveryColour, MAX_CARS,
    MAX_FORECAST_SAMPLES, MAX_MARSHAL_ZONES, MarshalZone, PacketHeader, PacketKind,
    ParticipantData, ParticipantsPacket, Payload, SUPPORTED_FORMAT, SessionData,
    TelemetryPacket, WeatherForecastSample,
};
use super::wire::Reader;
use super::DecodeError;

/// Decode one UDP datagram
///
/// # Errors
///
/// Returns `DecodeError::Malformed` if the header is short or a decoded kind
/// does not have its pinned size
pub fn decode(bytes: &[u8]) -> Result<TelemetryPacket, DecodeError> {
    if bytes.len() < HEADER_SIZE {
        return Err(DecodeError::Malformed {
            kind: None,
            expected: HEADER_SIZE,
            actual: bytes.len(),
        });
    }

    let mut r = Reader::new(bytes);
    let header = read_header(&mut r)?;
    let kind = header.kind();

    if header.packet_format != SUPPORTED_FORMAT {
        return Ok(opaque(header, &mut r));
    }

    let Some(expected) = kind.expected_size() else {
        return Ok(opaque(header, &mut r));
    };

    if bytes.len() != expected {
        return Err(DecodeError::Malformed {
            kind: Some(kind),
            expected,
            actual: bytes.len(),
        });
    }

    let payload = match kind {
        PacketKind::Motion => Payload::Motion(read_cars(&mut r, read_car_motion)?),
        PacketKind::Session => Payload::Session(Box::new(read_session(&mut r)?)),
        PacketKind::LapData => Payload::LapData(LapDataPacket {
            cars: read_cars(&mut r, read_lap_data)?,
            time_trial_pb_car_idx: r.u8()?,
            time_trial_rival_car_idx: r.u8()?,
        }),
        PacketKind::Event => Payload::Event(read_event(&mut r)?),
        PacketKind::Participants => {
            let num_active_cars = r.u8()?;
            Payload::Participants(ParticipantsPacket {
                num_active_cars,
                participants: read_cars(&mut r, read_participant)?,
            })
        }
        PacketKind::CarTelemetry => Payload::CarTelemetry(CarTelemetryPacket {
            cars: read_cars(&mut r, read_car_telemetry)?,
            mfd_panel_index: r.u8()?,
            mfd_panel_index_secondary_player: r.u8()?,
            suggested_gear: r.i8()?,
        }),
        PacketKind::CarStatus => Payload::CarStatus(read_cars(&mut r, read_car_status)?),
        PacketKind::FinalClassification => {
            let num_cars = r.u8()?;
            Payload::FinalClassification(FinalClassificationPacket {
                num_cars,
                cars: read_cars(&mut r, read_final_classification)?,
            })
        }
        PacketKind::CarDamage => Payload::CarDamage(read_cars(&mut r, read_car_damage)?),
        PacketKind::CarSetups
        | PacketKind::LobbyInfo
        | PacketKind::SessionHistory
        | PacketKind::TyreSets
        | PacketKind::MotionEx
        | PacketKind::TimeTrial
        | PacketKind::LapPositions
        | PacketKind::Unknown(_) => return Ok(opaque(header, &mut r)),
    };

    debug_assert_eq!(r.remaining(), 0, "pinned layout must consume the datagram");

    Ok(TelemetryPacket { header, payload })
}

/// Parse only the common header
///
/// # Errors
///
/// Returns `DecodeError::Malformed` if fewer than 29 bytes are given
pub fn decode_header(bytes: &[u8]) -> Result<PacketHeader, DecodeError> {
    if bytes.len() < HEADER_SIZE {
        return Err(DecodeError::Malformed {
            kind: None,
            expected: HEADER_SIZE,
            actual: bytes.len(),
        });
    }
    read_header(&mut Reader::new(bytes))
}

fn opaque(header: PacketHeader, r: &mut Reader<'_>) -> TelemetryPacket {
    TelemetryPacket {
        header,
        payload: Payload::Opaque {
            tag: header.packet_id,
            bytes: r.rest(),
        },
    }
}

fn read_header(r: &mut Reader<'_>) -> Result<PacketHeader, DecodeError> {
    Ok(PacketHeader {
        packet_format: r.u16()?,
        game_year: r.u8()?,
        game_major_version: r.u8()?,
        game_minor_version: r.u8()?,
        packet_version: r.u8()?,
        packet_id: r.u8()?,
        session_uid: r.u64()?,
        session_time: r.f32()?,
        frame_identifier: r.u32()?,
        overall_frame_identifier: r.u32()?,
        player_car_index: r.u8()?,
        secondary_player_car_index: r.u8()?,
    })
}

fn read_cars<T>(
    r: &mut Reader<'_>,
    read: fn(&mut Reader<'_>) -> Result<T, DecodeError>,
) -> Result<Vec<T>, DecodeError> {
    (0..MAX_CARS).map(|_| read(r)).collect()
}

fn read_vec3_f32(r: &mut Reader<'_>) -> Result<[f32; 3], DecodeError> {
    Ok([r.f32()?, r.f32()?, r.f32()?])
}

fn read_vec3_i16(r: &mut Reader<'_>) -> Result<[i16; 3], DecodeError> {
    Ok([r.i16()?, r.i16()?, r.i16()?])
}

fn read_car_motion(r: &mut Reader<'_>) -> Result<CarMotion, DecodeError> {
    Ok(CarMotion {
        world_position: read_vec3_f32(r)?,
        world_velocity: read_vec3_f32(r)?,
        world_forward_dir: read_vec3_i16(r)?,
        world_right_dir: read_vec3_i16(r)?,
        g_force_lateral: r.f32()?,
        g_force_longitudinal: r.f32()?,
        g_force_vertical: r.f32()?,
        yaw: r.f32()?,
        pitch: r.f32()?,
        roll: r.f32()?,
    })
}

fn read_session(r: &mut Reader<'_>) -> Result<SessionData, DecodeError> {
    let weather = r.u8()?;
    let track_temperature = r.i8()?;
    let air_temperature = r.i8()?;
    let total_laps = r.u8()?;
    let track_length = r.u16()?;
    let session_type = r.u8()?;
    let track_id = r.i8()?;
    let formula = r.u8()?;
    let session_time_left = r.u16()?;
    let session_duration = r.u16()?;
    let pit_speed_limit = r.u8()?;
    let game_paused = r.u8()?;
    let is_spectating = r.u8()?;
    let spectator_car_index = r.u8()?;
    // sliProNativeSupport
    r.skip(1)?;

    let num_marshal_zones = usize::from(r.u8()?).min(MAX_MARSHAL_ZONES);
    let mut marshal_zones = Vec::with_capacity(num_marshal_zones);
    for i in 0..MAX_MARSHAL_ZONES {
        let zone = MarshalZone {
            zone_start: r.f32()?,
            zone_flag: r.i8()?,
        };
        if i < num_marshal_zones {
            marshal_zones.push(zone);
        }
    }

    let safety_car_status = r.u8()?;
    let network_game = r.u8()?;

    let num_samples = usize::from(r.u8()?).min(MAX_FORECAST_SAMPLES);
    let mut weather_forecast = Vec::with_capacity(num_samples);
    for i in 0..MAX_FORECAST_SAMPLES {
        let sample = WeatherForecastSample {
            session_type: r.u8()?,
            time_offset: r.u8()?,
            weather: r.u8()?,
            track_temperature: r.i8()?,
            track_temperature_change: r.i8()?,
            air_temperature: r.i8()?,
            air_temperature_change: r.i8()?,
            rain_percentage: r.u8()?,
        };
        if i < num_samples {
            weather_forecast.push(sample);
        }
    }

    let forecast_accuracy = r.u8()?;
    let ai_difficulty = r.u8()?;
    let season_link_identifier = r.u32()?;
    let weekend_link_identifier = r.u32()?;
    let session_link_identifier = r.u32()?;
    let pit_stop_window_ideal_lap = r.u8()?;
    let pit_stop_window_latest_lap = r.u8()?;
    let pit_stop_rejoin_position = r.u8()?;
    // Assists, game mode, rule set, time of day, session length, units
    r.skip(SESSION_ASSISTS_BLOCK)?;
    let num_safety_car_periods = r.u8()?;
    let num_virtual_safety_car_periods = r.u8()?;
    let num_red_flag_periods = r.u8()?;
    // Lobby settings and weekend structure
    r.skip(SESSION_SETTINGS_BLOCK)?;
    let sector2_lap_distance_start = r.f32()?;
    let sector3_lap_distance_start = r.f32()?;

    Ok(SessionData {
        weather,
        track_temperature,
        air_temperature,
        total_laps,
        track_length,
        session_type,
        track_id,
        formula,
        session_time_left,
        session_duration,
        pit_speed_limit,
        game_paused,
        is_spectating,
        spectator_car_index,
        marshal_zones,
        safety_car_status,
        network_game,
        weather_forecast,
        forecast_accuracy,
        ai_difficulty,
        season_link_identifier,
        weekend_link_identifier,
        session_link_identifier,
        pit_stop_window_ideal_lap,
        pit_stop_window_latest_lap,
        pit_stop_rejoin_position,
        num_safety_car_periods,
        num_virtual_safety_car_periods,
        num_red_flag_periods,
        sector2_lap_distance_start,
        sector3_lap_distance_start,
    })
}

/// Eleven assist/mode bytes, `timeOfDay` (u32) and five unit bytes
pub(super) const SESSION_ASSISTS_BLOCK: usize = 20;

/// Twenty-five lobby setting bytes and the twelve-slot weekend structure
pub(super) const SESSION_SETTINGS_BLOCK: usize = 37;

fn read_lap_data(r: &mut Reader<'_>) -> Result<LapData, DecodeError> {
    Ok(LapData {
        last_lap_time_ms: r.u32()?,
        current_lap_time_ms: r.u32()?,
        sector1_time_ms_part: r.u16()?,
        sector1_time_minutes_part: r.u8()?,
        sector2_time_ms_part: r.u16()?,
        sector2_time_minutes_part: r.u8()?,
        delta_to_car_in_front_ms_part: r.u16()?,
        delta_to_car_in_front_minutes_part: r.u8()?,
        delta_to_race_leader_ms_part: r.u16()?,
        delta_to_race_leader_minutes_part: r.u8()?,
        lap_distance: r.f32()?,
        total_distance: r.f32()?,
        safety_car_delta: r.f32()?,
        car_position: r.u8()?,
        current_lap_num: r.u8()?,
        pit_status: r.u8()?,
        num_pit_stops: r.u8()?,
        sector: r.u8()?,
        current_lap_invalid: r.u8()?,
        penalties: r.u8()?,
        total_warnings: r.u8()?,
        corner_cutting_warnings: r.u8()?,
        num_unserved_drive_through_pens: r.u8()?,
        num_unserved_stop_go_pens: r.u8()?,
        grid_position: r.u8()?,
        driver_status: r.u8()?,
        result_status: r.u8()?,
        pit_lane_timer_active: r.u8()?,
        pit_lane_time_in_lane_ms: r.u16()?,
        pit_stop_timer_ms: r.u16()?,
        pit_stop_should_serve_pen: r.u8()?,
        speed_trap_fastest_speed: r.f32()?,
        speed_trap_fastest_lap: r.u8()?,
    })
}

fn read_event(r: &mut Reader<'_>) -> Result<EventPacket, DecodeError> {
    let code = [r.u8()?, r.u8()?, r.u8()?, r.u8()?];
    let raw = r.bytes(EVENT_DETAIL_SIZE)?;
    let mut d = Reader::new(&raw);

    let detail = match &code {
        b"SSTA" => EventDetail::SessionStarted,
        b"SEND" => EventDetail::SessionEnded,
        b"FTLP" => EventDetail::FastestLap {
            vehicle_idx: d.u8()?,
            lap_time: d.f32()?,
        },
        b"RTMT" => EventDetail::Retirement {
            vehicle_idx: d.u8()?,
            reason: d.u8()?,
        },
        b"DRSE" => EventDetail::DrsEnabled,
        b"DRSD" => EventDetail::DrsDisabled { reason: d.u8()? },
        b"TMPT" => EventDetail::TeamMateInPits {
            vehicle_idx: d.u8()?,
        },
        b"CHQF" => EventDetail::ChequeredFlag,
        b"RCWN" => EventDetail::RaceWinner {
            vehicle_idx: d.u8()?,
        },
        b"PENA" => EventDetail::Penalty {
            penalty_type: d.u8()?,
            infringement_type: d.u8()?,
            vehicle_idx: d.u8()?,
            other_vehicle_idx: d.u8()?,
            time: d.u8()?,
            lap_num: d.u8()?,
            places_gained: d.u8()?,
        },
        b"SPTP" => EventDetail::SpeedTrap {
            vehicle_idx: d.u8()?,
            speed: d.f32()?,
            is_overall_fastest_in_session: d.u8()?,
            is_driver_fastest_in_session: d.u8()?,
            fastest_vehicle_idx_in_session: d.u8()?,
            fastest_speed_in_session: d.f32()?,
        },
        b"STLG" => EventDetail::StartLights {
            num_lights: d.u8()?,
        },
        b"LGOT" => EventDetail::LightsOut,
        b"DTSV" => EventDetail::DriveThroughServed {
            vehicle_idx: d.u8()?,
        },
        b"SGSV" => EventDetail::StopGoServed {
            vehicle_idx: d.u8()?,
            stop_time: d.f32()?,
        },
        b"FLBK" => EventDetail::Flashback {
            frame_identifier: d.u32()?,
            session_time: d.f32()?,
        },
        b"BUTN" => EventDetail::Buttons {
            button_status: d.u32()?,
        },
        b"RDFL" => EventDetail::RedFlag,
        b"OVTK" => EventDetail::Overtake {
            overtaking_vehicle_idx: d.u8()?,
            being_overtaken_vehicle_idx: d.u8()?,
        },
        b"SCAR" => EventDetail::SafetyCar {
            safety_car_type: d.u8()?,
            event_type: d.u8()?,
        },
        b"COLL" => EventDetail::Collision {
            vehicle1_idx: d.u8()?,
            vehicle2_idx: d.u8()?,
        },
        _ => {
            let mut data = [0u8; EVENT_DETAIL_SIZE];
            data.copy_from_slice(&raw);
            EventDetail::Other { data }
        }
    };

    Ok(EventPacket { code, detail })
}

fn read_participant(r: &mut Reader<'_>) -> Result<ParticipantData, DecodeError> {
    let ai_controlled = r.u8()?;
    let driver_id = r.u8()?;
    let network_id = r.u8()?;
    let team_id = r.u8()?;
    let my_team = r.u8()?;
    let race_number = r.u8()?;
    let nationality = r.u8()?;
    let name = r.fixed_str(PARTICIPANT_NAME_LEN)?;
    let your_telemetry = r.u8()?;
    let show_online_names = r.u8()?;
    let tech_level = r.u16()?;
    let platform = r.u8()?;
    let num_colours = r.u8()?;
    let livery_colours = r.quad(|r| {
        Ok(LiveryColour {
            red: r.u8()?,
            green: r.u8()?,
            blue: r.u8()?,
        })
    })?;

    Ok(ParticipantData {
        ai_controlled,
        driver_id,
        network_id,
        team_id,
        my_team,
        race_number,
        nationality,
        name,
        your_telemetry,
        show_online_names,
        tech_level,
        platform,
        num_colours,
        livery_colours,
    })
}

/// Width of the participant name field
pub(super) const PARTICIPANT_NAME_LEN: usize = 32;

fn read_car_telemetry(r: &mut Reader<'_>) -> Result<CarTelemetryData, DecodeError> {
    Ok(CarTelemetryData {
        speed: r.u16()?,
        throttle: r.f32()?,
        steer: r.f32()?,
        brake: r.f32()?,
        clutch: r.u8()?,
        gear: r.i8()?,
        engine_rpm: r.u16()?,
        drs: r.u8()?,
        rev_lights_percent: r.u8()?,
        rev_lights_bit_value: r.u16()?,
        brakes_temperature: r.quad(Reader::u16)?,
        tyres_surface_temperature: r.quad(Reader::u8)?,
        tyres_inner_temperature: r.quad(Reader::u8)?,
        engine_temperature: r.u16()?,
        tyres_pressure: r.quad(Reader::f32)?,
        surface_type: r.quad(Reader::u8)?,
    })
}

fn read_car_status(r: &mut Reader<'_>) -> Result<CarStatusData, DecodeError> {
    Ok(CarStatusData {
        traction_control: r.u8()?,
        anti_lock_brakes: r.u8()?,
        fuel_mix: r.u8()?,
        front_brake_bias: r.u8()?,
        pit_limiter_status: r.u8()?,
        fuel_in_tank: r.f32()?,
        fuel_capacity: r.f32()?,
        fuel_remaining_laps: r.f32()?,
        max_rpm: r.u16()?,
        idle_rpm: r.u16()?,
        max_gears: r.u8()?,
        drs_allowed: r.u8()?,
        drs_activation_distance: r.u16()?,
        actual_tyre_compound: r.u8()?,
        visual_tyre_compound: r.u8()?,
        tyres_age_laps: r.u8()?,
        vehicle_fia_flags: r.i8()?,
        engine_power_ice: r.f32()?,
        engine_power_mguk: r.f32()?,
        ers_store_energy: r.f32()?,
        ers_deploy_mode: r.u8()?,
        ers_harvested_this_lap_mguk: r.f32()?,
        ers_harvested_this_lap_mguh: r.f32()?,
        ers_deployed_this_lap: r.f32()?,
        network_paused: r.u8()?,
    })
}

fn read_stints(r: &mut Reader<'_>) -> Result<[u8; 8], DecodeError> {
    let mut out = [0u8; 8];
    for slot in &mut out {
        *slot = r.u8()?;
    }
    Ok(out)
}

fn read_final_classification(r: &mut Reader<'_>) -> Result<FinalClassificationData, DecodeError> {
    Ok(FinalClassificationData {
        position: r.u8()?,
        num_laps: r.u8()?,
        grid_position: r.u8()?,
        points: r.u8()?,
        num_pit_stops: r.u8()?,
        result_status: r.u8()?,
        result_reason: r.u8()?,
        best_lap_time_ms: r.u32()?,
        total_race_time: r.f64()?,
        penalties_time: r.u8()?,
        num_penalties: r.u8()?,
        num_tyre_stints: r.u8()?,
        tyre_stints_actual: read_stints(r)?,
        tyre_stints_visual: read_stints(r)?,
        tyre_stints_end_laps: read_stints(r)?,
    })
}

fn read_car_damage(r: &mut Reader<'_>) -> Result<CarDamageData, DecodeError> {
    Ok(CarDamageData {
        tyres_wear: r.quad(Reader::f32)?,
        tyres_damage: r.quad(Reader::u8)?,
        brakes_damage: r.quad(Reader::u8)?,
        tyre_blisters: r.quad(Reader::u8)?,
        front_left_wing_damage: r.u8()?,
        front_right_wing_damage: r.u8()?,
        rear_wing_damage: r.u8()?,
        floor_damage: r.u8()?,
        diffuser_damage: r.u8()?,
        sidepod_damage: r.u8()?,
        drs_fault: r.u8()?,
        ers_fault: r.u8()?,
        gear_box_damage: r.u8()?,
        engine_damage: r.u8()?,
        engine_mguh_wear: r.u8()?,
        engine_es_wear: r.u8()?,
        engine_ce_wear: r.u8()?,
        engine_ice_wear: r.u8()?,
        engine_mguk_wear: r.u8()?,
        engine_tc_wear: r.u8()?,
        engine_blown: r.u8()?,
        engine_seized: r.u8()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_bytes(format: u16, tag: u8, total_len: usize) -> Vec<u8> {
        let mut bytes = vec![0u8; total_len];
        bytes[0..2].copy_from_slice(&format.to_le_bytes());
        bytes[2] = 25;
        bytes[6] = tag;
        bytes[7..15].copy_from_slice(&0xDEAD_BEEF_u64.to_le_bytes());
        bytes
    }

    #[test]
    fn test_short_header_rejected() {
        let err = decode(&[0u8; 10]).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::Malformed {
                kind: None,
                expected: HEADER_SIZE,
                actual: 10
            }
        ));
    }

    #[test]
    fn test_zeroed_packets_decode_at_pinned_size() {
        for tag in [0u8, 1, 2, 3, 4, 6, 7, 8, 10] {
            let kind = PacketKind::from_tag(tag);
            let size = kind.expected_size().unwrap();
            let packet = decode(&header_bytes(SUPPORTED_FORMAT, tag, size))
                .unwrap_or_else(|e| panic!("{kind:?}: {e}"));
            assert_eq!(packet.header.session_uid, 0xDEAD_BEEF);
            assert!(!matches!(packet.payload, Payload::Opaque { .. }), "{kind:?}");
        }
    }

    #[test]
    fn test_size_mismatch_is_malformed() {
        let bytes = header_bytes(SUPPORTED_FORMAT, 6, 1000);
        let err = decode(&bytes).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::Malformed {
                kind: Some(PacketKind::CarTelemetry),
                expected: 1352,
                actual: 1000
            }
        ));
    }

    #[test]
    fn test_undecoded_tag_is_opaque() {
        let bytes = header_bytes(SUPPORTED_FORMAT, 12, 200);
        let packet = decode(&bytes).unwrap();
        match packet.payload {
            Payload::Opaque { tag, bytes } => {
                assert_eq!(tag, 12);
                assert_eq!(bytes.len(), 200 - HEADER_SIZE);
            }
            other => panic!("expected opaque, got {other:?}"),
        }
    }

    #[test]
    fn test_newer_format_keeps_header() {
        // Wrong size for the 2025 layout, but a newer format is never malformed
        let bytes = header_bytes(2026, 6, 1400);
        let packet = decode(&bytes).unwrap();
        assert_eq!(packet.header.packet_format, 2026);
        assert_eq!(packet.header.kind(), PacketKind::CarTelemetry);
        assert!(matches!(packet.payload, Payload::Opaque { tag: 6, .. }));
    }

    #[test]
    fn test_unknown_event_code_kept_raw() {
        let mut bytes = header_bytes(SUPPORTED_FORMAT, 3, 45);
        bytes[29..33].copy_from_slice(b"ZZZZ");
        bytes[33] = 7;
        let packet = decode(&bytes).unwrap();
        let Payload::Event(event) = packet.payload else {
            panic!("expected event");
        };
        assert_eq!(event.code_str(), "ZZZZ");
        assert!(matches!(event.detail, EventDetail::Other { data } if data[0] == 7));
    }
}
