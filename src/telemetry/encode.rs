//! Datagram encoding, the exact inverse of `decode` for decoded kinds
//!
//! Used by the `simulate` command and by tests to produce realistic
//! datagrams without a running game.

use super::decode::{PARTICIPANT_NAME_LEN, SESSION_ASSISTS_BLOCK, SESSION_SETTINGS_BLOCK};
use super::packet::{
    CarDamageData, CarMotion, CarStatusData, CarTelemetryData, EventDetail, EventPacket,
    FinalClassificationData, LapData, MAX_CARS, MAX_FORECAST_SAMPLES, MAX_MARSHAL_ZONES,
    MarshalZone, PacketHeader, ParticipantData, Payload, SessionData, TelemetryPacket,
    WeatherForecastSample, EVENT_DETAIL_SIZE,
};
use super::wire::Writer;

/// Encode a packet to its wire form
///
/// Per-car arrays shorter than 22 entries are padded with zeroed cars;
/// longer ones are cut at 22.
#[must_use]
pub fn encode(packet: &TelemetryPacket) -> Vec<u8> {
    let size = packet.header.kind().expected_size().unwrap_or(0);
    let mut w = Writer::with_capacity(size);
    write_header(&mut w, &packet.header);

    match &packet.payload {
        Payload::Motion(cars) => write_cars(&mut w, cars, write_car_motion),
        Payload::Session(session) => write_session(&mut w, session),
        Payload::LapData(lap) => {
            write_cars(&mut w, &lap.cars, write_lap_data);
            w.u8(lap.time_trial_pb_car_idx);
            w.u8(lap.time_trial_rival_car_idx);
        }
        Payload::Event(event) => write_event(&mut w, event),
        Payload::Participants(p) => {
            w.u8(p.num_active_cars);
            write_cars(&mut w, &p.participants, write_participant);
        }
        Payload::CarTelemetry(t) => {
            write_cars(&mut w, &t.cars, write_car_telemetry);
            w.u8(t.mfd_panel_index);
            w.u8(t.mfd_panel_index_secondary_player);
            w.i8(t.suggested_gear);
        }
        Payload::CarStatus(cars) => write_cars(&mut w, cars, write_car_status),
        Payload::FinalClassification(fc) => {
            w.u8(fc.num_cars);
            write_cars(&mut w, &fc.cars, write_final_classification);
        }
        Payload::CarDamage(cars) => write_cars(&mut w, cars, write_car_damage),
        Payload::Opaque { bytes, .. } => w.bytes(bytes),
    }

    w.into_inner()
}

fn write_header(w: &mut Writer, h: &PacketHeader) {
    w.u16(h.packet_format);
    w.u8(h.game_year);
    w.u8(h.game_major_version);
    w.u8(h.game_minor_version);
    w.u8(h.packet_version);
    w.u8(h.packet_id);
    w.u64(h.session_uid);
    w.f32(h.session_time);
    w.u32(h.frame_identifier);
    w.u32(h.overall_frame_identifier);
    w.u8(h.player_car_index);
    w.u8(h.secondary_player_car_index);
}

fn write_cars<T: Default>(w: &mut Writer, cars: &[T], write: fn(&mut Writer, &T)) {
    let blank = T::default();
    for i in 0..MAX_CARS {
        write(w, cars.get(i).unwrap_or(&blank));
    }
}

fn write_quad<T: Copy>(w: &mut Writer, values: [T; 4], write: fn(&mut Writer, T)) {
    for v in values {
        write(w, v);
    }
}

fn write_car_motion(w: &mut Writer, c: &CarMotion) {
    for v in c.world_position {
        w.f32(v);
    }
    for v in c.world_velocity {
        w.f32(v);
    }
    for v in c.world_forward_dir {
        w.i16(v);
    }
    for v in c.world_right_dir {
        w.i16(v);
    }
    w.f32(c.g_force_lateral);
    w.f32(c.g_force_longitudinal);
    w.f32(c.g_force_vertical);
    w.f32(c.yaw);
    w.f32(c.pitch);
    w.f32(c.roll);
}

fn write_session(w: &mut Writer, s: &SessionData) {
    w.u8(s.weather);
    w.i8(s.track_temperature);
    w.i8(s.air_temperature);
    w.u8(s.total_laps);
    w.u16(s.track_length);
    w.u8(s.session_type);
    w.i8(s.track_id);
    w.u8(s.formula);
    w.u16(s.session_time_left);
    w.u16(s.session_duration);
    w.u8(s.pit_speed_limit);
    w.u8(s.game_paused);
    w.u8(s.is_spectating);
    w.u8(s.spectator_car_index);
    w.u8(0);

    let zones = s.marshal_zones.len().min(MAX_MARSHAL_ZONES);
    w.u8(u8::try_from(zones).unwrap_or(u8::MAX));
    let blank_zone = MarshalZone::default();
    for i in 0..MAX_MARSHAL_ZONES {
        let z = s.marshal_zones.get(i).unwrap_or(&blank_zone);
        w.f32(z.zone_start);
        w.i8(z.zone_flag);
    }

    w.u8(s.safety_car_status);
    w.u8(s.network_game);

    let samples = s.weather_forecast.len().min(MAX_FORECAST_SAMPLES);
    w.u8(u8::try_from(samples).unwrap_or(u8::MAX));
    let blank_sample = WeatherForecastSample::default();
    for i in 0..MAX_FORECAST_SAMPLES {
        let f = s.weather_forecast.get(i).unwrap_or(&blank_sample);
        w.u8(f.session_type);
        w.u8(f.time_offset);
        w.u8(f.weather);
        w.i8(f.track_temperature);
        w.i8(f.track_temperature_change);
        w.i8(f.air_temperature);
        w.i8(f.air_temperature_change);
        w.u8(f.rain_percentage);
    }

    w.u8(s.forecast_accuracy);
    w.u8(s.ai_difficulty);
    w.u32(s.season_link_identifier);
    w.u32(s.weekend_link_identifier);
    w.u32(s.session_link_identifier);
    w.u8(s.pit_stop_window_ideal_lap);
    w.u8(s.pit_stop_window_latest_lap);
    w.u8(s.pit_stop_rejoin_position);
    w.zeros(SESSION_ASSISTS_BLOCK);
    w.u8(s.num_safety_car_periods);
    w.u8(s.num_virtual_safety_car_periods);
    w.u8(s.num_red_flag_periods);
    w.zeros(SESSION_SETTINGS_BLOCK);
    w.f32(s.sector2_lap_distance_start);
    w.f32(s.sector3_lap_distance_start);
}

fn write_lap_data(w: &mut Writer, l: &LapData) {
    w.u32(l.last_lap_time_ms);
    w.u32(l.current_lap_time_ms);
    w.u16(l.sector1_time_ms_part);
    w.u8(l.sector1_time_minutes_part);
    w.u16(l.sector2_time_ms_part);
    w.u8(l.sector2_time_minutes_part);
    w.u16(l.delta_to_car_in_front_ms_part);
    w.u8(l.delta_to_car_in_front_minutes_part);
    w.u16(l.delta_to_race_leader_ms_part);
    w.u8(l.delta_to_race_leader_minutes_part);
    w.f32(l.lap_distance);
    w.f32(l.total_distance);
    w.f32(l.safety_car_delta);
    w.u8(l.car_position);
    w.u8(l.current_lap_num);
    w.u8(l.pit_status);
    w.u8(l.num_pit_stops);
    w.u8(l.sector);
    w.u8(l.current_lap_invalid);
    w.u8(l.penalties);
    w.u8(l.total_warnings);
    w.u8(l.corner_cutting_warnings);
    w.u8(l.num_unserved_drive_through_pens);
    w.u8(l.num_unserved_stop_go_pens);
    w.u8(l.grid_position);
    w.u8(l.driver_status);
    w.u8(l.result_status);
    w.u8(l.pit_lane_timer_active);
    w.u16(l.pit_lane_time_in_lane_ms);
    w.u16(l.pit_stop_timer_ms);
    w.u8(l.pit_stop_should_serve_pen);
    w.f32(l.speed_trap_fastest_speed);
    w.u8(l.speed_trap_fastest_lap);
}

fn write_event(w: &mut Writer, e: &EventPacket) {
    w.bytes(&e.code);
    let mut d = Writer::with_capacity(EVENT_DETAIL_SIZE);

    match &e.detail {
        EventDetail::SessionStarted
        | EventDetail::SessionEnded
        | EventDetail::DrsEnabled
        | EventDetail::ChequeredFlag
        | EventDetail::LightsOut
        | EventDetail::RedFlag => {}
        EventDetail::FastestLap {
            vehicle_idx,
            lap_time,
        } => {
            d.u8(*vehicle_idx);
            d.f32(*lap_time);
        }
        EventDetail::Retirement {
            vehicle_idx,
            reason,
        } => {
            d.u8(*vehicle_idx);
            d.u8(*reason);
        }
        EventDetail::DrsDisabled { reason } => d.u8(*reason),
        EventDetail::TeamMateInPits { vehicle_idx }
        | EventDetail::RaceWinner { vehicle_idx }
        | EventDetail::DriveThroughServed { vehicle_idx } => d.u8(*vehicle_idx),
        EventDetail::Penalty {
            penalty_type,
            infringement_type,
            vehicle_idx,
            other_vehicle_idx,
            time,
            lap_num,
            places_gained,
        } => {
            for v in [
                penalty_type,
                infringement_type,
                vehicle_idx,
                other_vehicle_idx,
                time,
                lap_num,
                places_gained,
            ] {
                d.u8(*v);
            }
        }
        EventDetail::SpeedTrap {
            vehicle_idx,
            speed,
            is_overall_fastest_in_session,
            is_driver_fastest_in_session,
            fastest_vehicle_idx_in_session,
            fastest_speed_in_session,
        } => {
            d.u8(*vehicle_idx);
            d.f32(*speed);
            d.u8(*is_overall_fastest_in_session);
            d.u8(*is_driver_fastest_in_session);
            d.u8(*fastest_vehicle_idx_in_session);
            d.f32(*fastest_speed_in_session);
        }
        EventDetail::StartLights { num_lights } => d.u8(*num_lights),
        EventDetail::StopGoServed {
            vehicle_idx,
            stop_time,
        } => {
            d.u8(*vehicle_idx);
            d.f32(*stop_time);
        }
        EventDetail::Flashback {
            frame_identifier,
            session_time,
        } => {
            d.u32(*frame_identifier);
            d.f32(*session_time);
        }
        EventDetail::Buttons { button_status } => d.u32(*button_status),
        EventDetail::Overtake {
            overtaking_vehicle_idx,
            being_overtaken_vehicle_idx,
        } => {
            d.u8(*overtaking_vehicle_idx);
            d.u8(*being_overtaken_vehicle_idx);
        }
        EventDetail::SafetyCar {
            safety_car_type,
            event_type,
        } => {
            d.u8(*safety_car_type);
            d.u8(*event_type);
        }
        EventDetail::Collision {
            vehicle1_idx,
            vehicle2_idx,
        } => {
            d.u8(*vehicle1_idx);
            d.u8(*vehicle2_idx);
        }
        EventDetail::Other { data } => d.bytes(data),
    }

    let used = d.len();
    w.bytes(&d.into_inner());
    w.zeros(EVENT_DETAIL_SIZE.saturating_sub(used));
}

fn write_participant(w: &mut Writer, p: &ParticipantData) {
    w.u8(p.ai_controlled);
    w.u8(p.driver_id);
    w.u8(p.network_id);
    w.u8(p.team_id);
    w.u8(p.my_team);
    w.u8(p.race_number);
    w.u8(p.nationality);
    w.fixed_str(&p.name, PARTICIPANT_NAME_LEN);
    w.u8(p.your_telemetry);
    w.u8(p.show_online_names);
    w.u16(p.tech_level);
    w.u8(p.platform);
    w.u8(p.num_colours);
    for c in p.livery_colours {
        w.u8(c.red);
        w.u8(c.green);
        w.u8(c.blue);
    }
}

fn write_car_telemetry(w: &mut Writer, t: &CarTelemetryData) {
    w.u16(t.speed);
    w.f32(t.throttle);
    w.f32(t.steer);
    w.f32(t.brake);
    w.u8(t.clutch);
    w.i8(t.gear);
    w.u16(t.engine_rpm);
    w.u8(t.drs);
    w.u8(t.rev_lights_percent);
    w.u16(t.rev_lights_bit_value);
    write_quad(w, t.brakes_temperature, Writer::u16);
    write_quad(w, t.tyres_surface_temperature, Writer::u8);
    write_quad(w, t.tyres_inner_temperature, Writer::u8);
    w.u16(t.engine_temperature);
    write_quad(w, t.tyres_pressure, Writer::f32);
    write_quad(w, t.surface_type, Writer::u8);
}

fn write_car_status(w: &mut Writer, s: &CarStatusData) {
    w.u8(s.traction_control);
    w.u8(s.anti_lock_brakes);
    w.u8(s.fuel_mix);
    w.u8(s.front_brake_bias);
    w.u8(s.pit_limiter_status);
    w.f32(s.fuel_in_tank);
    w.f32(s.fuel_capacity);
    w.f32(s.fuel_remaining_laps);
    w.u16(s.max_rpm);
    w.u16(s.idle_rpm);
    w.u8(s.max_gears);
    w.u8(s.drs_allowed);
    w.u16(s.drs_activation_distance);
    w.u8(s.actual_tyre_compound);
    w.u8(s.visual_tyre_compound);
    w.u8(s.tyres_age_laps);
    w.i8(s.vehicle_fia_flags);
    w.f32(s.engine_power_ice);
    w.f32(s.engine_power_mguk);
    w.f32(s.ers_store_energy);
    w.u8(s.ers_deploy_mode);
    w.f32(s.ers_harvested_this_lap_mguk);
    w.f32(s.ers_harvested_this_lap_mguh);
    w.f32(s.ers_deployed_this_lap);
    w.u8(s.network_paused);
}

fn write_final_classification(w: &mut Writer, f: &FinalClassificationData) {
    w.u8(f.position);
    w.u8(f.num_laps);
    w.u8(f.grid_position);
    w.u8(f.points);
    w.u8(f.num_pit_stops);
    w.u8(f.result_status);
    w.u8(f.result_reason);
    w.u32(f.best_lap_time_ms);
    w.f64(f.total_race_time);
    w.u8(f.penalties_time);
    w.u8(f.num_penalties);
    w.u8(f.num_tyre_stints);
    w.bytes(&f.tyre_stints_actual);
    w.bytes(&f.tyre_stints_visual);
    w.bytes(&f.tyre_stints_end_laps);
}

fn write_car_damage(w: &mut Writer, d: &CarDamageData) {
    write_quad(w, d.tyres_wear, Writer::f32);
    write_quad(w, d.tyres_damage, Writer::u8);
    write_quad(w, d.brakes_damage, Writer::u8);
    write_quad(w, d.tyre_blisters, Writer::u8);
    for v in [
        d.front_left_wing_damage,
        d.front_right_wing_damage,
        d.rear_wing_damage,
        d.floor_damage,
        d.diffuser_damage,
        d.sidepod_damage,
        d.drs_fault,
        d.ers_fault,
        d.gear_box_damage,
        d.engine_damage,
        d.engine_mguh_wear,
        d.engine_es_wear,
        d.engine_ce_wear,
        d.engine_ice_wear,
        d.engine_mguk_wear,
        d.engine_tc_wear,
        d.engine_blown,
        d.engine_seized,
    ] {
        w.u8(v);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::decode::decode;
    use crate::telemetry::packet::{
        CarTelemetryPacket, LapDataPacket, PacketKind, SUPPORTED_FORMAT,
    };

    fn header(kind: PacketKind) -> PacketHeader {
        PacketHeader {
            packet_format: SUPPORTED_FORMAT,
            game_year: 25,
            game_major_version: 1,
            game_minor_version: 4,
            packet_version: 1,
            packet_id: kind.tag(),
            session_uid: 77,
            session_time: 12.5,
            frame_identifier: 600,
            overall_frame_identifier: 600,
            player_car_index: 3,
            secondary_player_car_index: 255,
        }
    }

    #[test]
    fn test_telemetry_packet_survives_decode() {
        let mut cars = vec![CarTelemetryData::default(); MAX_CARS];
        cars[3] = CarTelemetryData {
            speed: 312,
            throttle: 1.0,
            gear: 8,
            engine_rpm: 11_800,
            drs: 1,
            brakes_temperature: [610, 615, 720, 718],
            tyres_surface_temperature: [96, 97, 101, 99],
            tyres_inner_temperature: [102, 103, 105, 104],
            engine_temperature: 108,
            tyres_pressure: [21.5, 21.5, 23.0, 23.0],
            ..CarTelemetryData::default()
        };
        let packet = TelemetryPacket {
            header: header(PacketKind::CarTelemetry),
            payload: Payload::CarTelemetry(CarTelemetryPacket {
                cars,
                mfd_panel_index: 255,
                mfd_panel_index_secondary_player: 255,
                suggested_gear: 0,
            }),
        };

        let bytes = encode(&packet);
        assert_eq!(bytes.len(), 1352);
        assert_eq!(decode(&bytes).unwrap(), packet);
    }

    #[test]
    fn test_short_car_list_is_padded() {
        let packet = TelemetryPacket {
            header: header(PacketKind::LapData),
            payload: Payload::LapData(LapDataPacket {
                cars: vec![LapData {
                    car_position: 1,
                    ..LapData::default()
                }],
                time_trial_pb_car_idx: 255,
                time_trial_rival_car_idx: 255,
            }),
        };
        let bytes = encode(&packet);
        assert_eq!(bytes.len(), 1285);
    }

    #[test]
    fn test_event_detail_padded_to_union() {
        let packet = TelemetryPacket {
            header: header(PacketKind::Event),
            payload: Payload::Event(EventPacket {
                code: *b"FTLP",
                detail: EventDetail::FastestLap {
                    vehicle_idx: 3,
                    lap_time: 82.345,
                },
            }),
        };
        let bytes = encode(&packet);
        assert_eq!(bytes.len(), 45);
        assert_eq!(decode(&bytes).unwrap(), packet);
    }
}
