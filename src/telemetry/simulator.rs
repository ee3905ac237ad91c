//! Synthetic session stream for running without the game
//!
//! Three cars lap a fictional circuit at a steady pace with the player in
//! second place. Tyre and brake temperatures drift so that the advisor has
//! something to say.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use super::encode::encode;
use super::packet::{
    CarDamageData, CarStatusData, CarTelemetryData, CarTelemetryPacket, LapData, LapDataPacket,
    PacketHeader, PacketKind, ParticipantData, ParticipantsPacket, Payload, SUPPORTED_FORMAT,
    SessionData, TelemetryPacket, WeatherForecastSample,
};
use crate::{Error, Result};

const DRIVERS: [&str; 3] = ["LECLERC", "PLAYER", "NORRIS"];
const PLAYER: u8 = 1;

/// Ticks between two session, participants and damage packets
const SLOW_PACKET_EVERY: u32 = 20;

#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Where datagrams are sent
    pub target: SocketAddr,
    /// Ticks per second
    pub rate_hz: u32,
    /// Reference lap time of the player
    pub lap_time: Duration,
    /// Stop after this many laps; 0 runs until shutdown
    pub laps: u8,
    pub session_uid: u64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            target: SocketAddr::from(([127, 0, 0, 1], 20777)),
            rate_hz: 10,
            lap_time: Duration::from_secs(90),
            laps: 0,
            session_uid: 0x00F1_2025,
        }
    }
}

/// Lap time bounds accepted by the generator
const MIN_LAP_MS: u32 = 3_000;
const MAX_LAP_MS: u32 = 600_000;

/// Deterministic race generator
#[derive(Debug)]
pub struct SessionSimulator {
    session_uid: u64,
    lap_time_ms: u32,
    elapsed_ms: u64,
    frame: u32,
    last_lap_ms: u32,
}

impl SessionSimulator {
    #[must_use]
    pub fn new(session_uid: u64, lap_time: Duration) -> Self {
        Self {
            session_uid,
            lap_time_ms: u32::try_from(lap_time.as_millis())
                .unwrap_or(MAX_LAP_MS)
                .clamp(MIN_LAP_MS, MAX_LAP_MS),
            elapsed_ms: 0,
            frame: 0,
            last_lap_ms: 0,
        }
    }

    /// Laps fully completed by the player
    #[must_use]
    pub fn completed_laps(&self) -> u8 {
        u8::try_from(self.elapsed_ms / u64::from(self.lap_time_ms)).unwrap_or(u8::MAX)
    }

    /// Advance the clock and return the packets of the new frame
    pub fn tick(&mut self, dt: Duration) -> Vec<TelemetryPacket> {
        let before = self.completed_laps();
        self.elapsed_ms = self
            .elapsed_ms
            .saturating_add(u64::try_from(dt.as_millis()).unwrap_or(u64::MAX));
        if self.completed_laps() > before {
            // Alternate slightly slower and faster laps
            self.last_lap_ms = match self.completed_laps() % 3 {
                0 => self.lap_time_ms - 350,
                1 => self.lap_time_ms + 420,
                _ => self.lap_time_ms + 90,
            };
        }

        let first = self.frame == 0;
        self.frame += 1;

        let mut packets = Vec::with_capacity(6);
        if first || self.frame % SLOW_PACKET_EVERY == 0 {
            packets.push(self.packet(PacketKind::Session, Payload::Session(Box::new(self.session()))));
            packets.push(self.packet(PacketKind::Participants, Payload::Participants(participants())));
            packets.push(self.packet(PacketKind::CarDamage, Payload::CarDamage(self.damage())));
        }
        packets.push(self.packet(PacketKind::LapData, Payload::LapData(self.laps())));
        packets.push(self.packet(PacketKind::CarTelemetry, Payload::CarTelemetry(self.telemetry())));
        packets.push(self.packet(PacketKind::CarStatus, Payload::CarStatus(self.status())));
        packets
    }

    #[allow(clippy::cast_precision_loss)]
    fn session_time(&self) -> f32 {
        self.elapsed_ms as f32 / 1000.0
    }

    /// Position within the current lap, 0.0 to 1.0
    #[allow(clippy::cast_precision_loss)]
    fn lap_fraction(&self) -> f32 {
        (self.elapsed_ms % u64::from(self.lap_time_ms)) as f32 / self.lap_time_ms as f32
    }

    fn packet(&self, kind: PacketKind, payload: Payload) -> TelemetryPacket {
        TelemetryPacket {
            header: PacketHeader {
                packet_format: SUPPORTED_FORMAT,
                game_year: 25,
                game_major_version: 1,
                game_minor_version: 0,
                packet_version: 1,
                packet_id: kind.tag(),
                session_uid: self.session_uid,
                session_time: self.session_time(),
                frame_identifier: self.frame,
                overall_frame_identifier: self.frame,
                player_car_index: PLAYER,
                secondary_player_car_index: 255,
            },
            payload,
        }
    }

    fn session(&self) -> SessionData {
        let laps = self.completed_laps();
        SessionData {
            weather: if laps >= 12 { 3 } else { 1 },
            track_temperature: 34,
            air_temperature: 24,
            total_laps: 25,
            track_length: 5_412,
            session_type: 15,
            weather_forecast: vec![
                WeatherForecastSample {
                    session_type: 15,
                    time_offset: 10,
                    weather: 2,
                    track_temperature: 32,
                    air_temperature: 23,
                    rain_percentage: 20,
                    ..WeatherForecastSample::default()
                },
                WeatherForecastSample {
                    session_type: 15,
                    time_offset: 30,
                    weather: 3,
                    track_temperature: 29,
                    air_temperature: 21,
                    rain_percentage: 55,
                    ..WeatherForecastSample::default()
                },
            ],
            pit_stop_window_ideal_lap: 14,
            pit_stop_window_latest_lap: 18,
            ..SessionData::default()
        }
    }

    fn laps(&self) -> LapDataPacket {
        let fraction = self.lap_fraction();
        let current_lap = self.completed_laps().saturating_add(1);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let current_ms = (fraction * self.lap_time_ms as f32) as u32;
        let sector_ms = self.lap_time_ms / 3;
        let sector: u8 = if fraction < 1.0 / 3.0 {
            0
        } else if fraction < 2.0 / 3.0 {
            1
        } else {
            2
        };

        let mut player = LapData {
            last_lap_time_ms: self.last_lap_ms,
            current_lap_time_ms: current_ms,
            delta_to_car_in_front_ms_part: 850,
            delta_to_race_leader_ms_part: 850,
            car_position: 2,
            current_lap_num: current_lap,
            sector,
            grid_position: 3,
            driver_status: 4,
            result_status: 2,
            ..LapData::default()
        };
        if sector >= 1 {
            split(sector_ms - 120, &mut player.sector1_time_ms_part, &mut player.sector1_time_minutes_part);
        }
        if sector >= 2 {
            split(sector_ms + 60, &mut player.sector2_time_ms_part, &mut player.sector2_time_minutes_part);
        }

        let leader = LapData {
            car_position: 1,
            delta_to_car_in_front_ms_part: 0,
            delta_to_race_leader_ms_part: 0,
            ..player
        };
        let chaser = LapData {
            car_position: 3,
            delta_to_car_in_front_ms_part: 1_900,
            delta_to_race_leader_ms_part: 2_750,
            ..player
        };

        LapDataPacket {
            cars: vec![leader, player, chaser],
            time_trial_pb_car_idx: 255,
            time_trial_rival_car_idx: 255,
        }
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn telemetry(&self) -> CarTelemetryPacket {
        let phase = self.lap_fraction() * std::f32::consts::TAU * 4.0;
        let speed = 220.0 + 90.0 * phase.sin();
        let braking = phase.sin() < -0.6;
        let laps = f32::from(self.completed_laps());
        // Tyres warm up over the first laps then keep creeping up
        let tyre = (75.0 + laps * 2.5).min(118.0) + 4.0 * phase.cos();
        let brake = if braking { 820.0 } else { 520.0 } + laps * 6.0;

        let car = CarTelemetryData {
            speed: speed as u16,
            throttle: if braking { 0.0 } else { 1.0 },
            brake: if braking { 0.9 } else { 0.0 },
            gear: (speed / 40.0).clamp(1.0, 8.0) as i8,
            engine_rpm: (9_000.0 + speed * 12.0) as u16,
            drs: u8::from(phase.cos() > 0.8),
            brakes_temperature: [brake as u16; 4],
            tyres_surface_temperature: [tyre as u8, tyre as u8, (tyre + 3.0) as u8, (tyre + 3.0) as u8],
            tyres_inner_temperature: [(tyre + 8.0) as u8; 4],
            engine_temperature: 105,
            tyres_pressure: [22.8, 22.8, 24.1, 24.1],
            ..CarTelemetryData::default()
        };

        CarTelemetryPacket {
            cars: vec![car; DRIVERS.len()],
            mfd_panel_index: 255,
            mfd_panel_index_secondary_player: 255,
            suggested_gear: 0,
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn status(&self) -> Vec<CarStatusData> {
        let burnt = self.elapsed_ms as f32 / self.lap_time_ms as f32 * 1.6;
        let fuel = (100.0 - burnt).max(0.0);
        let car = CarStatusData {
            fuel_mix: 1,
            front_brake_bias: 56,
            fuel_in_tank: fuel,
            fuel_capacity: 110.0,
            fuel_remaining_laps: fuel / 1.6 - f32::from(25 - self.completed_laps().min(25)),
            max_rpm: 13_000,
            idle_rpm: 4_000,
            max_gears: 8,
            drs_allowed: u8::from(self.lap_fraction() > 0.85),
            actual_tyre_compound: 17,
            visual_tyre_compound: 17,
            tyres_age_laps: self.completed_laps(),
            ers_store_energy: 2_800_000.0,
            ers_deploy_mode: 1,
            ..CarStatusData::default()
        };
        vec![car; DRIVERS.len()]
    }

    fn damage(&self) -> Vec<CarDamageData> {
        let wear = f32::from(self.completed_laps()) * 2.2;
        let car = CarDamageData {
            tyres_wear: [wear, wear, wear * 1.2, wear * 1.2],
            engine_ice_wear: self.completed_laps() / 2,
            ..CarDamageData::default()
        };
        vec![car; DRIVERS.len()]
    }
}

fn split(ms: u32, ms_part: &mut u16, minutes_part: &mut u8) {
    *minutes_part = u8::try_from(ms / 60_000).unwrap_or(u8::MAX);
    *ms_part = u16::try_from(ms % 60_000).unwrap_or(u16::MAX);
}

fn participants() -> ParticipantsPacket {
    ParticipantsPacket {
        num_active_cars: u8::try_from(DRIVERS.len()).unwrap_or(u8::MAX),
        participants: DRIVERS
            .iter()
            .zip(0u8..)
            .map(|(name, idx)| ParticipantData {
                ai_controlled: u8::from(idx != PLAYER),
                race_number: 10 + idx,
                name: (*name).to_string(),
                your_telemetry: 1,
                show_online_names: 1,
                ..ParticipantData::default()
            })
            .collect(),
    }
}

/// Stream a simulated session to `config.target` until the lap limit or
/// shutdown; returns the number of datagrams sent
///
/// # Errors
///
/// Returns error if the local socket cannot be bound or a send fails
pub async fn run_simulation(config: SimulatorConfig, mut shutdown: watch::Receiver<bool>) -> Result<u64> {
    let local: SocketAddr = if config.target.is_ipv4() {
        SocketAddr::from(([0, 0, 0, 0], 0))
    } else {
        SocketAddr::from(([0u16; 8], 0))
    };
    let socket = UdpSocket::bind(local)
        .await
        .map_err(|e| Error::Telemetry(format!("failed to bind simulator socket: {e}")))?;
    socket.set_broadcast(true)?;

    let period = Duration::from_secs(1) / config.rate_hz.max(1);
    let mut tick = tokio::time::interval(period);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut sim = SessionSimulator::new(config.session_uid, config.lap_time);
    let mut sent = 0u64;

    tracing::info!(target = %config.target, rate_hz = config.rate_hz, "simulating session");

    loop {
        tokio::select! {
            res = shutdown.changed() => {
                if res.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            _ = tick.tick() => {
                for packet in sim.tick(period) {
                    socket.send_to(&encode(&packet), config.target).await?;
                    sent += 1;
                }
                if config.laps > 0 && sim.completed_laps() >= config.laps {
                    break;
                }
            }
        }
    }

    tracing::info!(sent, laps = sim.completed_laps(), "simulation finished");
    Ok(sent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionAggregator;
    use crate::telemetry::decode;

    #[test]
    fn first_frame_carries_slow_packets() {
        let mut sim = SessionSimulator::new(7, Duration::from_secs(90));
        let kinds: Vec<_> = sim
            .tick(Duration::from_millis(100))
            .iter()
            .map(|p| p.header.kind())
            .collect();
        assert!(kinds.contains(&PacketKind::Session));
        assert!(kinds.contains(&PacketKind::Participants));
        assert_eq!(sim.tick(Duration::from_millis(100)).len(), 3);
    }

    #[test]
    fn extreme_lap_time_is_clamped() {
        let mut sim = SessionSimulator::new(7, Duration::from_secs(u64::MAX));
        assert_eq!(sim.lap_time_ms, MAX_LAP_MS);
        for _ in 0..4 {
            sim.tick(Duration::from_secs(601));
        }
        assert_eq!(sim.completed_laps(), 4);
        assert_eq!(sim.last_lap_ms, MAX_LAP_MS + 420);

        sim.tick(Duration::MAX);
        assert_eq!(sim.completed_laps(), u8::MAX);

        assert_eq!(SessionSimulator::new(7, Duration::ZERO).lap_time_ms, MIN_LAP_MS);
    }

    #[test]
    fn packets_survive_the_wire() {
        let mut sim = SessionSimulator::new(7, Duration::from_secs(90));
        for packet in sim.tick(Duration::from_millis(100)) {
            assert_eq!(decode(&encode(&packet)).unwrap().header, packet.header);
        }
    }

    #[test]
    fn aggregator_sees_completed_laps() {
        let mut sim = SessionSimulator::new(7, Duration::from_secs(6));
        let mut aggregator = SessionAggregator::new();
        let mut completed = Vec::new();
        for _ in 0..130 {
            for packet in sim.tick(Duration::from_millis(100)) {
                if let Some(lap) = aggregator.apply(&packet).lap_completed {
                    completed.push(lap.lap_number);
                }
            }
        }
        assert_eq!(completed, [1, 2]);

        let snapshot = aggregator.snapshot();
        assert_eq!(snapshot.driver_name(1), Some("PLAYER"));
        assert_eq!(snapshot.player_lap().unwrap().position, 2);
    }
}
