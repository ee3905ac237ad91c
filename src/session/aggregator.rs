//! Merges decoded packets into the live session and publishes snapshots

use std::sync::Arc;

use tokio::sync::watch;

use super::state::{Participant, RaceEvent, SessionSnapshot};
use crate::telemetry::packet::MAX_CARS;
use crate::telemetry::{Payload, TelemetryPacket};

/// Capacity of the race event ring
pub const EVENT_RING_CAPACITY: usize = 50;

/// Player lap that just finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LapCompleted {
    pub lap_number: u8,
    pub lap_time_ms: u32,
    pub position: u8,
    pub personal_best: bool,
}

/// What changed while merging one packet
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyOutcome {
    /// The packet carried a new session uid and the state was reset
    pub session_changed: bool,
    /// Frame index went backwards inside the same session
    pub frame_regressed: bool,
    pub lap_completed: Option<LapCompleted>,
    /// New zero-based player sector
    pub sector_changed: Option<u8>,
}

/// Cheap, cloneable read side of the aggregator
#[derive(Debug, Clone)]
pub struct SnapshotHandle {
    rx: watch::Receiver<Arc<SessionSnapshot>>,
}

impl SnapshotHandle {
    /// Latest published snapshot
    #[must_use]
    pub fn current(&self) -> Arc<SessionSnapshot> {
        Arc::clone(&self.rx.borrow())
    }

    /// Wait until a newer snapshot is published
    ///
    /// Returns `false` once the aggregator has been dropped.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }
}

/// Sole writer of the live session
pub struct SessionAggregator {
    state: SessionSnapshot,
    tx: watch::Sender<Arc<SessionSnapshot>>,
    seen_session: bool,
}

impl Default for SessionAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionAggregator {
    #[must_use]
    pub fn new() -> Self {
        let state = SessionSnapshot::empty(MAX_CARS);
        let (tx, _rx) = watch::channel(Arc::new(state.clone()));
        Self {
            state,
            tx,
            seen_session: false,
        }
    }

    /// Read handle for other tasks
    #[must_use]
    pub fn handle(&self) -> SnapshotHandle {
        SnapshotHandle {
            rx: self.tx.subscribe(),
        }
    }

    /// Latest published snapshot
    #[must_use]
    pub fn snapshot(&self) -> Arc<SessionSnapshot> {
        Arc::clone(&self.tx.borrow())
    }

    /// Merge one packet and publish the resulting snapshot
    ///
    /// Opaque payloads are ignored entirely.
    pub fn apply(&mut self, packet: &TelemetryPacket) -> ApplyOutcome {
        if matches!(packet.payload, Payload::Opaque { .. }) {
            return ApplyOutcome::default();
        }

        let mut outcome = ApplyOutcome::default();
        let header = &packet.header;

        if !self.seen_session || header.session_uid != self.state.session.session_uid {
            if self.seen_session {
                tracing::info!(
                    previous = self.state.session.session_uid,
                    next = header.session_uid,
                    "session changed, resetting state"
                );
                outcome.session_changed = true;
            }
            self.state = SessionSnapshot::empty(MAX_CARS);
            self.seen_session = true;
        } else if header.frame_identifier < self.state.last_frame {
            tracing::debug!(
                last = self.state.last_frame,
                frame = header.frame_identifier,
                "frame regressed within session"
            );
            outcome.frame_regressed = true;
        }

        self.state.header_seen(header);
        let player = usize::from(header.player_car_index);
        let count = self.state.car_count();

        match &packet.payload {
            Payload::Motion(cars) => {
                for (car, m) in self.state.cars.iter_mut().zip(cars.iter().take(count)) {
                    car.merge_motion(m);
                }
            }
            Payload::Session(data) => self.state.session.merge(data),
            Payload::LapData(lap_data) => {
                for (idx, (record, lap)) in self
                    .state
                    .laps
                    .iter_mut()
                    .zip(lap_data.cars.iter().take(count))
                    .enumerate()
                {
                    let previous_lap = record.lap_number;
                    let previous_sector = record.sector;
                    let had_data = record.received;
                    record.merge(lap);

                    let finished =
                        had_data && previous_lap > 0 && lap.current_lap_num > previous_lap;
                    let personal_best = finished && record.record_completed(lap.last_lap_time_ms);

                    if idx != player || !had_data {
                        continue;
                    }
                    if finished {
                        outcome.lap_completed = Some(LapCompleted {
                            lap_number: previous_lap,
                            lap_time_ms: lap.last_lap_time_ms,
                            position: lap.car_position,
                            personal_best,
                        });
                    }
                    if lap.sector != previous_sector {
                        outcome.sector_changed = Some(lap.sector);
                    }
                }
            }
            Payload::Event(event) => {
                if self.state.events.len() == EVENT_RING_CAPACITY {
                    self.state.events.pop_front();
                }
                self.state.events.push_back(RaceEvent {
                    code: event.code_str(),
                    session_time: header.session_time,
                    car_index: event.detail.vehicle_idx(),
                    detail: event.detail.clone(),
                });
            }
            Payload::Participants(p) => {
                // Zero is sent from menus; keep the current width then
                let active = match usize::from(p.num_active_cars).min(MAX_CARS) {
                    0 => count,
                    n => n,
                };
                self.state.resize(active);
                self.state.participants = p
                    .participants
                    .iter()
                    .take(active)
                    .enumerate()
                    .filter_map(|(idx, data)| {
                        u8::try_from(idx)
                            .ok()
                            .map(|idx| Participant::from_wire(idx, data))
                    })
                    .collect();
            }
            Payload::CarTelemetry(t) => {
                for (car, data) in self.state.cars.iter_mut().zip(t.cars.iter().take(count)) {
                    car.merge_telemetry(data);
                }
            }
            Payload::CarStatus(cars) => {
                for (car, data) in self.state.cars.iter_mut().zip(cars.iter().take(count)) {
                    car.merge_status(data);
                }
            }
            Payload::CarDamage(cars) => {
                for (car, data) in self.state.cars.iter_mut().zip(cars.iter().take(count)) {
                    car.merge_damage(data);
                }
            }
            Payload::FinalClassification(fc) => {
                let n = usize::from(fc.num_cars).min(count);
                self.state.classification = fc.cars.iter().take(n).copied().collect();
            }
            Payload::Opaque { .. } => {}
        }

        self.tx.send_replace(Arc::new(self.state.clone()));
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::packet::{
        CarTelemetryData, CarTelemetryPacket, EventDetail, EventPacket, LapData, LapDataPacket,
        PacketHeader, PacketKind,
    };

    fn header(kind: PacketKind, uid: u64, frame: u32) -> PacketHeader {
        PacketHeader {
            packet_format: 2025,
            game_year: 25,
            game_major_version: 1,
            game_minor_version: 0,
            packet_version: 1,
            packet_id: kind.tag(),
            session_uid: uid,
            session_time: 1.0,
            frame_identifier: frame,
            overall_frame_identifier: frame,
            player_car_index: 0,
            secondary_player_car_index: 255,
        }
    }

    fn lap_packet(uid: u64, frame: u32, lap_num: u8, sector: u8, last_ms: u32) -> TelemetryPacket {
        let mut cars = vec![LapData::default(); MAX_CARS];
        cars[0] = LapData {
            current_lap_num: lap_num,
            sector,
            last_lap_time_ms: last_ms,
            car_position: 4,
            ..LapData::default()
        };
        TelemetryPacket {
            header: header(PacketKind::LapData, uid, frame),
            payload: Payload::LapData(LapDataPacket {
                cars,
                time_trial_pb_car_idx: 255,
                time_trial_rival_car_idx: 255,
            }),
        }
    }

    #[test]
    fn test_lap_completion_reported_once() {
        let mut agg = SessionAggregator::new();
        agg.apply(&lap_packet(1, 1, 3, 2, 0));

        let out = agg.apply(&lap_packet(1, 2, 4, 0, 91_234));
        assert_eq!(
            out.lap_completed,
            Some(LapCompleted {
                lap_number: 3,
                lap_time_ms: 91_234,
                position: 4,
                personal_best: true,
            })
        );
        assert_eq!(out.sector_changed, Some(0));

        let out = agg.apply(&lap_packet(1, 3, 4, 0, 91_234));
        assert_eq!(out.lap_completed, None);
        assert_eq!(out.sector_changed, None);
        assert_eq!(agg.snapshot().laps[0].best_lap_ms, Some(91_234));
    }

    #[test]
    fn test_first_lap_packet_is_not_a_transition() {
        let mut agg = SessionAggregator::new();
        let out = agg.apply(&lap_packet(1, 1, 5, 1, 90_000));
        assert_eq!(out, ApplyOutcome::default());
    }

    #[test]
    fn test_frame_regression_flagged_but_applied() {
        let mut agg = SessionAggregator::new();
        agg.apply(&lap_packet(1, 100, 2, 0, 0));
        let out = agg.apply(&lap_packet(1, 50, 2, 1, 0));
        assert!(out.frame_regressed);
        assert_eq!(agg.snapshot().laps[0].sector, 1);
        assert_eq!(agg.snapshot().last_frame, 50);
    }

    #[test]
    fn test_event_ring_is_bounded() {
        let mut agg = SessionAggregator::new();
        for frame in 0..60u16 {
            agg.apply(&TelemetryPacket {
                header: header(PacketKind::Event, 9, u32::from(frame)),
                payload: Payload::Event(EventPacket {
                    code: *b"SPTP",
                    detail: EventDetail::SpeedTrap {
                        vehicle_idx: 0,
                        speed: 300.0 + f32::from(frame),
                        is_overall_fastest_in_session: 0,
                        is_driver_fastest_in_session: 0,
                        fastest_vehicle_idx_in_session: 0,
                        fastest_speed_in_session: 0.0,
                    },
                }),
            });
        }
        let snap = agg.snapshot();
        assert_eq!(snap.events.len(), EVENT_RING_CAPACITY);
        assert!(matches!(
            snap.events.front().map(|e| &e.detail),
            Some(EventDetail::SpeedTrap { speed, .. }) if (*speed - 310.0).abs() < f32::EPSILON
        ));
    }

    #[test]
    fn test_handle_sees_published_snapshot() {
        let mut agg = SessionAggregator::new();
        let handle = agg.handle();
        assert!(!handle.current().has_data());

        let mut cars = vec![CarTelemetryData::default(); MAX_CARS];
        cars[0].speed = 250;
        agg.apply(&TelemetryPacket {
            header: header(PacketKind::CarTelemetry, 1, 1),
            payload: Payload::CarTelemetry(CarTelemetryPacket {
                cars,
                mfd_panel_index: 0,
                mfd_panel_index_secondary_player: 0,
                suggested_gear: 0,
            }),
        });
        assert_eq!(handle.current().cars[0].speed_kph, 250);
    }
}
