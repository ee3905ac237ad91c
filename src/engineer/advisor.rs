//! Proactive radio messages
//!
//! Periodic advice read from the snapshot, plus announcements driven by
//! lap and sector transitions reported by the aggregator.

use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};

use super::dispatcher::AssistantResponse;
use super::intents::Intent;
use crate::session::{ApplyOutcome, LapCompleted, SessionSnapshot, SnapshotHandle, format_lap_time};
use crate::voice::SynthesizerHandle;

#[derive(Debug, Clone)]
pub struct AdvisorConfig {
    /// Periodic advice on or off
    pub auto_advice: bool,
    /// Minimum time between two pieces of advice
    pub interval: Duration,
    /// Announce lap times and personal best sectors
    pub announce_laps: bool,
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        Self {
            auto_advice: true,
            interval: Duration::from_secs(30),
            announce_laps: true,
        }
    }
}

/// Advice worth saying right now, if any
#[must_use]
pub fn generate_advice(snapshot: &SessionSnapshot) -> Option<String> {
    let car = snapshot.player_telemetry()?;
    let mut messages = Vec::new();

    let tyres = car.avg_tyre_temperature();
    if tyres < 60.0 {
        messages.push("Tyre temperatures very low. Push hard to warm them up.".to_string());
    } else if tyres > 115.0 {
        messages.push("Critical tyre overheating. Lift off now.".to_string());
    }

    if car.avg_brake_temperature() > 900.0 {
        messages.push("Brakes critically hot. Use engine braking.".to_string());
    }

    if let Some(lap) = snapshot.player_lap() {
        if lap.lap_number > 15 && tyres > 110.0 {
            messages.push("Tyres are worn. Think about boxing in the next 3 laps.".to_string());
        }
        if lap.lap_number > 0 && lap.lap_number % 10 == 0 {
            messages.push(format!("Lap {}. Keep going, good pace.", lap.lap_number));
        }
    }

    let drs = if car.has_status {
        car.drs_allowed
    } else {
        car.drs_open
    };
    if drs {
        messages.push("DRS available.".to_string());
    }

    (!messages.is_empty()).then(|| messages.join(" "))
}

/// Speaks up without being asked
pub struct Advisor {
    config: AdvisorConfig,
    last_advice_at: Instant,
    last_advice: Option<String>,
    best_sectors: [Option<u32>; 3],
    /// Sector 1 and 2 of the lap in progress
    lap_sectors: [Option<u32>; 2],
}

impl Advisor {
    #[must_use]
    pub fn new(config: AdvisorConfig) -> Self {
        Self {
            config,
            last_advice_at: Instant::now(),
            last_advice: None,
            best_sectors: [None; 3],
            lap_sectors: [None; 2],
        }
    }

    /// Periodic advice, at most once per interval and never the same text
    /// twice in a row
    pub fn periodic(&mut self, snapshot: &SessionSnapshot, now: Instant) -> Option<AssistantResponse> {
        if !self.config.auto_advice
            || now.saturating_duration_since(self.last_advice_at) < self.config.interval
        {
            return None;
        }

        let advice = generate_advice(snapshot)?;
        if self.last_advice.as_deref() == Some(advice.as_str()) {
            return None;
        }

        self.last_advice_at = now;
        self.last_advice = Some(advice.clone());
        Some(AssistantResponse::local(advice, Intent::Advice))
    }

    /// Messages triggered by an applied packet
    pub fn on_outcome(
        &mut self,
        outcome: &ApplyOutcome,
        snapshot: &SessionSnapshot,
    ) -> Vec<AssistantResponse> {
        if outcome.session_changed {
            self.best_sectors = [None; 3];
            self.lap_sectors = [None; 2];
            self.last_advice = None;
        }
        if !self.config.announce_laps {
            return Vec::new();
        }

        let mut messages = Vec::new();

        if let Some(lap) = &outcome.lap_completed {
            if let Some(msg) = self.sector_three(lap) {
                messages.push(msg);
            }
            messages.push(AssistantResponse::local(lap_message(lap), Intent::LapTime));
        }

        if let Some(sector) = outcome.sector_changed {
            if let Some(msg) = self.sector_done(sector, snapshot) {
                messages.push(msg);
            }
        }

        messages
    }

    /// Record the sector just finished when the player enters `sector`
    fn sector_done(&mut self, sector: u8, snapshot: &SessionSnapshot) -> Option<AssistantResponse> {
        let lap = snapshot.player_lap()?;
        let (idx, time) = match sector {
            1 => (0, lap.sector1_ms),
            2 => (1, lap.sector2_ms),
            _ => {
                self.lap_sectors = [None; 2];
                return None;
            }
        };
        if time == 0 {
            return None;
        }
        self.lap_sectors[idx] = Some(time);
        if lap.current_lap_invalid {
            return None;
        }
        self.check_best(idx, time)
    }

    fn sector_three(&mut self, lap: &LapCompleted) -> Option<AssistantResponse> {
        let [Some(s1), Some(s2)] = std::mem::take(&mut self.lap_sectors) else {
            return None;
        };
        let s3 = lap.lap_time_ms.checked_sub(s1 + s2).filter(|t| *t > 0)?;
        self.check_best(2, s3)
    }

    fn check_best(&mut self, idx: usize, time: u32) -> Option<AssistantResponse> {
        let previous = self.best_sectors[idx];
        if previous.is_some_and(|best| best <= time) {
            return None;
        }
        self.best_sectors[idx] = Some(time);
        // The first time through only sets the reference
        previous?;
        Some(AssistantResponse::local(
            format!("Great sector {}! Personal best.", idx + 1),
            Intent::LapTime,
        ))
    }

    /// Speak advice and announcements until shutdown
    pub async fn run(
        mut self,
        mut transitions: mpsc::Receiver<ApplyOutcome>,
        snapshots: SnapshotHandle,
        synthesizer: SynthesizerHandle,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut tick = tokio::time::interval(Duration::from_secs(1));
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                res = shutdown.changed() => {
                    if res.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                Some(outcome) = transitions.recv() => {
                    let snapshot = snapshots.current();
                    for message in self.on_outcome(&outcome, &snapshot) {
                        tracing::info!(text = %message.text, "radio announcement");
                        synthesizer.enqueue(message);
                    }
                }
                _ = tick.tick() => {
                    let snapshot = snapshots.current();
                    if let Some(message) = self.periodic(&snapshot, Instant::now()) {
                        tracing::info!(text = %message.text, "radio advice");
                        synthesizer.enqueue(message);
                    }
                }
            }
        }
        tracing::debug!("advisor stopped");
    }
}

fn lap_message(lap: &LapCompleted) -> String {
    let mut text = format!(
        "Lap {} done, {}. P{}.",
        lap.lap_number,
        format_lap_time(lap.lap_time_ms),
        lap.position
    );
    if lap.personal_best {
        text.push_str(" Personal best!");
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{CarState, LapRecord};

    fn snapshot(tyres: u8, lap_number: u8) -> SessionSnapshot {
        let mut s = SessionSnapshot::empty(1);
        s.cars[0] = CarState {
            tyres_surface_temperature: [tyres; 4],
            brakes_temperature: [500; 4],
            has_telemetry: true,
            ..CarState::default()
        };
        s.laps[0] = LapRecord {
            lap_number,
            received: true,
            ..LapRecord::default()
        };
        s.packets_applied = 1;
        s
    }

    #[test]
    fn advice_thresholds() {
        assert!(generate_advice(&snapshot(55, 3)).unwrap().contains("warm them up"));
        assert!(generate_advice(&snapshot(120, 3)).unwrap().contains("overheating"));
        assert!(generate_advice(&snapshot(90, 10)).unwrap().starts_with("Lap 10."));
        assert_eq!(generate_advice(&snapshot(90, 3)), None);
    }

    #[test]
    fn periodic_respects_interval_and_repeats() {
        let mut advisor = Advisor::new(AdvisorConfig::default());
        let start = advisor.last_advice_at;
        let s = snapshot(55, 3);

        assert!(advisor.periodic(&s, start + Duration::from_secs(10)).is_none());
        assert!(advisor.periodic(&s, start + Duration::from_secs(31)).is_some());
        // Same advice again after another interval stays quiet
        assert!(advisor.periodic(&s, start + Duration::from_secs(70)).is_none());
        // Different advice is spoken
        let hot = snapshot(120, 3);
        assert!(advisor.periodic(&hot, start + Duration::from_secs(75)).is_some());
    }

    #[test]
    fn disabled_advice_is_silent() {
        let mut advisor = Advisor::new(AdvisorConfig {
            auto_advice: false,
            ..AdvisorConfig::default()
        });
        let later = advisor.last_advice_at + Duration::from_secs(600);
        assert!(advisor.periodic(&snapshot(55, 3), later).is_none());
    }

    #[test]
    fn lap_completed_announced() {
        let mut advisor = Advisor::new(AdvisorConfig::default());
        let outcome = ApplyOutcome {
            lap_completed: Some(LapCompleted {
                lap_number: 4,
                lap_time_ms: 91_245,
                position: 3,
                personal_best: true,
            }),
            ..ApplyOutcome::default()
        };
        let messages = advisor.on_outcome(&outcome, &snapshot(90, 5));
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].text, "Lap 4 done, 1:31.245. P3. Personal best!");
    }

    #[test]
    fn faster_sector_is_personal_best() {
        let mut advisor = Advisor::new(AdvisorConfig::default());
        let mut s = snapshot(90, 2);
        let into_s2 = ApplyOutcome {
            sector_changed: Some(1),
            ..ApplyOutcome::default()
        };

        s.laps[0].sector1_ms = 30_000;
        assert!(advisor.on_outcome(&into_s2, &s).is_empty());

        s.laps[0].sector1_ms = 29_500;
        let messages = advisor.on_outcome(&into_s2, &s);
        assert_eq!(messages[0].text, "Great sector 1! Personal best.");

        s.laps[0].sector1_ms = 29_900;
        assert!(advisor.on_outcome(&into_s2, &s).is_empty());
    }
}
