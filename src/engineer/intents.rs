//! Local intent catalogue
//!
//! Questions the snapshot can answer directly. Triggers are English and
//! French; the first rule that matches wins, so order matters.

use regex::Regex;
use serde::Serialize;

use crate::session::{SessionSnapshot, format_gap, format_lap_time};
use crate::telemetry::Wheel;

/// Spoken when a handler needs data that has not arrived yet
pub const NO_DATA: &str = "No data yet, I'm not receiving telemetry.";

/// A question the engineer answers from live data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Tyres,
    Brakes,
    Speed,
    Position,
    LapTime,
    Strategy,
    Gap,
    Fuel,
    Advice,
    Drs,
    Engine,
    Weather,
    Pressure,
    Wear,
    Competition,
    Status,
    Help,
}

impl Intent {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Tyres => "tyres",
            Self::Brakes => "brakes",
            Self::Speed => "speed",
            Self::Position => "position",
            Self::LapTime => "lap_time",
            Self::Strategy => "strategy",
            Self::Gap => "gap",
            Self::Fuel => "fuel",
            Self::Advice => "advice",
            Self::Drs => "drs",
            Self::Engine => "engine",
            Self::Weather => "weather",
            Self::Pressure => "pressure",
            Self::Wear => "wear",
            Self::Competition => "competition",
            Self::Status => "status",
            Self::Help => "help",
        }
    }

    /// Build the spoken answer from a snapshot
    #[must_use]
    pub fn answer(self, snapshot: &SessionSnapshot, engineer: &str) -> String {
        let answer = match self {
            Self::Tyres => tyres(snapshot),
            Self::Brakes => brakes(snapshot),
            Self::Speed => speed(snapshot),
            Self::Position => position(snapshot),
            Self::LapTime => lap_time(snapshot),
            Self::Strategy => strategy(snapshot),
            Self::Gap => gap(snapshot),
            Self::Fuel => fuel(snapshot),
            Self::Advice => advice(snapshot),
            Self::Drs => drs(snapshot),
            Self::Engine => engine(snapshot),
            Self::Weather => weather(snapshot),
            Self::Pressure => pressure(snapshot),
            Self::Wear => wear(snapshot),
            Self::Competition => competition(snapshot),
            Self::Status => status(snapshot),
            Self::Help => Some(help(engineer)),
        };
        answer.unwrap_or_else(|| NO_DATA.to_string())
    }
}

/// Trigger patterns in match order
const RULES: &[(Intent, &str)] = &[
    (Intent::Tyres, r"\b(pneus?|gommes?|tyres?|tires?|rubber)\b"),
    (Intent::Brakes, r"\b(freins?|brakes?|braking)\b"),
    (Intent::Speed, r"\b(vitesse|rapide|vite|speed|fast)\b"),
    (Intent::Position, r"\b(position|classement|place|p\d{1,2}|où)\b"),
    (Intent::LapTime, r"\b(temps|chrono|time|dernier tour|last lap|lap times?)\b"),
    (Intent::Strategy, r"\b(strat[eé]gie|strategy|pit|pitter|arrêt|box|boxer)\b"),
    (Intent::Gap, r"\b(écart|ecart|delta|gap|avance|retard|devant|derrière|ahead|behind)\b"),
    (Intent::Fuel, r"\b(carburant|essence|fuel|autonomie)\b"),
    (Intent::Advice, r"\b(conseils?|que faire|advice|tips?)\b"),
    (Intent::Drs, r"\b(drs|aileron)\b"),
    (Intent::Engine, r"\b(moteur|engine|power unit)\b"),
    (Intent::Weather, r"\b(météo|meteo|pluie|weather|rain|conditions)\b"),
    (Intent::Pressure, r"\b(pressions?|pressures?|psi)\b"),
    (Intent::Wear, r"\b(usure|dégradation|degradation|wear)\b"),
    (Intent::Competition, r"\b(concurrents?|adversaires?|rivals?|compétition|competition)\b"),
    (Intent::Status, r"\b(état|etat|comment va|tout va bien|status|check)\b"),
    (Intent::Help, r"\b(commandes?|liste|help|aide)\b"),
];

/// Compiled trigger table
pub struct IntentCatalogue {
    rules: Vec<(Intent, Regex)>,
}

impl IntentCatalogue {
    /// Compile the built-in rules; an invalid pattern is logged and skipped
    #[must_use]
    pub fn builtin() -> Self {
        let rules = RULES
            .iter()
            .filter_map(|(intent, pattern)| match Regex::new(&format!("(?i){pattern}")) {
                Ok(re) => Some((*intent, re)),
                Err(e) => {
                    tracing::warn!(intent = intent.name(), error = %e, "invalid intent pattern, skipping");
                    None
                }
            })
            .collect();
        Self { rules }
    }

    /// First intent whose trigger appears in the command
    #[must_use]
    pub fn classify(&self, command: &str) -> Option<Intent> {
        self.rules
            .iter()
            .find(|(_, re)| re.is_match(command))
            .map(|(intent, _)| *intent)
    }
}

impl Default for IntentCatalogue {
    fn default() -> Self {
        Self::builtin()
    }
}

fn per_wheel<T: std::fmt::Display + Copy>(values: [T; 4]) -> String {
    Wheel::ALL
        .iter()
        .map(|w| format!("{} {}", w.label(), values[*w as usize]))
        .collect::<Vec<_>>()
        .join(", ")
}

fn tyres(s: &SessionSnapshot) -> Option<String> {
    let car = s.player_telemetry()?;
    let avg = car.avg_tyre_temperature();
    let verdict = if (80.0..=100.0).contains(&avg) {
        "Temperatures are good."
    } else {
        "Keep an eye on them."
    };
    Some(format!(
        "Tyres average {avg:.0} degrees. {}. {verdict}",
        per_wheel(car.tyres_surface_temperature)
    ))
}

fn brakes(s: &SessionSnapshot) -> Option<String> {
    let avg = s.player_telemetry()?.avg_brake_temperature();
    let state = if avg > 800.0 {
        "critical"
    } else if avg > 400.0 {
        "normal"
    } else {
        "cold"
    };
    Some(format!("Brakes average {avg:.0} degrees, {state}."))
}

fn speed(s: &SessionSnapshot) -> Option<String> {
    let car = s.player_telemetry()?;
    let gear = match car.gear {
        -1 => "reverse".to_string(),
        0 => "neutral".to_string(),
        g => format!("gear {g}"),
    };
    Some(format!("{} kilometres per hour, {gear}.", car.speed_kph))
}

fn position(s: &SessionSnapshot) -> Option<String> {
    let lap = s.player_lap()?;
    let total = s.session.total_laps;
    if total > 0 {
        Some(format!(
            "You're P{}, lap {} of {total}.",
            lap.position, lap.lap_number
        ))
    } else {
        Some(format!("You're P{}, lap {}.", lap.position, lap.lap_number))
    }
}

fn lap_time(s: &SessionSnapshot) -> Option<String> {
    let lap = s.player_lap()?;
    let mut text = format!("Current lap {}.", format_lap_time(lap.current_lap_ms));
    if lap.last_lap_ms > 0 {
        text.push_str(&format!(" Last lap {}.", format_lap_time(lap.last_lap_ms)));
    }
    if let Some(best) = lap.best_lap_ms {
        text.push_str(&format!(" Best {}.", format_lap_time(best)));
    }
    Some(text)
}

fn strategy(s: &SessionSnapshot) -> Option<String> {
    let avg = s.player_telemetry()?.avg_tyre_temperature();
    let lap = s.player_lap()?;

    let mut text = if avg > 110.0 {
        format!("Tyres are very hot at {avg:.0} degrees. We recommend boxing in the next 2 to 3 laps.")
    } else if lap.lap_number > 15 && avg > 100.0 {
        "Tyres are starting to go. Watch them, we could pit soon.".to_string()
    } else {
        "Stay out, tyres are good.".to_string()
    };

    let window = s.session.pit_stop_window_ideal_lap;
    if window > 0 && lap.pit_stops == 0 {
        text.push_str(&format!(
            " Pit window opens lap {window}, latest lap {}.",
            s.session.pit_stop_window_latest_lap
        ));
    }
    Some(text)
}

fn gap(s: &SessionSnapshot) -> Option<String> {
    let lap = s.player_lap()?;
    if lap.position == 1 {
        return Some("You're leading the race.".to_string());
    }
    if lap.delta_to_car_in_front_ms == 0 {
        return Some(format!(
            "Gap to the leader {} seconds.",
            format_gap(lap.delta_to_leader_ms)
        ));
    }
    Some(format!(
        "Gap to the car ahead {} seconds. Gap to the leader {} seconds.",
        format_gap(lap.delta_to_car_in_front_ms),
        format_gap(lap.delta_to_leader_ms)
    ))
}

fn fuel(s: &SessionSnapshot) -> Option<String> {
    let car = s.player_car().filter(|c| c.has_status)?;
    let margin = car.fuel_remaining_laps;
    let verdict = if margin >= 0.0 {
        format!("Enough to finish, {margin:.1} laps in hand.")
    } else {
        format!("We're {:.1} laps short, start lifting and coasting.", -margin)
    };
    Some(format!("Fuel {:.1} kilos. {verdict}", car.fuel_in_tank))
}

fn advice(s: &SessionSnapshot) -> Option<String> {
    let car = s.player_telemetry()?;
    let mut tips = Vec::new();

    let tyres = car.avg_tyre_temperature();
    if tyres < 70.0 {
        tips.push("warm up the tyres");
    } else if tyres > 110.0 {
        tips.push("cool the tyres");
    }
    if car.avg_brake_temperature() > 800.0 {
        tips.push("cool the brakes");
    }

    if tips.is_empty() {
        Some("All good, keep it up!".to_string())
    } else {
        Some(format!("Advice: {}.", tips.join(", ")))
    }
}

fn drs(s: &SessionSnapshot) -> Option<String> {
    let car = s.player_car()?;
    if car.has_damage && car.drs_fault {
        return Some("DRS fault, it won't open.".to_string());
    }
    let available = if car.has_status {
        car.drs_allowed
    } else if car.has_telemetry {
        car.drs_open
    } else {
        return None;
    };
    Some(if available {
        "DRS available, use it!".to_string()
    } else {
        "DRS not available right now.".to_string()
    })
}

fn engine(s: &SessionSnapshot) -> Option<String> {
    let car = s.player_telemetry()?;
    let temp = car.engine_temperature;
    let state = if temp > 120 {
        "critical"
    } else if temp > 90 {
        "normal"
    } else {
        "optimal"
    };
    Some(format!(
        "Engine at {temp} degrees, {} rpm. {state}.",
        car.engine_rpm
    ))
}

fn weather(s: &SessionSnapshot) -> Option<String> {
    let session = &s.session;
    if !session.received {
        return None;
    }
    let mut text = format!(
        "Conditions {}. Track {} degrees, air {} degrees.",
        session.weather_label(),
        session.track_temperature,
        session.air_temperature
    );

    let rain = session
        .forecast
        .iter()
        .filter(|f| f.session_type == session.session_type && f.time_offset > 0)
        .find(|f| f.rain_percentage >= 40);
    match rain {
        Some(f) => text.push_str(&format!(
            " {}% chance of rain in {} minutes.",
            f.rain_percentage, f.time_offset
        )),
        None => text.push_str(" No rain expected."),
    }
    if let Some(sc) = session.safety_car_label() {
        text.push_str(&format!(" Note, {sc}."));
    }
    Some(text)
}

fn pressure(s: &SessionSnapshot) -> Option<String> {
    let car = s.player_telemetry()?;
    let per_wheel = Wheel::ALL
        .iter()
        .map(|w| format!("{} {:.1}", w.label(), car.tyres_pressure[*w as usize]))
        .collect::<Vec<_>>()
        .join(", ");
    Some(format!(
        "Average pressure {:.1} PSI. {per_wheel}.",
        car.avg_tyre_pressure()
    ))
}

fn wear(s: &SessionSnapshot) -> Option<String> {
    let car = s.player_car().filter(|c| c.has_damage)?;
    let (wheel, worst) = car.worst_tyre_wear();
    let mut text = format!("Worst tyre is the {} at {worst:.0} percent wear.", wheel.label());
    if car.has_status {
        text.push_str(&format!(
            " {} compound, {} laps old.",
            capitalize(car.compound_label()),
            car.tyres_age_laps
        ));
    }
    Some(text)
}

fn competition(s: &SessionSnapshot) -> Option<String> {
    let lap = s.player_lap()?;
    if lap.position == 1 {
        return Some("You're leading! Manage the gap.".to_string());
    }

    let ahead = lap
        .position
        .checked_sub(1)
        .and_then(|p| s.car_at_position(p))
        .and_then(|(idx, _)| s.driver_name(idx))
        .map_or_else(|| "the car ahead".to_string(), ToString::to_string);

    if lap.delta_to_car_in_front_ms < 1000 {
        Some(format!(
            "P{}, {ahead} is within a second, DRS attack!",
            lap.position
        ))
    } else {
        Some(format!(
            "P{}, keep pushing, {} seconds to {ahead}.",
            lap.position,
            format_gap(lap.delta_to_car_in_front_ms)
        ))
    }
}

fn status(s: &SessionSnapshot) -> Option<String> {
    let car = s.player_telemetry()?;
    let tyres = car.avg_tyre_temperature();
    let brakes = car.avg_brake_temperature();

    let mut issues = Vec::new();
    if tyres < 70.0 {
        issues.push("tyres cold");
    } else if tyres > 110.0 {
        issues.push("tyres hot");
    }
    if brakes > 800.0 {
        issues.push("brakes very hot");
    }
    if car.engine_temperature > 120 {
        issues.push("engine hot");
    }

    if issues.is_empty() {
        Some(format!(
            "All good! {} kilometres per hour, tyres {tyres:.0} degrees, brakes {brakes:.0} degrees. Keep it up!",
            car.speed_kph
        ))
    } else {
        Some(format!("Heads up: {}. Otherwise all OK.", issues.join(", ")))
    }
}

fn help(engineer: &str) -> String {
    format!(
        "Say {engineer} then: tyres, brakes, speed, position, lap time, strategy, gap, fuel, \
         DRS, engine, weather, pressures, wear, rivals, status or advice."
    )
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars).collect()
    })
}
