//! Live session state built from decoded telemetry

mod aggregator;
mod state;
mod summary;

pub use aggregator::{
    ApplyOutcome, EVENT_RING_CAPACITY, LapCompleted, SessionAggregator, SnapshotHandle,
};
pub use state::{
    CarState, LapRecord, Participant, RaceEvent, SessionSnapshot, SessionState, weather_label,
};
pub use summary::{context_summary, format_gap, format_lap_time};
