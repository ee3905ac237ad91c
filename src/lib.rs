//! Race Engineer - a voice race engineer for F1 25
//!
//! This library provides the core functionality:
//! - UDP telemetry decoding (packet format 2025)
//! - Live session state merged from the packet stream
//! - Wake word recognition, STT and TTS
//! - Local intent answers with remote provider failover
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                 F1 25 (UDP 20777)                    │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │   Telemetry decoder  │  Session aggregator          │
//! └────────────────────┬────────────────────────────────┘
//!                      │ snapshots
//! ┌────────────────────▼────────────────────────────────┐
//! │   Recognizer  │  Dispatcher  │  Advisor  │  Synth    │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │   Providers: Mistral │ NVIDIA │ Gemini │ OpenAI │ …  │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod daemon;
pub mod engineer;
pub mod error;
pub mod providers;
pub mod session;
pub mod telemetry;
pub mod voice;

pub use config::{CliOverrides, Config};
pub use daemon::Daemon;
pub use engineer::{AssistantResponse, Dispatcher, Intent, Provenance};
pub use error::{Error, Result};
pub use providers::{CompletionProvider, ProviderError, ProviderRoster};
pub use session::{SessionAggregator, SessionSnapshot, SnapshotHandle};
pub use telemetry::{DecodeError, TelemetryPacket, decode, encode};
