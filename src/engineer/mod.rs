//! The race engineer: answers driver questions and speaks up unprompted

mod advisor;
mod dispatcher;
mod intents;

pub use advisor::{Advisor, AdvisorConfig, generate_advice};
pub use dispatcher::{AssistantResponse, Dispatcher, Provenance, apology, persona_context};
pub use intents::{Intent, IntentCatalogue, NO_DATA};
