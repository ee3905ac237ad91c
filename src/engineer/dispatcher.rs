//! Command dispatch: local intents first, then remote providers

use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

use super::intents::{Intent, IntentCatalogue};
use crate::providers::ProviderRoster;
use crate::session::{SessionSnapshot, SnapshotHandle, context_summary};
use crate::voice::{SynthesizerHandle, VoiceCommand};

/// Where an answer came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "source", content = "name", rename_all = "snake_case")]
pub enum Provenance {
    Local(Intent),
    Remote(String),
    None,
}

/// Text to speak plus how it was produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssistantResponse {
    pub text: String,
    pub provenance: Provenance,
    pub latency: Duration,
}

impl AssistantResponse {
    /// Unprompted radio message derived from local data
    #[must_use]
    pub fn local(text: impl Into<String>, intent: Intent) -> Self {
        Self {
            text: text.into(),
            provenance: Provenance::Local(intent),
            latency: Duration::ZERO,
        }
    }
}

/// Reply when no handler and no provider could answer
#[must_use]
pub fn apology(engineer: &str) -> String {
    format!("Sorry, I didn't get that. Say '{engineer} help' for the list of commands.")
}

/// System instructions for remote providers: persona plus live data
#[must_use]
pub fn persona_context(engineer: &str, snapshot: &SessionSnapshot) -> String {
    let data = serde_json::to_string_pretty(&context_summary(snapshot))
        .unwrap_or_else(|_| "{}".to_string());
    format!(
        "You are {engineer}, a Formula 1 race engineer talking to your driver over team radio.\n\
         \n\
         Rules:\n\
         1. Answer very concisely, 2 to 4 sentences at most.\n\
         2. Be direct and professional, like a real race engineer on the radio.\n\
         3. Use the car data below to answer precisely.\n\
         4. If the question has nothing to do with the data, say so simply.\n\
         5. Never mention being an AI or an assistant.\n\
         6. Talk as if you are in the garage, on the radio with the driver.\n\
         7. Say \"we\" for the team (\"we'll box\", \"we're watching it\").\n\
         8. Be encouraging but factual.\n\
         9. Answer in the language the driver used.\n\
         \n\
         Current car data:\n{data}"
    )
}

/// Resolves driver commands into responses
pub struct Dispatcher {
    catalogue: IntentCatalogue,
    roster: ProviderRoster,
    engineer: String,
}

impl Dispatcher {
    #[must_use]
    pub fn new(engineer: impl Into<String>, roster: ProviderRoster) -> Self {
        Self {
            catalogue: IntentCatalogue::builtin(),
            roster,
            engineer: engineer.into(),
        }
    }

    #[must_use]
    pub const fn roster(&self) -> &ProviderRoster {
        &self.roster
    }

    /// Answer a command against a snapshot
    ///
    /// Never fails: when nothing can answer, the apology comes back with
    /// provenance `None`.
    pub async fn resolve(
        &mut self,
        command: &VoiceCommand,
        snapshot: &SessionSnapshot,
    ) -> AssistantResponse {
        let started = Instant::now();
        let question = command.transcript.trim();

        if let Some(intent) = self.catalogue.classify(question) {
            tracing::debug!(intent = intent.name(), "answered locally");
            return AssistantResponse {
                text: intent.answer(snapshot, &self.engineer),
                provenance: Provenance::Local(intent),
                latency: started.elapsed(),
            };
        }

        let prompt = format!("Driver: \"{question}\"");
        let context = persona_context(&self.engineer, snapshot);
        if let Some(answer) = self.roster.complete(&prompt, &context).await {
            return AssistantResponse {
                text: answer.text,
                provenance: Provenance::Remote(answer.provider),
                latency: started.elapsed(),
            };
        }

        if !self.roster.is_empty() {
            tracing::warn!(providers = self.roster.len(), "no provider answered");
        }
        AssistantResponse {
            text: apology(&self.engineer),
            provenance: Provenance::None,
            latency: started.elapsed(),
        }
    }

    /// Answer commands until shutdown, handing responses to the synthesizer
    ///
    /// A provider request still in flight at shutdown is abandoned.
    pub async fn run(
        mut self,
        mut commands: mpsc::Receiver<VoiceCommand>,
        snapshots: SnapshotHandle,
        synthesizer: SynthesizerHandle,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                res = shutdown.changed() => {
                    if res.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                command = commands.recv() => {
                    let Some(command) = command else { break };
                    let snapshot = snapshots.current();
                    let response = tokio::select! {
                        response = self.resolve(&command, &snapshot) => response,
                        _ = shutdown.changed() => break,
                    };
                    tracing::info!(
                        command_id = %command.id,
                        transcript = %command.transcript,
                        provenance = ?response.provenance,
                        latency_ms = u64::try_from(response.latency.as_millis()).unwrap_or(u64::MAX),
                        "command resolved"
                    );
                    if let Some(dropped) = synthesizer.enqueue(response) {
                        tracing::debug!(text = %dropped.text, "dropped stale pending response");
                    }
                }
            }
        }
        tracing::debug!("dispatcher stopped");
    }
}
