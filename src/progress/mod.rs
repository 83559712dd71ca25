//! Ordered progress event stream for a pipeline run
//!
//! A [`ProgressLog`] is append-only. Observers may poll the full sequence at
//! any time through [`ProgressLog::events`] or follow it live through
//! [`ProgressLog::subscribe`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;

pub mod reporter;
pub use reporter::TracingProgressReporter;

/// Capacity of the live broadcast channel. Slow subscribers lag, the log itself never drops.
const LIVE_CHANNEL_CAPACITY: usize = 256;

/// Stage-scoped event kinds exposed to observers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProgressEventKind {
    ValidatingInput,
    PlanningProject,
    GeneratingFiles,
    GeneratingFile,
    FileGenerated,
    GeneratingTests,
    RunningSanityChecks,
    PackagingOutput,
    Error,
    Done,
}

impl ProgressEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressEventKind::ValidatingInput => "VALIDATING_INPUT",
            ProgressEventKind::PlanningProject => "PLANNING_PROJECT",
            ProgressEventKind::GeneratingFiles => "GENERATING_FILES",
            ProgressEventKind::GeneratingFile => "GENERATING_FILE",
            ProgressEventKind::FileGenerated => "FILE_GENERATED",
            ProgressEventKind::GeneratingTests => "GENERATING_TESTS",
            ProgressEventKind::RunningSanityChecks => "RUNNING_SANITY_CHECKS",
            ProgressEventKind::PackagingOutput => "PACKAGING_OUTPUT",
            ProgressEventKind::Error => "ERROR",
            ProgressEventKind::Done => "DONE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressLevel {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub kind: ProgressEventKind,
    pub timestamp: DateTime<Utc>,
    pub level: ProgressLevel,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

impl ProgressEvent {
    pub fn new(kind: ProgressEventKind, message: impl Into<String>) -> Self {
        let level = match kind {
            ProgressEventKind::Error => ProgressLevel::Error,
            ProgressEventKind::FileGenerated | ProgressEventKind::Done => ProgressLevel::Success,
            _ => ProgressLevel::Info,
        };
        Self {
            kind,
            timestamp: Utc::now(),
            level,
            message: message.into(),
            payload: None,
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn with_level(mut self, level: ProgressLevel) -> Self {
        self.level = level;
        self
    }

    /// Artifact path carried in the payload, if any
    pub fn path(&self) -> Option<&str> {
        self.payload
            .as_ref()
            .and_then(|p| p.get("path"))
            .and_then(|p| p.as_str())
    }
}

/// Append-only, shareable record of a run's progress events
#[derive(Debug, Clone)]
pub struct ProgressLog {
    events: Arc<RwLock<Vec<ProgressEvent>>>,
    live: broadcast::Sender<ProgressEvent>,
}

impl Default for ProgressLog {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressLog {
    pub fn new() -> Self {
        let (live, _) = broadcast::channel(LIVE_CHANNEL_CAPACITY);
        Self {
            events: Arc::new(RwLock::new(Vec::new())),
            live,
        }
    }

    /// Append an event stamped with the current time
    pub fn emit(&self, kind: ProgressEventKind, message: impl Into<String>) {
        self.push(ProgressEvent::new(kind, message));
    }

    /// Append an event carrying a structured payload
    pub fn emit_with(
        &self,
        kind: ProgressEventKind,
        message: impl Into<String>,
        payload: serde_json::Value,
    ) {
        self.push(ProgressEvent::new(kind, message).with_payload(payload));
    }

    pub fn push(&self, event: ProgressEvent) {
        // Holding the write lock across the broadcast keeps live order identical to log order
        let mut events = self.events.write().unwrap_or_else(|e| e.into_inner());
        events.push(event.clone());
        // No subscribers is fine
        let _ = self.live.send(event);
    }

    /// Snapshot of every event emitted so far, in causal order
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.events.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Kinds of every event emitted so far, in order
    pub fn kinds(&self) -> Vec<ProgressEventKind> {
        self.events
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|e| e.kind)
            .collect()
    }

    /// Receive events emitted from now on
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.live.subscribe()
    }
}
