use super::{ProgressEvent, ProgressEventKind, ProgressLevel, ProgressLog};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProgressVerbosity {
    /// Stage boundaries, errors and completion only
    Minimal,
    #[default]
    Normal,
    /// Every event, including per-file start markers
    Verbose,
}

/// Forwards a run's live progress stream into the tracing pipeline
pub struct TracingProgressReporter {
    verbosity: ProgressVerbosity,
}

impl TracingProgressReporter {
    pub fn new(verbosity: ProgressVerbosity) -> Self {
        Self { verbosity }
    }

    /// Whether an event passes the configured verbosity filter
    pub fn should_report(&self, event: &ProgressEvent) -> bool {
        match self.verbosity {
            ProgressVerbosity::Minimal => matches!(
                event.kind,
                ProgressEventKind::ValidatingInput
                    | ProgressEventKind::PlanningProject
                    | ProgressEventKind::GeneratingFiles
                    | ProgressEventKind::RunningSanityChecks
                    | ProgressEventKind::PackagingOutput
                    | ProgressEventKind::Error
                    | ProgressEventKind::Done
            ),
            ProgressVerbosity::Normal => event.kind != ProgressEventKind::GeneratingFile,
            ProgressVerbosity::Verbose => true,
        }
    }

    fn report(&self, event: &ProgressEvent) {
        if !self.should_report(event) {
            return;
        }

        let kind = event.kind.as_str();
        let path = event.path().unwrap_or("");
        match event.level {
            ProgressLevel::Error => error!(kind, path, "{}", event.message),
            ProgressLevel::Warning => warn!(kind, path, "{}", event.message),
            ProgressLevel::Info | ProgressLevel::Success => info!(kind, path, "{}", event.message),
        }
    }

    /// Follow `log` on a background task until the log is dropped or `DONE` is seen
    pub fn spawn(self, log: &ProgressLog) -> JoinHandle<()> {
        let mut rx = log.subscribe();

        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        self.report(&event);
                        if event.kind == ProgressEventKind::Done {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(skipped, "Progress reporter lagged behind the run");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}
