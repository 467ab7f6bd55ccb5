// src/generation/poller.rs
//! Waits for an asynchronous generation to land in the store by re-reading the
//! chat's `files_json` until it differs from the value seen at dispatch.

use crate::models::StoreError;
use crate::project::{parse_files_json, GeneratedFile};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);
pub const DEFAULT_POLL_DEADLINE: Duration = Duration::from_secs(60);

/// Read side of the chat store the poller depends on.
#[async_trait]
pub trait FilesSnapshotSource: Send + Sync {
    async fn files_json(&self, chat_id: &str) -> Result<Option<String>, StoreError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PollState {
    Pending,
    Succeeded { files: Vec<GeneratedFile> },
    TimedOut,
    Failed { message: String },
    Cancelled,
}

impl PollState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PollState::Pending)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PollConfig {
    pub interval: Duration,
    pub deadline: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            deadline: DEFAULT_POLL_DEADLINE,
        }
    }
}

/// Handle to a running poll task.
#[derive(Debug, Clone)]
pub struct GenerationPoll {
    state: watch::Receiver<PollState>,
    cancel: CancellationToken,
}

impl GenerationPoll {
    /// Starts polling `chat_id`. `baseline` is the `files_json` value read
    /// when the generation was dispatched.
    pub fn spawn(
        source: Arc<dyn FilesSnapshotSource>,
        chat_id: String,
        baseline: Option<String>,
        config: PollConfig,
    ) -> Self {
        let (tx, rx) = watch::channel(PollState::Pending);
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();

        tokio::spawn(async move {
            let outcome = poll_until_changed(source.as_ref(), &chat_id, baseline, config, task_cancel).await;
            match &outcome {
                PollState::Succeeded { files } => {
                    tracing::info!("✅ Generation for chat {} landed with {} files", chat_id, files.len())
                }
                PollState::TimedOut => tracing::warn!("⏰ Generation for chat {} timed out", chat_id),
                PollState::Failed { message } => {
                    tracing::error!("❌ Polling chat {} failed: {}", chat_id, message)
                }
                PollState::Cancelled => tracing::info!("🛑 Polling chat {} cancelled", chat_id),
                PollState::Pending => {}
            }
            tx.send_replace(outcome);
        });

        Self { state: rx, cancel }
    }

    pub fn state(&self) -> PollState {
        self.state.borrow().clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.state.borrow().is_terminal()
    }

    /// Resolves once the poll reaches a terminal state.
    pub async fn wait(&self) -> PollState {
        let mut state = self.state.clone();
        let result = match state.wait_for(PollState::is_terminal).await {
            Ok(terminal) => terminal.clone(),
            // Task ended without publishing (runtime shutdown).
            Err(_) => PollState::Cancelled,
        };
        result
    }
}

async fn poll_until_changed(
    source: &dyn FilesSnapshotSource,
    chat_id: &str,
    baseline: Option<String>,
    config: PollConfig,
    cancel: CancellationToken,
) -> PollState {
    let deadline = tokio::time::sleep(config.deadline);
    tokio::pin!(deadline);

    let mut ticker = tokio::time::interval(config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // First tick completes immediately; the first read happens one interval in.
    ticker.tick().await;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return PollState::Cancelled,
            _ = &mut deadline => return PollState::TimedOut,
            _ = ticker.tick() => {
                match source.files_json(chat_id).await {
                    Ok(Some(current)) if !current.is_empty() && Some(&current) != baseline.as_ref() => {
                        return match parse_files_json(&current) {
                            Ok(files) => PollState::Succeeded { files },
                            Err(e) => PollState::Failed { message: e.to_string() },
                        };
                    }
                    Ok(_) => tracing::debug!("Chat {} unchanged, polling again", chat_id),
                    Err(StoreError::NotFound) => {
                        return PollState::Failed { message: format!("chat {} no longer exists", chat_id) };
                    }
                    Err(e) => tracing::warn!("Polling chat {} failed, retrying next tick: {}", chat_id, e),
                }
            }
        }
    }
}
