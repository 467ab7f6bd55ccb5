// src/workspace/registry.rs
use super::ChatWorkspace;
use crate::generation::poller::{FilesSnapshotSource, GenerationPoll, PollConfig, PollState};
use crate::generation::{GenerationError, GenerationOutcome, GENERIC_FAILURE_MESSAGE};
use crate::models::chat::Chat;
use crate::project::scaffold::default_scaffold;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};

pub type SharedWorkspace = Arc<Mutex<ChatWorkspace>>;

/// Workspaces untouched for this long are dropped by the sweeper.
pub const DEFAULT_IDLE_TTL: Duration = Duration::from_secs(30 * 60);
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

struct WorkspaceEntry {
    workspace: SharedWorkspace,
    last_used: std::sync::Mutex<Instant>,
}

impl WorkspaceEntry {
    fn touch(&self) {
        let mut last_used = self.last_used.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *last_used = Instant::now();
    }

    fn idle_for(&self) -> Duration {
        self.last_used
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .elapsed()
    }
}

struct PollEntry {
    id: u64,
    poll: GenerationPoll,
}

/// Open workspaces and their asynchronous generations, keyed by chat id.
pub struct WorkspaceRegistry {
    workspaces: RwLock<HashMap<String, WorkspaceEntry>>,
    polls: RwLock<HashMap<String, PollEntry>>,
    next_poll_id: AtomicU64,
}

pub type SharedWorkspaceRegistry = Arc<WorkspaceRegistry>;

impl WorkspaceRegistry {
    pub fn new() -> Self {
        Self {
            workspaces: RwLock::new(HashMap::new()),
            polls: RwLock::new(HashMap::new()),
            next_poll_id: AtomicU64::new(1),
        }
    }

    pub async fn open_count(&self) -> usize {
        self.workspaces.read().await.len()
    }

    pub async fn get(&self, chat_id: &str) -> Option<SharedWorkspace> {
        self.workspaces.read().await.get(chat_id).map(|entry| {
            entry.touch();
            entry.workspace.clone()
        })
    }

    /// Returns the open workspace for `chat`, loading it on first use.
    pub async fn open(&self, chat: &Chat) -> SharedWorkspace {
        if let Some(workspace) = self.get(&chat.id).await {
            return workspace;
        }

        let loaded = ChatWorkspace::from_chat(chat);
        let mut workspaces = self.workspaces.write().await;
        workspaces
            .entry(chat.id.clone())
            .or_insert_with(|| {
                tracing::debug!("📂 Opened workspace for chat {}", chat.id);
                WorkspaceEntry {
                    workspace: Arc::new(Mutex::new(loaded)),
                    last_used: std::sync::Mutex::new(Instant::now()),
                }
            })
            .workspace
            .clone()
    }

    /// Drops the open workspace of `chat_id` unless it is generating, so the
    /// next open reloads it from the store. Its subscribers are told to
    /// reattach. Returns whether it was dropped.
    pub async fn detach_if_idle(&self, chat_id: &str) -> bool {
        let mut workspaces = self.workspaces.write().await;
        let Some(shared) = workspaces.get(chat_id).map(|entry| entry.workspace.clone()) else {
            return false;
        };
        // Workspace locks are never held while waiting on the registry.
        let workspace = shared.lock().await;
        if workspace.is_generating() {
            return false;
        }
        workspace.detach();
        drop(workspace);

        workspaces.remove(chat_id);
        tracing::debug!("📤 Detached workspace for chat {}", chat_id);
        true
    }

    /// Drops workspaces idle for at least `ttl` that nobody holds: no
    /// handler or socket, no subscriber, no generation. Returns how many.
    pub async fn evict_idle(&self, ttl: Duration) -> usize {
        let polling: HashSet<String> = self.polls.read().await.keys().cloned().collect();
        let mut workspaces = self.workspaces.write().await;
        let before = workspaces.len();

        workspaces.retain(|chat_id, entry| {
            if polling.contains(chat_id) || entry.idle_for() < ttl || Arc::strong_count(&entry.workspace) > 1 {
                return true;
            }
            match entry.workspace.try_lock() {
                Ok(workspace) => workspace.is_generating() || workspace.subscriber_count() > 0,
                Err(_) => true,
            }
        });

        let evicted = before - workspaces.len();
        if evicted > 0 {
            tracing::debug!("🧹 Evicted {} idle workspaces", evicted);
        }
        evicted
    }

    /// Runs [`Self::evict_idle`] every `every` for the life of the process.
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration, ttl: Duration) {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                registry.evict_idle(ttl).await;
            }
        });
    }

    /// Starts polling for an asynchronous generation of `chat_id` and applies
    /// its terminal state to the workspace once reached.
    pub async fn start_poll(
        self: &Arc<Self>,
        workspace: SharedWorkspace,
        source: Arc<dyn FilesSnapshotSource>,
        baseline: Option<String>,
        config: PollConfig,
    ) -> GenerationPoll {
        let chat_id = workspace.lock().await.chat_id().to_string();
        let poll = GenerationPoll::spawn(source, chat_id.clone(), baseline, config);
        let id = self.next_poll_id.fetch_add(1, Ordering::Relaxed);

        if let Some(previous) = self.polls.write().await.insert(
            chat_id.clone(),
            PollEntry {
                id,
                poll: poll.clone(),
            },
        ) {
            previous.poll.cancel();
        }

        let registry = Arc::clone(self);
        let follower = poll.clone();
        tokio::spawn(async move {
            let state = follower.wait().await;
            if !registry.finish_poll(&chat_id, id).await {
                tracing::debug!("Ignoring superseded poll result for chat {}", chat_id);
                return;
            }
            apply_poll_state(&workspace, state).await;
        });

        poll
    }

    pub async fn poll_state(&self, chat_id: &str) -> Option<PollState> {
        self.polls.read().await.get(chat_id).map(|entry| entry.poll.state())
    }

    /// Cancels the in-flight poll for `chat_id`. Returns false when nothing
    /// was running.
    pub async fn cancel_poll(&self, chat_id: &str) -> bool {
        match self.polls.read().await.get(chat_id) {
            Some(entry) if !entry.poll.is_finished() => {
                entry.poll.cancel();
                true
            }
            _ => false,
        }
    }

    /// Removes the poll entry if `id` is still the current poll of `chat_id`.
    async fn finish_poll(&self, chat_id: &str, id: u64) -> bool {
        let mut polls = self.polls.write().await;
        match polls.get(chat_id) {
            Some(entry) if entry.id == id => {
                polls.remove(chat_id);
                true
            }
            _ => false,
        }
    }
}

impl Default for WorkspaceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

async fn apply_poll_state(workspace: &SharedWorkspace, state: PollState) {
    let mut workspace = workspace.lock().await;
    match state {
        PollState::Succeeded { files } => {
            workspace.complete_generation(GenerationOutcome::from_files(&default_scaffold(), &files));
        }
        PollState::TimedOut => workspace.fail_generation(GenerationError::TimedOut.user_message()),
        PollState::Failed { message } => {
            tracing::error!("Generation for chat {} failed: {}", workspace.chat_id(), message);
            workspace.fail_generation(GENERIC_FAILURE_MESSAGE);
        }
        PollState::Cancelled => workspace.cancel_generation(),
        PollState::Pending => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::TIMEOUT_MESSAGE;
    use crate::models::StoreError;
    use crate::project::{find_file, ENTRY_PAGE_PATH};
    use crate::workspace::WorkspaceEvent;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::time::Duration;

    struct FixedSource(Option<String>);

    #[async_trait]
    impl FilesSnapshotSource for FixedSource {
        async fn files_json(&self, _chat_id: &str) -> Result<Option<String>, StoreError> {
            Ok(self.0.clone())
        }
    }

    fn chat() -> Chat {
        Chat {
            id: "chat-1".to_string(),
            user_id: 1,
            name: "New Chat".to_string(),
            html_code: String::new(),
            css_code: String::new(),
            jsx_code: String::new(),
            files_json: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn quick(deadline_ms: u64) -> PollConfig {
        PollConfig {
            interval: Duration::from_millis(10),
            deadline: Duration::from_millis(deadline_ms),
        }
    }

    #[tokio::test]
    async fn open_returns_the_same_workspace() {
        let registry = WorkspaceRegistry::new();
        let a = registry.open(&chat()).await;
        let b = registry.open(&chat()).await;
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn unchanged_blob_until_deadline_surfaces_timeout() {
        let registry = Arc::new(WorkspaceRegistry::new());
        let workspace = registry.open(&chat()).await;
        let files_before = workspace.lock().await.files().to_vec();
        let mut events = {
            let mut ws = workspace.lock().await;
            ws.begin_generation().unwrap();
            ws.subscribe()
        };

        let source = Arc::new(FixedSource(None));
        registry
            .start_poll(workspace.clone(), source, None, quick(60))
            .await;

        let event = events.recv().await.unwrap();
        assert_eq!(
            event,
            WorkspaceEvent::GenerationFailed {
                message: TIMEOUT_MESSAGE.to_string()
            }
        );

        let ws = workspace.lock().await;
        assert_eq!(ws.error(), Some(TIMEOUT_MESSAGE));
        assert!(!ws.is_generating());
        assert_eq!(ws.files(), files_before.as_slice());
        drop(ws);
        assert_eq!(registry.poll_state("chat-1").await, None);
    }

    #[tokio::test]
    async fn landed_files_complete_the_generation() {
        let registry = Arc::new(WorkspaceRegistry::new());
        let workspace = registry.open(&chat()).await;
        let mut events = {
            let mut ws = workspace.lock().await;
            ws.begin_generation().unwrap();
            ws.subscribe()
        };

        let source = Arc::new(FixedSource(Some(
            r#"[{"path":"app/page.tsx","content":"X"}]"#.to_string(),
        )));
        registry
            .start_poll(workspace.clone(), source, None, quick(1_000))
            .await;

        assert!(matches!(
            events.recv().await.unwrap(),
            WorkspaceEvent::GenerationCompleted { .. }
        ));
        let ws = workspace.lock().await;
        assert!(!ws.is_generating());
        assert_eq!(find_file(ws.files(), ENTRY_PAGE_PATH).unwrap().content, "X");
        assert_eq!(ws.preview().js, "X");
    }

    #[tokio::test]
    async fn cancel_clears_generating_flag() {
        let registry = Arc::new(WorkspaceRegistry::new());
        let workspace = registry.open(&chat()).await;
        let mut events = {
            let mut ws = workspace.lock().await;
            ws.begin_generation().unwrap();
            ws.subscribe()
        };

        registry
            .start_poll(workspace.clone(), Arc::new(FixedSource(None)), None, quick(5_000))
            .await;
        assert!(registry.cancel_poll("chat-1").await);

        assert_eq!(events.recv().await.unwrap(), WorkspaceEvent::GenerationCancelled);
        assert!(!workspace.lock().await.is_generating());
        assert!(!registry.cancel_poll("chat-1").await);
    }

    fn chat_with(id: &str, files_json: Option<&str>) -> Chat {
        Chat {
            id: id.to_string(),
            files_json: files_json.map(str::to_string),
            ..chat()
        }
    }

    #[tokio::test]
    async fn idle_unheld_workspaces_are_evicted() {
        let registry = WorkspaceRegistry::new();
        for i in 0..50 {
            registry.open(&chat_with(&format!("chat-{}", i), None)).await;
        }
        let held = registry.open(&chat_with("held", None)).await;
        let generating = registry.open(&chat_with("busy", None)).await;
        generating.lock().await.begin_generation().unwrap();
        drop(generating);
        let watched = registry.open(&chat_with("watched", None)).await;
        let _events = watched.lock().await.subscribe();
        drop(watched);
        assert_eq!(registry.open_count().await, 53);

        assert_eq!(registry.evict_idle(Duration::from_secs(3600)).await, 0);
        assert_eq!(registry.evict_idle(Duration::ZERO).await, 50);

        assert_eq!(registry.open_count().await, 3);
        assert!(registry.get("held").await.is_some());
        assert!(registry.get("busy").await.is_some());
        assert!(registry.get("watched").await.is_some());
        drop(held);
    }

    #[tokio::test]
    async fn finished_polls_are_forgotten() {
        let registry = Arc::new(WorkspaceRegistry::new());
        let workspace = registry.open(&chat()).await;
        let mut events = {
            let mut ws = workspace.lock().await;
            ws.begin_generation().unwrap();
            ws.subscribe()
        };
        registry
            .start_poll(workspace.clone(), Arc::new(FixedSource(None)), None, quick(30))
            .await;
        events.recv().await.unwrap();
        assert_eq!(registry.poll_state("chat-1").await, None);
    }

    #[tokio::test]
    async fn late_result_after_timeout_leaves_surfaced_error_alone() {
        let registry = Arc::new(WorkspaceRegistry::new());
        let workspace = registry.open(&chat()).await;
        let files_before = workspace.lock().await.files().to_vec();
        let mut events = {
            let mut ws = workspace.lock().await;
            ws.begin_generation().unwrap();
            ws.subscribe()
        };
        registry
            .start_poll(workspace.clone(), Arc::new(FixedSource(None)), None, quick(30))
            .await;
        assert!(matches!(events.recv().await.unwrap(), WorkspaceEvent::GenerationFailed { .. }));

        // The workflow result lands in the store afterwards.
        assert!(registry.detach_if_idle("chat-1").await);
        assert_eq!(events.recv().await.unwrap(), WorkspaceEvent::Detached);

        {
            let ws = workspace.lock().await;
            assert_eq!(ws.error(), Some(TIMEOUT_MESSAGE));
            assert_eq!(ws.files(), files_before.as_slice());
        }

        let stored = r#"[{"path":"app/page.tsx","content":"Late"}]"#;
        let reopened = registry.open(&chat_with("chat-1", Some(stored))).await;
        assert!(!Arc::ptr_eq(&workspace, &reopened));
        assert_eq!(reopened.lock().await.preview().js, "Late");
    }

    #[tokio::test]
    async fn generating_workspace_is_not_detached() {
        let registry = WorkspaceRegistry::new();
        let workspace = registry.open(&chat()).await;
        workspace.lock().await.begin_generation().unwrap();

        assert!(!registry.detach_if_idle("chat-1").await);
        assert!(!registry.detach_if_idle("missing").await);
        assert_eq!(registry.open_count().await, 1);
    }
}
