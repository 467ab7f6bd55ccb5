// src/workspace/mod.rs
//! In-memory editing session for one chat: the current file set, its tree,
//! the selected file, the preview slots and the generation status. Changes
//! are announced on a typed broadcast bus so every view of the chat (the
//! dashboard, websocket clients) stays in step.

pub mod registry;

use crate::generation::GenerationOutcome;
use crate::models::chat::Chat;
use crate::project::preview::{project_preview, render_preview_frame, PreviewSlot, PreviewSlots};
use crate::project::scaffold::{default_scaffold, merge_with_scaffold};
use crate::project::tree::{build_file_tree, FileNode};
use crate::project::{
    find_file, legacy_files, parse_files_json, GeneratedFile, ProjectError, ENTRY_PAGE_PATH,
};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::broadcast;

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkspaceEvent {
    GenerationStarted,
    GenerationCompleted { file_count: usize },
    GenerationFailed { message: String },
    GenerationCancelled,
    FileSelected { path: String },
    FileEdited {
        path: String,
        preview_slot: Option<PreviewSlot>,
    },
    /// The workspace was closed; reopen the chat to keep following it.
    Detached,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WorkspaceError {
    #[error("a generation is already in progress for this chat")]
    AlreadyGenerating,
    #[error("no file is selected")]
    NoFileSelected,
    #[error(transparent)]
    Project(#[from] ProjectError),
}

/// Serializable view of a workspace.
#[derive(Debug, Clone, Serialize)]
pub struct WorkspaceSnapshot {
    pub chat_id: String,
    pub files: Vec<GeneratedFile>,
    pub tree: Vec<FileNode>,
    pub selected_path: Option<String>,
    pub selected_content: Option<String>,
    pub preview: PreviewSlots,
    pub preview_frame: String,
    pub generating: bool,
    pub error: Option<String>,
}

#[derive(Debug)]
pub struct ChatWorkspace {
    chat_id: String,
    files: Vec<GeneratedFile>,
    tree: Vec<FileNode>,
    preview: PreviewSlots,
    selected_path: Option<String>,
    generating: bool,
    error: Option<String>,
    events: broadcast::Sender<WorkspaceEvent>,
}

impl ChatWorkspace {
    /// Builds a workspace from stored files laid over the default scaffold.
    pub fn new(chat_id: impl Into<String>, stored: &[GeneratedFile]) -> Self {
        let files = merge_with_scaffold(&default_scaffold(), stored);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let mut workspace = Self {
            chat_id: chat_id.into(),
            tree: build_file_tree(&files),
            preview: project_preview(&files),
            files,
            selected_path: None,
            generating: false,
            error: None,
            events,
        };
        workspace.selected_path = workspace.default_selection();
        workspace
    }

    /// Loads a chat, preferring `files_json` over the legacy columns. An
    /// unreadable blob falls back to the legacy columns so the chat stays usable.
    pub fn from_chat(chat: &Chat) -> Self {
        let stored = match chat.files_json.as_deref().filter(|json| !json.is_empty()) {
            Some(json) => parse_files_json(json).unwrap_or_else(|e| {
                tracing::warn!("⚠️ Stored files of chat {} are unreadable, using legacy columns: {}", chat.id, e);
                legacy_files(&chat.jsx_code, &chat.css_code)
            }),
            None => legacy_files(&chat.jsx_code, &chat.css_code),
        };
        let mut workspace = Self::new(chat.id.clone(), &stored);
        workspace.preview.html = chat.html_code.clone();
        workspace
    }

    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    pub fn files(&self) -> &[GeneratedFile] {
        &self.files
    }

    pub fn preview(&self) -> &PreviewSlots {
        &self.preview
    }

    pub fn selected_path(&self) -> Option<&str> {
        self.selected_path.as_deref()
    }

    pub fn is_generating(&self) -> bool {
        self.generating
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WorkspaceEvent> {
        self.events.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.events.receiver_count()
    }

    pub fn detach(&self) {
        self.emit(WorkspaceEvent::Detached);
    }

    pub fn select_file(&mut self, path: &str) -> Result<&GeneratedFile, WorkspaceError> {
        if find_file(&self.files, path).is_none() {
            return Err(ProjectError::FileNotFound(path.to_string()).into());
        }
        self.selected_path = Some(path.to_string());
        self.emit(WorkspaceEvent::FileSelected {
            path: path.to_string(),
        });
        find_file(&self.files, path).ok_or_else(|| ProjectError::FileNotFound(path.to_string()).into())
    }

    /// Replaces the selected file's content and mirrors it into the preview
    /// when the file feeds one of its slots. Allowed while a generation is in
    /// flight; whichever write lands last wins.
    pub fn edit_selected(&mut self, content: &str) -> Result<Option<PreviewSlot>, WorkspaceError> {
        let path = self.selected_path.clone().ok_or(WorkspaceError::NoFileSelected)?;
        let file = self
            .files
            .iter_mut()
            .find(|file| file.path == path)
            .ok_or_else(|| ProjectError::FileNotFound(path.clone()))?;
        file.content = content.to_string();

        self.tree = build_file_tree(&self.files);
        let preview_slot = self.preview.apply_edit(&path, content);
        self.emit(WorkspaceEvent::FileEdited { path, preview_slot });
        Ok(preview_slot)
    }

    pub fn begin_generation(&mut self) -> Result<(), WorkspaceError> {
        if self.generating {
            return Err(WorkspaceError::AlreadyGenerating);
        }
        self.generating = true;
        self.error = None;
        self.emit(WorkspaceEvent::GenerationStarted);
        Ok(())
    }

    pub fn complete_generation(&mut self, outcome: GenerationOutcome) {
        self.tree = build_file_tree(&outcome.files);
        self.files = outcome.files;
        self.preview = outcome.preview;
        self.selected_path = self.default_selection();
        self.generating = false;
        self.error = None;
        self.emit(WorkspaceEvent::GenerationCompleted {
            file_count: self.files.len(),
        });
    }

    /// Surfaces `message` in the error slot. Files are left untouched.
    pub fn fail_generation(&mut self, message: impl Into<String>) {
        let message = message.into();
        self.generating = false;
        self.error = Some(message.clone());
        self.emit(WorkspaceEvent::GenerationFailed { message });
    }

    pub fn cancel_generation(&mut self) {
        self.generating = false;
        self.emit(WorkspaceEvent::GenerationCancelled);
    }

    pub fn snapshot(&self) -> WorkspaceSnapshot {
        let selected_content = self
            .selected_path
            .as_deref()
            .and_then(|path| find_file(&self.files, path))
            .map(|file| file.content.clone());

        WorkspaceSnapshot {
            chat_id: self.chat_id.clone(),
            files: self.files.clone(),
            tree: self.tree.clone(),
            selected_path: self.selected_path.clone(),
            selected_content,
            preview: self.preview.clone(),
            preview_frame: render_preview_frame(&self.preview),
            generating: self.generating,
            error: self.error.clone(),
        }
    }

    fn default_selection(&self) -> Option<String> {
        find_file(&self.files, ENTRY_PAGE_PATH)
            .or_else(|| self.files.first())
            .map(|file| file.path.clone())
    }

    fn emit(&self, event: WorkspaceEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}
