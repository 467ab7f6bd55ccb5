// src/project/mod.rs
//! Generated project files and the pure logic that shapes them: the display
//! tree, the scaffold merge, the preview projection and the zip export.

pub mod export;
pub mod preview;
pub mod scaffold;
pub mod tree;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

/// Path of the page component that drives the live preview.
pub const ENTRY_PAGE_PATH: &str = "app/page.tsx";
/// Path of the stylesheet injected into the live preview.
pub const GLOBAL_STYLESHEET_PATH: &str = "app/globals.css";

/// One file emitted by the generation backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedFile {
    pub path: String,
    pub content: String,
}

impl GeneratedFile {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProjectError {
    #[error("file path is empty")]
    EmptyPath,
    #[error("invalid file path '{path}': {reason}")]
    InvalidPath { path: String, reason: &'static str },
    #[error("duplicate file path '{0}'")]
    DuplicatePath(String),
    #[error("path '{0}' is used both as a file and as a folder")]
    FileFolderConflict(String),
    #[error("invalid files json: {0}")]
    InvalidJson(String),
    #[error("file '{0}' not found")]
    FileNotFound(String),
}

/// Checks that a file set describes exactly one tree shape.
///
/// Rejects empty or absolute paths, empty / `.` / `..` segments, duplicate
/// paths, and any path that names a file where another path needs a folder.
pub fn validate_file_paths(files: &[GeneratedFile]) -> Result<(), ProjectError> {
    let mut file_paths: HashSet<&str> = HashSet::with_capacity(files.len());
    let mut folder_paths: HashSet<&str> = HashSet::new();

    for file in files {
        let path = file.path.as_str();
        if path.is_empty() {
            return Err(ProjectError::EmptyPath);
        }
        if path.starts_with('/') {
            return Err(invalid(path, "absolute paths are not allowed"));
        }
        if path.contains('\\') {
            return Err(invalid(path, "paths must use forward slashes"));
        }
        for segment in path.split('/') {
            match segment {
                "" => return Err(invalid(path, "empty path segment")),
                "." | ".." => return Err(invalid(path, "relative path segment")),
                _ => {}
            }
        }
        if !file_paths.insert(path) {
            return Err(ProjectError::DuplicatePath(path.to_string()));
        }
        for (index, _) in path.match_indices('/') {
            folder_paths.insert(&path[..index]);
        }
    }

    // Sorted so the reported conflict does not depend on hash order.
    let mut conflicts: Vec<&str> = file_paths.intersection(&folder_paths).copied().collect();
    conflicts.sort_unstable();
    match conflicts.first() {
        Some(path) => Err(ProjectError::FileFolderConflict(path.to_string())),
        None => Ok(()),
    }
}

fn invalid(path: &str, reason: &'static str) -> ProjectError {
    ProjectError::InvalidPath {
        path: path.to_string(),
        reason,
    }
}

/// Parses the persisted `files_json` blob and validates its paths.
pub fn parse_files_json(json: &str) -> Result<Vec<GeneratedFile>, ProjectError> {
    let files: Vec<GeneratedFile> =
        serde_json::from_str(json).map_err(|e| ProjectError::InvalidJson(e.to_string()))?;
    validate_file_paths(&files)?;
    Ok(files)
}

pub fn to_files_json(files: &[GeneratedFile]) -> Result<String, ProjectError> {
    serde_json::to_string(files).map_err(|e| ProjectError::InvalidJson(e.to_string()))
}

/// Rebuilds a file set from the single-file columns of chats that predate
/// `files_json`. Empty columns produce no file.
pub fn legacy_files(jsx_code: &str, css_code: &str) -> Vec<GeneratedFile> {
    let mut files = Vec::new();
    if !jsx_code.is_empty() {
        files.push(GeneratedFile::new(ENTRY_PAGE_PATH, jsx_code));
    }
    if !css_code.is_empty() {
        files.push(GeneratedFile::new(GLOBAL_STYLESHEET_PATH, css_code));
    }
    files
}

pub fn find_file<'a>(files: &'a [GeneratedFile], path: &str) -> Option<&'a GeneratedFile> {
    files.iter().find(|file| file.path == path)
}
