// src/generation/mod.rs
//! Talking to code-generation backends: request/response shapes, the prompt,
//! the workflow webhook and the poller that waits for its callback.

pub mod poller;
pub mod prompt;
pub mod workflow;

use crate::project::preview::{project_preview, PreviewSlots};
use crate::project::scaffold::merge_with_scaffold;
use crate::project::{legacy_files, validate_file_paths, GeneratedFile, ProjectError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const GENERIC_FAILURE_MESSAGE: &str = "Failed to generate code.";
pub const TIMEOUT_MESSAGE: &str = "Timeout: the generation backend did not respond in time.";

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("malformed backend response: {0}")]
    MalformedResponse(String),
    #[error("backend returned invalid files: {0}")]
    InvalidFiles(#[from] ProjectError),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("{0} is not configured")]
    NotConfigured(&'static str),
    #[error("no response from the backend before the deadline")]
    TimedOut,
}

impl GenerationError {
    /// Text shown in the workspace error slot.
    pub fn user_message(&self) -> &'static str {
        match self {
            GenerationError::TimedOut => TIMEOUT_MESSAGE,
            _ => GENERIC_FAILURE_MESSAGE,
        }
    }
}

/// Single-file shape returned by the original generation prompt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyCode {
    pub html: String,
    pub css: String,
    pub jsx: String,
}

/// The two response shapes a backend may send, validated on receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GenerationResponse {
    Legacy(LegacyCode),
    Files { files: Vec<GeneratedFile> },
}

impl GenerationResponse {
    /// Extracts the outermost JSON object from model output (which may be
    /// wrapped in prose or code fences) and classifies it.
    pub fn from_model_text(text: &str) -> Result<Self, GenerationError> {
        let start = text.find('{');
        let end = text.rfind('}');
        let json = match (start, end) {
            (Some(start), Some(end)) if start < end => &text[start..=end],
            _ => {
                return Err(GenerationError::MalformedResponse(
                    "response did not contain a JSON object".to_string(),
                ))
            }
        };
        let value: Value = serde_json::from_str(json)
            .map_err(|e| GenerationError::MalformedResponse(e.to_string()))?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, GenerationError> {
        let Value::Object(mut map) = value else {
            return Err(GenerationError::MalformedResponse(
                "expected a JSON object".to_string(),
            ));
        };

        if let Some(files) = map.remove("files") {
            let files: Vec<GeneratedFile> = serde_json::from_value(files).map_err(|e| {
                GenerationError::MalformedResponse(format!("`files` is not a file list: {}", e))
            })?;
            validate_file_paths(&files)?;
            return Ok(GenerationResponse::Files { files });
        }

        let mut take = |key: &str| match map.remove(key) {
            Some(Value::String(code)) => Ok(code),
            Some(_) => Err(GenerationError::MalformedResponse(format!(
                "`{}` is not a string",
                key
            ))),
            None => Err(GenerationError::MalformedResponse(format!(
                "missing `{}` (expected `files` or `html`/`css`/`jsx`)",
                key
            ))),
        };
        Ok(GenerationResponse::Legacy(LegacyCode {
            html: take("html")?,
            css: take("css")?,
            jsx: take("jsx")?,
        }))
    }

    /// Turns the response into the chat's complete file set and preview.
    pub fn into_outcome(self, scaffold: &[GeneratedFile]) -> GenerationOutcome {
        match self {
            GenerationResponse::Files { files } => GenerationOutcome::from_files(scaffold, &files),
            GenerationResponse::Legacy(code) => {
                let files = merge_with_scaffold(scaffold, &legacy_files(&code.jsx, &code.css));
                GenerationOutcome {
                    files,
                    preview: PreviewSlots {
                        html: code.html,
                        css: code.css,
                        js: code.jsx,
                    },
                }
            }
        }
    }
}

/// A chat's state after a successful generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerationOutcome {
    pub files: Vec<GeneratedFile>,
    pub preview: PreviewSlots,
}

impl GenerationOutcome {
    pub fn from_files(scaffold: &[GeneratedFile], generated: &[GeneratedFile]) -> Self {
        let files = merge_with_scaffold(scaffold, generated);
        let preview = project_preview(&files);
        Self { files, preview }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    Legacy,
    #[default]
    Files,
}

/// What a synchronous backend is asked to do.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub prompt: String,
    pub mode: OutputMode,
    pub files: Vec<GeneratedFile>,
    pub preview: PreviewSlots,
}

#[async_trait]
pub trait CodeGenerator: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResponse, GenerationError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::{ENTRY_PAGE_PATH, GLOBAL_STYLESHEET_PATH};
    use serde_json::json;

    #[test]
    fn parses_files_shape() {
        let text = r#"Here you go:
```json
{"files": [{"path": "app/page.tsx", "content": "X"}]}
```"#;
        let response = GenerationResponse::from_model_text(text).unwrap();
        assert_eq!(
            response,
            GenerationResponse::Files {
                files: vec![GeneratedFile::new("app/page.tsx", "X")]
            }
        );
    }

    #[test]
    fn parses_legacy_shape() {
        let response =
            GenerationResponse::from_value(json!({"html": "", "css": "a{}", "jsx": "<A/>"})).unwrap();
        assert_eq!(
            response,
            GenerationResponse::Legacy(LegacyCode {
                html: String::new(),
                css: "a{}".to_string(),
                jsx: "<A/>".to_string(),
            })
        );
    }

    #[test]
    fn rejects_unknown_or_broken_shapes() {
        assert!(matches!(
            GenerationResponse::from_model_text("no json here"),
            Err(GenerationError::MalformedResponse(_))
        ));
        assert!(matches!(
            GenerationResponse::from_model_text("{ broken"),
            Err(GenerationError::MalformedResponse(_))
        ));
        assert!(matches!(
            GenerationResponse::from_value(json!([1, 2])),
            Err(GenerationError::MalformedResponse(_))
        ));
        assert!(matches!(
            GenerationResponse::from_value(json!({"html": "", "css": ""})),
            Err(GenerationError::MalformedResponse(_))
        ));
        assert!(matches!(
            GenerationResponse::from_value(json!({"html": "", "css": 3, "jsx": ""})),
            Err(GenerationError::MalformedResponse(_))
        ));
        assert!(matches!(
            GenerationResponse::from_value(json!({"files": "app/page.tsx"})),
            Err(GenerationError::MalformedResponse(_))
        ));
    }

    #[test]
    fn rejects_inconsistent_file_paths() {
        let value = json!({"files": [
            {"path": "app", "content": ""},
            {"path": "app/page.tsx", "content": ""}
        ]});
        assert!(matches!(
            GenerationResponse::from_value(value),
            Err(GenerationError::InvalidFiles(ProjectError::FileFolderConflict(_)))
        ));
    }

    #[test]
    fn files_outcome_merges_scaffold_and_projects_preview() {
        let scaffold = vec![
            GeneratedFile::new("package.json", "{}"),
            GeneratedFile::new(GLOBAL_STYLESHEET_PATH, "scaffold css"),
            GeneratedFile::new(ENTRY_PAGE_PATH, "scaffold page"),
        ];
        let response = GenerationResponse::Files {
            files: vec![GeneratedFile::new(ENTRY_PAGE_PATH, "X")],
        };

        let outcome = response.into_outcome(&scaffold);

        assert_eq!(outcome.files.len(), 3);
        assert_eq!(outcome.preview.js, "X");
        assert_eq!(outcome.preview.css, "scaffold css");
        assert_eq!(outcome.preview.html, "");
    }

    #[test]
    fn legacy_outcome_keeps_html_slot() {
        let response = GenerationResponse::Legacy(LegacyCode {
            html: "<div id=\"root\"></div>".to_string(),
            css: "body{}".to_string(),
            jsx: "<App/>".to_string(),
        });

        let outcome = response.into_outcome(&[]);

        assert_eq!(outcome.preview.html, "<div id=\"root\"></div>");
        assert_eq!(
            outcome.files,
            vec![
                GeneratedFile::new(ENTRY_PAGE_PATH, "<App/>"),
                GeneratedFile::new(GLOBAL_STYLESHEET_PATH, "body{}"),
            ]
        );
    }

    #[test]
    fn only_timeouts_get_the_timeout_message() {
        assert_eq!(GenerationError::TimedOut.user_message(), TIMEOUT_MESSAGE);
        assert_eq!(
            GenerationError::Transport("refused".into()).user_message(),
            GENERIC_FAILURE_MESSAGE
        );
    }
}
