// src/generation/workflow.rs
use super::GenerationError;
use crate::project::GeneratedFile;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Body posted to the workflow webhook to start an asynchronous generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDispatch {
    pub prompt: String,
    pub chat_id: String,
    /// Current entry page.
    pub frontend_code: String,
    pub backend_code: String,
}

/// Body the workflow posts back once it has produced files.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowCallback {
    pub chat_id: String,
    #[serde(default)]
    pub prompt: Option<String>,
    pub files: Vec<GeneratedFile>,
}

#[derive(Debug, Deserialize)]
struct WebhookErrorBody {
    message: Option<String>,
}

/// Fire-and-acknowledge client for the workflow webhook. No retries: a
/// duplicate dispatch would run the workflow twice.
#[derive(Debug, Clone)]
pub struct WorkflowClient {
    client: Client,
    webhook_url: String,
}

impl WorkflowClient {
    pub fn new(webhook_url: String) -> Self {
        Self {
            client: Client::new(),
            webhook_url,
        }
    }

    pub async fn dispatch(&self, request: &WorkflowDispatch) -> Result<(), GenerationError> {
        tracing::info!("🚀 Dispatching chat {} to workflow webhook", request.chat_id);

        let response = self
            .client
            .post(&self.webhook_url)
            .timeout(Duration::from_secs(30))
            .json(request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Workflow webhook unreachable: {}", e);
                GenerationError::Transport(e.to_string())
            })?;

        let status = response.status();
        if status.is_success() {
            tracing::debug!("Workflow webhook acknowledged chat {}", request.chat_id);
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<WebhookErrorBody>(&body)
            .ok()
            .and_then(|b| b.message)
            .unwrap_or(body);
        tracing::error!("Workflow webhook rejected dispatch ({}): {}", status, message);
        Err(GenerationError::Transport(format!(
            "workflow webhook returned {}: {}",
            status, message
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn dispatch_uses_camel_case_fields() {
        let dispatch = WorkflowDispatch {
            prompt: "landing page".to_string(),
            chat_id: "c1".to_string(),
            frontend_code: "page".to_string(),
            backend_code: String::new(),
        };
        assert_eq!(
            serde_json::to_value(&dispatch).unwrap(),
            json!({"prompt": "landing page", "chatId": "c1", "frontendCode": "page", "backendCode": ""})
        );
    }

    #[test]
    fn callback_prompt_is_optional() {
        let callback: WorkflowCallback = serde_json::from_value(json!({
            "chatId": "c1",
            "files": [{"path": "app/page.tsx", "content": "X"}]
        }))
        .unwrap();
        assert_eq!(callback.chat_id, "c1");
        assert!(callback.prompt.is_none());
        assert_eq!(callback.files, vec![GeneratedFile::new("app/page.tsx", "X")]);

        let missing_files = serde_json::from_value::<WorkflowCallback>(json!({"chatId": "c1"}));
        assert!(missing_files.is_err());
    }
}
