// src/models/chat.rs
use super::StoreError;
use crate::generation::poller::FilesSnapshotSource;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgExecutor, PgPool};

pub const DEFAULT_CHAT_NAME: &str = "New Chat";
pub const GENERATED_CHAT_NAME: &str = "Generated Project";
const CHAT_NAME_MAX_CHARS: usize = 40;

/// One chat = one evolving generated project.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Chat {
    pub id: String,
    pub user_id: i32,
    pub name: String,
    pub html_code: String,
    pub css_code: String,
    pub jsx_code: String,
    pub files_json: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, FromRow)]
pub struct ChatSummary {
    pub id: String,
    pub name: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateChatRequest {
    pub name: Option<String>,
}

/// Everything a successful generation writes back in one statement.
#[derive(Debug, Clone)]
pub struct GenerationUpdate<'a> {
    pub name: &'a str,
    pub html_code: &'a str,
    pub css_code: &'a str,
    pub jsx_code: &'a str,
    pub files_json: &'a str,
}

const CHAT_COLUMNS: &str =
    "id, user_id, name, html_code, css_code, jsx_code, files_json, created_at, updated_at";

impl Chat {
    pub async fn create(pool: &PgPool, user_id: i32, name: Option<&str>) -> Result<Chat, StoreError> {
        let name = name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(DEFAULT_CHAT_NAME);
        let chat = sqlx::query_as::<_, Chat>(&format!(
            "INSERT INTO chats (id, user_id, name, created_at, updated_at)
             VALUES ($1, $2, $3, NOW(), NOW())
             RETURNING {}",
            CHAT_COLUMNS
        ))
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(user_id)
        .bind(name)
        .fetch_one(pool)
        .await?;
        Ok(chat)
    }

    pub async fn find_for_user(pool: &PgPool, id: &str, user_id: i32) -> Result<Option<Chat>, StoreError> {
        let chat = sqlx::query_as::<_, Chat>(&format!(
            "SELECT {} FROM chats WHERE id = $1 AND user_id = $2",
            CHAT_COLUMNS
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
        Ok(chat)
    }

    pub async fn list_for_user(pool: &PgPool, user_id: i32) -> Result<Vec<ChatSummary>, StoreError> {
        let chats = sqlx::query_as::<_, ChatSummary>(
            "SELECT id, name, updated_at FROM chats WHERE user_id = $1 ORDER BY updated_at DESC",
        )
        .bind(user_id)
        .fetch_all(pool)
        .await?;
        Ok(chats)
    }

    /// Full replace of the file blob, projected columns and name.
    pub async fn apply_generation<'e, E>(
        executor: E,
        id: &str,
        update: &GenerationUpdate<'_>,
    ) -> Result<(), StoreError>
    where
        E: PgExecutor<'e>,
    {
        let result = sqlx::query(
            "UPDATE chats
             SET name = $2, html_code = $3, css_code = $4, jsx_code = $5, files_json = $6, updated_at = NOW()
             WHERE id = $1",
        )
        .bind(id)
        .bind(update.name)
        .bind(update.html_code)
        .bind(update.css_code)
        .bind(update.jsx_code)
        .bind(update.files_json)
        .execute(executor)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    /// Persists a local edit to the entry page or stylesheet. `None` leaves
    /// the column as it is.
    pub async fn update_projection(
        pool: &PgPool,
        id: &str,
        css_code: Option<&str>,
        jsx_code: Option<&str>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE chats
             SET css_code = COALESCE($2, css_code), jsx_code = COALESCE($3, jsx_code), updated_at = NOW()
             WHERE id = $1",
        )
        .bind(id)
        .bind(css_code)
        .bind(jsx_code)
        .execute(pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

#[async_trait]
impl FilesSnapshotSource for PgPool {
    async fn files_json(&self, chat_id: &str) -> Result<Option<String>, StoreError> {
        let row: Option<(Option<String>,)> = sqlx::query_as("SELECT files_json FROM chats WHERE id = $1")
            .bind(chat_id)
            .fetch_optional(self)
            .await?;
        match row {
            Some((files_json,)) => Ok(files_json),
            None => Err(StoreError::NotFound),
        }
    }
}

/// Chat title derived from the prompt that produced it.
pub fn chat_name_from_prompt(prompt: Option<&str>) -> String {
    match prompt.map(str::trim).filter(|p| !p.is_empty()) {
        Some(prompt) => prompt.chars().take(CHAT_NAME_MAX_CHARS).collect(),
        None => GENERATED_CHAT_NAME.to_string(),
    }
}
