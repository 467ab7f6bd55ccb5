// src/models/auth.rs
use super::StoreError;
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::{FromRow, PgExecutor, PgPool};

pub const DEFAULT_TOKEN_BALANCE: i32 = 100;
pub const VERIFICATION_TOKEN_TTL_HOURS: i64 = 24;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i32,
    pub email: String,
    pub name: String,
    pub password_hash: String,
    pub email_verified_at: Option<DateTime<Utc>>,
    pub tokens: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: i32,
    pub email: String,
    pub name: String,
    pub email_verified: bool,
    pub tokens: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub success: bool,
    pub message: String,
    pub user: UserResponse,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub success: bool,
    pub message: String,
    pub user: UserResponse,
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct TokenBalanceResponse {
    pub tokens: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user id
    pub email: String,
    pub name: String,
    pub exp: usize,
    pub iat: usize,
}

impl Claims {
    pub fn user_id(&self) -> Option<i32> {
        self.sub.parse().ok()
    }
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        UserResponse {
            id: user.id,
            email: user.email,
            name: user.name,
            email_verified: user.email_verified_at.is_some(),
            tokens: user.tokens,
            created_at: user.created_at,
        }
    }
}

const USER_COLUMNS: &str =
    "id, email, name, password_hash, email_verified_at, tokens, created_at, updated_at";

impl User {
    pub async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE email = $1",
            USER_COLUMNS
        ))
        .bind(email)
        .fetch_optional(pool)
        .await?;
        Ok(user)
    }

    pub async fn find_by_id(pool: &PgPool, id: i32) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS))
            .bind(id)
            .fetch_optional(pool)
            .await?;
        Ok(user)
    }

    pub async fn create(
        pool: &PgPool,
        name: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<User, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (email, name, password_hash, tokens, created_at, updated_at)
             VALUES ($1, $2, $3, $4, NOW(), NOW())
             RETURNING {}",
            USER_COLUMNS
        ))
        .bind(email)
        .bind(name)
        .bind(password_hash)
        .bind(DEFAULT_TOKEN_BALANCE)
        .fetch_one(pool)
        .await?;
        Ok(user)
    }

    pub async fn mark_email_verified(pool: &PgPool, email: &str) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE users SET email_verified_at = COALESCE(email_verified_at, NOW()), updated_at = NOW()
             WHERE email = $1",
        )
        .bind(email)
        .execute(pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    pub async fn token_balance(pool: &PgPool, id: i32) -> Result<i32, StoreError> {
        let balance: Option<i32> = sqlx::query_scalar("SELECT tokens FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?;
        balance.ok_or(StoreError::NotFound)
    }

    /// Debits `amount` if the balance covers it. Returns the new balance, or
    /// `None` when the balance is insufficient.
    pub async fn debit_tokens<'e, E>(executor: E, id: i32, amount: i32) -> Result<Option<i32>, StoreError>
    where
        E: PgExecutor<'e>,
    {
        let balance: Option<i32> = sqlx::query_scalar(
            "UPDATE users SET tokens = tokens - $2, updated_at = NOW()
             WHERE id = $1 AND tokens >= $2
             RETURNING tokens",
        )
        .bind(id)
        .bind(amount)
        .fetch_optional(executor)
        .await?;
        Ok(balance)
    }
}

/// Single-use e-mail verification token. Only its SHA-256 is stored.
pub struct VerificationToken;

impl VerificationToken {
    /// Issues a fresh token for `email`, replacing any earlier one, and
    /// returns the plaintext for the verification link.
    pub async fn issue(pool: &PgPool, email: &str) -> Result<String, StoreError> {
        let token = generate_token();
        let expires_at = Utc::now() + Duration::hours(VERIFICATION_TOKEN_TTL_HOURS);

        let mut tx = pool.begin().await?;
        sqlx::query("DELETE FROM verification_tokens WHERE email = $1")
            .bind(email)
            .execute(&mut *tx)
            .await?;
        sqlx::query("INSERT INTO verification_tokens (token_hash, email, expires_at) VALUES ($1, $2, $3)")
            .bind(hash_token(&token))
            .bind(email)
            .bind(expires_at)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(token)
    }

    /// Consumes `token` and returns its e-mail if it was valid and unexpired.
    pub async fn consume(pool: &PgPool, token: &str) -> Result<Option<String>, StoreError> {
        let row: Option<(String, DateTime<Utc>)> = sqlx::query_as(
            "DELETE FROM verification_tokens WHERE token_hash = $1 RETURNING email, expires_at",
        )
        .bind(hash_token(token))
        .fetch_optional(pool)
        .await?;

        Ok(match row {
            Some((email, expires_at)) if expires_at > Utc::now() => Some(email),
            _ => None,
        })
    }
}

fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}
