// src/handlers/auth.rs
use super::{api_error, caller_id, internal_error, store_error, ApiResult};
use crate::mailer::verification_link;
use crate::middleware::auth::{auth_middleware, bearer_token};
use crate::middleware::rate_limit::{rate_limit_middleware, RateLimiter};
use crate::models::auth::*;
use crate::AppState;
use axum::{
    extract::{Extension, Query},
    http::{HeaderMap, StatusCode},
    response::{Json, Redirect},
    routing::{get, post, Router},
};
use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::Deserialize;
use std::sync::Arc;

const MIN_PASSWORD_LEN: usize = 6;
const TOKEN_TTL_HOURS: i64 = 24;

pub fn auth_routes() -> Router {
    Router::new()
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .route("/api/auth/verify", get(verify_token))
        .route("/api/auth/verify-email", get(verify_email))
        .layer(axum::middleware::from_fn_with_state(
            RateLimiter::strict(),
            rate_limit_middleware,
        ))
}

pub fn user_routes() -> Router {
    Router::new()
        .route("/api/user/tokens", get(token_balance))
        .route_layer(axum::middleware::from_fn(auth_middleware))
}

async fn register(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<RegisterResponse>)> {
    let name = payload.name.trim();
    let email = payload.email.trim().to_lowercase();

    if name.is_empty() || email.is_empty() || payload.password.is_empty() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "Name, email, and password are required",
        ));
    }

    if payload.password.len() < MIN_PASSWORD_LEN {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "Password must be at least 6 characters long",
        ));
    }

    match User::find_by_email(&state.db_pool, &email).await {
        Ok(Some(_)) => {
            return Err(api_error(
                StatusCode::CONFLICT,
                "User with this email already exists",
            ))
        }
        Ok(None) => {}
        Err(e) => return Err(store_error("Database error checking existing user", e)),
    }

    let password_hash =
        hash(&payload.password, DEFAULT_COST).map_err(|e| internal_error("Error hashing password", e))?;

    let user = User::create(&state.db_pool, name, &email, &password_hash)
        .await
        .map_err(|e| store_error("Error creating user", e))?;

    let token = VerificationToken::issue(&state.db_pool, &user.email)
        .await
        .map_err(|e| store_error("Error issuing verification token", e))?;
    let link = verification_link(&state.config.public_base_url, &token);
    if let Err(e) = state.mailer.send_verification(&user.email, &user.name, &link).await {
        // The account exists; the user can ask for another link later.
        tracing::error!("Failed to send verification e-mail to {}: {}", user.email, e);
    }

    tracing::info!("👤 Registered user {} ({})", user.id, user.email);

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            success: true,
            message: "User registered successfully. Please verify your e-mail.".to_string(),
            user: UserResponse::from(user),
        }),
    ))
}

async fn login(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<LoginRequest>,
) -> ApiResult<Json<AuthResponse>> {
    if payload.email.is_empty() || payload.password.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "Email and password are required"));
    }

    let email = payload.email.trim().to_lowercase();
    let user = match User::find_by_email(&state.db_pool, &email).await {
        Ok(Some(user)) => user,
        Ok(None) => return Err(api_error(StatusCode::UNAUTHORIZED, "Invalid email or password")),
        Err(e) => return Err(store_error("Database error finding user", e)),
    };

    match verify(&payload.password, &user.password_hash) {
        Ok(true) => {}
        Ok(false) => return Err(api_error(StatusCode::UNAUTHORIZED, "Invalid email or password")),
        Err(e) => return Err(internal_error("Error verifying password", e)),
    }

    if state.config.require_email_verification && user.email_verified_at.is_none() {
        return Err(api_error(
            StatusCode::FORBIDDEN,
            "Please verify your e-mail before signing in",
        ));
    }

    let token = generate_jwt_token(&user, &state.config.jwt_secret)?;

    Ok(Json(AuthResponse {
        success: true,
        message: "Login successful".to_string(),
        user: UserResponse::from(user),
        token,
    }))
}

async fn verify_token(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<Json<UserResponse>> {
    let token = bearer_token(&headers).map_err(|message| api_error(StatusCode::UNAUTHORIZED, message))?;

    let claims = verify_jwt_token(token, &state.config.jwt_secret).map_err(|e| {
        tracing::warn!("JWT verification failed: {}", e);
        api_error(StatusCode::UNAUTHORIZED, "Invalid or expired token")
    })?;

    let user_id = caller_id(&claims)?;
    match User::find_by_id(&state.db_pool, user_id).await {
        Ok(Some(user)) => Ok(Json(UserResponse::from(user))),
        Ok(None) => Err(api_error(StatusCode::UNAUTHORIZED, "User no longer exists")),
        Err(e) => Err(store_error("Database error finding user", e)),
    }
}

#[derive(Debug, Deserialize)]
struct VerifyEmailQuery {
    token: Option<String>,
}

async fn verify_email(
    Extension(state): Extension<Arc<AppState>>,
    Query(query): Query<VerifyEmailQuery>,
) -> Redirect {
    let Some(token) = query.token.filter(|t| !t.is_empty()) else {
        return Redirect::to("/?error=invalid_token");
    };

    let email = match VerificationToken::consume(&state.db_pool, &token).await {
        Ok(Some(email)) => email,
        Ok(None) => return Redirect::to("/?error=expired_token"),
        Err(e) => {
            tracing::error!("Database error consuming verification token: {}", e);
            return Redirect::to("/?error=server_error");
        }
    };

    match User::mark_email_verified(&state.db_pool, &email).await {
        Ok(()) => {
            tracing::info!("✅ E-mail verified for {}", email);
            Redirect::to("/?verified=true")
        }
        Err(e) => {
            tracing::error!("Failed to mark {} as verified: {}", email, e);
            Redirect::to("/?error=server_error")
        }
    }
}

async fn token_balance(
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<TokenBalanceResponse>> {
    let user_id = caller_id(&claims)?;
    let tokens = User::token_balance(&state.db_pool, user_id)
        .await
        .map_err(|e| store_error("Database error reading token balance", e))?;
    Ok(Json(TokenBalanceResponse { tokens }))
}

pub fn generate_jwt_token(user: &User, jwt_secret: &str) -> ApiResult<String> {
    let now = Utc::now();
    let claims = Claims {
        sub: user.id.to_string(),
        email: user.email.clone(),
        name: user.name.clone(),
        exp: (now + Duration::hours(TOKEN_TTL_HOURS)).timestamp() as usize,
        iat: now.timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(jwt_secret.as_bytes()),
    )
    .map_err(|e| internal_error("Error generating JWT token", e))
}

pub fn verify_jwt_token(token: &str, jwt_secret: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(jwt_secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(token_data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        User {
            id: 7,
            email: "ada@example.com".to_string(),
            name: "Ada".to_string(),
            password_hash: String::new(),
            email_verified_at: Some(Utc::now()),
            tokens: DEFAULT_TOKEN_BALANCE,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn issued_token_verifies_with_same_secret() {
        let token = generate_jwt_token(&user(), "secret").unwrap();
        let claims = verify_jwt_token(&token, "secret").unwrap();
        assert_eq!(claims.user_id(), Some(7));
        assert_eq!(claims.email, "ada@example.com");
        assert_eq!(claims.exp - claims.iat, 24 * 3600);
    }

    #[test]
    fn token_fails_with_other_secret() {
        let token = generate_jwt_token(&user(), "secret").unwrap();
        assert!(verify_jwt_token(&token, "other").is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        let past = (Utc::now() - Duration::hours(2)).timestamp() as usize;
        let claims = Claims {
            sub: "7".to_string(),
            email: "ada@example.com".to_string(),
            name: "Ada".to_string(),
            exp: past,
            iat: past - 3600,
        };
        let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(b"secret")).unwrap();
        assert!(verify_jwt_token(&token, "secret").is_err());
    }
}
