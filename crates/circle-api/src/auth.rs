use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::{SaltString, rand_core::OsRng}};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use tracing::{info, warn};
use uuid::Uuid;

use circle_types::api::{Claims, LoginRequest, LoginResponse, RegisterRequest, RegisterResponse};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

const TOKEN_LIFETIME_DAYS: i64 = 30;

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<impl IntoResponse> {
    validate_registration(&req)?;

    // Hash password with Argon2id
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|e| ApiError::internal(format!("password hashing failed: {}", e)))?
        .to_string();

    let user_id = Uuid::new_v4();
    let uid = user_id.to_string();
    let username = req.username.clone();
    let email = req.email.trim().to_string();
    state
        .db_call(move |db| db.create_user(&uid, &username, &email, &password_hash))
        .await?;

    let token = create_token(&state.jwt_secret, user_id, &req.username)
        .map_err(|e| ApiError::internal(e.to_string()))?;

    info!("Registered {} ({})", req.username, user_id);
    Ok((StatusCode::CREATED, Json(RegisterResponse { user_id, token })))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<impl IntoResponse> {
    let username = req.username.clone();
    let user = state
        .db_call(move |db| db.get_user_by_username(&username))
        .await?
        .ok_or(ApiError::Unauthorized)?;

    // Verify password
    let parsed_hash = PasswordHash::new(&user.password)
        .map_err(|e| ApiError::internal(format!("stored hash unreadable: {}", e)))?;

    if Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .is_err()
    {
        warn!("Failed login for {}", req.username);
        return Err(ApiError::Unauthorized);
    }

    let user_id: Uuid = user
        .id
        .parse()
        .map_err(|_| ApiError::internal(format!("corrupt user id '{}'", user.id)))?;

    let token = create_token(&state.jwt_secret, user_id, &user.username)
        .map_err(|e| ApiError::internal(e.to_string()))?;

    Ok(Json(LoginResponse {
        user_id,
        username: user.username,
        token,
    }))
}

fn validate_registration(req: &RegisterRequest) -> ApiResult<()> {
    let name_len = req.username.chars().count();
    if !(3..=32).contains(&name_len) {
        return Err(ApiError::bad_request("username must be 3 to 32 characters"));
    }
    if req.password.len() < 8 {
        return Err(ApiError::bad_request("password must be at least 8 characters"));
    }
    let email = req.email.trim();
    if email.is_empty() || !email.contains('@') {
        return Err(ApiError::bad_request("email is not valid"));
    }
    Ok(())
}

pub fn create_token(secret: &str, user_id: Uuid, username: &str) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        username: username.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::days(TOKEN_LIFETIME_DAYS)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

/// Validate a bearer token and return its claims.
pub fn verify_token(secret: &str, token: &str) -> Option<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .ok()
}
