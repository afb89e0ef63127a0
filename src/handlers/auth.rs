// src/handlers/auth.rs

use axum::{Json, extract::State, response::IntoResponse};
use serde::Deserialize;
use serde_json::json;
use validator::Validate;

use crate::{error::AppError, state::AppState, utils::jwt::sign_admin_token};

/// DTO for the admin login form.
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, max = 200))]
    pub password: String,
}

/// Exchanges the shared admin password for a JWT token.
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    if !state.admin.verify(&payload.password)? {
        tracing::warn!("Rejected admin login attempt");
        return Err(AppError::AuthError("Invalid password".to_string()));
    }

    let token = sign_admin_token(&state.config.jwt_secret, state.config.jwt_expiration)?;
    tracing::info!("Admin logged in");

    Ok(Json(json!({
        "token": token,
        "type": "Bearer",
        "expiresIn": state.config.jwt_expiration
    })))
}
