//! Registration and email verification. Session/token issuance is handled by
//! the external auth layer; this flow only creates the account and flips
//! `is_verified` once the mailed code comes back.

use argon2::password_hash::{rand_core::OsRng, SaltString};
use argon2::{Argon2, PasswordHasher};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use validator::Validate;

use crate::account::VerifyOutcome;
use crate::domain::NewUser;
use crate::error::{Error, Result};
use crate::http::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email(message = "invalid email"))]
    pub email: String,
    #[validate(length(min = 8, message = "password must be at least 8 characters"))]
    pub password: String,
    pub phone_number: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub email: String,
    pub code: String,
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse> {
    req.validate()?;
    if let Some(existing) = state.store.user_by_email(&req.email).await? {
        if existing.is_verified {
            return Err(Error::Validation("email already registered".into()));
        }
        // Leftover from an abandoned registration: start over.
        state.store.delete_user(existing.id).await?;
    }
    let password_hash = hash_password(&req.password)?;
    let user = state
        .store
        .create_user(NewUser {
            email: req.email,
            phone_number: req.phone_number,
            password_hash,
        })
        .await?;
    let code = state.codes.issue(&user.email);
    state
        .mailer
        .send_verification_code(&user.email, &code)
        .await
        .map_err(|e| Error::Storage(format!("verification code delivery failed: {e}")))?;
    let body = serde_json::json!({
        "message": "verification code sent",
        "email": user.email,
    });
    Ok((StatusCode::CREATED, Json(body)))
}

pub async fn verify(
    State(state): State<AppState>,
    Json(req): Json<VerifyRequest>,
) -> Result<Json<serde_json::Value>> {
    match state.codes.verify(&req.email, &req.code) {
        VerifyOutcome::Ok => {}
        VerifyOutcome::ExpiredOrMissing => {
            return Err(Error::Validation(
                "verification code expired or missing".into(),
            ))
        }
        VerifyOutcome::Mismatch => {
            return Err(Error::Validation("wrong verification code".into()))
        }
    }
    let user = state.store.mark_verified(&req.email).await?;
    Ok(Json(serde_json::json!({
        "verified": true,
        "email": user.email,
    })))
}

fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Ok(Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| Error::Storage(format!("password hashing failed: {e}")))?
        .to_string())
}
