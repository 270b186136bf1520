//! Authentication routes

use super::extract::Caller;
use crate::app::AppState;
use crate::database::{Role, User};
use crate::error::{AppError, Result};
use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRequest {
    /// Admins may issue a session on behalf of another user
    pub user_id: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub token: String,
    pub expires_in: u64,
    pub user: User,
}

pub async fn me(Caller(user): Caller) -> Json<User> {
    Json(user)
}

pub async fn issue_session(
    State(state): State<AppState>,
    Caller(caller): Caller,
    body: Option<Json<SessionRequest>>,
) -> Result<Json<SessionResponse>> {
    let signer = state
        .signer
        .as_ref()
        .ok_or_else(|| AppError::Forbidden("session tokens are not enabled".to_string()))?;

    let subject = match body.and_then(|Json(req)| req.user_id) {
        Some(id) if id != caller.id => {
            if caller.role != Role::Admin {
                return Err(AppError::Forbidden(
                    "only admins may issue sessions for others".to_string(),
                ));
            }
            state
                .repo
                .get::<User>(&id)
                .await?
                .filter(|u| u.is_active)
                .ok_or_else(|| AppError::not_found("User", id))?
        }
        _ => caller,
    };

    let token = signer.sign(&subject.id, Utc::now())?;
    tracing::info!("Issued session token for {}", subject.id);

    Ok(Json(SessionResponse {
        token,
        expires_in: signer.ttl().as_secs(),
        user: subject,
    }))
}
