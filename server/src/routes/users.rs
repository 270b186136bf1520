//! User routes

use super::extract::{Caller, ExpectedVersion, Listing, MaybeCaller, ValidatedJson};
use crate::app::AppState;
use crate::database::{CreateUserRequest, UpdateUserRequest, User};
use crate::error::Result;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;

pub async fn list_users(
    State(state): State<AppState>,
    Caller(caller): Caller,
) -> Result<Listing<User>> {
    Ok(Listing(state.services.users.list_users(&caller).await?))
}

pub async fn get_user(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(id): Path<String>,
) -> Result<Json<User>> {
    Ok(Json(state.services.users.get_user(&caller, &id).await?))
}

/// Public for student sign-up; privileged roles need an admin caller
pub async fn create_user(
    State(state): State<AppState>,
    MaybeCaller(caller): MaybeCaller,
    ValidatedJson(req): ValidatedJson<CreateUserRequest>,
) -> Result<(StatusCode, Json<User>)> {
    let user = state.services.users.register(req, caller.as_ref()).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn update_user(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(id): Path<String>,
    ExpectedVersion(version): ExpectedVersion,
    ValidatedJson(req): ValidatedJson<UpdateUserRequest>,
) -> Result<Json<User>> {
    let user = state
        .services
        .users
        .update_user(&caller, &id, req, version)
        .await?;
    Ok(Json(user))
}
