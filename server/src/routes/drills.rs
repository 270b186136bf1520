//! Drill routes

use super::extract::{Caller, Listing, StaffCaller, ValidatedJson};
use crate::app::AppState;
use crate::database::{CreateDrillRequest, Drill};
use crate::error::Result;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

pub async fn list_drills(
    State(state): State<AppState>,
    Caller(_caller): Caller,
) -> Result<Listing<Drill>> {
    Ok(Listing(state.services.preparedness.list_drills().await?))
}

pub async fn list_upcoming(
    State(state): State<AppState>,
    Caller(_caller): Caller,
) -> Result<Listing<Drill>> {
    Ok(Listing(
        state.services.preparedness.list_upcoming_drills().await?,
    ))
}

pub async fn create_drill(
    State(state): State<AppState>,
    StaffCaller(caller): StaffCaller,
    ValidatedJson(req): ValidatedJson<CreateDrillRequest>,
) -> Result<(StatusCode, Json<Drill>)> {
    let drill = state
        .services
        .preparedness
        .schedule_drill(&caller, req)
        .await?;
    Ok((StatusCode::CREATED, Json(drill)))
}
