//! Occurrence routes

use super::extract::{Listing, StaffCaller, ValidatedJson};
use crate::app::AppState;
use crate::database::{CreateOccurrenceRequest, Occurrence};
use crate::error::Result;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

pub async fn list_occurrences(
    State(state): State<AppState>,
    StaffCaller(caller): StaffCaller,
) -> Result<Listing<Occurrence>> {
    Ok(Listing(
        state.services.incidents.list_occurrences(&caller).await?,
    ))
}

pub async fn create_occurrence(
    State(state): State<AppState>,
    StaffCaller(caller): StaffCaller,
    ValidatedJson(req): ValidatedJson<CreateOccurrenceRequest>,
) -> Result<(StatusCode, Json<Occurrence>)> {
    let occurrence = state
        .services
        .incidents
        .create_occurrence(&caller, req)
        .await?;
    Ok((StatusCode::CREATED, Json(occurrence)))
}
