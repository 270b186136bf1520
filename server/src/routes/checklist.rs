//! Checklist routes

use super::extract::{Caller, ExpectedVersion, Listing, StaffCaller, ValidatedJson};
use crate::app::AppState;
use crate::database::{ChecklistItem, CreateChecklistItemRequest, UpdateChecklistItemRequest};
use crate::error::Result;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;

pub async fn list_items(
    State(state): State<AppState>,
    Caller(_caller): Caller,
) -> Result<Listing<ChecklistItem>> {
    Ok(Listing(state.services.preparedness.list_checklist().await?))
}

pub async fn create_item(
    State(state): State<AppState>,
    StaffCaller(caller): StaffCaller,
    ValidatedJson(req): ValidatedJson<CreateChecklistItemRequest>,
) -> Result<(StatusCode, Json<ChecklistItem>)> {
    let item = state
        .services
        .preparedness
        .add_checklist_item(&caller, req)
        .await?;
    Ok((StatusCode::CREATED, Json(item)))
}

pub async fn update_item(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(id): Path<String>,
    ExpectedVersion(version): ExpectedVersion,
    ValidatedJson(req): ValidatedJson<UpdateChecklistItemRequest>,
) -> Result<Json<ChecklistItem>> {
    let item = state
        .services
        .preparedness
        .update_checklist_item(&caller, &id, req, version)
        .await?;
    Ok(Json(item))
}
