//! Visitor routes

use super::extract::{Listing, StaffCaller, ValidatedJson};
use crate::app::AppState;
use crate::database::{CreateVisitorRequest, Visitor};
use crate::error::Result;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;

pub async fn list_visitors(
    State(state): State<AppState>,
    StaffCaller(caller): StaffCaller,
) -> Result<Listing<Visitor>> {
    Ok(Listing(state.services.visitors.list_visitors(&caller).await?))
}

pub async fn list_active(
    State(state): State<AppState>,
    StaffCaller(caller): StaffCaller,
) -> Result<Listing<Visitor>> {
    Ok(Listing(state.services.visitors.list_active(&caller).await?))
}

pub async fn create_visitor(
    State(state): State<AppState>,
    StaffCaller(caller): StaffCaller,
    ValidatedJson(req): ValidatedJson<CreateVisitorRequest>,
) -> Result<(StatusCode, Json<Visitor>)> {
    let visitor = state.services.visitors.check_in(&caller, req).await?;
    Ok((StatusCode::CREATED, Json(visitor)))
}

pub async fn check_out(
    State(state): State<AppState>,
    StaffCaller(caller): StaffCaller,
    Path(id): Path<String>,
) -> Result<Json<Visitor>> {
    Ok(Json(state.services.visitors.check_out(&caller, &id).await?))
}
