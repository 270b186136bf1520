//! Notice routes

use super::extract::{Caller, ExpectedVersion, Listing, StaffCaller, ValidatedJson};
use crate::app::AppState;
use crate::database::{CreateNoticeRequest, Notice, UpdateNoticeRequest};
use crate::error::Result;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;

pub async fn list_notices(
    State(state): State<AppState>,
    Caller(caller): Caller,
) -> Result<Listing<Notice>> {
    Ok(Listing(
        state.services.communications.list_notices(&caller).await?,
    ))
}

pub async fn create_notice(
    State(state): State<AppState>,
    StaffCaller(caller): StaffCaller,
    ValidatedJson(req): ValidatedJson<CreateNoticeRequest>,
) -> Result<(StatusCode, Json<Notice>)> {
    let notice = state
        .services
        .communications
        .publish_notice(&caller, req)
        .await?;
    Ok((StatusCode::CREATED, Json(notice)))
}

pub async fn update_notice(
    State(state): State<AppState>,
    StaffCaller(caller): StaffCaller,
    Path(id): Path<String>,
    ExpectedVersion(version): ExpectedVersion,
    ValidatedJson(req): ValidatedJson<UpdateNoticeRequest>,
) -> Result<Json<Notice>> {
    let notice = state
        .services
        .communications
        .update_notice(&caller, &id, req, version)
        .await?;
    Ok(Json(notice))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(id): Path<String>,
) -> Result<Json<Notice>> {
    let notice = state
        .services
        .communications
        .mark_notice_read(&caller, &id)
        .await?;
    Ok(Json(notice))
}
