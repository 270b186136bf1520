//! Campaign routes

use super::extract::{Caller, ExpectedVersion, Listing, StaffCaller, ValidatedJson};
use crate::app::AppState;
use crate::database::{Campaign, CreateCampaignRequest, UpdateCampaignRequest};
use crate::error::Result;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;

pub async fn list_campaigns(
    State(state): State<AppState>,
    Caller(caller): Caller,
) -> Result<Listing<Campaign>> {
    Ok(Listing(
        state.services.communications.list_campaigns(&caller).await?,
    ))
}

pub async fn create_campaign(
    State(state): State<AppState>,
    StaffCaller(caller): StaffCaller,
    ValidatedJson(req): ValidatedJson<CreateCampaignRequest>,
) -> Result<(StatusCode, Json<Campaign>)> {
    let campaign = state
        .services
        .communications
        .create_campaign(&caller, req)
        .await?;
    Ok((StatusCode::CREATED, Json(campaign)))
}

pub async fn update_campaign(
    State(state): State<AppState>,
    StaffCaller(caller): StaffCaller,
    Path(id): Path<String>,
    ExpectedVersion(version): ExpectedVersion,
    ValidatedJson(req): ValidatedJson<UpdateCampaignRequest>,
) -> Result<Json<Campaign>> {
    let campaign = state
        .services
        .communications
        .update_campaign(&caller, &id, req, version)
        .await?;
    Ok(Json(campaign))
}

pub async fn record_read(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(id): Path<String>,
) -> Result<Json<Campaign>> {
    let campaign = state
        .services
        .communications
        .record_campaign_read(&caller, &id)
        .await?;
    Ok(Json(campaign))
}
