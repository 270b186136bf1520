//! Emergency alert routes

use super::extract::{Caller, Listing, StaffCaller, ValidatedJson};
use crate::app::AppState;
use crate::config::{ALERT_POLL_DEFAULT_SECS, ALERT_POLL_MAX_SECS};
use crate::database::{CreateEmergencyAlertRequest, EmergencyAlert};
use crate::error::{AppError, FieldViolation, Result};
use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use std::time::Duration;

#[derive(Deserialize)]
pub struct ActiveChangesParams {
    /// Seconds to wait for a change
    pub timeout: Option<u64>,
    /// Comma separated ids of the active alerts the client already shows
    pub known: Option<String>,
}

pub async fn list_alerts(
    State(state): State<AppState>,
    Caller(_caller): Caller,
) -> Result<Listing<EmergencyAlert>> {
    Ok(Listing(state.services.incidents.list_alerts().await?))
}

pub async fn list_active(
    State(state): State<AppState>,
    Caller(_caller): Caller,
) -> Result<Listing<EmergencyAlert>> {
    Ok(Listing(state.services.incidents.list_active_alerts().await?))
}

/// Long poll: answers once the active set changes or the timeout passes
pub async fn await_active(
    State(state): State<AppState>,
    Caller(_caller): Caller,
    params: std::result::Result<Query<ActiveChangesParams>, QueryRejection>,
) -> Result<Listing<EmergencyAlert>> {
    let Query(params) = params.map_err(|rejection| {
        AppError::Validation(vec![FieldViolation::new("timeout", rejection.body_text())])
    })?;

    let wait = Duration::from_secs(
        params
            .timeout
            .unwrap_or(ALERT_POLL_DEFAULT_SECS)
            .min(ALERT_POLL_MAX_SECS),
    );
    let known = params.known.map(|ids| {
        ids.split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(String::from)
            .collect()
    });

    let alerts = state
        .services
        .incidents
        .await_active_alerts(known, wait)
        .await?;
    Ok(Listing(alerts))
}

pub async fn trigger_alert(
    State(state): State<AppState>,
    Caller(caller): Caller,
    ValidatedJson(req): ValidatedJson<CreateEmergencyAlertRequest>,
) -> Result<(StatusCode, Json<EmergencyAlert>)> {
    let alert = state.services.incidents.trigger_alert(&caller, req).await?;
    Ok((StatusCode::CREATED, Json(alert)))
}

pub async fn resolve_alert(
    State(state): State<AppState>,
    StaffCaller(caller): StaffCaller,
    Path(id): Path<String>,
) -> Result<Json<EmergencyAlert>> {
    Ok(Json(
        state.services.incidents.resolve_alert(&caller, &id).await?,
    ))
}
