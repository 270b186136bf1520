//! Report routes

use super::extract::{Caller, ExpectedVersion, Listing, MaybeCaller, StaffCaller, ValidatedJson};
use crate::app::AppState;
use crate::database::{CreateReportRequest, Report, ReportStatus, UpdateReportStatusRequest};
use crate::error::{AppError, FieldViolation, Result};
use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

#[derive(Deserialize)]
pub struct ReportFilter {
    pub status: Option<ReportStatus>,
}

pub async fn list_reports(
    State(state): State<AppState>,
    Caller(caller): Caller,
    filter: std::result::Result<Query<ReportFilter>, QueryRejection>,
) -> Result<Listing<Report>> {
    let Query(filter) = filter.map_err(|rejection| {
        AppError::Validation(vec![FieldViolation::new("status", rejection.body_text())])
    })?;

    let reports = state
        .services
        .incidents
        .list_reports(&caller, filter.status)
        .await?;
    Ok(Listing(reports))
}

pub async fn get_report(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(id): Path<String>,
) -> Result<Json<Report>> {
    Ok(Json(state.services.incidents.get_report(&caller, &id).await?))
}

/// Anonymous reports are accepted without a caller
pub async fn create_report(
    State(state): State<AppState>,
    MaybeCaller(caller): MaybeCaller,
    ValidatedJson(req): ValidatedJson<CreateReportRequest>,
) -> Result<(StatusCode, Json<Report>)> {
    let report = state
        .services
        .incidents
        .create_report(req, caller.as_ref())
        .await?;
    Ok((StatusCode::CREATED, Json(report)))
}

pub async fn update_status(
    State(state): State<AppState>,
    StaffCaller(caller): StaffCaller,
    Path(id): Path<String>,
    ExpectedVersion(version): ExpectedVersion,
    ValidatedJson(req): ValidatedJson<UpdateReportStatusRequest>,
) -> Result<Json<Report>> {
    let report = state
        .services
        .incidents
        .update_report_status(
            &caller,
            &id,
            req.status.ok_or_else(|| AppError::missing("status"))?,
            version,
        )
        .await?;
    Ok(Json(report))
}
