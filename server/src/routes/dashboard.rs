//! Dashboard routes

use super::extract::StaffCaller;
use crate::app::AppState;
use crate::database::DashboardStats;
use crate::error::Result;
use axum::extract::State;
use axum::Json;

pub async fn stats(
    State(state): State<AppState>,
    StaffCaller(caller): StaffCaller,
) -> Result<Json<DashboardStats>> {
    Ok(Json(state.services.dashboard.stats(&caller).await?))
}
