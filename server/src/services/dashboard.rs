//! Dashboard service
//!
//! Aggregate counters for the staff overview. The underlying reads run
//! concurrently and the first failure fails the whole request.

use super::auth::ensure_staff;
use crate::config::RECENT_REPORTS_LIMIT;
use crate::database::{DashboardStats, Report, ReportStatus, Repository, User};
use crate::error::Result;
use chrono::Utc;

#[derive(Clone)]
pub struct DashboardService {
    repo: Repository,
}

impl DashboardService {
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }

    pub async fn stats(&self, caller: &User) -> Result<DashboardStats> {
        ensure_staff(caller)?;

        let (users, mut reports, visitors, alerts, drills) = tokio::try_join!(
            self.repo.list::<User>(),
            self.repo.list::<Report>(),
            self.repo.list_active_visitors(),
            self.repo.list_active_alerts(),
            self.repo.list_upcoming_drills(Utc::now()),
        )?;

        let count = |status: ReportStatus| reports.iter().filter(|r| r.status == status).count();
        let pending_reports = count(ReportStatus::Pending);
        let in_progress_reports = count(ReportStatus::InProgress);
        let resolved_reports = count(ReportStatus::Resolved);
        let total_reports = reports.len();

        reports.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        reports.truncate(RECENT_REPORTS_LIMIT);

        Ok(DashboardStats {
            total_users: users.len(),
            active_users: users.iter().filter(|u| u.is_active).count(),
            total_reports,
            pending_reports,
            in_progress_reports,
            resolved_reports,
            active_visitors: visitors.len(),
            active_alerts: alerts.len(),
            upcoming_drills: drills.len(),
            recent_reports: reports,
        })
    }
}
