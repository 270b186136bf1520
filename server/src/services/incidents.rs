//! Incidents service
//!
//! Reports, occurrences and emergency alerts: everything that records
//! something going wrong on the premises, and its lifecycle.

use super::auth::ensure_staff;
use crate::database::{
    CreateEmergencyAlertRequest, CreateOccurrenceRequest, CreateReportRequest, EmergencyAlert,
    Fetched, Occurrence, Report, ReportStatus, Repository, User,
};
use crate::error::{AppError, Result};
use std::time::Duration;

#[derive(Clone)]
pub struct IncidentsService {
    repo: Repository,
}

impl IncidentsService {
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }

    // ===== Reports =====

    /// File a report. Anonymous reports need no caller and never record one.
    pub async fn create_report(
        &self,
        req: CreateReportRequest,
        caller: Option<&User>,
    ) -> Result<Report> {
        let reporter_id = match (req.is_anonymous, caller) {
            (true, _) => None,
            (false, Some(user)) => Some(user.id.clone()),
            (false, None) => return Err(AppError::Unauthorized),
        };

        let report = self.repo.create_report(req, reporter_id).await?;
        tracing::info!(
            "Report {} filed ({}, {:?})",
            report.id,
            report.report_type,
            report.priority
        );

        Ok(report)
    }

    /// Staff see every report; everyone else sees their own
    pub async fn list_reports(
        &self,
        caller: &User,
        status: Option<ReportStatus>,
    ) -> Result<Fetched<Vec<Report>>> {
        let reports = if caller.role.is_staff() {
            match status {
                Some(status) => self.repo.list_reports_by_status(status).await,
                None => self.repo.list::<Report>().await,
            }
        } else {
            self.repo
                .list_reports_by_reporter(&caller.id)
                .await
                .map(|reports| {
                    reports
                        .into_iter()
                        .filter(|r| status.map_or(true, |s| r.status == s))
                        .collect()
                })
        };

        Fetched::from_read(reports)
    }

    pub async fn get_report(&self, caller: &User, id: &str) -> Result<Report> {
        let report = self
            .repo
            .get::<Report>(id)
            .await?
            .ok_or_else(|| AppError::not_found("Report", id))?;

        if report.reporter_id.as_deref() != Some(caller.id.as_str()) {
            ensure_staff(caller)?;
        }

        Ok(report)
    }

    /// Move a report forward through pending, in_progress and resolved
    pub async fn update_report_status(
        &self,
        caller: &User,
        id: &str,
        status: ReportStatus,
        expected_version: Option<u64>,
    ) -> Result<Report> {
        ensure_staff(caller)?;

        let current = self
            .repo
            .get::<Report>(id)
            .await?
            .ok_or_else(|| AppError::not_found("Report", id))?;

        if let Some(expected) = expected_version {
            if expected != current.version {
                return Err(AppError::Conflict(format!(
                    "Report {} is at version {}, not {}",
                    id, current.version, expected
                )));
            }
        }
        if current.status == status {
            return Ok(current);
        }
        if !current.status.can_transition_to(status) {
            return Err(AppError::Conflict(format!(
                "Report cannot move from {} to {}",
                current.status.as_str(),
                status.as_str()
            )));
        }

        tracing::info!(
            "Report {} moving {} -> {}",
            id,
            current.status.as_str(),
            status.as_str()
        );

        // Pin the version we validated against so a racing writer cannot
        // slip a backward transition in between
        self.repo
            .update_report_status(id, status, &caller.id, Some(current.version))
            .await?
            .ok_or_else(|| AppError::not_found("Report", id))
    }

    // ===== Occurrences =====

    pub async fn list_occurrences(&self, caller: &User) -> Result<Fetched<Vec<Occurrence>>> {
        ensure_staff(caller)?;
        Fetched::from_read(self.repo.list::<Occurrence>().await)
    }

    pub async fn create_occurrence(
        &self,
        caller: &User,
        req: CreateOccurrenceRequest,
    ) -> Result<Occurrence> {
        ensure_staff(caller)?;

        let occurrence = self.repo.create_occurrence(req, &caller.id).await?;
        tracing::info!(
            "Occurrence {} logged with {:?} severity",
            occurrence.id,
            occurrence.severity
        );

        Ok(occurrence)
    }

    // ===== Emergency alerts =====

    /// Any authenticated user can raise the alarm
    pub async fn trigger_alert(
        &self,
        caller: &User,
        req: CreateEmergencyAlertRequest,
    ) -> Result<EmergencyAlert> {
        let alert = self.repo.create_emergency_alert(req, &caller.id).await?;
        tracing::warn!(
            "Emergency alert {} triggered by {}: {}",
            alert.id,
            caller.id,
            alert.message
        );

        Ok(alert)
    }

    pub async fn list_alerts(&self) -> Result<Fetched<Vec<EmergencyAlert>>> {
        Fetched::from_read(self.repo.list::<EmergencyAlert>().await)
    }

    pub async fn list_active_alerts(&self) -> Result<Fetched<Vec<EmergencyAlert>>> {
        Fetched::from_read(self.repo.list_active_alerts().await)
    }

    /// Long poll on the active alerts.
    ///
    /// Returns as soon as the set of active alert ids differs from `known`
    /// (or, without `known`, from the set at subscription time). After `wait`
    /// the current set is returned unchanged.
    pub async fn await_active_alerts(
        &self,
        known: Option<Vec<String>>,
        wait: Duration,
    ) -> Result<Fetched<Vec<EmergencyAlert>>> {
        let mut rx = match self.repo.watch_active_alerts().await {
            Ok(rx) => rx,
            Err(e) => return Fetched::from_read(Err(e)),
        };

        let mut baseline = match known {
            Some(ids) => ids,
            None => alert_ids(&rx.borrow()),
        };
        baseline.sort();

        let changed = tokio::time::timeout(wait, async {
            loop {
                let current = alert_ids(&rx.borrow_and_update());
                if current != baseline {
                    return;
                }
                if rx.changed().await.is_err() {
                    return;
                }
            }
        })
        .await;
        if changed.is_err() {
            tracing::debug!("Active alert poll timed out after {:?}", wait);
        }

        let alerts = rx.borrow().clone();
        Ok(Fetched::Ok(alerts))
    }

    pub async fn resolve_alert(&self, caller: &User, id: &str) -> Result<EmergencyAlert> {
        ensure_staff(caller)?;

        let alert = self
            .repo
            .resolve_emergency_alert(id, &caller.id)
            .await?
            .ok_or_else(|| AppError::not_found("Emergency alert", id))?;
        tracing::info!("Emergency alert {} resolved by {}", id, caller.id);

        Ok(alert)
    }
}

/// Sorted ids of an alert set
fn alert_ids(alerts: &[EmergencyAlert]) -> Vec<String> {
    let mut ids: Vec<String> = alerts.iter().map(|a| a.id.clone()).collect();
    ids.sort();
    ids
}
