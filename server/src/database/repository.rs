//! Repository layer
//!
//! Typed create/read/update operations over a [`DocumentStore`]. Records
//! get a fresh UUID and their defaults on creation; updates are shallow
//! merges. A missing record is `Ok(None)`, never an error, so callers can
//! decide how to surface it.

use super::models::*;
use super::query::{Direction, Op, Query};
use super::snapshots::SnapshotHub;
use super::store::{Document, DocumentStore, StoreError};
use crate::config::{MAX_CAS_ATTEMPTS, SNAPSHOT_DEBOUNCE_MS};
use crate::error::{AppError, Result};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use uuid::Uuid;

/// A record type kept in its own collection
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const COLLECTION: &'static str;
    /// Human-readable name used in not-found errors
    const NAME: &'static str;

    fn id(&self) -> &str;
    fn version(&self) -> u64;
}

macro_rules! entity {
    ($ty:ty, $collection:literal, $name:literal) => {
        impl Entity for $ty {
            const COLLECTION: &'static str = $collection;
            const NAME: &'static str = $name;

            fn id(&self) -> &str {
                &self.id
            }

            fn version(&self) -> u64 {
                self.version
            }
        }
    };
}

entity!(User, "users", "User");
entity!(Report, "reports", "Report");
entity!(Notice, "notices", "Notice");
entity!(Visitor, "visitors", "Visitor");
entity!(Occurrence, "occurrences", "Occurrence");
entity!(ChecklistItem, "checklist", "Checklist item");
entity!(Drill, "drills", "Drill");
entity!(Campaign, "campaigns", "Campaign");
entity!(EmergencyAlert, "emergency_alerts", "Emergency alert");

/// Serialize a value that must be a JSON object into a store document
pub fn to_document<T: Serialize>(value: &T) -> Result<Document> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(AppError::Generic(format!(
            "expected a JSON object, got {}",
            other
        ))),
    }
}

fn from_document<E: Entity>(doc: Document) -> Result<E> {
    Ok(serde_json::from_value(Value::Object(doc))?)
}

fn patch(value: Value) -> Document {
    match value {
        Value::Object(map) => map,
        _ => Document::new(),
    }
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Repository over an injected document store
#[derive(Clone)]
pub struct Repository {
    store: Arc<dyn DocumentStore>,
    snapshots: SnapshotHub,
}

impl Repository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            snapshots: SnapshotHub::new(Duration::from_millis(SNAPSHOT_DEBOUNCE_MS)),
        }
    }

    /// Repository backed by a fresh in-memory store
    pub fn in_memory() -> Self {
        Self::new(Arc::new(super::memory::MemoryStore::new()))
    }

    // ===== Generic operations =====

    /// Store a fully built record
    pub async fn insert<E: Entity>(&self, record: &E) -> Result<E> {
        let doc = self
            .store
            .insert(E::COLLECTION, record.id(), to_document(record)?)
            .await?;
        self.snapshots.notify(E::COLLECTION);

        tracing::debug!("Created {} {}", E::NAME, record.id());
        from_document(doc)
    }

    pub async fn get<E: Entity>(&self, id: &str) -> Result<Option<E>> {
        self.store
            .get(E::COLLECTION, id)
            .await?
            .map(from_document)
            .transpose()
    }

    /// Shallow-merge `fields` into a record. Missing ids yield `Ok(None)`.
    pub async fn update_fields<E: Entity>(
        &self,
        id: &str,
        fields: Document,
        expected_version: Option<u64>,
    ) -> Result<Option<E>> {
        let merged = self
            .store
            .merge(E::COLLECTION, id, fields, expected_version)
            .await?;

        match merged {
            Some(doc) => {
                self.snapshots.notify(E::COLLECTION);
                tracing::debug!("Updated {} {}", E::NAME, id);
                from_document(doc).map(Some)
            }
            None => Ok(None),
        }
    }

    pub async fn list<E: Entity>(&self) -> Result<Vec<E>> {
        self.store
            .list(E::COLLECTION)
            .await?
            .into_iter()
            .map(from_document)
            .collect()
    }

    pub async fn list_filtered<E, F>(&self, predicate: F) -> Result<Vec<E>>
    where
        E: Entity,
        F: Fn(&E) -> bool,
    {
        Ok(self
            .list::<E>()
            .await?
            .into_iter()
            .filter(|e| predicate(e))
            .collect())
    }

    pub async fn query<E: Entity>(&self, query: &Query) -> Result<Vec<E>> {
        self.store
            .query(E::COLLECTION, query)
            .await?
            .into_iter()
            .map(from_document)
            .collect()
    }

    /// Read-modify-write guarded by the record version.
    ///
    /// `change` returns the fields to merge, or `None` to leave the record
    /// untouched; an error aborts without writing. A concurrent writer makes
    /// the merge fail its version check and the change is recomputed against
    /// the fresh record.
    pub async fn modify<E, F>(&self, id: &str, change: F) -> Result<Option<E>>
    where
        E: Entity,
        F: Fn(&E) -> Result<Option<Document>>,
    {
        for _ in 0..MAX_CAS_ATTEMPTS {
            let Some(current) = self.get::<E>(id).await? else {
                return Ok(None);
            };
            let Some(fields) = change(&current)? else {
                return Ok(Some(current));
            };

            match self
                .update_fields::<E>(id, fields, Some(current.version()))
                .await
            {
                Err(AppError::Store(StoreError::Conflict { .. })) => {
                    tracing::debug!("Version race on {} {}, retrying", E::NAME, id);
                    continue;
                }
                other => return other,
            }
        }

        Err(AppError::Conflict(format!(
            "{} {} is being modified concurrently",
            E::NAME,
            id
        )))
    }

    /// Live view of a query: the receiver always holds the full current
    /// result set and is refreshed after every change to the collection.
    pub async fn watch<E: Entity>(&self, query: Query) -> Result<watch::Receiver<Vec<E>>> {
        let mut changes = self.snapshots.changes(E::COLLECTION);
        let initial = self.query::<E>(&query).await?;
        let (tx, rx) = watch::channel(initial);

        let repo = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tx.closed() => break,
                    change = changes.recv() => {
                        if let Err(broadcast::error::RecvError::Closed) = change {
                            break;
                        }
                        match repo.query::<E>(&query).await {
                            Ok(records) => {
                                if tx.send(records).is_err() {
                                    break;
                                }
                            }
                            Err(e) => {
                                tracing::warn!("Snapshot refresh for {} failed: {}", E::COLLECTION, e);
                            }
                        }
                    }
                }
            }
            tracing::debug!("Snapshot listener on {} stopped", E::COLLECTION);
        });

        Ok(rx)
    }

    // ===== Creation with defaults =====

    pub async fn create_user(&self, req: CreateUserRequest) -> Result<User> {
        let user = User {
            id: new_id(),
            email: req.email.trim().to_lowercase(),
            name: req.name.trim().to_string(),
            role: req.role.unwrap_or_default(),
            is_active: true,
            created_at: Utc::now(),
            version: 0,
        };
        self.insert(&user).await
    }

    pub async fn create_report(
        &self,
        req: CreateReportRequest,
        reporter_id: Option<String>,
    ) -> Result<Report> {
        let report = Report {
            id: new_id(),
            report_type: req.report_type,
            description: req.description,
            is_anonymous: req.is_anonymous,
            reporter_id: if req.is_anonymous { None } else { reporter_id },
            status: ReportStatus::Pending,
            priority: req.priority.unwrap_or_default(),
            location: req.location,
            created_at: Utc::now(),
            resolved_at: None,
            resolved_by: None,
            version: 0,
        };
        self.insert(&report).await
    }

    pub async fn create_notice(&self, req: CreateNoticeRequest, created_by: &str) -> Result<Notice> {
        let audience =
            Role::normalize_audience(req.target_audience.unwrap_or_else(|| Role::ALL.to_vec()));

        let notice = Notice {
            id: new_id(),
            title: req.title,
            content: req.content,
            priority: req.priority.unwrap_or_default(),
            target_audience: audience,
            is_active: true,
            expires_at: req.expires_at,
            created_by: created_by.to_string(),
            read_by: Vec::new(),
            created_at: Utc::now(),
            version: 0,
        };
        self.insert(&notice).await
    }

    pub async fn create_visitor(
        &self,
        req: CreateVisitorRequest,
        registered_by: &str,
    ) -> Result<Visitor> {
        let visitor = Visitor {
            id: new_id(),
            name: req.name,
            document: req.document,
            purpose: req.purpose,
            host_name: req.host_name,
            check_in_time: Utc::now(),
            check_out_time: None,
            status: VisitorStatus::CheckedIn,
            badge_number: req.badge_number,
            registered_by: registered_by.to_string(),
            version: 0,
        };
        self.insert(&visitor).await
    }

    pub async fn create_occurrence(
        &self,
        req: CreateOccurrenceRequest,
        created_by: &str,
    ) -> Result<Occurrence> {
        let occurrence = Occurrence {
            id: new_id(),
            description: req.description,
            severity: req.severity.ok_or_else(|| AppError::missing("severity"))?,
            location: req.location,
            created_by: created_by.to_string(),
            created_at: Utc::now(),
            version: 0,
        };
        self.insert(&occurrence).await
    }

    pub async fn create_checklist_item(
        &self,
        req: CreateChecklistItemRequest,
    ) -> Result<ChecklistItem> {
        let item = ChecklistItem {
            id: new_id(),
            title: req.title,
            description: req.description,
            is_completed: false,
            completed_by: None,
            completed_at: None,
            created_at: Utc::now(),
            version: 0,
        };
        self.insert(&item).await
    }

    pub async fn create_drill(&self, req: CreateDrillRequest, created_by: &str) -> Result<Drill> {
        let drill = Drill {
            id: new_id(),
            title: req.title,
            description: req.description,
            drill_type: req.drill_type,
            scheduled_date: req
                .scheduled_date
                .ok_or_else(|| AppError::missing("scheduledDate"))?,
            created_by: created_by.to_string(),
            created_at: Utc::now(),
            version: 0,
        };
        self.insert(&drill).await
    }

    pub async fn create_campaign(
        &self,
        req: CreateCampaignRequest,
        created_by: &str,
    ) -> Result<Campaign> {
        let campaign = Campaign {
            id: new_id(),
            title: req.title,
            content: req.content,
            category: req.category,
            is_active: true,
            created_by: created_by.to_string(),
            read_count: 0,
            created_at: Utc::now(),
            version: 0,
        };
        self.insert(&campaign).await
    }

    pub async fn create_emergency_alert(
        &self,
        req: CreateEmergencyAlertRequest,
        triggered_by: &str,
    ) -> Result<EmergencyAlert> {
        let alert = EmergencyAlert {
            id: new_id(),
            message: req.message,
            location: req.location,
            triggered_by: triggered_by.to_string(),
            is_active: true,
            is_resolved: false,
            resolved_by: None,
            resolved_at: None,
            created_at: Utc::now(),
            version: 0,
        };
        self.insert(&alert).await
    }

    // ===== Derived operations =====

    /// Check a visitor out. A second checkout leaves the record as it was.
    pub async fn check_out_visitor(&self, id: &str) -> Result<Option<Visitor>> {
        self.modify::<Visitor, _>(id, |visitor| {
            if visitor.check_out_time.is_some() {
                return Ok(None);
            }
            Ok(Some(patch(json!({
                "checkOutTime": Utc::now(),
                "status": VisitorStatus::CheckedOut,
            }))))
        })
        .await
    }

    /// Resolution is terminal; a resolved alert is a conflict
    pub async fn resolve_emergency_alert(
        &self,
        id: &str,
        resolved_by: &str,
    ) -> Result<Option<EmergencyAlert>> {
        self.modify::<EmergencyAlert, _>(id, |alert| {
            if alert.is_resolved {
                return Err(AppError::Conflict(format!(
                    "Emergency alert {} is already resolved",
                    id
                )));
            }
            Ok(Some(patch(json!({
                "isActive": false,
                "isResolved": true,
                "resolvedBy": resolved_by,
                "resolvedAt": Utc::now(),
            }))))
        })
        .await
    }

    /// Overwrite the status, keeping the resolution fields consistent with it
    pub async fn update_report_status(
        &self,
        id: &str,
        status: ReportStatus,
        actor: &str,
        expected_version: Option<u64>,
    ) -> Result<Option<Report>> {
        let fields = if status == ReportStatus::Resolved {
            json!({
                "status": status,
                "resolvedAt": Utc::now(),
                "resolvedBy": actor,
            })
        } else {
            json!({
                "status": status,
                "resolvedAt": null,
                "resolvedBy": null,
            })
        };
        self.update_fields(id, patch(fields), expected_version).await
    }

    /// Fields recording (or clearing) checklist completion
    pub fn completion_fields(completed: bool, actor: &str) -> Document {
        if completed {
            patch(json!({
                "isCompleted": true,
                "completedBy": actor,
                "completedAt": Utc::now(),
            }))
        } else {
            patch(json!({
                "isCompleted": false,
                "completedBy": null,
                "completedAt": null,
            }))
        }
    }

    pub async fn set_checklist_completion(
        &self,
        id: &str,
        completed: bool,
        actor: &str,
    ) -> Result<Option<ChecklistItem>> {
        self.update_fields(id, Self::completion_fields(completed, actor), None)
            .await
    }

    /// Add `user_id` to a notice's readers once
    pub async fn mark_notice_read(&self, id: &str, user_id: &str) -> Result<Option<Notice>> {
        self.modify::<Notice, _>(id, |notice| {
            if notice.read_by.iter().any(|u| u == user_id) {
                return Ok(None);
            }
            let mut read_by = notice.read_by.clone();
            read_by.push(user_id.to_string());
            Ok(Some(patch(json!({ "readBy": read_by }))))
        })
        .await
    }

    pub async fn record_campaign_read(&self, id: &str) -> Result<Option<Campaign>> {
        self.modify::<Campaign, _>(id, |campaign| {
            Ok(Some(patch(json!({ "readCount": campaign.read_count + 1 }))))
        })
        .await
    }

    // ===== Derived views =====

    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let query = Query::new()
            .filter("email", Op::Eq, email.trim().to_lowercase())
            .limit(1);
        Ok(self.query::<User>(&query).await?.into_iter().next())
    }

    pub async fn list_reports_by_status(&self, status: ReportStatus) -> Result<Vec<Report>> {
        self.query(&Query::new().filter("status", Op::Eq, status.as_str()))
            .await
    }

    pub async fn list_reports_by_reporter(&self, reporter_id: &str) -> Result<Vec<Report>> {
        self.query(&Query::new().filter("reporterId", Op::Eq, reporter_id))
            .await
    }

    pub async fn list_recent_reports(&self, limit: usize) -> Result<Vec<Report>> {
        self.query(
            &Query::new()
                .order_by("createdAt", Direction::Desc)
                .limit(limit),
        )
        .await
    }

    /// Visitors still on the premises
    pub async fn list_active_visitors(&self) -> Result<Vec<Visitor>> {
        self.list_filtered(|v: &Visitor| v.check_out_time.is_none())
            .await
    }

    pub async fn list_active_alerts(&self) -> Result<Vec<EmergencyAlert>> {
        self.list_filtered(|a: &EmergencyAlert| a.is_active && !a.is_resolved)
            .await
    }

    /// Live view of the alerts still awaiting resolution
    pub async fn watch_active_alerts(&self) -> Result<watch::Receiver<Vec<EmergencyAlert>>> {
        self.watch(
            Query::new()
                .filter("isActive", Op::Eq, true)
                .filter("isResolved", Op::Eq, false),
        )
        .await
    }

    /// Drills scheduled after `now`, soonest first
    pub async fn list_upcoming_drills(&self, now: DateTime<Utc>) -> Result<Vec<Drill>> {
        let mut drills = self
            .list_filtered(|d: &Drill| d.scheduled_date > now)
            .await?;
        drills.sort_by_key(|d| d.scheduled_date);
        Ok(drills)
    }

    pub async fn list_notices_for(&self, role: Role, now: DateTime<Utc>) -> Result<Vec<Notice>> {
        self.list_filtered(|n: &Notice| n.is_visible_to(role, now))
            .await
    }

    pub async fn list_active_campaigns(&self) -> Result<Vec<Campaign>> {
        self.query(&Query::new().filter("isActive", Op::Eq, true))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::resilient::tests::FlakyStore;
    use crate::database::resilient::{ResilientStore, RetryPolicy};
    use chrono::Duration as ChronoDuration;
    use std::collections::HashSet;

    fn visitor_request(name: &str) -> CreateVisitorRequest {
        CreateVisitorRequest {
            name: name.to_string(),
            document: "123".to_string(),
            purpose: "meeting".to_string(),
            host_name: "Carlos".to_string(),
            badge_number: None,
        }
    }

    fn report_request(anonymous: bool) -> CreateReportRequest {
        CreateReportRequest {
            report_type: "vandalism".to_string(),
            description: "Broken window in block B".to_string(),
            is_anonymous: anonymous,
            priority: None,
            location: Some("Block B".to_string()),
        }
    }

    #[tokio::test]
    async fn test_ids_are_unique_and_resolvable() {
        let repo = Repository::in_memory();
        let mut ids = HashSet::new();

        for i in 0..25 {
            let item = repo
                .create_checklist_item(CreateChecklistItemRequest {
                    title: format!("Item {}", i),
                    description: None,
                })
                .await
                .unwrap();
            assert!(ids.insert(item.id.clone()));

            let fetched = repo.get::<ChecklistItem>(&item.id).await.unwrap().unwrap();
            assert_eq!(fetched, item);
        }
    }

    #[tokio::test]
    async fn test_creation_defaults() {
        let repo = Repository::in_memory();

        let user = repo
            .create_user(CreateUserRequest {
                email: " Ana@School.Test ".to_string(),
                name: "Ana".to_string(),
                role: None,
            })
            .await
            .unwrap();
        assert_eq!(user.role, Role::Student);
        assert!(user.is_active);
        assert_eq!(user.email, "ana@school.test");
        assert_eq!(user.version, 1);

        let report = repo
            .create_report(report_request(false), Some(user.id.clone()))
            .await
            .unwrap();
        assert_eq!(report.status, ReportStatus::Pending);
        assert_eq!(report.priority, Priority::Medium);
        assert_eq!(report.reporter_id.as_deref(), Some(user.id.as_str()));
        assert!(report.resolved_at.is_none());

        let campaign = repo
            .create_campaign(
                CreateCampaignRequest {
                    title: "Stop bullying".to_string(),
                    content: "Talk to us".to_string(),
                    category: "bullying".to_string(),
                },
                &user.id,
            )
            .await
            .unwrap();
        assert!(campaign.is_active);
        assert_eq!(campaign.read_count, 0);
    }

    #[tokio::test]
    async fn test_anonymous_report_drops_reporter() {
        let repo = Repository::in_memory();

        let report = repo
            .create_report(report_request(true), Some("u-123".to_string()))
            .await
            .unwrap();

        assert!(report.reporter_id.is_none());
    }

    #[tokio::test]
    async fn test_update_missing_creates_nothing() {
        let repo = Repository::in_memory();

        let updated = repo
            .update_fields::<User>("missing", patch(json!({"name": "Ghost"})), None)
            .await
            .unwrap();

        assert!(updated.is_none());
        assert!(repo.list::<User>().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_visitor_checkout_is_idempotent() {
        let repo = Repository::in_memory();
        let visitor = repo
            .create_visitor(visitor_request("Ana"), "staff-1")
            .await
            .unwrap();

        let first = repo.check_out_visitor(&visitor.id).await.unwrap().unwrap();
        assert_eq!(first.status, VisitorStatus::CheckedOut);
        let checked_out_at = first.check_out_time.unwrap();

        tokio::time::sleep(Duration::from_millis(5)).await;
        let second = repo.check_out_visitor(&visitor.id).await.unwrap().unwrap();

        assert_eq!(second.check_out_time, Some(checked_out_at));
        assert_eq!(second.check_in_time, visitor.check_in_time);
        assert_eq!(second.version, first.version);

        assert!(repo.check_out_visitor("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_active_visitor_view() {
        let repo = Repository::in_memory();
        let ana = repo
            .create_visitor(visitor_request("Ana"), "staff-1")
            .await
            .unwrap();
        repo.create_visitor(visitor_request("Bruno"), "staff-1")
            .await
            .unwrap();

        repo.check_out_visitor(&ana.id).await.unwrap();

        let active = repo.list_active_visitors().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].name, "Bruno");
        assert_eq!(repo.list::<Visitor>().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_report_resolution_fields_follow_status() {
        let repo = Repository::in_memory();
        let report = repo.create_report(report_request(true), None).await.unwrap();

        let resolved = repo
            .update_report_status(&report.id, ReportStatus::Resolved, "staff-1", None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(resolved.status, ReportStatus::Resolved);
        assert!(resolved.resolved_at.is_some());
        assert_eq!(resolved.resolved_by.as_deref(), Some("staff-1"));

        let reopened = repo
            .update_report_status(&report.id, ReportStatus::InProgress, "staff-1", None)
            .await
            .unwrap()
            .unwrap();
        assert!(reopened.resolved_at.is_none());
        assert!(reopened.resolved_by.is_none());
    }

    #[tokio::test]
    async fn test_resolved_alert_leaves_active_view() {
        let repo = Repository::in_memory();
        let alert = repo
            .create_emergency_alert(
                CreateEmergencyAlertRequest {
                    message: "Intruder near gate 2".to_string(),
                    location: Some("Gate 2".to_string()),
                },
                "u1",
            )
            .await
            .unwrap();
        assert_eq!(repo.list_active_alerts().await.unwrap().len(), 1);

        let resolved = repo
            .resolve_emergency_alert(&alert.id, "admin-1")
            .await
            .unwrap()
            .unwrap();

        assert!(resolved.is_resolved);
        assert!(!resolved.is_active);
        assert!(repo.list_active_alerts().await.unwrap().is_empty());
        assert_eq!(repo.list::<EmergencyAlert>().await.unwrap().len(), 1);

        assert!(matches!(
            repo.resolve_emergency_alert(&alert.id, "admin-2").await,
            Err(AppError::Conflict(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_resolves_have_one_winner() {
        let repo = Repository::in_memory();
        let alert = repo
            .create_emergency_alert(
                CreateEmergencyAlertRequest {
                    message: "Gas leak in kitchen".to_string(),
                    location: None,
                },
                "u1",
            )
            .await
            .unwrap();

        let mut handles = Vec::new();
        for n in 0..8 {
            let repo = repo.clone();
            let id = alert.id.clone();
            let actor = format!("staff-{}", n);
            handles.push(tokio::spawn(async move {
                let outcome = repo.resolve_emergency_alert(&id, &actor).await;
                (actor, outcome)
            }));
        }

        let mut winners = Vec::new();
        for handle in handles {
            match handle.await.unwrap() {
                (actor, Ok(Some(_))) => winners.push(actor),
                (_, Err(AppError::Conflict(_))) => {}
                (actor, other) => panic!("{} got {:?}", actor, other),
            }
        }
        assert_eq!(winners.len(), 1);

        let stored = repo
            .get::<EmergencyAlert>(&alert.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.resolved_by.as_deref(), Some(winners[0].as_str()));
        assert_eq!(stored.version, 2);
    }

    #[tokio::test]
    async fn test_checklist_completion_toggle() {
        let repo = Repository::in_memory();
        let item = repo
            .create_checklist_item(CreateChecklistItemRequest {
                title: "Check extinguishers".to_string(),
                description: None,
            })
            .await
            .unwrap();
        assert!(!item.is_completed);

        let done = repo
            .set_checklist_completion(&item.id, true, "staff-1")
            .await
            .unwrap()
            .unwrap();
        assert!(done.is_completed);
        assert_eq!(done.completed_by.as_deref(), Some("staff-1"));
        assert!(done.completed_at.is_some());

        let undone = repo
            .set_checklist_completion(&item.id, false, "staff-1")
            .await
            .unwrap()
            .unwrap();
        assert!(!undone.is_completed);
        assert!(undone.completed_by.is_none());
        assert!(undone.completed_at.is_none());
    }

    #[tokio::test]
    async fn test_upcoming_drills_sorted() {
        let repo = Repository::in_memory();
        let now = Utc::now();

        for (title, offset_days) in [("Later", 10), ("Past", -3), ("Sooner", 2)] {
            repo.create_drill(
                CreateDrillRequest {
                    title: title.to_string(),
                    description: None,
                    drill_type: "fire".to_string(),
                    scheduled_date: Some(now + ChronoDuration::days(offset_days)),
                },
                "staff-1",
            )
            .await
            .unwrap();
        }

        let upcoming = repo.list_upcoming_drills(now).await.unwrap();
        let titles: Vec<&str> = upcoming.iter().map(|d| d.title.as_str()).collect();
        assert_eq!(titles, vec!["Sooner", "Later"]);
    }

    #[tokio::test]
    async fn test_notice_reads_are_deduplicated() {
        let repo = Repository::in_memory();
        let notice = repo
            .create_notice(
                CreateNoticeRequest {
                    title: "Evacuation routes".to_string(),
                    content: "Updated maps posted".to_string(),
                    priority: Some(Priority::High),
                    target_audience: Some(vec![Role::Staff, Role::Student, Role::Staff]),
                    expires_at: None,
                },
                "admin-1",
            )
            .await
            .unwrap();
        assert_eq!(notice.target_audience.len(), 2);

        repo.mark_notice_read(&notice.id, "u1").await.unwrap();
        repo.mark_notice_read(&notice.id, "u2").await.unwrap();
        let notice = repo.mark_notice_read(&notice.id, "u1").await.unwrap().unwrap();

        assert_eq!(notice.read_by, vec!["u1".to_string(), "u2".to_string()]);
    }

    #[tokio::test]
    async fn test_concurrent_campaign_reads_are_counted() {
        let repo = Repository::in_memory();
        let campaign = repo
            .create_campaign(
                CreateCampaignRequest {
                    title: "Cyber safety".to_string(),
                    content: "Think before you post".to_string(),
                    category: "online".to_string(),
                },
                "staff-1",
            )
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..4 {
            let repo = repo.clone();
            let id = campaign.id.clone();
            handles.push(tokio::spawn(async move {
                repo.record_campaign_read(&id).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let campaign = repo.get::<Campaign>(&campaign.id).await.unwrap().unwrap();
        assert_eq!(campaign.read_count, 4);
    }

    #[tokio::test]
    async fn test_stale_version_is_rejected() {
        let repo = Repository::in_memory();
        let user = repo
            .create_user(CreateUserRequest {
                email: "bea@school.test".to_string(),
                name: "Bea".to_string(),
                role: None,
            })
            .await
            .unwrap();

        repo.update_fields::<User>(&user.id, patch(json!({"name": "Bea A."})), Some(1))
            .await
            .unwrap();
        let stale = repo
            .update_fields::<User>(&user.id, patch(json!({"name": "Bea B."})), Some(1))
            .await;

        assert!(matches!(
            stale,
            Err(AppError::Store(StoreError::Conflict { .. }))
        ));
    }

    #[tokio::test]
    async fn test_find_user_by_email() {
        let repo = Repository::in_memory();
        repo.create_user(CreateUserRequest {
            email: "carla@school.test".to_string(),
            name: "Carla".to_string(),
            role: Some(Role::Staff),
        })
        .await
        .unwrap();

        let found = repo
            .find_user_by_email("CARLA@school.test")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.role, Role::Staff);
        assert!(repo
            .find_user_by_email("nobody@school.test")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_snapshot_listener_delivers_full_result_set() {
        let repo = Repository::in_memory();
        let mut rx = repo
            .watch::<EmergencyAlert>(Query::new().filter("isResolved", Op::Eq, false))
            .await
            .unwrap();
        assert!(rx.borrow().is_empty());

        for message in ["Fire in lab", "Smoke in gym"] {
            repo.create_emergency_alert(
                CreateEmergencyAlertRequest {
                    message: message.to_string(),
                    location: None,
                },
                "u1",
            )
            .await
            .unwrap();
        }

        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while rx.borrow().len() < 2 {
            tokio::time::timeout_at(deadline, rx.changed())
                .await
                .expect("snapshot not delivered in time")
                .unwrap();
        }

        let messages: Vec<String> = rx.borrow().iter().map(|a| a.message.clone()).collect();
        assert_eq!(messages, vec!["Fire in lab", "Smoke in gym"]);
    }

    #[tokio::test]
    async fn test_transient_failures_surface_after_retries() {
        let flaky = Arc::new(FlakyStore::new(0));
        let store = ResilientStore::new(flaky.clone(), RetryPolicy::immediate(2));
        let repo = Repository::new(Arc::new(store));

        repo.create_visitor(visitor_request("Ana"), "staff-1")
            .await
            .unwrap();

        flaky.fail_next(2);
        assert_eq!(repo.list_active_visitors().await.unwrap().len(), 1);

        flaky.fail_next(10);
        let err = repo.list_active_visitors().await.unwrap_err();
        assert!(err.is_transient());
    }
}
