//! Preparedness service
//!
//! The safety checklist and the drill calendar.

use super::auth::ensure_staff;
use crate::database::{
    ChecklistItem, CreateChecklistItemRequest, CreateDrillRequest, Document, Drill, Fetched,
    Repository, UpdateChecklistItemRequest, User,
};
use crate::error::{AppError, Result};
use chrono::Utc;
use serde_json::Value;

#[derive(Clone)]
pub struct PreparednessService {
    repo: Repository,
}

impl PreparednessService {
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }

    // ===== Checklist =====

    pub async fn list_checklist(&self) -> Result<Fetched<Vec<ChecklistItem>>> {
        Fetched::from_read(self.repo.list::<ChecklistItem>().await)
    }

    pub async fn add_checklist_item(
        &self,
        caller: &User,
        req: CreateChecklistItemRequest,
    ) -> Result<ChecklistItem> {
        ensure_staff(caller)?;

        let item = self.repo.create_checklist_item(req).await?;
        tracing::info!("Checklist item {} added: {}", item.id, item.title);

        Ok(item)
    }

    /// Edit an item or toggle its completion.
    ///
    /// Anyone signed in may tick an item; renaming it is a staff task.
    /// Completing an already completed item keeps who completed it and when.
    pub async fn update_checklist_item(
        &self,
        caller: &User,
        id: &str,
        req: UpdateChecklistItemRequest,
        expected_version: Option<u64>,
    ) -> Result<ChecklistItem> {
        if req.title.is_some() || req.description.is_some() {
            ensure_staff(caller)?;
        }

        let current = self
            .repo
            .get::<ChecklistItem>(id)
            .await?
            .ok_or_else(|| AppError::not_found("Checklist item", id))?;
        let expected = expected_version.unwrap_or(current.version);

        let mut fields = Document::new();
        if let Some(title) = req.title {
            fields.insert("title".to_string(), Value::String(title));
        }
        if let Some(description) = req.description {
            fields.insert("description".to_string(), Value::String(description));
        }
        if let Some(completed) = req.is_completed {
            if completed != current.is_completed {
                tracing::debug!(
                    "Checklist item {} marked {} by {}",
                    id,
                    if completed { "complete" } else { "incomplete" },
                    caller.id
                );
                fields.extend(Repository::completion_fields(completed, &caller.id));
            }
        }

        if fields.is_empty() {
            return Ok(current);
        }

        self.repo
            .update_fields::<ChecklistItem>(id, fields, Some(expected))
            .await?
            .ok_or_else(|| AppError::not_found("Checklist item", id))
    }

    // ===== Drills =====

    pub async fn list_drills(&self) -> Result<Fetched<Vec<Drill>>> {
        Fetched::from_read(self.repo.list::<Drill>().await)
    }

    pub async fn list_upcoming_drills(&self) -> Result<Fetched<Vec<Drill>>> {
        Fetched::from_read(self.repo.list_upcoming_drills(Utc::now()).await)
    }

    pub async fn schedule_drill(&self, caller: &User, req: CreateDrillRequest) -> Result<Drill> {
        ensure_staff(caller)?;

        let drill = self.repo.create_drill(req, &caller.id).await?;
        tracing::info!(
            "Drill {} ({}) scheduled for {}",
            drill.id,
            drill.drill_type,
            drill.scheduled_date
        );

        Ok(drill)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{CreateUserRequest, Role, StoreError};
    use chrono::Duration;

    async fn setup() -> (PreparednessService, User, User) {
        let repo = Repository::in_memory();
        let staff = repo
            .create_user(CreateUserRequest {
                email: "safety@school.test".to_string(),
                name: "Safety officer".to_string(),
                role: Some(Role::Staff),
            })
            .await
            .unwrap();
        let student = repo
            .create_user(CreateUserRequest {
                email: "ivo@school.test".to_string(),
                name: "Ivo".to_string(),
                role: None,
            })
            .await
            .unwrap();
        (PreparednessService::new(repo), staff, student)
    }

    async fn item(service: &PreparednessService, staff: &User) -> ChecklistItem {
        service
            .add_checklist_item(
                staff,
                CreateChecklistItemRequest {
                    title: "Inspect emergency lights".to_string(),
                    description: None,
                },
            )
            .await
            .unwrap()
    }

    fn toggle(completed: bool) -> UpdateChecklistItemRequest {
        UpdateChecklistItemRequest {
            is_completed: Some(completed),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_completion_keeps_first_completer() {
        let (service, staff, student) = setup().await;
        let item = item(&service, &staff).await;

        let done = service
            .update_checklist_item(&student, &item.id, toggle(true), None)
            .await
            .unwrap();
        assert_eq!(done.completed_by.as_deref(), Some(student.id.as_str()));

        let again = service
            .update_checklist_item(&staff, &item.id, toggle(true), None)
            .await
            .unwrap();
        assert_eq!(again.completed_by, done.completed_by);
        assert_eq!(again.completed_at, done.completed_at);

        let undone = service
            .update_checklist_item(&staff, &item.id, toggle(false), None)
            .await
            .unwrap();
        assert!(!undone.is_completed);
        assert!(undone.completed_by.is_none());
        assert!(undone.completed_at.is_none());
    }

    #[tokio::test]
    async fn test_only_staff_edit_item_text() {
        let (service, staff, student) = setup().await;
        let item = item(&service, &staff).await;

        let rename = UpdateChecklistItemRequest {
            title: Some("Something else".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            service
                .update_checklist_item(&student, &item.id, rename.clone(), None)
                .await,
            Err(AppError::Forbidden(_))
        ));

        let renamed = service
            .update_checklist_item(&staff, &item.id, rename, None)
            .await
            .unwrap();
        assert_eq!(renamed.title, "Something else");
        assert!(!renamed.is_completed);
    }

    #[tokio::test]
    async fn test_stale_version_is_rejected() {
        let (service, staff, _) = setup().await;
        let item = item(&service, &staff).await;

        let err = service
            .update_checklist_item(&staff, &item.id, toggle(true), Some(item.version + 1))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Store(StoreError::Conflict { .. })));
    }

    #[tokio::test]
    async fn test_drills_schedule_and_upcoming() {
        let (service, staff, student) = setup().await;
        let drill = |days: i64| CreateDrillRequest {
            title: format!("Drill in {} days", days),
            description: None,
            drill_type: "evacuation".to_string(),
            scheduled_date: Some(Utc::now() + Duration::days(days)),
        };

        assert!(matches!(
            service.schedule_drill(&student, drill(3)).await,
            Err(AppError::Forbidden(_))
        ));

        service.schedule_drill(&staff, drill(-1)).await.unwrap();
        service.schedule_drill(&staff, drill(3)).await.unwrap();

        let upcoming = service.list_upcoming_drills().await.unwrap().unwrap_or_default();
        assert_eq!(upcoming.len(), 1);
        assert_eq!(
            service.list_drills().await.unwrap().unwrap_or_default().len(),
            2
        );
    }
}
