//! Users service
//!
//! Registration and profile edits. Students may register themselves;
//! privileged accounts and role/activation changes are admin-only.

use super::auth::{ensure_admin, ensure_staff};
use crate::database::repository::to_document;
use crate::database::{
    CreateUserRequest, Fetched, Repository, Role, UpdateUserRequest, User,
};
use crate::error::{AppError, Result};

#[derive(Clone)]
pub struct UsersService {
    repo: Repository,
}

impl UsersService {
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }

    pub async fn list_users(&self, caller: &User) -> Result<Fetched<Vec<User>>> {
        ensure_staff(caller)?;
        Fetched::from_read(self.repo.list::<User>().await)
    }

    /// A user may read their own profile; staff may read anyone's
    pub async fn get_user(&self, caller: &User, id: &str) -> Result<User> {
        if caller.id != id {
            ensure_staff(caller)?;
        }
        self.repo
            .get::<User>(id)
            .await?
            .ok_or_else(|| AppError::not_found("User", id))
    }

    pub async fn register(&self, req: CreateUserRequest, caller: Option<&User>) -> Result<User> {
        let role = req.role.unwrap_or_default();
        if role != Role::Student {
            let caller = caller.ok_or(AppError::Unauthorized)?;
            ensure_admin(caller)?;
        }

        self.ensure_email_free(&req.email, None).await?;

        tracing::info!("Registering {} account", role.as_str());
        let user = self.repo.create_user(req).await?;
        tracing::info!("User registered: {}", user.id);

        Ok(user)
    }

    pub async fn update_user(
        &self,
        caller: &User,
        id: &str,
        mut req: UpdateUserRequest,
        expected_version: Option<u64>,
    ) -> Result<User> {
        if caller.id != id || req.role.is_some() || req.is_active.is_some() {
            ensure_admin(caller)?;
        }

        if let Some(email) = req.email.take() {
            let email = email.trim().to_lowercase();
            self.ensure_email_free(&email, Some(id)).await?;
            req.email = Some(email);
        }
        if let Some(name) = req.name.as_mut() {
            *name = name.trim().to_string();
        }

        tracing::debug!("Updating user: {}", id);

        self.repo
            .update_fields::<User>(id, to_document(&req)?, expected_version)
            .await?
            .ok_or_else(|| AppError::not_found("User", id))
    }

    async fn ensure_email_free(&self, email: &str, owner: Option<&str>) -> Result<()> {
        match self.repo.find_user_by_email(email).await? {
            Some(existing) if Some(existing.id.as_str()) != owner => Err(AppError::Conflict(
                format!("email {} is already registered", existing.email),
            )),
            _ => Ok(()),
        }
    }
}
