//! Visitors service
//!
//! Front-desk registration of people entering the school.

use super::auth::ensure_staff;
use crate::database::{CreateVisitorRequest, Fetched, Repository, User, Visitor};
use crate::error::{AppError, Result};

#[derive(Clone)]
pub struct VisitorsService {
    repo: Repository,
}

impl VisitorsService {
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }

    /// Register a visitor, checked in as of now
    pub async fn check_in(&self, caller: &User, req: CreateVisitorRequest) -> Result<Visitor> {
        ensure_staff(caller)?;

        let visitor = self.repo.create_visitor(req, &caller.id).await?;
        tracing::info!("Visitor {} checked in to see {}", visitor.id, visitor.host_name);

        Ok(visitor)
    }

    pub async fn list_visitors(&self, caller: &User) -> Result<Fetched<Vec<Visitor>>> {
        ensure_staff(caller)?;
        Fetched::from_read(self.repo.list::<Visitor>().await)
    }

    pub async fn list_active(&self, caller: &User) -> Result<Fetched<Vec<Visitor>>> {
        ensure_staff(caller)?;
        Fetched::from_read(self.repo.list_active_visitors().await)
    }

    pub async fn check_out(&self, caller: &User, id: &str) -> Result<Visitor> {
        ensure_staff(caller)?;

        let visitor = self
            .repo
            .check_out_visitor(id)
            .await?
            .ok_or_else(|| AppError::not_found("Visitor", id))?;
        tracing::info!("Visitor {} checked out", visitor.id);

        Ok(visitor)
    }
}
