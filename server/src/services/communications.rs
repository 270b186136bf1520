//! Communications service
//!
//! Notices addressed to audiences by role, and awareness campaigns.

use super::auth::ensure_staff;
use crate::database::repository::to_document;
use crate::database::{
    Campaign, CreateCampaignRequest, CreateNoticeRequest, Fetched, Notice, Repository, Role,
    UpdateCampaignRequest, UpdateNoticeRequest, User,
};
use crate::error::{AppError, Result};
use chrono::Utc;

#[derive(Clone)]
pub struct CommunicationsService {
    repo: Repository,
}

impl CommunicationsService {
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }

    // ===== Notices =====

    /// Staff see every notice; others see what is currently addressed to them
    pub async fn list_notices(&self, caller: &User) -> Result<Fetched<Vec<Notice>>> {
        let notices = if caller.role.is_staff() {
            self.repo.list::<Notice>().await
        } else {
            self.repo.list_notices_for(caller.role, Utc::now()).await
        };
        Fetched::from_read(notices)
    }

    pub async fn publish_notice(&self, caller: &User, req: CreateNoticeRequest) -> Result<Notice> {
        ensure_staff(caller)?;

        let notice = self.repo.create_notice(req, &caller.id).await?;
        tracing::info!("Notice {} published: {}", notice.id, notice.title);

        Ok(notice)
    }

    pub async fn update_notice(
        &self,
        caller: &User,
        id: &str,
        mut req: UpdateNoticeRequest,
        expected_version: Option<u64>,
    ) -> Result<Notice> {
        ensure_staff(caller)?;
        tracing::debug!("Updating notice: {}", id);

        req.target_audience = req.target_audience.map(Role::normalize_audience);

        self.repo
            .update_fields::<Notice>(id, to_document(&req)?, expected_version)
            .await?
            .ok_or_else(|| AppError::not_found("Notice", id))
    }

    /// Record that the caller has read a notice addressed to them
    pub async fn mark_notice_read(&self, caller: &User, id: &str) -> Result<Notice> {
        let notice = self
            .repo
            .get::<Notice>(id)
            .await?
            .ok_or_else(|| AppError::not_found("Notice", id))?;

        // Hidden notices are indistinguishable from missing ones
        if !caller.role.is_staff() && !notice.is_visible_to(caller.role, Utc::now()) {
            return Err(AppError::not_found("Notice", id));
        }

        self.repo
            .mark_notice_read(id, &caller.id)
            .await?
            .ok_or_else(|| AppError::not_found("Notice", id))
    }

    // ===== Campaigns =====

    pub async fn list_campaigns(&self, caller: &User) -> Result<Fetched<Vec<Campaign>>> {
        let campaigns = if caller.role.is_staff() {
            self.repo.list::<Campaign>().await
        } else {
            self.repo.list_active_campaigns().await
        };
        Fetched::from_read(campaigns)
    }

    pub async fn create_campaign(
        &self,
        caller: &User,
        req: CreateCampaignRequest,
    ) -> Result<Campaign> {
        ensure_staff(caller)?;

        let campaign = self.repo.create_campaign(req, &caller.id).await?;
        tracing::info!("Campaign {} launched in {}", campaign.id, campaign.category);

        Ok(campaign)
    }

    pub async fn update_campaign(
        &self,
        caller: &User,
        id: &str,
        req: UpdateCampaignRequest,
        expected_version: Option<u64>,
    ) -> Result<Campaign> {
        ensure_staff(caller)?;
        tracing::debug!("Updating campaign: {}", id);

        self.repo
            .update_fields::<Campaign>(id, to_document(&req)?, expected_version)
            .await?
            .ok_or_else(|| AppError::not_found("Campaign", id))
    }

    pub async fn record_campaign_read(&self, caller: &User, id: &str) -> Result<Campaign> {
        let campaign = self
            .repo
            .get::<Campaign>(id)
            .await?
            .ok_or_else(|| AppError::not_found("Campaign", id))?;

        if !campaign.is_active && !caller.role.is_staff() {
            return Err(AppError::not_found("Campaign", id));
        }

        self.repo
            .record_campaign_read(id)
            .await?
            .ok_or_else(|| AppError::not_found("Campaign", id))
    }
}
