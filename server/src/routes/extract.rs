//! Request extractors shared by all handlers
//!
//! Caller extractors run before the body is read, so role checks reject a
//! request before its payload is even validated.

use crate::app::AppState;
use crate::config::DEGRADED_HEADER;
use crate::database::{Fetched, User};
use crate::error::{AppError, FieldViolation};
use crate::services::auth::ensure_staff;
use axum::async_trait;
use axum::extract::{FromRequest, FromRequestParts, Request};
use axum::http::header::IF_MATCH;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::de::DeserializeOwned;
use serde::Serialize;
use validator::Validate;

/// An authenticated, active user
pub struct Caller(pub User);

#[async_trait]
impl FromRequestParts<AppState> for Caller {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        state
            .callers
            .resolve(&parts.headers)
            .await?
            .map(Caller)
            .ok_or(AppError::Unauthorized)
    }
}

/// An authenticated staff member or admin
pub struct StaffCaller(pub User);

#[async_trait]
impl FromRequestParts<AppState> for StaffCaller {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Caller(user) = Caller::from_request_parts(parts, state).await?;
        ensure_staff(&user)?;
        Ok(StaffCaller(user))
    }
}

/// The caller when one is identified; unknown or missing credentials are `None`
pub struct MaybeCaller(pub Option<User>);

#[async_trait]
impl FromRequestParts<AppState> for MaybeCaller {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        Ok(MaybeCaller(state.callers.resolve(&parts.headers).await?))
    }
}

/// Optional `If-Match` version for compare-and-swap updates
pub struct ExpectedVersion(pub Option<u64>);

#[async_trait]
impl<S> FromRequestParts<S> for ExpectedVersion
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Some(value) = parts.headers.get(IF_MATCH) else {
            return Ok(ExpectedVersion(None));
        };

        value
            .to_str()
            .ok()
            .map(|v| v.trim().trim_start_matches("W/").trim_matches('"'))
            .and_then(|v| v.parse::<u64>().ok())
            .map(|v| ExpectedVersion(Some(v)))
            .ok_or_else(|| {
                AppError::Validation(vec![FieldViolation::new(
                    "If-Match",
                    "must be a record version number",
                )])
            })
    }
}

/// JSON body that has passed its `validator` rules
pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate + Send,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await.map_err(|rejection| {
            AppError::Validation(vec![FieldViolation::new("body", rejection.body_text())])
        })?;

        value.validate()?;
        Ok(ValidatedJson(value))
    }
}

/// List response that flags degraded reads with a header instead of failing
pub struct Listing<T>(pub Fetched<Vec<T>>);

impl<T: Serialize> IntoResponse for Listing<T> {
    fn into_response(self) -> Response {
        match self.0 {
            Fetched::Ok(items) => Json(items).into_response(),
            Fetched::Degraded { reason } => {
                ([(DEGRADED_HEADER, reason)], Json(Vec::<T>::new())).into_response()
            }
        }
    }
}
