//! Request extractors.

use axum::{extract::FromRequestParts, http::request::Parts};
use rmadesk_common::AppError;

use crate::middleware::StaffMember;

/// Any authenticated staff member, admins included.
#[derive(Debug, Clone)]
pub struct StaffUser(pub StaffMember);

impl<S> FromRequestParts<S> for StaffUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<StaffMember>()
            .cloned()
            .map(StaffUser)
            .ok_or(AppError::Unauthorized)
    }
}

/// An authenticated admin.
#[derive(Debug, Clone)]
pub struct AdminUser(pub StaffMember);

impl<S> FromRequestParts<S> for AdminUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let StaffUser(member) = StaffUser::from_request_parts(parts, state).await?;
        if !member.role.is_admin() {
            return Err(AppError::Forbidden("Admin access required".to_string()));
        }
        Ok(Self(member))
    }
}
