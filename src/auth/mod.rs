/*!
 * # Authorization Module
 *
 * Authentication happens upstream; requests arrive with the caller's
 * identity in `X-User-Id` / `X-User-Role` headers. This module turns those
 * into a [`Principal`] and answers project-scoped capability questions
 * through the [`AccessResolver`] contract.
 */

use crate::errors::ApiError;
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

pub mod directory;
pub mod rbac;

pub use directory::{
    InMemoryPrincipalDirectory, InMemoryProjectDirectory, PrincipalDirectory, ProjectDirectory,
};
pub use rbac::{AccessResolver, Capability, ProjectScope, RbacAccessResolver};

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Role {
    Admin,
    ProjectManager,
    ProcurementManager,
    ProcurementOfficer,
    SiteSupervisor,
    Engineer,
    Client,
}

impl Role {
    /// Roles that own purchase orders regardless of who created them.
    pub fn is_purchase_department(self) -> bool {
        matches!(
            self,
            Role::Admin | Role::ProcurementManager | Role::ProcurementOfficer
        )
    }
}

/// An authenticated actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: Uuid,
    pub role: Role,
}

impl Principal {
    pub fn new(id: Uuid, role: Role) -> Self {
        Self { id, role }
    }
}

/// Extractor for the calling principal.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser(pub Principal);

pub type AuthenticatedUser = AuthUser;

fn header<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(principal) = parts.extensions.get::<Principal>() {
            return Ok(AuthUser(*principal));
        }

        let id = header(parts, USER_ID_HEADER)
            .ok_or_else(|| ApiError::Unauthorized("Missing X-User-Id header".to_string()))?;
        let id = Uuid::parse_str(id)
            .map_err(|_| ApiError::Unauthorized("Malformed X-User-Id header".to_string()))?;
        let role = header(parts, USER_ROLE_HEADER)
            .ok_or_else(|| ApiError::Unauthorized("Missing X-User-Role header".to_string()))?;
        let role = Role::from_str(role)
            .map_err(|_| ApiError::Unauthorized(format!("Unknown role '{}'", role)))?;

        let principal = Principal::new(id, role);
        parts.extensions.insert(principal);
        Ok(AuthUser(principal))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(builder: axum::http::request::Builder) -> Result<AuthUser, ApiError> {
        let (mut parts, _) = builder.body(()).unwrap().into_parts();
        AuthUser::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn extracts_principal_from_headers() {
        let id = Uuid::new_v4();
        let user = extract(
            Request::builder()
                .header(USER_ID_HEADER, id.to_string())
                .header(USER_ROLE_HEADER, "procurement_officer"),
        )
        .await
        .unwrap();
        assert_eq!(user.0, Principal::new(id, Role::ProcurementOfficer));
    }

    #[tokio::test]
    async fn rejects_unknown_role() {
        let result = extract(
            Request::builder()
                .header(USER_ID_HEADER, Uuid::new_v4().to_string())
                .header(USER_ROLE_HEADER, "superuser"),
        )
        .await;
        assert!(matches!(result, Err(ApiError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn rejects_missing_identity() {
        let result = extract(Request::builder()).await;
        assert!(matches!(result, Err(ApiError::Unauthorized(_))));
    }

    #[test]
    fn purchase_department_roles() {
        assert!(Role::ProcurementOfficer.is_purchase_department());
        assert!(Role::Admin.is_purchase_department());
        assert!(!Role::SiteSupervisor.is_purchase_department());
        assert!(!Role::ProjectManager.is_purchase_department());
    }
}
