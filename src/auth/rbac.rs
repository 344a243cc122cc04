/*!
 * # Role-Based Access Control (RBAC) Module
 *
 * Maps roles to capability sets once at startup and resolves which
 * projects a principal may act on.
 */

use super::{Principal, ProjectDirectory, Role};
use crate::errors::ServiceError;
use async_trait::async_trait;
use lazy_static::lazy_static;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Action categories guarded by the resolver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum Capability {
    View,
    Edit,
    Approve,
    Delete,
}

lazy_static! {
    static ref CAPABILITIES: HashMap<Role, HashSet<Capability>> = {
        use Capability::*;
        let mut table = HashMap::new();
        table.insert(Role::Admin, HashSet::from([View, Edit, Approve, Delete]));
        table.insert(Role::ProcurementManager, HashSet::from([View, Edit, Approve, Delete]));
        table.insert(Role::ProjectManager, HashSet::from([View, Edit, Approve]));
        table.insert(Role::ProcurementOfficer, HashSet::from([View, Edit]));
        table.insert(Role::SiteSupervisor, HashSet::from([View, Edit]));
        table.insert(Role::Engineer, HashSet::from([View, Edit]));
        table.insert(Role::Client, HashSet::from([View, Approve]));
        table
    };
}

pub fn role_has_capability(role: Role, capability: Capability) -> bool {
    CAPABILITIES
        .get(&role)
        .map(|caps| caps.contains(&capability))
        .unwrap_or(false)
}

/// Projects a principal may see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectScope {
    All,
    Only(HashSet<Uuid>),
}

impl ProjectScope {
    pub fn contains(&self, project_id: &Uuid) -> bool {
        match self {
            ProjectScope::All => true,
            ProjectScope::Only(ids) => ids.contains(project_id),
        }
    }
}

/// Gatekeeper consulted before every procurement and approval operation.
#[async_trait]
pub trait AccessResolver: Send + Sync {
    async fn can_access_project(
        &self,
        principal: &Principal,
        project_id: Uuid,
    ) -> Result<bool, ServiceError>;

    async fn visible_projects(&self, principal: &Principal) -> Result<ProjectScope, ServiceError>;

    fn has_capability(&self, principal: &Principal, capability: Capability) -> bool;

    /// Fails with `Forbidden` unless the principal holds `capability` on `project_id`.
    async fn authorize(
        &self,
        principal: &Principal,
        project_id: Uuid,
        capability: Capability,
    ) -> Result<(), ServiceError> {
        if !self.has_capability(principal, capability) {
            return Err(ServiceError::Forbidden(format!(
                "role {} lacks {} permission",
                principal.role, capability
            )));
        }
        if !self.can_access_project(principal, project_id).await? {
            return Err(ServiceError::Forbidden(format!(
                "principal {} has no access to project {}",
                principal.id, project_id
            )));
        }
        Ok(())
    }
}

/// Capability table plus project membership lookup.
#[derive(Clone)]
pub struct RbacAccessResolver {
    projects: Arc<dyn ProjectDirectory>,
}

impl RbacAccessResolver {
    pub fn new(projects: Arc<dyn ProjectDirectory>) -> Self {
        Self { projects }
    }

    fn sees_all_projects(role: Role) -> bool {
        role.is_purchase_department()
    }
}

#[async_trait]
impl AccessResolver for RbacAccessResolver {
    async fn can_access_project(
        &self,
        principal: &Principal,
        project_id: Uuid,
    ) -> Result<bool, ServiceError> {
        if Self::sees_all_projects(principal.role) {
            return Ok(true);
        }
        let member = self.projects.is_member(project_id, principal.id).await?;
        if !member {
            debug!(principal_id = %principal.id, %project_id, "project access denied");
        }
        Ok(member)
    }

    async fn visible_projects(&self, principal: &Principal) -> Result<ProjectScope, ServiceError> {
        if Self::sees_all_projects(principal.role) {
            return Ok(ProjectScope::All);
        }
        let ids = self.projects.projects_for(principal.id).await?;
        Ok(ProjectScope::Only(ids.into_iter().collect()))
    }

    fn has_capability(&self, principal: &Principal, capability: Capability) -> bool {
        role_has_capability(principal.role, capability)
    }
}
