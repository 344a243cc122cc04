use super::Role;
use crate::errors::ServiceError;
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashSet;
use uuid::Uuid;

/// Project membership lookup.
#[async_trait]
pub trait ProjectDirectory: Send + Sync {
    async fn is_member(&self, project_id: Uuid, principal_id: Uuid) -> Result<bool, ServiceError>;
    async fn projects_for(&self, principal_id: Uuid) -> Result<Vec<Uuid>, ServiceError>;
}

/// Answers whether a principal id refers to a known user.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PrincipalDirectory: Send + Sync {
    async fn exists(&self, principal_id: Uuid) -> Result<bool, ServiceError>;
}

#[derive(Debug, Default)]
pub struct InMemoryProjectDirectory {
    memberships: DashMap<Uuid, HashSet<Uuid>>,
}

impl InMemoryProjectDirectory {
    pub fn assign(&self, principal_id: Uuid, project_id: Uuid) {
        self.memberships
            .entry(principal_id)
            .or_default()
            .insert(project_id);
    }
}

#[async_trait]
impl ProjectDirectory for InMemoryProjectDirectory {
    async fn is_member(&self, project_id: Uuid, principal_id: Uuid) -> Result<bool, ServiceError> {
        Ok(self
            .memberships
            .get(&principal_id)
            .map(|projects| projects.contains(&project_id))
            .unwrap_or(false))
    }

    async fn projects_for(&self, principal_id: Uuid) -> Result<Vec<Uuid>, ServiceError> {
        Ok(self
            .memberships
            .get(&principal_id)
            .map(|projects| projects.iter().copied().collect())
            .unwrap_or_default())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryPrincipalDirectory {
    principals: DashMap<Uuid, Role>,
}

impl InMemoryPrincipalDirectory {
    pub fn register(&self, principal_id: Uuid, role: Role) {
        self.principals.insert(principal_id, role);
    }

    pub fn role_of(&self, principal_id: &Uuid) -> Option<Role> {
        self.principals.get(principal_id).map(|r| *r)
    }
}

#[async_trait]
impl PrincipalDirectory for InMemoryPrincipalDirectory {
    async fn exists(&self, principal_id: Uuid) -> Result<bool, ServiceError> {
        Ok(self.principals.contains_key(&principal_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn registered_principals_exist() {
        let directory = InMemoryPrincipalDirectory::default();
        let id = Uuid::new_v4();
        directory.register(id, Role::Engineer);
        assert!(directory.exists(id).await.unwrap());
        assert!(!directory.exists(Uuid::new_v4()).await.unwrap());
        assert_eq!(directory.role_of(&id), Some(Role::Engineer));
    }
}
