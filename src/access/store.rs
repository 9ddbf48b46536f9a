//! Seams between the enforcer and its collaborators.
//!
//! The enforcer only needs two read capabilities: the policies bound to a role, and
//! the relationship graph (role assignment plus generic edges for relationship
//! constraints). [`OrmBackend`] serves both from the database over any sea-orm
//! connection, so a caller-supplied transaction becomes the ambient transaction.

use async_trait::async_trait;
use sea_orm::ConnectionTrait;
use uuid::Uuid;

use crate::access::errors::AccessError;
use crate::access::types::{Policy, ResourceId};
use crate::storage;

#[async_trait]
pub trait PolicyStore: Send + Sync {
    /// Policies bound to `role`. Bindings to deleted policies contribute nothing.
    async fn policies_bound_to(&self, role: Uuid) -> Result<Vec<Policy>, AccessError>;
}

#[async_trait]
pub trait RelationshipGraph: Send + Sync {
    /// Roles that are parents of `subject` in the graph.
    async fn resolve_assigned_roles(&self, subject: &ResourceId)
        -> Result<Vec<Uuid>, AccessError>;

    /// Targets of `from --kind--> *` edges.
    async fn related_from(
        &self,
        from: &ResourceId,
        kind: &str,
    ) -> Result<Vec<ResourceId>, AccessError>;
}

#[async_trait]
impl<T: PolicyStore + ?Sized> PolicyStore for &T {
    async fn policies_bound_to(&self, role: Uuid) -> Result<Vec<Policy>, AccessError> {
        (**self).policies_bound_to(role).await
    }
}

#[async_trait]
impl<T: RelationshipGraph + ?Sized> RelationshipGraph for &T {
    async fn resolve_assigned_roles(
        &self,
        subject: &ResourceId,
    ) -> Result<Vec<Uuid>, AccessError> {
        (**self).resolve_assigned_roles(subject).await
    }

    async fn related_from(
        &self,
        from: &ResourceId,
        kind: &str,
    ) -> Result<Vec<ResourceId>, AccessError> {
        (**self).related_from(from, kind).await
    }
}

/// Database-backed policy store and relationship graph.
pub struct OrmBackend<'c, C> {
    conn: &'c C,
}

impl<'c, C> OrmBackend<'c, C>
where
    C: ConnectionTrait + Send + Sync,
{
    pub fn new(conn: &'c C) -> Self {
        Self { conn }
    }
}

impl<C> Clone for OrmBackend<'_, C> {
    fn clone(&self) -> Self {
        Self { conn: self.conn }
    }
}

#[async_trait]
impl<C> PolicyStore for OrmBackend<'_, C>
where
    C: ConnectionTrait + Send + Sync,
{
    async fn policies_bound_to(&self, role: Uuid) -> Result<Vec<Policy>, AccessError> {
        storage::policies_bound_to(self.conn, role).await
    }
}

#[async_trait]
impl<C> RelationshipGraph for OrmBackend<'_, C>
where
    C: ConnectionTrait + Send + Sync,
{
    async fn resolve_assigned_roles(
        &self,
        subject: &ResourceId,
    ) -> Result<Vec<Uuid>, AccessError> {
        storage::resolve_assigned_roles(self.conn, subject).await
    }

    async fn related_from(
        &self,
        from: &ResourceId,
        kind: &str,
    ) -> Result<Vec<ResourceId>, AccessError> {
        storage::related_from(self.conn, from, kind).await
    }
}
