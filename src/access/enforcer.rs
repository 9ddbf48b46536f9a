use std::collections::HashSet;

use crate::access::errors::AccessError;
use crate::access::registry::SystemPolicyRegistry;
use crate::access::store::{PolicyStore, RelationshipGraph};
use crate::access::types::{Effect, Policy, Request, ResourceId};

/// Decides requests against role-bound policies plus the system registry.
///
/// Deny policies are checked before allow policies; a request that matches neither is
/// denied. Internal deny policies are also checked against each object alone, so a
/// protected object cannot be slipped through alongside unprotected ones. Any store or graph failure aborts the decision and is returned as-is, never
/// as [`AccessError::Denied`].
pub struct Enforcer<'a, S> {
    store: S,
    system: &'a SystemPolicyRegistry,
}

impl<'a, S> Enforcer<'a, S>
where
    S: PolicyStore + RelationshipGraph,
{
    pub fn new(store: S, system: &'a SystemPolicyRegistry) -> Self {
        Self { store, system }
    }

    /// `Ok(())` if the subject may perform the action on every object.
    pub async fn enforce(&self, req: &Request) -> Result<(), AccessError> {
        req.validate()?;

        let policies = self.retrieve_policies(&req.subject).await?;
        let allowed = self.decide(&policies, req).await?;

        tracing::debug!(
            subject = %req.subject,
            action = %req.action,
            objects = req.objects.len(),
            policies = policies.len(),
            allowed,
            "Access decision"
        );

        if allowed {
            Ok(())
        } else {
            Err(AccessError::Denied)
        }
    }

    /// The subset of `req.objects` the subject may act on, each decided on its own.
    pub async fn filter(&self, req: &Request) -> Result<HashSet<ResourceId>, AccessError> {
        req.validate_parts()?;
        if req.objects.is_empty() {
            return Ok(HashSet::new());
        }

        let policies = self.retrieve_policies(&req.subject).await?;
        let mut allowed = HashSet::new();
        for object in &req.objects {
            if self.decide(&policies, &req.for_object(object)).await? {
                allowed.insert(object.clone());
            }
        }

        tracing::debug!(
            subject = %req.subject,
            action = %req.action,
            requested = req.objects.len(),
            allowed = allowed.len(),
            "Access filter"
        );

        Ok(allowed)
    }

    async fn retrieve_policies(&self, subject: &ResourceId) -> Result<Vec<Policy>, AccessError> {
        let mut policies = Vec::new();
        for role in self.store.resolve_assigned_roles(subject).await? {
            policies.extend(self.store.policies_bound_to(role).await?);
        }
        policies.extend(self.system.all());
        Ok(policies)
    }

    async fn decide(&self, policies: &[Policy], req: &Request) -> Result<bool, AccessError> {
        let graph: &dyn RelationshipGraph = &self.store;

        for policy in policies.iter().filter(|p| p.effect == Effect::Deny) {
            if Self::deny_matches(policy, req, graph).await? {
                tracing::trace!(policy = %policy.name, "Deny policy matched");
                return Ok(false);
            }
        }
        for policy in policies.iter().filter(|p| p.effect == Effect::Allow) {
            if policy.constraint.enforce(req, graph).await? {
                tracing::trace!(policy = %policy.name, "Allow policy matched");
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Internal deny policies guard individual resources, so they fire when any single
    /// object is covered rather than only when the whole set is.
    async fn deny_matches(
        policy: &Policy,
        req: &Request,
        graph: &dyn RelationshipGraph,
    ) -> Result<bool, AccessError> {
        if policy.constraint.enforce(req, graph).await? {
            return Ok(true);
        }
        if !policy.internal || req.objects.len() < 2 {
            return Ok(false);
        }
        for object in &req.objects {
            if policy.constraint.enforce(&req.for_object(object), graph).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}
