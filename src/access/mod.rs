pub mod builtin;
pub mod constraint;
pub mod enforcer;
pub mod errors;
pub mod loader;
pub mod policy;
pub mod registry;
pub mod store;
pub mod types;
pub mod web;

use std::sync::Arc;

use sea_orm::{ConnectionTrait, DatabaseConnection, TransactionTrait};

use enforcer::Enforcer;
use errors::AccessError;
use registry::SystemPolicyRegistry;
use store::OrmBackend;
use types::Policy;

use crate::errors::PerimeterError;
use crate::settings;

/// Owns the database handle and the system policy registry; hands out enforcers.
#[derive(Clone)]
pub struct AccessService {
    db: DatabaseConnection,
    system: Arc<SystemPolicyRegistry>,
}

impl AccessService {
    pub fn new(db: DatabaseConnection, system: Arc<SystemPolicyRegistry>) -> Self {
        Self { db, system }
    }

    /// Service bring-up: builtin roles (all or nothing), guardrails, then any `.kdl`
    /// system policies from the configured directory.
    pub async fn bring_up(
        db: DatabaseConnection,
        cfg: &settings::Access,
    ) -> Result<Self, PerimeterError> {
        if cfg.provision_builtin_roles {
            let tx = db.begin().await?;
            builtin::provision_builtin_roles(&tx).await?;
            tx.commit().await?;
        }

        let service = Self::new(db, Arc::new(SystemPolicyRegistry::new()));
        if cfg.builtin_guardrails {
            service.register_system_policies(builtin::guardrail_policies())?;
        }
        if let Some(dir) = &cfg.policies_dir {
            service.register_system_policies(loader::load_policies(dir)?)?;
        }
        tracing::info!(
            system_policies = service.system.len(),
            "System policy registry ready"
        );
        Ok(service)
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    pub fn registry(&self) -> &Arc<SystemPolicyRegistry> {
        &self.system
    }

    /// Enforcer reading through the service's own connection.
    pub fn enforcer(&self) -> Enforcer<'_, OrmBackend<'_, DatabaseConnection>> {
        Enforcer::new(OrmBackend::new(&self.db), &self.system)
    }

    /// Enforcer reading through `conn`, typically an open `DatabaseTransaction`, so the
    /// decision sees the caller's uncommitted writes.
    pub fn enforcer_in<'a, C>(&'a self, conn: &'a C) -> Enforcer<'a, OrmBackend<'a, C>>
    where
        C: ConnectionTrait + Send + Sync,
    {
        Enforcer::new(OrmBackend::new(conn), &self.system)
    }

    /// Validate and register policies that apply to every subject.
    pub fn register_system_policies(&self, policies: Vec<Policy>) -> Result<(), AccessError> {
        for p in &policies {
            p.constraint.validate()?;
        }
        self.system.register(policies);
        Ok(())
    }
}
