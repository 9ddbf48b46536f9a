use std::collections::HashSet;

use crate::access::errors::AccessError;
use crate::access::types::{
    role_keys_from_ids, Effect, Policy, ResourceId, Role, PARENT_OF, ROLE_TYPE,
};
use crate::entities;
use crate::errors::PerimeterError;
use crate::settings::Database as DbCfg;
use chrono::Utc;
use migration::{Migrator, MigratorTrait};
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, Database, DatabaseConnection, EntityTrait,
    QueryFilter, QueryOrder, Set, TransactionTrait,
};
use uuid::Uuid;

/// Connect and bring the schema up to date.
pub async fn init(cfg: &DbCfg) -> Result<DatabaseConnection, PerimeterError> {
    let db = Database::connect(&cfg.url).await?;
    Migrator::up(&db, None).await?;
    Ok(db)
}

fn flag(b: bool) -> i64 {
    if b {
        1
    } else {
        0
    }
}

fn parse_key(key: &str) -> Result<Uuid, AccessError> {
    Uuid::parse_str(key).map_err(|_| AccessError::InvalidIdentifier(key.to_string()))
}

fn key_strings(keys: &[Uuid]) -> Vec<String> {
    keys.iter().map(|k| k.to_string()).collect()
}

// Policy functions

fn policy_from_model(model: entities::policy::Model) -> Result<Policy, AccessError> {
    let effect = Effect::parse(&model.effect).ok_or_else(|| {
        AccessError::InvalidPolicy(format!(
            "policy `{}` has unknown effect `{}`",
            model.key, model.effect
        ))
    })?;
    Ok(Policy {
        key: parse_key(&model.key)?,
        name: model.name,
        effect,
        constraint: serde_json::from_str(&model.constraint_json)?,
        internal: model.internal != 0,
    })
}

/// Persist a policy, assigning a key when it has none.
pub async fn create_policy<C: ConnectionTrait>(
    db: &C,
    mut policy: Policy,
) -> Result<Policy, AccessError> {
    policy.constraint.validate()?;
    if policy.key.is_nil() {
        policy.key = Uuid::new_v4();
    }

    let model = entities::policy::ActiveModel {
        key: Set(policy.key.to_string()),
        name: Set(policy.name.clone()),
        effect: Set(policy.effect.as_str().to_string()),
        constraint_json: Set(serde_json::to_string(&policy.constraint)?),
        internal: Set(flag(policy.internal)),
        created_at: Set(Utc::now().timestamp()),
    };
    model.insert(db).await?;

    Ok(policy)
}

pub async fn get_policy<C: ConnectionTrait>(
    db: &C,
    key: Uuid,
) -> Result<Option<Policy>, AccessError> {
    use entities::policy::Entity;

    Entity::find_by_id(key.to_string())
        .one(db)
        .await?
        .map(policy_from_model)
        .transpose()
}

pub async fn list_policies<C: ConnectionTrait>(db: &C) -> Result<Vec<Policy>, AccessError> {
    use entities::policy::{Column, Entity};

    Entity::find()
        .order_by_asc(Column::CreatedAt)
        .all(db)
        .await?
        .into_iter()
        .map(policy_from_model)
        .collect()
}

/// Replace a policy's name, effect and constraint. Internal policies are immutable.
pub async fn update_policy<C: ConnectionTrait>(db: &C, policy: &Policy) -> Result<(), AccessError> {
    use entities::policy::Entity;

    policy.constraint.validate()?;
    let existing = Entity::find_by_id(policy.key.to_string())
        .one(db)
        .await?
        .ok_or_else(|| AccessError::NotFound(format!("policy {}", policy.key)))?;
    if existing.internal != 0 {
        return Err(AccessError::ProtectedEntity(format!(
            "cannot modify builtin policy `{}`",
            existing.name
        )));
    }

    let mut active: entities::policy::ActiveModel = existing.into();
    active.name = Set(policy.name.clone());
    active.effect = Set(policy.effect.as_str().to_string());
    active.constraint_json = Set(serde_json::to_string(&policy.constraint)?);
    active.update(db).await?;

    Ok(())
}

/// Delete policies by key. Unknown keys are ignored; role bindings are left in place
/// and skipped on lookup.
pub async fn delete_policies<C: ConnectionTrait>(db: &C, keys: &[Uuid]) -> Result<u64, AccessError> {
    use entities::policy::{Column, Entity};

    if keys.is_empty() {
        return Ok(0);
    }
    let keys = key_strings(keys);
    let existing = Entity::find()
        .filter(Column::Key.is_in(keys.clone()))
        .all(db)
        .await?;
    if let Some(builtin) = existing.iter().find(|p| p.internal != 0) {
        return Err(AccessError::ProtectedEntity(format!(
            "cannot delete builtin policy `{}`",
            builtin.name
        )));
    }

    let result = Entity::delete_many()
        .filter(Column::Key.is_in(keys))
        .exec(db)
        .await?;

    Ok(result.rows_affected)
}

// Policy <-> role binding functions

/// Bind policies to a role. Binding an already-bound policy is a no-op.
pub async fn bind_policies_to_role<C: ConnectionTrait>(
    db: &C,
    role: Uuid,
    policies: &[Uuid],
) -> Result<(), AccessError> {
    use entities::role_policy::{Column, Entity};

    if get_role(db, role).await?.is_none() {
        return Err(AccessError::NotFound(format!("role {role}")));
    }
    for policy in policies {
        let binding = entities::role_policy::ActiveModel {
            role_key: Set(role.to_string()),
            policy_key: Set(policy.to_string()),
        };
        Entity::insert(binding)
            .on_conflict(
                OnConflict::columns([Column::RoleKey, Column::PolicyKey])
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(db)
            .await?;
    }

    Ok(())
}

pub async fn unbind_policies_from_role<C: ConnectionTrait>(
    db: &C,
    role: Uuid,
    policies: &[Uuid],
) -> Result<(), AccessError> {
    use entities::role_policy::{Column, Entity};

    Entity::delete_many()
        .filter(Column::RoleKey.eq(role.to_string()))
        .filter(Column::PolicyKey.is_in(key_strings(policies)))
        .exec(db)
        .await?;

    Ok(())
}

/// Policies bound to `role`, skipping bindings whose policy no longer exists.
pub async fn policies_bound_to<C: ConnectionTrait>(
    db: &C,
    role: Uuid,
) -> Result<Vec<Policy>, AccessError> {
    use entities::{policy, role_policy};

    let bound: Vec<String> = role_policy::Entity::find()
        .filter(role_policy::Column::RoleKey.eq(role.to_string()))
        .all(db)
        .await?
        .into_iter()
        .map(|b| b.policy_key)
        .collect();
    if bound.is_empty() {
        return Ok(Vec::new());
    }

    policy::Entity::find()
        .filter(policy::Column::Key.is_in(bound))
        .order_by_asc(policy::Column::CreatedAt)
        .all(db)
        .await?
        .into_iter()
        .map(policy_from_model)
        .collect()
}

// Role functions

fn role_from_model(model: entities::role::Model) -> Result<Role, AccessError> {
    Ok(Role {
        key: parse_key(&model.key)?,
        name: model.name,
        description: model.description,
        internal: model.internal != 0,
    })
}

pub async fn create_role<C: ConnectionTrait>(db: &C, mut role: Role) -> Result<Role, AccessError> {
    if role.key.is_nil() {
        role.key = Uuid::new_v4();
    }

    let model = entities::role::ActiveModel {
        key: Set(role.key.to_string()),
        name: Set(role.name.clone()),
        description: Set(role.description.clone()),
        internal: Set(flag(role.internal)),
        created_at: Set(Utc::now().timestamp()),
    };
    model.insert(db).await?;

    Ok(role)
}

pub async fn get_role<C: ConnectionTrait>(db: &C, key: Uuid) -> Result<Option<Role>, AccessError> {
    use entities::role::Entity;

    Entity::find_by_id(key.to_string())
        .one(db)
        .await?
        .map(role_from_model)
        .transpose()
}

/// Exact, case-sensitive name lookup. Names are not unique; the oldest role wins.
pub async fn get_role_by_name<C: ConnectionTrait>(
    db: &C,
    name: &str,
) -> Result<Option<Role>, AccessError> {
    use entities::role::{Column, Entity};

    Entity::find()
        .filter(Column::Name.eq(name))
        .order_by_asc(Column::CreatedAt)
        .one(db)
        .await?
        .map(role_from_model)
        .transpose()
}

/// Name lookup restricted to builtin roles, ignoring custom roles of the same name.
pub async fn get_builtin_role_by_name<C: ConnectionTrait>(
    db: &C,
    name: &str,
) -> Result<Option<Role>, AccessError> {
    use entities::role::{Column, Entity};

    Entity::find()
        .filter(Column::Name.eq(name))
        .filter(Column::Internal.eq(flag(true)))
        .order_by_asc(Column::CreatedAt)
        .one(db)
        .await?
        .map(role_from_model)
        .transpose()
}

/// All roles, optionally restricted to builtin (`Some(true)`) or custom (`Some(false)`).
pub async fn list_roles<C: ConnectionTrait>(
    db: &C,
    internal: Option<bool>,
) -> Result<Vec<Role>, AccessError> {
    use entities::role::{Column, Entity};

    let mut query = Entity::find().order_by_asc(Column::CreatedAt);
    if let Some(internal) = internal {
        query = query.filter(Column::Internal.eq(flag(internal)));
    }

    query
        .all(db)
        .await?
        .into_iter()
        .map(role_from_model)
        .collect()
}

pub async fn update_role<C: ConnectionTrait>(
    db: &C,
    key: Uuid,
    name: Option<String>,
    description: Option<String>,
) -> Result<Role, AccessError> {
    use entities::role::Entity;

    let existing = Entity::find_by_id(key.to_string())
        .one(db)
        .await?
        .ok_or_else(|| AccessError::NotFound(format!("role {key}")))?;
    if existing.internal != 0 {
        return Err(AccessError::ProtectedEntity(format!(
            "cannot modify builtin role `{}`",
            existing.name
        )));
    }

    let mut active: entities::role::ActiveModel = existing.into();
    if let Some(name) = name {
        active.name = Set(name);
    }
    if let Some(description) = description {
        active.description = Set(description);
    }
    let updated = active.update(db).await?;

    role_from_model(updated)
}

/// Delete roles together with their policy bindings and assignment edges. Subjects
/// that held a deleted role simply lose the policies it carried.
///
/// The cascade runs in its own transaction (a savepoint when `db` is already one), so
/// a failure leaves every role, binding and edge in place.
pub async fn delete_roles<C>(db: &C, keys: &[Uuid]) -> Result<u64, AccessError>
where
    C: ConnectionTrait + TransactionTrait,
{
    if keys.is_empty() {
        return Ok(0);
    }
    let txn = db.begin().await?;
    match delete_roles_cascade(&txn, key_strings(keys)).await {
        Ok(deleted) => {
            txn.commit().await?;
            Ok(deleted)
        }
        Err(e) => {
            txn.rollback().await?;
            Err(e)
        }
    }
}

async fn delete_roles_cascade<C: ConnectionTrait>(
    db: &C,
    keys: Vec<String>,
) -> Result<u64, AccessError> {
    use entities::{relationship, role, role_policy};

    let existing = role::Entity::find()
        .filter(role::Column::Key.is_in(keys.clone()))
        .all(db)
        .await?;
    if let Some(builtin) = existing.iter().find(|r| r.internal != 0) {
        return Err(AccessError::ProtectedEntity(format!(
            "cannot delete builtin role `{}`",
            builtin.name
        )));
    }

    role_policy::Entity::delete_many()
        .filter(role_policy::Column::RoleKey.is_in(keys.clone()))
        .exec(db)
        .await?;
    relationship::Entity::delete_many()
        .filter(relationship::Column::FromType.eq(ROLE_TYPE))
        .filter(relationship::Column::FromKey.is_in(keys.clone()))
        .exec(db)
        .await?;
    let result = role::Entity::delete_many()
        .filter(role::Column::Key.is_in(keys))
        .exec(db)
        .await?;

    Ok(result.rows_affected)
}

// Role assignment functions

fn require_concrete_subject(subject: &ResourceId) -> Result<(), AccessError> {
    if subject.is_type_wildcard() {
        return Err(AccessError::MalformedRequest(format!(
            "cannot assign roles to type wildcard `{subject}`"
        )));
    }
    Ok(())
}

/// Record that `subject` holds `role`. Repeating an assignment is a no-op.
pub async fn assign_role<C: ConnectionTrait>(
    db: &C,
    subject: &ResourceId,
    role: Uuid,
) -> Result<(), AccessError> {
    require_concrete_subject(subject)?;
    let role = get_role(db, role)
        .await?
        .ok_or_else(|| AccessError::NotFound(format!("role {role}")))?;
    define_relationship(db, &role.resource_id(), PARENT_OF, subject).await
}

/// Remove the assignment edge. Unassigning a role that is not held is a no-op.
pub async fn unassign_role<C: ConnectionTrait>(
    db: &C,
    subject: &ResourceId,
    role: Uuid,
) -> Result<(), AccessError> {
    require_concrete_subject(subject)?;
    delete_relationship(
        db,
        &crate::access::types::role_resource_id(role),
        PARENT_OF,
        subject,
    )
    .await
}

/// Keys of the roles assigned to `subject`.
pub async fn resolve_assigned_roles<C: ConnectionTrait>(
    db: &C,
    subject: &ResourceId,
) -> Result<Vec<Uuid>, AccessError> {
    let parents = related_to(db, subject, PARENT_OF).await?;
    let roles: Vec<ResourceId> = parents
        .into_iter()
        .filter(|p| p.resource_type == ROLE_TYPE)
        .collect();
    role_keys_from_ids(&roles)
}

/// Subjects currently holding `role`.
pub async fn subjects_assigned_to<C: ConnectionTrait>(
    db: &C,
    role: Uuid,
) -> Result<Vec<ResourceId>, AccessError> {
    related_from(db, &crate::access::types::role_resource_id(role), PARENT_OF).await
}

// Relationship graph functions

fn require_concrete_endpoint(id: &ResourceId) -> Result<(), AccessError> {
    id.validate()?;
    if id.is_type_wildcard() {
        return Err(AccessError::MalformedRequest(format!(
            "relationship endpoint `{id}` must be a concrete \"type:key\""
        )));
    }
    Ok(())
}

/// Create `from --kind--> to`. Defining an existing edge is a no-op.
pub async fn define_relationship<C: ConnectionTrait>(
    db: &C,
    from: &ResourceId,
    kind: &str,
    to: &ResourceId,
) -> Result<(), AccessError> {
    use entities::relationship::{Column, Entity};

    require_concrete_endpoint(from)?;
    require_concrete_endpoint(to)?;

    let edge = entities::relationship::ActiveModel {
        from_type: Set(from.resource_type.clone()),
        from_key: Set(from.key.clone()),
        kind: Set(kind.to_string()),
        to_type: Set(to.resource_type.clone()),
        to_key: Set(to.key.clone()),
        created_at: Set(Utc::now().timestamp()),
    };
    Entity::insert(edge)
        .on_conflict(
            OnConflict::columns([
                Column::FromType,
                Column::FromKey,
                Column::Kind,
                Column::ToType,
                Column::ToKey,
            ])
            .do_nothing()
            .to_owned(),
        )
        .exec_without_returning(db)
        .await?;

    Ok(())
}

pub async fn delete_relationship<C: ConnectionTrait>(
    db: &C,
    from: &ResourceId,
    kind: &str,
    to: &ResourceId,
) -> Result<(), AccessError> {
    use entities::relationship::{Column, Entity};

    Entity::delete_many()
        .filter(Column::FromType.eq(from.resource_type.as_str()))
        .filter(Column::FromKey.eq(from.key.as_str()))
        .filter(Column::Kind.eq(kind))
        .filter(Column::ToType.eq(to.resource_type.as_str()))
        .filter(Column::ToKey.eq(to.key.as_str()))
        .exec(db)
        .await?;

    Ok(())
}

/// Targets of `from --kind--> *`.
pub async fn related_from<C: ConnectionTrait>(
    db: &C,
    from: &ResourceId,
    kind: &str,
) -> Result<Vec<ResourceId>, AccessError> {
    use entities::relationship::{Column, Entity};

    let edges = Entity::find()
        .filter(Column::FromType.eq(from.resource_type.as_str()))
        .filter(Column::FromKey.eq(from.key.as_str()))
        .filter(Column::Kind.eq(kind))
        .order_by_asc(Column::CreatedAt)
        .all(db)
        .await?;

    Ok(edges
        .into_iter()
        .map(|e| ResourceId::new(e.to_type, e.to_key))
        .collect())
}

/// Sources of `* --kind--> to`, without duplicates.
pub async fn related_to<C: ConnectionTrait>(
    db: &C,
    to: &ResourceId,
    kind: &str,
) -> Result<Vec<ResourceId>, AccessError> {
    use entities::relationship::{Column, Entity};

    let edges = Entity::find()
        .filter(Column::ToType.eq(to.resource_type.as_str()))
        .filter(Column::ToKey.eq(to.key.as_str()))
        .filter(Column::Kind.eq(kind))
        .order_by_asc(Column::CreatedAt)
        .all(db)
        .await?;

    let mut seen = HashSet::new();
    Ok(edges
        .into_iter()
        .map(|e| ResourceId::new(e.from_type, e.from_key))
        .filter(|id| seen.insert(id.clone()))
        .collect())
}
