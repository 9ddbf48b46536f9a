//! Guardrail system policies and the roles every deployment starts with.

use sea_orm::ConnectionTrait;
use uuid::Uuid;

use crate::access::constraint::Constraint;
use crate::access::errors::AccessError;
use crate::access::types::{Action, Policy, ResourceId, Role, CREATED_BY, ROLE_TYPE};
use crate::storage;

/// Resource type owning everything that ships with the system.
pub const BUILTIN_TYPE: &str = "builtin";

pub const PROTECT_BUILTIN_RESOURCES: Uuid = Uuid::from_u128(0x5f1c_0a2e_7b3d_4e8f_9a01_0000_0000_0001);
pub const PROTECT_BUILTIN_ROLES: Uuid = Uuid::from_u128(0x5f1c_0a2e_7b3d_4e8f_9a01_0000_0000_0002);

pub const OWNER_ROLE: &str = "Owner";
pub const ENGINEER_ROLE: &str = "Engineer";
pub const VIEWER_ROLE: &str = "Viewer";

const ENGINEER_TYPES: [&str; 6] = ["channel", "workspace", "schematic", "range", "label", "task"];

pub fn builtin_id() -> ResourceId {
    ResourceId::new(BUILTIN_TYPE, "system")
}

/// Deny policies registered at bring-up so that no role can modify or delete what the
/// system itself owns.
pub fn guardrail_policies() -> Vec<Policy> {
    let writes = || vec![Action::Update, Action::Delete];
    vec![
        Policy::deny(
            "builtin resources are read-only",
            Constraint::objects_and_actions(vec![ResourceId::type_wildcard(BUILTIN_TYPE)], writes()),
        )
        .with_key(PROTECT_BUILTIN_RESOURCES)
        .as_internal(),
        Policy::deny(
            "builtin roles are read-only",
            Constraint::all(vec![
                Constraint::match_ids(vec![ResourceId::type_wildcard(ROLE_TYPE)]),
                Constraint::actions(writes()),
                Constraint::related(CREATED_BY, vec![ResourceId::type_wildcard(BUILTIN_TYPE)]),
            ]),
        )
        .with_key(PROTECT_BUILTIN_ROLES)
        .as_internal(),
    ]
}

fn builtin_roles() -> Vec<(&'static str, &'static str, Constraint)> {
    vec![
        (
            OWNER_ROLE,
            "Full access to every resource",
            Constraint::default(),
        ),
        (
            ENGINEER_ROLE,
            "Full access to channels, workspaces, schematics, ranges, labels and tasks",
            Constraint::objects_and_actions(
                ENGINEER_TYPES.iter().map(|t| ResourceId::type_wildcard(*t)),
                vec![Action::All],
            ),
        ),
        (
            VIEWER_ROLE,
            "Read-only access to every resource",
            Constraint::actions(vec![Action::Retrieve]),
        ),
    ]
}

/// Create the built-in roles and their policies if they do not exist yet.
///
/// Each role is internal, bound to one internal allow policy, and recorded as
/// `role:<key> --created_by--> builtin:system` so the role guardrail covers it.
/// Returns the built-in roles, whether found or created.
pub async fn provision_builtin_roles<C: ConnectionTrait>(db: &C) -> Result<Vec<Role>, AccessError> {
    let mut roles = Vec::new();
    let mut created = 0;

    for (name, description, constraint) in builtin_roles() {
        if let Some(existing) = storage::get_builtin_role_by_name(db, name).await? {
            roles.push(existing);
            continue;
        }
        if storage::get_role_by_name(db, name).await?.is_some() {
            tracing::warn!(role = name, "A custom role shadows a builtin role name");
        }

        let policy = storage::create_policy(db, Policy::allow(name, constraint).as_internal()).await?;
        let role = storage::create_role(
            db,
            Role {
                internal: true,
                ..Role::new(name, description)
            },
        )
        .await?;
        storage::bind_policies_to_role(db, role.key, &[policy.key]).await?;
        storage::define_relationship(db, &role.resource_id(), CREATED_BY, &builtin_id()).await?;

        created += 1;
        roles.push(role);
    }

    tracing::info!(created, total = roles.len(), "Provisioned builtin roles");
    Ok(roles)
}
