pub mod policy;
pub mod relationship;
pub mod role;
pub mod role_policy;

pub use policy::Entity as Policy;
pub use relationship::Entity as Relationship;
pub use role::Entity as Role;
pub use role_policy::Entity as RolePolicy;
