use perimeter::access::types::{Policy, ResourceId, Role};
use perimeter::storage;
use sea_orm::ConnectionTrait;

/// Builder for a role together with its bound policies and holders
pub struct RoleBuilder {
    name: String,
    description: String,
    policies: Vec<Policy>,
    subjects: Vec<ResourceId>,
}

impl RoleBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            description: String::new(),
            policies: Vec::new(),
            subjects: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn with_policy(mut self, policy: Policy) -> Self {
        self.policies.push(policy);
        self
    }

    pub fn assigned_to(mut self, subject: &ResourceId) -> Self {
        self.subjects.push(subject.clone());
        self
    }

    pub async fn create<C: ConnectionTrait>(self, db: &C) -> Role {
        let role = storage::create_role(db, Role::new(self.name, self.description))
            .await
            .expect("Failed to create test role");

        let mut keys = Vec::new();
        for policy in self.policies {
            let created = storage::create_policy(db, policy)
                .await
                .expect("Failed to create test policy");
            keys.push(created.key);
        }
        storage::bind_policies_to_role(db, role.key, &keys)
            .await
            .expect("Failed to bind test policies");

        for subject in &self.subjects {
            storage::assign_role(db, subject, role.key)
                .await
                .expect("Failed to assign test role");
        }

        role
    }
}
