use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::access::constraint::Constraint;
use crate::access::errors::AccessError;

/// Identifier of a resource: "type:key" e.g. "channel:ch1".
///
/// An empty key is a type wildcard ("channel:" or just "channel") that stands for
/// every resource of that type. Wildcards are only meaningful as constraint operands.
///
/// The type must be non-empty and must not contain `:`, otherwise the id cannot be
/// read back from its string form. Keys may contain `:`. [`ResourceId::new`] does not
/// check this; [`ResourceId::validate`] does, and requests, constraints and stored
/// edges are validated before use.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceId {
    pub resource_type: String,
    pub key: String,
}

impl ResourceId {
    pub fn new(resource_type: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            key: key.into(),
        }
    }

    pub fn type_wildcard(resource_type: impl Into<String>) -> Self {
        Self::new(resource_type, "")
    }

    pub fn is_type_wildcard(&self) -> bool {
        self.key.is_empty()
    }

    /// `self` matches `candidate` if they are equal, or `self` is a type wildcard
    /// of the candidate's type.
    pub fn matches(&self, candidate: &ResourceId) -> bool {
        self.resource_type == candidate.resource_type
            && (self.key.is_empty() || self.key == candidate.key)
    }

    /// Reject ids whose string form would not parse back to the same id.
    pub fn validate(&self) -> Result<(), AccessError> {
        if self.resource_type.is_empty() || self.resource_type.contains(':') {
            return Err(AccessError::InvalidIdentifier(format!(
                "`{self}`: resource type must be non-empty and contain no `:`"
            )));
        }
        Ok(())
    }

    pub fn parse(s: &str) -> Option<Self> {
        let (t, key) = s.split_once(':').unwrap_or((s, ""));
        if t.is_empty() {
            return None;
        }
        Some(Self::new(t, key))
    }
}

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.resource_type, self.key)
    }
}

impl TryFrom<String> for ResourceId {
    type Error = AccessError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        ResourceId::parse(&value).ok_or(AccessError::InvalidIdentifier(value))
    }
}

impl From<ResourceId> for String {
    fn from(id: ResourceId) -> Self {
        id.to_string()
    }
}

/// Tag naming what a request wants to do with its objects.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Action {
    Create,
    Retrieve,
    Update,
    Delete,
    /// Wildcard: inside an action set it matches every action.
    All,
    Custom(String),
}

impl Action {
    pub fn as_str(&self) -> &str {
        match self {
            Action::Create => "create",
            Action::Retrieve => "retrieve",
            Action::Update => "update",
            Action::Delete => "delete",
            Action::All => "*",
            Action::Custom(s) => s,
        }
    }
}

impl From<&str> for Action {
    fn from(s: &str) -> Self {
        match s {
            "create" => Action::Create,
            "retrieve" => Action::Retrieve,
            "update" => Action::Update,
            "delete" => Action::Delete,
            "*" => Action::All,
            other => Action::Custom(other.to_string()),
        }
    }
}

impl From<String> for Action {
    fn from(s: String) -> Self {
        Action::from(s.as_str())
    }
}

impl From<Action> for String {
    fn from(a: Action) -> Self {
        a.as_str().to_string()
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An already-authenticated subject asking to perform `action` on `objects`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub subject: ResourceId,
    pub objects: Vec<ResourceId>,
    pub action: Action,
}

impl Request {
    pub fn new(subject: ResourceId, objects: Vec<ResourceId>, action: Action) -> Self {
        Self {
            subject,
            objects,
            action,
        }
    }

    /// Narrow the request to a single object.
    pub fn for_object(&self, object: &ResourceId) -> Request {
        Request {
            subject: self.subject.clone(),
            objects: vec![object.clone()],
            action: self.action.clone(),
        }
    }

    /// Cheap shape checks performed before any store access.
    pub fn validate(&self) -> Result<(), AccessError> {
        if self.objects.is_empty() {
            return Err(AccessError::MalformedRequest(
                "request names no objects".into(),
            ));
        }
        self.validate_parts()
    }

    /// Everything `validate` checks except the non-empty object list.
    pub(crate) fn validate_parts(&self) -> Result<(), AccessError> {
        for id in std::iter::once(&self.subject).chain(&self.objects) {
            id.validate()
                .map_err(|e| AccessError::MalformedRequest(e.to_string()))?;
        }
        if self.action.as_str().is_empty() {
            return Err(AccessError::MalformedRequest("action is empty".into()));
        }
        if matches!(self.action, Action::All) {
            return Err(AccessError::MalformedRequest(
                "`*` is a wildcard, not a requestable action".into(),
            ));
        }
        if let Some(obj) = self.objects.iter().find(|o| o.is_type_wildcard()) {
            return Err(AccessError::MalformedRequest(format!(
                "object `{obj}` is a type wildcard (expected \"type:key\")"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Effect {
    Allow,
    Deny,
}

impl Effect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Effect::Allow => "allow",
            Effect::Deny => "deny",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "allow" => Some(Effect::Allow),
            "deny" => Some(Effect::Deny),
            _ => None,
        }
    }
}

/// A named rule: when its constraint matches a request, `effect` applies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    /// `Uuid::nil()` means "assign a key on create".
    #[serde(default = "Uuid::nil")]
    pub key: Uuid,
    pub name: String,
    pub effect: Effect,
    #[serde(default)]
    pub constraint: Constraint,
    #[serde(default)]
    pub internal: bool,
}

impl Policy {
    pub fn allow(name: impl Into<String>, constraint: Constraint) -> Self {
        Self {
            key: Uuid::nil(),
            name: name.into(),
            effect: Effect::Allow,
            constraint,
            internal: false,
        }
    }

    pub fn deny(name: impl Into<String>, constraint: Constraint) -> Self {
        Self {
            effect: Effect::Deny,
            ..Self::allow(name, constraint)
        }
    }

    pub fn with_key(mut self, key: Uuid) -> Self {
        self.key = key;
        self
    }

    pub fn as_internal(mut self) -> Self {
        self.internal = true;
        self
    }
}

/// A reusable bundle of policies. Bindings and assignments live outside the record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    #[serde(default = "Uuid::nil")]
    pub key: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub internal: bool,
}

impl Role {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            key: Uuid::nil(),
            name: name.into(),
            description: description.into(),
            internal: false,
        }
    }

    /// The role's node in the relationship graph.
    pub fn resource_id(&self) -> ResourceId {
        role_resource_id(self.key)
    }
}

pub const ROLE_TYPE: &str = "role";

/// Edge kind recording that a role is held by a subject: `role --parent_of--> subject`.
pub const PARENT_OF: &str = "parent_of";

/// Edge kind recording provenance: `resource --created_by--> creator`.
pub const CREATED_BY: &str = "created_by";

pub fn role_resource_id(key: Uuid) -> ResourceId {
    ResourceId::new(ROLE_TYPE, key.to_string())
}

/// Extract role keys from graph ids, failing on the first non-UUID key.
pub fn role_keys_from_ids(ids: &[ResourceId]) -> Result<Vec<Uuid>, AccessError> {
    ids.iter()
        .map(|id| {
            Uuid::parse_str(&id.key).map_err(|_| AccessError::InvalidIdentifier(id.to_string()))
        })
        .collect()
}
