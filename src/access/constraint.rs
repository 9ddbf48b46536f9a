//! Boolean constraint language evaluated against a [`Request`].
//!
//! A constraint is a small tree:
//! - `match`: every request object must match one of the listed ids
//!   (type wildcards like `channel:` cover every channel)
//! - `action`: the request action must be in the set, or the set contains `*`
//! - `logical`: `contains_all` (AND), `contains_any` (OR) or `contains_none` (NOT)
//!   over nested constraints
//! - `relationship`: every request object must have an outgoing graph edge of the
//!   given kind to one of the listed ids (or to the request subject)
//!
//! A tree without an `action` node matches every action. The default constraint is an
//! empty AND and always matches.

use std::collections::BTreeSet;

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::access::errors::AccessError;
use crate::access::store::RelationshipGraph;
use crate::access::types::{Action, Request, ResourceId};

const MAX_DEPTH: usize = 16;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchOperator {
    #[default]
    ContainsAny,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionOperator {
    #[default]
    IsIn,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogicalOperator {
    /// AND
    #[default]
    ContainsAll,
    /// OR
    ContainsAny,
    /// NOT: none of the nested constraints holds
    ContainsNone,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Constraint {
    Match {
        #[serde(default)]
        operator: MatchOperator,
        ids: Vec<ResourceId>,
    },
    Action {
        #[serde(default)]
        operator: ActionOperator,
        actions: BTreeSet<Action>,
    },
    Logical {
        #[serde(default)]
        operator: LogicalOperator,
        #[serde(default)]
        constraints: Vec<Constraint>,
    },
    Relationship {
        relationship: String,
        #[serde(default)]
        operator: MatchOperator,
        #[serde(default)]
        ids: Vec<ResourceId>,
        #[serde(default)]
        match_subject: bool,
    },
}

impl Default for Constraint {
    fn default() -> Self {
        Constraint::all(Vec::new())
    }
}

impl Constraint {
    pub fn match_ids(ids: impl IntoIterator<Item = ResourceId>) -> Self {
        Constraint::Match {
            operator: MatchOperator::ContainsAny,
            ids: ids.into_iter().collect(),
        }
    }

    pub fn actions(actions: impl IntoIterator<Item = Action>) -> Self {
        Constraint::Action {
            operator: ActionOperator::IsIn,
            actions: actions.into_iter().collect(),
        }
    }

    pub fn all(constraints: Vec<Constraint>) -> Self {
        Constraint::Logical {
            operator: LogicalOperator::ContainsAll,
            constraints,
        }
    }

    pub fn any(constraints: Vec<Constraint>) -> Self {
        Constraint::Logical {
            operator: LogicalOperator::ContainsAny,
            constraints,
        }
    }

    /// Satisfied when no constraint in `constraints` is.
    pub fn none_of(constraints: Vec<Constraint>) -> Self {
        Constraint::Logical {
            operator: LogicalOperator::ContainsNone,
            constraints,
        }
    }

    pub fn related(relationship: impl Into<String>, ids: Vec<ResourceId>) -> Self {
        Constraint::Relationship {
            relationship: relationship.into(),
            operator: MatchOperator::ContainsAny,
            ids,
            match_subject: false,
        }
    }

    pub fn related_to_subject(relationship: impl Into<String>) -> Self {
        Constraint::Relationship {
            relationship: relationship.into(),
            operator: MatchOperator::ContainsAny,
            ids: Vec::new(),
            match_subject: true,
        }
    }

    /// Shorthand for the common "these objects, these actions" shape.
    pub fn objects_and_actions(
        ids: impl IntoIterator<Item = ResourceId>,
        actions: impl IntoIterator<Item = Action>,
    ) -> Self {
        Constraint::all(vec![
            Constraint::match_ids(ids),
            Constraint::actions(actions),
        ])
    }

    /// Structural checks applied before a constraint is persisted or registered.
    pub fn validate(&self) -> Result<(), AccessError> {
        self.validate_at(0)
    }

    fn validate_at(&self, depth: usize) -> Result<(), AccessError> {
        if depth >= MAX_DEPTH {
            return Err(AccessError::InvalidPolicy(format!(
                "constraint nesting exceeds {MAX_DEPTH} levels"
            )));
        }
        match self {
            Constraint::Match { ids, .. } => validate_ids(ids),
            Constraint::Action { .. } => Ok(()),
            Constraint::Logical {
                operator: LogicalOperator::ContainsNone,
                constraints,
            } if constraints.is_empty() => Err(AccessError::InvalidPolicy(
                "`contains_none` needs at least one nested constraint".into(),
            )),
            Constraint::Logical { constraints, .. } => constraints
                .iter()
                .try_for_each(|c| c.validate_at(depth + 1)),
            Constraint::Relationship {
                relationship,
                ids,
                match_subject,
                ..
            } => {
                if relationship.is_empty() {
                    return Err(AccessError::InvalidPolicy(
                        "relationship constraint needs a relationship kind".into(),
                    ));
                }
                if ids.is_empty() && !match_subject {
                    return Err(AccessError::InvalidPolicy(format!(
                        "relationship constraint `{relationship}` has no target ids and does not match the subject"
                    )));
                }
                validate_ids(ids)
            }
        }
    }

    /// Evaluate against `req`. Only `relationship` nodes touch `graph`; their
    /// failures propagate unchanged.
    pub fn enforce<'a>(
        &'a self,
        req: &'a Request,
        graph: &'a dyn RelationshipGraph,
    ) -> BoxFuture<'a, Result<bool, AccessError>> {
        Box::pin(async move {
            match self {
                Constraint::Match { ids, .. } => Ok(covers_all(ids, &req.objects)),
                Constraint::Action { actions, .. } => {
                    Ok(actions.contains(&Action::All) || actions.contains(&req.action))
                }
                Constraint::Logical {
                    operator,
                    constraints,
                } => match operator {
                    LogicalOperator::ContainsAll => {
                        for c in constraints {
                            if !c.enforce(req, graph).await? {
                                return Ok(false);
                            }
                        }
                        Ok(true)
                    }
                    LogicalOperator::ContainsAny => {
                        for c in constraints {
                            if c.enforce(req, graph).await? {
                                return Ok(true);
                            }
                        }
                        Ok(false)
                    }
                    LogicalOperator::ContainsNone => {
                        for c in constraints {
                            if c.enforce(req, graph).await? {
                                return Ok(false);
                            }
                        }
                        Ok(true)
                    }
                },
                Constraint::Relationship {
                    relationship,
                    ids,
                    match_subject,
                    ..
                } => {
                    for obj in &req.objects {
                        let targets = graph.related_from(obj, relationship).await?;
                        let hit = targets.iter().any(|t| {
                            (*match_subject && *t == req.subject)
                                || ids.iter().any(|id| id.matches(t))
                        });
                        if !hit {
                            return Ok(false);
                        }
                    }
                    Ok(true)
                }
            }
        })
    }
}

fn validate_ids(ids: &[ResourceId]) -> Result<(), AccessError> {
    ids.iter()
        .try_for_each(|id| id.validate())
        .map_err(|e| AccessError::InvalidPolicy(e.to_string()))
}

/// Every object must be matched by at least one id. No coverage is pooled across
/// different constraints.
fn covers_all(ids: &[ResourceId], objects: &[ResourceId]) -> bool {
    objects
        .iter()
        .all(|obj| ids.iter().any(|id| id.matches(obj)))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use uuid::Uuid;

    /// In-memory edges keyed by (from, kind).
    #[derive(Default)]
    pub(crate) struct MapGraph {
        pub edges: HashMap<(ResourceId, String), Vec<ResourceId>>,
        pub roles: HashMap<ResourceId, Vec<Uuid>>,
    }

    impl MapGraph {
        pub fn with_edge(mut self, from: ResourceId, kind: &str, to: ResourceId) -> Self {
            self.edges
                .entry((from, kind.to_string()))
                .or_default()
                .push(to);
            self
        }
    }

    #[async_trait]
    impl RelationshipGraph for MapGraph {
        async fn resolve_assigned_roles(
            &self,
            subject: &ResourceId,
        ) -> Result<Vec<Uuid>, AccessError> {
            Ok(self.roles.get(subject).cloned().unwrap_or_default())
        }

        async fn related_from(
            &self,
            from: &ResourceId,
            kind: &str,
        ) -> Result<Vec<ResourceId>, AccessError> {
            Ok(self
                .edges
                .get(&(from.clone(), kind.to_string()))
                .cloned()
                .unwrap_or_default())
        }
    }

    /// Every lookup fails as if the store connection dropped.
    pub(crate) struct BrokenGraph;

    #[async_trait]
    impl RelationshipGraph for BrokenGraph {
        async fn resolve_assigned_roles(
            &self,
            _subject: &ResourceId,
        ) -> Result<Vec<Uuid>, AccessError> {
            Err(AccessError::Db(sea_orm::DbErr::Custom("connection lost".into())))
        }

        async fn related_from(
            &self,
            _from: &ResourceId,
            _kind: &str,
        ) -> Result<Vec<ResourceId>, AccessError> {
            Err(AccessError::Db(sea_orm::DbErr::Custom("connection lost".into())))
        }
    }

    fn ch(key: &str) -> ResourceId {
        ResourceId::new("channel", key)
    }

    fn req(objects: Vec<ResourceId>, action: Action) -> Request {
        Request::new(ResourceId::new("user", "u1"), objects, action)
    }

    async fn eval(c: &Constraint, r: &Request) -> bool {
        c.enforce(r, &MapGraph::default()).await.unwrap()
    }

    #[tokio::test]
    async fn test_match_requires_every_object() {
        let c = Constraint::match_ids(vec![ch("ch1")]);
        assert!(eval(&c, &req(vec![ch("ch1")], Action::Retrieve)).await);
        assert!(!eval(&c, &req(vec![ch("ch1"), ch("ch2")], Action::Retrieve)).await);

        let both = Constraint::match_ids(vec![ch("ch1"), ch("ch2")]);
        assert!(eval(&both, &req(vec![ch("ch1"), ch("ch2")], Action::Retrieve)).await);
    }

    #[tokio::test]
    async fn test_match_type_wildcard() {
        let c = Constraint::match_ids(vec![ResourceId::type_wildcard("channel")]);
        assert!(eval(&c, &req(vec![ch("a"), ch("b"), ch("c")], Action::Update)).await);
        assert!(
            !eval(
                &c,
                &req(vec![ch("a"), ResourceId::new("label", "l1")], Action::Update)
            )
            .await
        );
    }

    #[tokio::test]
    async fn test_match_empty_objects_is_trivially_true() {
        let c = Constraint::match_ids(vec![ch("ch1")]);
        assert!(eval(&c, &req(vec![], Action::Retrieve)).await);
    }

    #[tokio::test]
    async fn test_action_set_and_wildcard() {
        let c = Constraint::actions(vec![Action::Retrieve, Action::Update]);
        assert!(eval(&c, &req(vec![ch("x")], Action::Update)).await);
        assert!(!eval(&c, &req(vec![ch("x")], Action::Delete)).await);

        let all = Constraint::actions(vec![Action::All]);
        for action in [
            Action::Create,
            Action::Retrieve,
            Action::Update,
            Action::Delete,
            Action::from("read_data"),
        ] {
            assert!(eval(&all, &req(vec![ch("x")], action)).await);
        }
    }

    #[tokio::test]
    async fn test_no_action_node_matches_any_action() {
        let c = Constraint::all(vec![Constraint::match_ids(vec![ch("ch1")])]);
        assert!(eval(&c, &req(vec![ch("ch1")], Action::Delete)).await);
        assert!(eval(&c, &req(vec![ch("ch1")], Action::from("custom"))).await);
    }

    #[tokio::test]
    async fn test_logical_and_or() {
        let read_ch1 = Constraint::objects_and_actions(vec![ch("ch1")], vec![Action::Retrieve]);
        assert!(eval(&read_ch1, &req(vec![ch("ch1")], Action::Retrieve)).await);
        assert!(!eval(&read_ch1, &req(vec![ch("ch1")], Action::Delete)).await);

        let either = Constraint::any(vec![
            Constraint::match_ids(vec![ch("ch1")]),
            Constraint::match_ids(vec![ch("ch2")]),
        ]);
        assert!(eval(&either, &req(vec![ch("ch2")], Action::Retrieve)).await);
        // OR picks one branch for the whole object set; it does not pool coverage
        assert!(!eval(&either, &req(vec![ch("ch1"), ch("ch2")], Action::Retrieve)).await);

        assert!(!eval(&Constraint::any(vec![]), &req(vec![ch("ch1")], Action::Retrieve)).await);
    }

    #[tokio::test]
    async fn test_logical_none() {
        let not_secret = Constraint::all(vec![
            Constraint::match_ids(vec![ResourceId::type_wildcard("channel")]),
            Constraint::none_of(vec![Constraint::match_ids(vec![ch("secret")])]),
        ]);
        assert!(eval(&not_secret, &req(vec![ch("ch1")], Action::Retrieve)).await);
        assert!(!eval(&not_secret, &req(vec![ch("secret")], Action::Retrieve)).await);

        let neither = Constraint::none_of(vec![
            Constraint::actions(vec![Action::Delete]),
            Constraint::actions(vec![Action::Update]),
        ]);
        assert!(eval(&neither, &req(vec![ch("ch1")], Action::Retrieve)).await);
        assert!(!eval(&neither, &req(vec![ch("ch1")], Action::Update)).await);
    }

    #[tokio::test]
    async fn test_default_constraint_always_matches() {
        let c = Constraint::default();
        assert!(eval(&c, &req(vec![ch("anything")], Action::Delete)).await);
        assert!(eval(&c, &req(vec![ResourceId::new("x", "y")], Action::Create)).await);
    }

    #[tokio::test]
    async fn test_relationship_constraint() {
        let public = ResourceId::new("label", "public");
        let graph = MapGraph::default()
            .with_edge(ch("ch1"), "labeled_by", public.clone())
            .with_edge(ch("ch2"), "labeled_by", ResourceId::new("label", "secret"));

        let c = Constraint::related("labeled_by", vec![public]);
        let r1 = req(vec![ch("ch1")], Action::Retrieve);
        let r2 = req(vec![ch("ch1"), ch("ch2")], Action::Retrieve);
        assert!(c.enforce(&r1, &graph).await.unwrap());
        assert!(!c.enforce(&r2, &graph).await.unwrap());

        let any_label = Constraint::related("labeled_by", vec![ResourceId::type_wildcard("label")]);
        assert!(any_label.enforce(&r2, &graph).await.unwrap());
    }

    #[tokio::test]
    async fn test_relationship_match_subject() {
        let author = ResourceId::new("user", "u1");
        let graph = MapGraph::default().with_edge(
            ResourceId::new("schematic", "s1"),
            "created_by",
            author.clone(),
        );
        let c = Constraint::related_to_subject("created_by");

        let mine = Request::new(
            author,
            vec![ResourceId::new("schematic", "s1")],
            Action::Update,
        );
        let theirs = Request::new(
            ResourceId::new("user", "u2"),
            vec![ResourceId::new("schematic", "s1")],
            Action::Update,
        );
        assert!(c.enforce(&mine, &graph).await.unwrap());
        assert!(!c.enforce(&theirs, &graph).await.unwrap());
    }

    #[tokio::test]
    async fn test_graph_errors_propagate() {
        let c = Constraint::all(vec![
            Constraint::match_ids(vec![ch("ch1")]),
            Constraint::related("labeled_by", vec![ResourceId::type_wildcard("label")]),
        ]);
        let err = c
            .enforce(&req(vec![ch("ch1")], Action::Retrieve), &BrokenGraph)
            .await
            .unwrap_err();
        assert!(matches!(err, AccessError::Db(_)));
    }

    #[tokio::test]
    async fn test_and_short_circuits_before_graph() {
        // The match fails first, so the broken graph is never consulted
        let c = Constraint::all(vec![
            Constraint::match_ids(vec![ch("other")]),
            Constraint::related("labeled_by", vec![ResourceId::type_wildcard("label")]),
        ]);
        let matched = c
            .enforce(&req(vec![ch("ch1")], Action::Retrieve), &BrokenGraph)
            .await
            .unwrap();
        assert!(!matched);
    }

    #[test]
    fn test_serde_shape() {
        let c = Constraint::objects_and_actions(
            vec![ResourceId::type_wildcard("channel")],
            vec![Action::Retrieve],
        );
        let json = serde_json::to_value(&c).unwrap();
        assert_eq!(json["kind"], "logical");
        assert_eq!(json["operator"], "contains_all");
        assert_eq!(json["constraints"][0]["kind"], "match");
        assert_eq!(json["constraints"][0]["ids"][0], "channel:");
        assert_eq!(json["constraints"][1]["actions"][0], "retrieve");

        let back: Constraint = serde_json::from_value(json).unwrap();
        assert_eq!(back, c);

        // Operators default when omitted
        let terse: Constraint =
            serde_json::from_str(r#"{"kind":"match","ids":["channel:ch1"]}"#).unwrap();
        assert_eq!(terse, Constraint::match_ids(vec![ch("ch1")]));
    }

    #[test]
    fn test_validate() {
        assert!(Constraint::default().validate().is_ok());
        assert!(Constraint::related("labeled_by", vec![]).validate().is_err());
        assert!(Constraint::related("", vec![ch("x")]).validate().is_err());
        assert!(Constraint::related_to_subject("created_by").validate().is_ok());
        assert!(Constraint::none_of(vec![]).validate().is_err());
        assert!(matches!(
            Constraint::match_ids(vec![ResourceId::new("a:b", "c")]).validate(),
            Err(AccessError::InvalidPolicy(_))
        ));
        assert!(Constraint::related("labeled_by", vec![ResourceId::new("label:x", "")])
            .validate()
            .is_err());
        assert!(Constraint::none_of(vec![Constraint::related("labeled_by", vec![])])
            .validate()
            .is_err());

        let mut deep = Constraint::default();
        for _ in 0..MAX_DEPTH {
            deep = Constraint::all(vec![deep]);
        }
        assert!(matches!(deep.validate(), Err(AccessError::InvalidPolicy(_))));
    }
}
