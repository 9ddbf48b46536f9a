use crate::access::constraint::{Constraint, MatchOperator};
use crate::access::errors::AccessError;
use crate::access::types::{Action, Effect, Policy, ResourceId};
use kdl::{KdlDocument, KdlNode};
use uuid::Uuid;

/// Parse a KDL document string into policies.
///
/// ```kdl
/// policy "protect-metrics" effect="deny" {
///     match {
///         - "metrics"
///     }
///     actions {
///         - "update"
///         - "delete"
///     }
/// }
/// ```
pub fn parse_kdl_document(source: &str) -> Result<Vec<Policy>, AccessError> {
    let doc: KdlDocument = source
        .parse()
        .map_err(|e: kdl::KdlError| AccessError::KdlParse(e.to_string()))?;

    let mut policies = Vec::new();

    for node in doc.nodes() {
        match node.name().value() {
            "policy" => policies.push(parse_policy(node)?),
            other => {
                tracing::warn!("ignoring unknown top-level KDL node `{other}`");
            }
        }
    }

    Ok(policies)
}

fn parse_policy(node: &KdlNode) -> Result<Policy, AccessError> {
    let name = first_string_arg(node).ok_or_else(|| {
        AccessError::InvalidPolicy(
            "policy node requires a string argument (e.g. policy \"protect-metrics\" effect=\"deny\")"
                .into(),
        )
    })?;

    let effect_str = node
        .get("effect")
        .and_then(|v| v.as_string())
        .unwrap_or("allow");
    let effect = Effect::parse(effect_str).ok_or_else(|| {
        AccessError::InvalidPolicy(format!(
            "policy `{name}` has effect `{effect_str}` (expected \"allow\" or \"deny\")"
        ))
    })?;

    let key = match node.get("key").and_then(|v| v.as_string()) {
        Some(k) => Uuid::parse_str(k).map_err(|_| {
            AccessError::InvalidPolicy(format!("policy `{name}` has invalid key `{k}`"))
        })?,
        None => Uuid::new_v4(),
    };

    let children = parse_children(node, &name)?;
    let constraint = match children.len() {
        1 => children.into_iter().next().unwrap_or_default(),
        _ => Constraint::all(children),
    };
    constraint
        .validate()
        .map_err(|e| AccessError::InvalidPolicy(format!("policy `{name}`: {e}")))?;

    Ok(Policy {
        key,
        name,
        effect,
        constraint,
        internal: false,
    })
}

fn parse_children(node: &KdlNode, policy: &str) -> Result<Vec<Constraint>, AccessError> {
    let Some(children) = node.children() else {
        return Ok(Vec::new());
    };
    children
        .nodes()
        .iter()
        .map(|child| parse_constraint(child, policy))
        .collect()
}

fn parse_constraint(node: &KdlNode, policy: &str) -> Result<Constraint, AccessError> {
    match node.name().value() {
        "match" => {
            let ids = resource_ids(node, policy)?;
            if ids.is_empty() {
                return Err(AccessError::InvalidPolicy(format!(
                    "`match` in policy `{policy}` lists no resource ids"
                )));
            }
            Ok(Constraint::match_ids(ids))
        }
        "actions" => {
            let actions = dash_list(node, policy)?;
            if actions.is_empty() {
                return Err(AccessError::InvalidPolicy(format!(
                    "`actions` in policy `{policy}` lists no actions"
                )));
            }
            Ok(Constraint::actions(actions.into_iter().map(Action::from)))
        }
        "all" => Ok(Constraint::all(parse_children(node, policy)?)),
        "any" => Ok(Constraint::any(parse_children(node, policy)?)),
        "not" => Ok(Constraint::none_of(parse_children(node, policy)?)),
        "related" => {
            let relationship = first_string_arg(node).ok_or_else(|| {
                AccessError::InvalidPolicy(format!(
                    "`related` in policy `{policy}` requires a relationship argument (e.g. related \"labeled_by\")"
                ))
            })?;
            let match_subject = node
                .get("subject")
                .and_then(|v| v.as_bool())
                .unwrap_or(false);
            Ok(Constraint::Relationship {
                relationship,
                operator: MatchOperator::ContainsAny,
                ids: resource_ids(node, policy)?,
                match_subject,
            })
        }
        other => Err(AccessError::InvalidPolicy(format!(
            "unexpected child `{other}` in policy `{policy}` (expected `match`, `actions`, `all`, `any`, `not` or `related`)"
        ))),
    }
}

fn resource_ids(node: &KdlNode, policy: &str) -> Result<Vec<ResourceId>, AccessError> {
    dash_list(node, policy)?
        .into_iter()
        .map(|s| {
            ResourceId::parse(&s).ok_or_else(|| {
                AccessError::InvalidPolicy(format!(
                    "invalid resource id `{s}` in policy `{policy}` (expected \"type:key\" or \"type\")"
                ))
            })
        })
        .collect()
}

/// Extract the first string argument from a KDL node.
fn first_string_arg(node: &KdlNode) -> Option<String> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

/// Extract dash-list children: every child must be a `-` node with one string argument.
fn dash_list(node: &KdlNode, policy: &str) -> Result<Vec<String>, AccessError> {
    let Some(children) = node.children() else {
        return Ok(Vec::new());
    };
    let parent = node.name().value();
    children
        .nodes()
        .iter()
        .map(|n| {
            if n.name().value() != "-" {
                return Err(AccessError::InvalidPolicy(format!(
                    "unexpected `{}` inside `{parent}` in policy `{policy}` (expected `- \"value\"` entries)",
                    n.name().value()
                )));
            }
            match n.entries() {
                [entry] if entry.name().is_none() => entry
                    .value()
                    .as_string()
                    .map(|s| s.to_string())
                    .ok_or_else(|| {
                        AccessError::InvalidPolicy(format!(
                            "entry inside `{parent}` in policy `{policy}` must be a string"
                        ))
                    }),
                _ => Err(AccessError::InvalidPolicy(format!(
                    "each `-` inside `{parent}` in policy `{policy}` takes exactly one string"
                ))),
            }
        })
        .collect()
}
