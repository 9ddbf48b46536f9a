use std::collections::HashSet;
use std::path::Path;

use crate::access::errors::AccessError;
use crate::access::policy::parse_kdl_document;
use crate::access::types::{Effect, Policy};

/// Load all `.kdl` policy files from the given directory, in file-name order.
pub fn load_policies(dir: &Path) -> Result<Vec<Policy>, AccessError> {
    if !dir.is_dir() {
        return Err(AccessError::InvalidPolicy(format!(
            "policies directory `{}` does not exist or is not a directory",
            dir.display()
        )));
    }

    let mut entries: Vec<_> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.path()
                .extension()
                .map(|ext| ext == "kdl")
                .unwrap_or(false)
        })
        .collect();
    entries.sort_by_key(|e| e.path());

    let mut policies = Vec::new();
    let mut file_count = 0;

    for entry in entries {
        let path = entry.path();
        let contents =
            std::fs::read_to_string(&path).map_err(|source| AccessError::PolicyLoadError {
                path: path.display().to_string(),
                source,
            })?;
        policies.extend(parse_kdl_document(&contents)?);
        file_count += 1;
    }

    check_duplicate_keys(&policies)?;

    tracing::info!(
        files = file_count,
        policies = policies.len(),
        deny = policies.iter().filter(|p| p.effect == Effect::Deny).count(),
        "Loaded system policies"
    );

    Ok(policies)
}

/// Explicit keys must be unique across all loaded files.
fn check_duplicate_keys(policies: &[Policy]) -> Result<(), AccessError> {
    let mut seen = HashSet::new();
    for p in policies {
        if !seen.insert(p.key) {
            return Err(AccessError::InvalidPolicy(format!(
                "duplicate policy key `{}` (policy `{}`)",
                p.key, p.name
            )));
        }
    }
    Ok(())
}
