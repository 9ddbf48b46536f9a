use parking_lot::RwLock;
use uuid::Uuid;

use crate::access::types::Policy;

/// Policies that apply to every subject regardless of role.
///
/// Constructed once at bring-up and shared as `Arc<SystemPolicyRegistry>`. Reads take
/// a snapshot so registrations never block an in-flight decision for long.
#[derive(Debug, Default)]
pub struct SystemPolicyRegistry {
    policies: RwLock<Vec<Policy>>,
}

impl SystemPolicyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append policies. Duplicates are kept.
    pub fn register(&self, policies: impl IntoIterator<Item = Policy>) {
        let mut guard = self.policies.write();
        let before = guard.len();
        guard.extend(policies);
        tracing::debug!(
            added = guard.len() - before,
            total = guard.len(),
            "Registered system policies"
        );
    }

    pub fn all(&self) -> Vec<Policy> {
        self.policies.read().clone()
    }

    /// Remove every registered policy with `key`, returning how many were dropped.
    pub fn remove(&self, key: Uuid) -> usize {
        let mut guard = self.policies.write();
        let before = guard.len();
        guard.retain(|p| p.key != key);
        before - guard.len()
    }

    pub fn len(&self) -> usize {
        self.policies.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::constraint::Constraint;
    use std::sync::Arc;

    #[test]
    fn test_register_appends_without_dedup() {
        let registry = SystemPolicyRegistry::new();
        assert!(registry.is_empty());

        let p = Policy::deny("no-metrics", Constraint::default()).with_key(Uuid::new_v4());
        registry.register(vec![p.clone()]);
        registry.register(vec![p.clone()]);

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.all(), vec![p.clone(), p]);
    }

    #[test]
    fn test_remove_by_key() {
        let registry = SystemPolicyRegistry::new();
        let keep = Policy::allow("keep", Constraint::default()).with_key(Uuid::new_v4());
        let drop = Policy::deny("drop", Constraint::default()).with_key(Uuid::new_v4());
        registry.register(vec![keep.clone(), drop.clone(), drop.clone()]);

        assert_eq!(registry.remove(drop.key), 2);
        assert_eq!(registry.remove(drop.key), 0);
        assert_eq!(registry.all(), vec![keep]);
    }

    #[test]
    fn test_snapshot_is_detached() {
        let registry = SystemPolicyRegistry::new();
        registry.register(vec![Policy::allow("a", Constraint::default())]);
        let snapshot = registry.all();
        registry.register(vec![Policy::allow("b", Constraint::default())]);
        assert_eq!(snapshot.len(), 1);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_concurrent_registration() {
        let registry = Arc::new(SystemPolicyRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    for j in 0..25 {
                        registry.register(vec![Policy::allow(
                            format!("p-{i}-{j}"),
                            Constraint::default(),
                        )]);
                        let _ = registry.all();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(registry.len(), 200);
    }
}
