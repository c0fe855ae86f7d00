use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// A single grant: an action, optionally narrowed to a scope
///
/// An empty `scope` grants the action without any resource restriction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Permission {
    pub action: String,
    #[serde(default)]
    pub scope: String,
}

impl Permission {
    pub fn new(action: impl Into<String>, scope: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            scope: scope.into(),
        }
    }
}

/// Grants grouped by action: `action -> {scope, ...}`
///
/// Ordered containers keep the value identical for identical input sets,
/// whatever order the permissions arrived in.
pub type ScopesByAction = BTreeMap<String, BTreeSet<String>>;

/// Fold a flat permission list into the shape evaluators consume
///
/// Duplicates collapse. An action granted only with an empty scope still
/// gets an entry, so action-only checks succeed.
pub fn group_scopes_by_action(permissions: &[Permission]) -> ScopesByAction {
    let mut grouped = ScopesByAction::new();

    for permission in permissions {
        let scopes = grouped.entry(permission.action.clone()).or_default();
        if !permission.scope.is_empty() {
            scopes.insert(permission.scope.clone());
        }
    }

    grouped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_collapses_duplicates() {
        let grouped = group_scopes_by_action(&[
            Permission::new("users:read", "users:id:1"),
            Permission::new("users:read", "users:id:1"),
            Permission::new("users:read", "users:id:2"),
            Permission::new("teams:read", "teams:*"),
        ]);

        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped["users:read"].len(), 2);
        assert!(grouped["teams:read"].contains("teams:*"));
    }

    #[test]
    fn test_group_is_order_independent() {
        let a = vec![
            Permission::new("users:read", "users:id:2"),
            Permission::new("users:write", "users:*"),
            Permission::new("users:read", "users:id:1"),
        ];
        let mut b = a.clone();
        b.reverse();

        assert_eq!(group_scopes_by_action(&a), group_scopes_by_action(&b));
    }

    #[test]
    fn test_group_keeps_action_only_grants() {
        let grouped = group_scopes_by_action(&[Permission::new("server.stats:read", "")]);

        assert!(grouped.contains_key("server.stats:read"));
        assert!(grouped["server.stats:read"].is_empty());
    }
}
