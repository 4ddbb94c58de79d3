//! Ordered, duplicate-free set of resources declared for one run.

use std::collections::HashMap;

use serde::Serialize;

use crate::error::ConvergeError;
use crate::resource::{Action, Guard, Notification, Resource, ResourceId};

#[derive(Debug, Default)]
pub struct ResourceRegistry {
    resources: Vec<Resource>,
    index: HashMap<ResourceId, usize>,
}

/// Serializable view of one declaration, used by `shipwright plan`.
#[derive(Debug, Clone, Serialize)]
pub struct ResourceSummary {
    pub id: String,
    pub action: Action,
    pub guard: Option<Guard>,
    pub notifies: Vec<Notification>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `resource`, rejecting a second declaration of the same id.
    pub fn declare(&mut self, resource: Resource) -> Result<(), ConvergeError> {
        if self.index.contains_key(&resource.id) {
            return Err(ConvergeError::DuplicateResource {
                id: resource.id.clone(),
            });
        }
        self.index.insert(resource.id.clone(), self.resources.len());
        self.resources.push(resource);
        Ok(())
    }

    pub fn get(&self, id: &ResourceId) -> Option<&Resource> {
        self.index.get(id).map(|&i| &self.resources[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Resource> {
        self.resources.iter()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Every notification edge must point at a declared resource.
    pub fn validate(&self) -> Result<(), ConvergeError> {
        for resource in &self.resources {
            for n in &resource.notifies {
                if !self.index.contains_key(&n.target) {
                    return Err(ConvergeError::UnknownNotificationTarget {
                        notifier: resource.id.clone(),
                        action: n.action,
                        target: n.target.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn summaries(&self) -> Vec<ResourceSummary> {
        self.resources
            .iter()
            .map(|r| ResourceSummary {
                id: r.id.to_string(),
                action: r.action,
                guard: r.guard.clone(),
                notifies: r.notifies.clone(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::Ownership;

    #[test]
    fn declare_keeps_order() {
        let mut reg = ResourceRegistry::new();
        reg.declare(Resource::directory("/b", Ownership::new())).unwrap();
        reg.declare(Resource::directory("/a", Ownership::new())).unwrap();
        let keys: Vec<_> = reg.iter().map(|r| r.id.key.as_str()).collect();
        assert_eq!(keys, vec!["/b", "/a"]);
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn duplicate_identity_is_rejected() {
        let mut reg = ResourceRegistry::new();
        reg.declare(Resource::directory("/var/log/www", Ownership::new())).unwrap();
        let err = reg
            .declare(Resource::directory("/var/log/www", Ownership::of("blog")))
            .unwrap_err();
        assert!(matches!(err, ConvergeError::DuplicateResource { .. }));
        assert!(err.is_configuration());
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn same_key_different_type_is_allowed() {
        let mut reg = ResourceRegistry::new();
        reg.declare(Resource::directory("/x", Ownership::new())).unwrap();
        reg.declare(Resource::file("/x", Ownership::new(), None)).unwrap();
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn validate_rejects_undeclared_target() {
        let mut reg = ResourceRegistry::new();
        reg.declare(
            Resource::file("/etc/nginx/site", Ownership::new(), None)
                .notifies(Action::Reload, ResourceId::service("nginx")),
        )
        .unwrap();
        let err = reg.validate().unwrap_err();
        assert!(matches!(err, ConvergeError::UnknownNotificationTarget { .. }));

        reg.declare(Resource::service("nginx")).unwrap();
        reg.validate().unwrap();
    }
}
