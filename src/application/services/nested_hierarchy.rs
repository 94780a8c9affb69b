//! Resolver rooted at a single nested scope

use std::sync::Arc;

use crate::application::services::hierarchy::{HierarchyCore, HierarchyResolver, Projection};
use crate::config::HierarchySettings;
use crate::domain::{ItemId, ItemKind, ObjectHandle, TreeItem};
use crate::infrastructure::traits::DomainAdapter;

/// Shows only the content of one nested scope, under a synthetic
/// `NestedScopeRoot` item representing the scope object itself.
///
/// Folder logic is the whole-world one, restricted to the folders whose root
/// is the nested scope. Unloaded descriptors and the scope item never appear.
pub struct NestedScopeHierarchy {
    root: ObjectHandle,
    core: HierarchyCore,
}

impl NestedScopeHierarchy {
    pub fn new(domain: Arc<dyn DomainAdapter>, root: ObjectHandle, options: HierarchySettings) -> Self {
        Self {
            root,
            core: HierarchyCore::new(domain, options, Projection::NestedScope(root)),
        }
    }

    pub fn root(&self) -> ObjectHandle {
        self.root
    }

    pub fn root_item_id(&self) -> ItemId {
        ItemId::NestedScopeRoot(self.root)
    }
}

impl HierarchyResolver for NestedScopeHierarchy {
    fn parent_id(&self, id: &ItemId) -> Option<ItemId> {
        self.core.parent_id(id)
    }

    fn create_item(&self, id: &ItemId) -> Option<TreeItem> {
        if matches!(id.kind(), ItemKind::Scope | ItemKind::Unloaded) {
            return None;
        }
        self.core.create_item(id)
    }

    fn create_items(&self) -> Vec<TreeItem> {
        self.core.create_items()
    }

    fn create_children(&self, item: &TreeItem) -> Vec<TreeItem> {
        self.core.create_children(item)
    }

    fn options(&self) -> HierarchySettings {
        self.core.options()
    }

    fn set_options(&self, options: HierarchySettings) {
        self.core.set_options(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::FolderRoot;
    use crate::infrastructure::memory::{InMemoryWorld, ObjectSpec};
    use crate::infrastructure::traits::DomainAdapter as _;

    #[test]
    fn test_nested_content_hangs_off_synthetic_root() {
        let world = Arc::new(InMemoryWorld::new("Main", false));
        let instance = world.spawn(ObjectSpec::new("Instance").nested_scope(true)).unwrap();
        let inner = world
            .spawn(ObjectSpec::new("Inner").owned_by(instance).in_folder("Props"))
            .unwrap();
        let outside = world.spawn(ObjectSpec::new("Outside")).unwrap();
        let resolver = NestedScopeHierarchy::new(world.clone(), instance, HierarchySettings::default());

        let ids: Vec<ItemId> = resolver.create_items().into_iter().map(|item| item.id).collect();
        assert_eq!(
            ids,
            vec![
                ItemId::NestedScopeRoot(instance),
                ItemId::folder(FolderRoot::Object(instance), "Props"),
                ItemId::Object(inner),
            ]
        );
        assert!(!ids.contains(&ItemId::Object(outside)));
        assert_eq!(
            resolver.parent_id(&ItemId::folder(FolderRoot::Object(instance), "Props")),
            Some(resolver.root_item_id())
        );
        assert!(world.folder_exists(FolderRoot::Object(instance), &"Props".into()));
    }
}
