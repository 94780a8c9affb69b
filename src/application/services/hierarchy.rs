//! Hierarchy resolution
//!
//! A resolver answers "what is this item's parent" and "what are its
//! children" from the current domain state. Nothing is cached between calls:
//! the domain may have changed since the last query.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::hash::BuildHasher;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, instrument};

use crate::application::services::tree::OutlinerTree;
use crate::config::HierarchySettings;
use crate::domain::{FolderPath, FolderRoot, ItemId, ItemKind, ObjectHandle, ObjectInfo, TreeItem};
use crate::infrastructure::traits::DomainAdapter;

/// Set of already-materialized item identifiers.
pub trait ItemLookup {
    fn contains_item(&self, id: &ItemId) -> bool;
}

impl<V, S: BuildHasher> ItemLookup for HashMap<ItemId, V, S> {
    fn contains_item(&self, id: &ItemId) -> bool {
        self.contains_key(id)
    }
}

impl<S: BuildHasher> ItemLookup for HashSet<ItemId, S> {
    fn contains_item(&self, id: &ItemId) -> bool {
        self.contains(id)
    }
}

impl ItemLookup for BTreeSet<ItemId> {
    fn contains_item(&self, id: &ItemId) -> bool {
        self.contains(id)
    }
}

impl ItemLookup for OutlinerTree {
    fn contains_item(&self, id: &ItemId) -> bool {
        self.contains(id)
    }
}

/// Resolver contract consumed by the materialized tree and the view layer.
pub trait HierarchyResolver: Send + Sync {
    /// Resolved parent under the current configuration. `None` for root items
    /// and for items this hierarchy does not show.
    fn parent_id(&self, id: &ItemId) -> Option<ItemId>;

    /// Build the item for `id`, or `None` if it is stale or not shown.
    fn create_item(&self, id: &ItemId) -> Option<TreeItem>;

    /// Full materialization: every item this hierarchy shows.
    fn create_items(&self) -> Vec<TreeItem>;

    fn create_children(&self, item: &TreeItem) -> Vec<TreeItem>;

    fn options(&self) -> HierarchySettings;

    fn set_options(&self, options: HierarchySettings);

    /// Parent of `item` if it is already among `known`.
    fn find_parent(&self, item: &TreeItem, known: &dyn ItemLookup) -> Option<ItemId> {
        self.parent_id(&item.id)
            .filter(|parent| known.contains_item(parent))
    }

    /// Force-construct the parent of `item`, used when a delta arrives for an
    /// item whose ancestors have not been materialized.
    fn create_parent_item(&self, item: &TreeItem) -> Option<TreeItem> {
        self.parent_id(&item.id)
            .and_then(|parent| self.create_item(&parent))
    }
}

/// Which part of the domain a resolver projects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Projection {
    World,
    NestedScope(ObjectHandle),
}

/// Resolution rules shared by both resolver variants.
pub(crate) struct HierarchyCore {
    domain: Arc<dyn DomainAdapter>,
    options: RwLock<HierarchySettings>,
    projection: Projection,
}

impl HierarchyCore {
    pub(crate) fn new(domain: Arc<dyn DomainAdapter>, options: HierarchySettings, projection: Projection) -> Self {
        Self {
            domain,
            options: RwLock::new(options),
            projection,
        }
    }

    pub(crate) fn options(&self) -> HierarchySettings {
        *self.options.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn set_options(&self, options: HierarchySettings) {
        *self.options.write().unwrap_or_else(PoisonError::into_inner) = options;
    }

    fn nested_root(&self) -> Option<ObjectHandle> {
        match self.projection {
            Projection::World => None,
            Projection::NestedScope(root) => Some(root),
        }
    }

    /// Top item of this projection, if it currently exists.
    pub(crate) fn root_id(&self) -> Option<ItemId> {
        match self.projection {
            Projection::World => self.domain.scope().map(|scope| ItemId::Scope(scope.id)),
            Projection::NestedScope(root) => self
                .domain
                .object(root)
                .filter(|info| info.is_nested_scope)
                .map(|_| ItemId::NestedScopeRoot(root)),
        }
    }

    /// Folder namespace shown by this projection.
    pub(crate) fn folder_root(&self) -> FolderRoot {
        match self.projection {
            Projection::World => FolderRoot::Scope,
            Projection::NestedScope(root) => FolderRoot::Object(root),
        }
    }

    /// Whether an object belongs to this projection under the current options.
    ///
    /// Content of a nested scope is shown only while nested scopes are
    /// displayed or the scope is being edited; ownership cycles hide the object.
    fn object_visible(&self, info: &ObjectInfo) -> bool {
        if Some(info.handle) == self.nested_root() {
            return false;
        }
        let options = self.options();
        let mut visited = HashSet::new();
        let mut owner = info.owner;
        loop {
            match owner {
                None => return self.projection == Projection::World,
                Some(current) if Some(current) == self.nested_root() => return true,
                Some(current) => {
                    if !visited.insert(current) {
                        debug!(object = %info.handle, "cyclic nested-scope ownership, hiding object");
                        return false;
                    }
                    let Some(owner_info) = self.domain.object(current) else {
                        return false;
                    };
                    if !(options.show_nested_scopes || owner_info.editing) {
                        return false;
                    }
                    owner = owner_info.owner;
                }
            }
        }
    }

    /// True if `handle` lies on its own attachment chain.
    fn attachment_cycle(&self, handle: ObjectHandle) -> bool {
        let mut visited = HashSet::new();
        let mut current = self.domain.object(handle).and_then(|info| info.attach_parent);
        while let Some(parent) = current {
            if parent == handle {
                return true;
            }
            if !visited.insert(parent) {
                return false;
            }
            current = self.domain.object(parent).and_then(|info| info.attach_parent);
        }
        false
    }

    fn folder_visible(&self, root: FolderRoot, path: &FolderPath) -> bool {
        self.options().show_folders
            && root == self.folder_root()
            && !path.is_none()
            && self.root_id().is_some()
            && self.domain.folder_exists(root, path)
    }

    /// Folder item for `path` if it is shown, otherwise the projection root.
    fn folder_or_root(&self, root: FolderRoot, path: &FolderPath) -> Option<ItemId> {
        if !path.is_none() && self.options().show_folders {
            if self.domain.folder_exists(root, path) {
                return Some(ItemId::Folder(root, path.clone()));
            }
            debug!(%path, "folder path not registered, parenting to root");
        }
        self.root_id()
    }

    /// Attachment parent, then enclosing nested scope, then folder, then root.
    fn object_parent(&self, info: &ObjectInfo) -> Option<ItemId> {
        let owner_parent = info
            .owner
            .filter(|owner| Some(*owner) != self.nested_root())
            .map(ItemId::Object);

        if let Some(parent) = info.attach_parent {
            if self.attachment_cycle(info.handle) {
                debug!(object = %info.handle, "cyclic attachment, parenting to root");
                return owner_parent.or_else(|| self.root_id());
            }
            match self.domain.object(parent) {
                Some(parent_info) if parent_info.owner == info.owner && self.object_visible(&parent_info) => {
                    return Some(ItemId::Object(parent));
                }
                Some(_) => {}
                None => debug!(object = %info.handle, "attachment parent expired"),
            }
        }

        if owner_parent.is_some() {
            return owner_parent;
        }

        let root = info.folder_root();
        if root == self.folder_root() {
            self.folder_or_root(root, &info.folder)
        } else {
            self.root_id()
        }
    }

    pub(crate) fn parent_id(&self, id: &ItemId) -> Option<ItemId> {
        match id {
            ItemId::Scope(_) | ItemId::NestedScopeRoot(_) => None,
            ItemId::Object(handle) => {
                let info = self.domain.object(*handle)?;
                if !self.object_visible(&info) {
                    return None;
                }
                self.object_parent(&info)
            }
            ItemId::SubObject(handle) => {
                let sub = self.domain.sub_object(*handle)?;
                let owner = self.domain.object(sub.owner)?;
                (self.options().show_components && self.object_visible(&owner))
                    .then_some(ItemId::Object(sub.owner))
            }
            ItemId::Folder(root, path) => {
                if !self.folder_visible(*root, path) {
                    return None;
                }
                self.folder_or_root(*root, &path.parent())
            }
            ItemId::Unloaded(guid) => {
                if self.projection != Projection::World || !self.options().show_unloaded {
                    return None;
                }
                let descriptor = self.domain.unloaded_descriptor(*guid)?;
                self.folder_or_root(FolderRoot::Scope, &descriptor.folder)
            }
        }
    }

    #[instrument(level = "trace", skip(self))]
    pub(crate) fn create_item(&self, id: &ItemId) -> Option<TreeItem> {
        let label = match id {
            ItemId::Scope(scope_id) => {
                let scope = self.domain.scope()?;
                if self.projection != Projection::World || scope.id != *scope_id {
                    return None;
                }
                scope.label
            }
            ItemId::NestedScopeRoot(handle) => {
                if Some(*handle) != self.nested_root() {
                    return None;
                }
                self.domain.object(*handle).filter(|info| info.is_nested_scope)?.label
            }
            ItemId::Object(handle) => {
                let info = self.domain.object(*handle)?;
                self.object_visible(&info).then_some(info.label)?
            }
            ItemId::SubObject(handle) => {
                self.parent_id(id)?;
                self.domain.sub_object(*handle)?.label
            }
            ItemId::Folder(root, path) => {
                if !self.folder_visible(*root, path) {
                    return None;
                }
                path.leaf().to_string()
            }
            ItemId::Unloaded(guid) => {
                self.parent_id(id)?;
                self.domain.unloaded_descriptor(*guid)?.label
            }
        };
        Some(TreeItem::new(id.clone(), label))
    }

    /// Identifiers that may resolve to `parent`; callers confirm with `parent_id`.
    fn candidates(&self, parent: &ItemId) -> Vec<ItemId> {
        let root = self.folder_root();
        let mut candidates = Vec::new();
        match parent {
            ItemId::Folder(folder_root, path) => {
                candidates.extend(
                    self.domain
                        .folders(*folder_root)
                        .into_iter()
                        .filter(|folder| &folder.parent() == path)
                        .map(|folder| ItemId::Folder(*folder_root, folder)),
                );
                candidates.extend(
                    self.domain
                        .objects()
                        .into_iter()
                        .filter(|&handle| {
                            self.domain
                                .object(handle)
                                .map(|info| &info.folder == path)
                                .unwrap_or(false)
                        })
                        .map(ItemId::Object),
                );
                if self.projection == Projection::World {
                    candidates.extend(
                        self.domain
                            .unloaded()
                            .into_iter()
                            .filter(|descriptor| &descriptor.folder == path)
                            .map(|descriptor| ItemId::Unloaded(descriptor.guid)),
                    );
                }
            }
            ItemId::Scope(_) | ItemId::NestedScopeRoot(_) => {
                candidates.extend(
                    self.domain
                        .folders(root)
                        .into_iter()
                        .map(|folder| ItemId::Folder(root, folder)),
                );
                candidates.extend(self.domain.objects().into_iter().map(ItemId::Object));
                if self.projection == Projection::World {
                    candidates.extend(
                        self.domain
                            .unloaded()
                            .into_iter()
                            .map(|descriptor| ItemId::Unloaded(descriptor.guid)),
                    );
                }
            }
            ItemId::Object(handle) => {
                candidates.extend(self.domain.sub_objects(*handle).into_iter().map(ItemId::SubObject));
                candidates.extend(self.domain.objects().into_iter().map(ItemId::Object));
            }
            ItemId::SubObject(_) | ItemId::Unloaded(_) => {}
        }
        candidates
    }

    #[instrument(level = "debug", skip(self, item), fields(item = %item.id))]
    pub(crate) fn create_children(&self, item: &TreeItem) -> Vec<TreeItem> {
        self.candidates(&item.id)
            .into_iter()
            .filter(|candidate| self.parent_id(candidate).as_ref() == Some(&item.id))
            .filter_map(|candidate| self.create_item(&candidate))
            .collect()
    }

    #[instrument(level = "debug", skip(self))]
    pub(crate) fn create_items(&self) -> Vec<TreeItem> {
        let Some(root_id) = self.root_id() else {
            return Vec::new();
        };
        let root = self.folder_root();
        let mut ids = vec![root_id];
        ids.extend(
            self.domain
                .folders(root)
                .into_iter()
                .map(|folder| ItemId::Folder(root, folder)),
        );
        for handle in self.domain.objects() {
            ids.push(ItemId::Object(handle));
            ids.extend(self.domain.sub_objects(handle).into_iter().map(ItemId::SubObject));
        }
        if self.projection == Projection::World {
            ids.extend(
                self.domain
                    .unloaded()
                    .into_iter()
                    .map(|descriptor| ItemId::Unloaded(descriptor.guid)),
            );
        }

        let items: Vec<TreeItem> = ids.iter().filter_map(|id| self.create_item(id)).collect();
        debug!(count = items.len(), "materialized");
        items
    }
}

/// Resolver over the whole scope.
pub struct WorldHierarchy {
    core: HierarchyCore,
}

impl WorldHierarchy {
    pub fn new(domain: Arc<dyn DomainAdapter>, options: HierarchySettings) -> Self {
        Self {
            core: HierarchyCore::new(domain, options, Projection::World),
        }
    }

    /// Identifier of the scope item, `None` while no scope is loaded.
    pub fn scope_item_id(&self) -> Option<ItemId> {
        self.core.root_id()
    }
}

impl HierarchyResolver for WorldHierarchy {
    fn parent_id(&self, id: &ItemId) -> Option<ItemId> {
        self.core.parent_id(id)
    }

    fn create_item(&self, id: &ItemId) -> Option<TreeItem> {
        if id.kind() == ItemKind::NestedScopeRoot {
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
    use crate::domain::{
        DomainError, DomainResult, ObjectGuid, ScopeId, ScopeInfo, SubObjectHandle, SubObjectInfo, UnloadedDescriptor,
    };
    use crate::infrastructure::memory::{InMemoryWorld, ObjectSpec};
    use crate::infrastructure::traits::{DomainListener, SubscriptionId};

    fn world() -> Arc<InMemoryWorld> {
        Arc::new(InMemoryWorld::new("Main", false))
    }

    fn options() -> HierarchySettings {
        HierarchySettings::default()
    }

    #[test]
    fn test_attached_object_resolves_to_attachment_parent() {
        let world = world();
        let parent = world.spawn(ObjectSpec::new("Parent").in_folder("Group")).unwrap();
        let child = world.spawn(ObjectSpec::new("Child").attached_to(parent).in_folder("Group")).unwrap();
        let resolver = WorldHierarchy::new(world.clone(), options());

        assert_eq!(resolver.parent_id(&ItemId::Object(child)), Some(ItemId::Object(parent)));
        assert_eq!(
            resolver.parent_id(&ItemId::Object(parent)),
            Some(ItemId::folder(FolderRoot::Scope, "Group"))
        );
    }

    #[test]
    fn test_folders_hidden_parent_object_to_scope() {
        let world = world();
        let object = world.spawn(ObjectSpec::new("Foo").in_folder("Group")).unwrap();
        let mut settings = options();
        settings.show_folders = false;
        let resolver = WorldHierarchy::new(world.clone(), settings);

        assert_eq!(resolver.parent_id(&ItemId::Object(object)), resolver.scope_item_id());
        assert!(resolver
            .create_item(&ItemId::folder(FolderRoot::Scope, "Group"))
            .is_none());
    }

    #[test]
    fn test_find_parent_requires_known_parent() {
        let world = world();
        let object = world.spawn(ObjectSpec::new("Foo").in_folder("Group")).unwrap();
        let resolver = WorldHierarchy::new(world.clone(), options());
        let item = resolver.create_item(&ItemId::Object(object)).unwrap();

        let mut known = HashSet::new();
        assert_eq!(resolver.find_parent(&item, &known), None);

        known.insert(ItemId::folder(FolderRoot::Scope, "Group"));
        assert_eq!(
            resolver.find_parent(&item, &known),
            Some(ItemId::folder(FolderRoot::Scope, "Group"))
        );
        assert_eq!(
            resolver.create_parent_item(&item).map(|parent| parent.label),
            Some("Group".to_string())
        );
    }

    /// Read-only domain reporting data the in-memory world refuses to build.
    struct CorruptWorld {
        scope: ScopeInfo,
        objects: Vec<ObjectInfo>,
    }

    impl CorruptWorld {
        fn object_info(index: usize, label: &str) -> ObjectInfo {
            ObjectInfo {
                handle: handle(index),
                guid: ObjectGuid::new(),
                label: label.to_string(),
                attach_parent: None,
                folder: FolderPath::none(),
                owner: None,
                is_nested_scope: false,
                editing: false,
                temporary: false,
                locked: false,
            }
        }
    }

    fn handle(index: usize) -> ObjectHandle {
        ObjectHandle::from_index(generational_arena::Index::from_raw_parts(index, 0))
    }

    impl DomainAdapter for CorruptWorld {
        fn scope(&self) -> Option<ScopeInfo> {
            Some(self.scope.clone())
        }
        fn objects(&self) -> Vec<ObjectHandle> {
            self.objects.iter().map(|info| info.handle).collect()
        }
        fn object(&self, handle: ObjectHandle) -> Option<ObjectInfo> {
            self.objects.iter().find(|info| info.handle == handle).cloned()
        }
        fn sub_objects(&self, _owner: ObjectHandle) -> Vec<SubObjectHandle> {
            Vec::new()
        }
        fn sub_object(&self, _handle: SubObjectHandle) -> Option<SubObjectInfo> {
            None
        }
        fn folders(&self, _root: FolderRoot) -> Vec<FolderPath> {
            Vec::new()
        }
        fn folder_exists(&self, _root: FolderRoot, _path: &FolderPath) -> bool {
            false
        }
        fn unloaded(&self) -> Vec<UnloadedDescriptor> {
            Vec::new()
        }
        fn unloaded_descriptor(&self, _guid: ObjectGuid) -> Option<UnloadedDescriptor> {
            None
        }
        fn attachment_sockets(&self, _parent: ObjectHandle) -> Vec<String> {
            Vec::new()
        }
        fn can_attach(&self, _parent: ObjectHandle, _child: ObjectHandle) -> Result<(), String> {
            Err("read-only".to_string())
        }
        fn can_move_to_container(&self, _object: ObjectHandle, _root: FolderRoot) -> Result<(), String> {
            Err("read-only".to_string())
        }
        fn attach(&self, _parent: ObjectHandle, _child: ObjectHandle, _socket: Option<&str>) -> DomainResult<()> {
            Err(DomainError::Rejected("read-only".to_string()))
        }
        fn detach(&self, _child: ObjectHandle) -> DomainResult<()> {
            Err(DomainError::Rejected("read-only".to_string()))
        }
        fn set_folder_path(&self, _object: ObjectHandle, _path: &FolderPath) -> DomainResult<()> {
            Err(DomainError::Rejected("read-only".to_string()))
        }
        fn move_to_container(&self, _objects: &[ObjectHandle], _root: FolderRoot) -> DomainResult<()> {
            Err(DomainError::Rejected("read-only".to_string()))
        }
        fn create_folder(&self, _root: FolderRoot, _path: &FolderPath) -> DomainResult<()> {
            Err(DomainError::Rejected("read-only".to_string()))
        }
        fn rename_folder(&self, _root: FolderRoot, _old: &FolderPath, _new: &FolderPath) -> DomainResult<()> {
            Err(DomainError::Rejected("read-only".to_string()))
        }
        fn delete_folder(&self, _root: FolderRoot, _path: &FolderPath) -> DomainResult<()> {
            Err(DomainError::Rejected("read-only".to_string()))
        }
        fn pin(&self, _guid: ObjectGuid) {}
        fn unpin(&self, _guid: ObjectGuid) {}
        fn is_pinned(&self, _guid: ObjectGuid) -> bool {
            false
        }
        fn subscribe(&self, _listener: DomainListener) -> SubscriptionId {
            SubscriptionId(0)
        }
        fn unsubscribe(&self, _id: SubscriptionId) {}
    }

    #[test]
    fn test_cyclic_attachment_and_ownership_are_tolerated() {
        let mut a = CorruptWorld::object_info(0, "A");
        let mut b = CorruptWorld::object_info(1, "B");
        let mut c = CorruptWorld::object_info(2, "C");
        let mut d = CorruptWorld::object_info(3, "D");
        a.attach_parent = Some(b.handle);
        b.attach_parent = Some(a.handle);
        c.is_nested_scope = true;
        c.owner = Some(c.handle);
        d.owner = Some(c.handle);
        let world = Arc::new(CorruptWorld {
            scope: ScopeInfo {
                id: ScopeId::new(),
                label: "Main".to_string(),
                partitioned: false,
            },
            objects: vec![a, b, c, d],
        });
        let resolver = WorldHierarchy::new(world, options());
        let scope = resolver.scope_item_id();

        let items: Vec<ItemId> = resolver.create_items().into_iter().map(|item| item.id).collect();

        assert_eq!(resolver.parent_id(&ItemId::Object(handle(0))), scope);
        assert_eq!(resolver.parent_id(&ItemId::Object(handle(1))), scope);
        assert!(items.contains(&ItemId::Object(handle(0))));
        assert!(items.contains(&ItemId::Object(handle(1))));
        assert!(resolver.create_item(&ItemId::Object(handle(2))).is_none());
        assert!(!items.contains(&ItemId::Object(handle(2))));
        assert!(!items.contains(&ItemId::Object(handle(3))));
    }
}
