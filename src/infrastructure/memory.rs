//! In-memory implementations of the boundary traits
//!
//! `InMemoryWorld` is a complete reference domain: objects live in a
//! generational arena, so handles to destroyed objects are detected instead of
//! dangling. Notifications are dispatched synchronously after the state lock
//! is released, which lets listeners query the world re-entrantly.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use generational_arena::Arena;
use tracing::{debug, instrument, trace};

use crate::domain::{
    DomainError, DomainEvent, DomainResult, FolderPath, FolderRoot, ObjectGuid, ObjectHandle,
    ObjectInfo, ScopeId, ScopeInfo, SubObjectHandle, SubObjectInfo, UnloadedDescriptor,
};
use crate::infrastructure::traits::{
    DomainAdapter, DomainListener, SelectionListener, SelectionProvider, SubscriptionId,
    TransactionProvider,
};

/// Everything needed to spawn an object.
#[derive(Debug, Clone, Default)]
pub struct ObjectSpec {
    pub label: String,
    pub guid: Option<ObjectGuid>,
    pub attach_parent: Option<ObjectHandle>,
    pub folder: FolderPath,
    pub owner: Option<ObjectHandle>,
    pub nested_scope: bool,
    pub editing: bool,
    pub temporary: bool,
    pub locked: bool,
    pub sockets: Vec<String>,
}

impl ObjectSpec {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Self::default()
        }
    }

    pub fn attached_to(mut self, parent: ObjectHandle) -> Self {
        self.attach_parent = Some(parent);
        self
    }

    pub fn in_folder(mut self, path: impl Into<FolderPath>) -> Self {
        self.folder = path.into();
        self
    }

    pub fn owned_by(mut self, owner: ObjectHandle) -> Self {
        self.owner = Some(owner);
        self
    }

    pub fn nested_scope(mut self, editing: bool) -> Self {
        self.nested_scope = true;
        self.editing = editing;
        self
    }

    pub fn temporary(mut self) -> Self {
        self.temporary = true;
        self
    }

    pub fn locked(mut self) -> Self {
        self.locked = true;
        self
    }

    pub fn with_sockets<I, S>(mut self, sockets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sockets = sockets.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_guid(mut self, guid: ObjectGuid) -> Self {
        self.guid = Some(guid);
        self
    }
}

#[derive(Debug, Clone)]
struct ObjectRecord {
    guid: ObjectGuid,
    label: String,
    attach_parent: Option<ObjectHandle>,
    socket: Option<String>,
    folder: FolderPath,
    owner: Option<ObjectHandle>,
    nested_scope: bool,
    editing: bool,
    temporary: bool,
    locked: bool,
    sockets: Vec<String>,
    sub_objects: Vec<SubObjectHandle>,
}

impl ObjectRecord {
    fn folder_root(&self) -> FolderRoot {
        self.owner.map(FolderRoot::Object).unwrap_or(FolderRoot::Scope)
    }
}

#[derive(Debug, Clone)]
struct SubObjectRecord {
    owner: ObjectHandle,
    label: String,
}

#[derive(Debug, Default)]
struct WorldState {
    scope: Option<ScopeInfo>,
    objects: Arena<ObjectRecord>,
    sub_objects: Arena<SubObjectRecord>,
    folders: BTreeMap<FolderRoot, BTreeSet<FolderPath>>,
    unloaded: BTreeMap<ObjectGuid, UnloadedDescriptor>,
    pinned: BTreeSet<ObjectGuid>,
}

impl WorldState {
    fn record(&self, handle: ObjectHandle) -> DomainResult<&ObjectRecord> {
        self.objects
            .get(handle.index())
            .ok_or(DomainError::StaleObject(handle))
    }

    fn record_mut(&mut self, handle: ObjectHandle) -> DomainResult<&mut ObjectRecord> {
        self.objects
            .get_mut(handle.index())
            .ok_or(DomainError::StaleObject(handle))
    }

    fn handles(&self) -> Vec<ObjectHandle> {
        self.objects
            .iter()
            .map(|(index, _)| ObjectHandle::from_index(index))
            .collect()
    }

    fn root_exists(&self, root: FolderRoot) -> bool {
        match root {
            FolderRoot::Scope => self.scope.is_some(),
            FolderRoot::Object(owner) => self.objects.contains(owner.index()),
        }
    }

    fn folder_exists(&self, root: FolderRoot, path: &FolderPath) -> bool {
        self.folders
            .get(&root)
            .map(|paths| paths.contains(path))
            .unwrap_or(false)
    }

    /// Register `path` and its missing ancestors, shallowest first.
    fn ensure_folder(&mut self, root: FolderRoot, path: &FolderPath, events: &mut Vec<DomainEvent>) {
        if path.is_none() {
            return;
        }
        let mut chain = Vec::new();
        let mut current = path.clone();
        while !current.is_none() && !self.folder_exists(root, &current) {
            chain.push(current.clone());
            current = current.parent();
        }
        let paths = self.folders.entry(root).or_default();
        for folder in chain.into_iter().rev() {
            paths.insert(folder.clone());
            events.push(DomainEvent::FolderCreated { root, path: folder });
        }
    }

    /// True if `ancestor` lies on the attachment chain above `handle`.
    fn is_attached_below(&self, handle: ObjectHandle, ancestor: ObjectHandle) -> bool {
        let mut visited = BTreeSet::new();
        let mut current = self.objects.get(handle.index()).and_then(|r| r.attach_parent);
        while let Some(parent) = current {
            if parent == ancestor {
                return true;
            }
            if !visited.insert(parent) {
                return false;
            }
            current = self.objects.get(parent.index()).and_then(|r| r.attach_parent);
        }
        false
    }

    /// True if `container` is `handle` or encloses it through nested scopes.
    fn is_inside_container(&self, handle: ObjectHandle, container: ObjectHandle) -> bool {
        let mut visited = BTreeSet::new();
        let mut current = Some(handle);
        while let Some(object) = current {
            if object == container {
                return true;
            }
            if !visited.insert(object) {
                return false;
            }
            current = self.objects.get(object.index()).and_then(|r| r.owner);
        }
        false
    }

    fn can_attach(&self, parent: ObjectHandle, child: ObjectHandle) -> Result<(), String> {
        let parent_record = self
            .record(parent)
            .map_err(|_| "Attachment parent no longer exists".to_string())?;
        let child_record = self
            .record(child)
            .map_err(|_| "Dragged object no longer exists".to_string())?;

        if parent == child {
            return Err(format!("Cannot attach {} to itself", child_record.label));
        }
        if child_record.locked {
            return Err(format!("Cannot move {} as it is locked", child_record.label));
        }
        if self.is_attached_below(parent, child) {
            return Err(format!(
                "Cannot attach {} to {}: {} is already attached to {}",
                child_record.label, parent_record.label, parent_record.label, child_record.label
            ));
        }
        if parent_record.owner != child_record.owner {
            return Err(format!(
                "Cannot attach {} to {} as they belong to different containers",
                child_record.label, parent_record.label
            ));
        }
        Ok(())
    }

    fn can_move_to_container(&self, object: ObjectHandle, root: FolderRoot) -> Result<(), String> {
        let record = self
            .record(object)
            .map_err(|_| "Dragged object no longer exists".to_string())?;
        if record.locked {
            return Err(format!("Cannot move {} as it is locked", record.label));
        }
        if let FolderRoot::Object(container) = root {
            let container_record = self
                .record(container)
                .map_err(|_| "Destination no longer exists".to_string())?;
            if !container_record.nested_scope {
                return Err(format!("{} is not a nested scope", container_record.label));
            }
            if !container_record.editing {
                return Err("Cannot move into a nested scope which is not being edited".to_string());
            }
            if self.is_inside_container(container, object) {
                return Err(format!("Cannot move {} into itself", record.label));
            }
        }
        Ok(())
    }
}

/// Reference domain adapter backed by generational arenas.
pub struct InMemoryWorld {
    state: RwLock<WorldState>,
    listeners: RwLock<Vec<(SubscriptionId, DomainListener)>>,
    next_subscription: AtomicU64,
}

impl Default for InMemoryWorld {
    fn default() -> Self {
        Self::new("World", false)
    }
}

impl InMemoryWorld {
    /// A world with its scope loaded.
    pub fn new(label: impl Into<String>, partitioned: bool) -> Self {
        let world = Self::unloaded_scope();
        world.write().scope = Some(ScopeInfo {
            id: ScopeId::new(),
            label: label.into(),
            partitioned,
        });
        world
    }

    /// A world with no scope loaded yet.
    pub fn unloaded_scope() -> Self {
        Self {
            state: RwLock::new(WorldState::default()),
            listeners: RwLock::new(Vec::new()),
            next_subscription: AtomicU64::new(1),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, WorldState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, WorldState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Dispatch events in order. Must be called without holding the state lock.
    fn emit(&self, events: Vec<DomainEvent>) {
        if events.is_empty() {
            return;
        }
        let listeners: Vec<DomainListener> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        for event in &events {
            trace!(?event, "emit");
            for listener in &listeners {
                listener(event);
            }
        }
    }

    /// Raise an arbitrary notification (used to simulate external subsystems).
    pub fn notify(&self, event: DomainEvent) {
        self.emit(vec![event]);
    }

    #[instrument(level = "debug", skip(self, spec), fields(label = %spec.label))]
    pub fn spawn(&self, spec: ObjectSpec) -> DomainResult<ObjectHandle> {
        let mut events = Vec::new();
        let handle = {
            let mut state = self.write();
            if state.scope.is_none() {
                return Err(DomainError::ScopeNotLoaded);
            }
            if let Some(owner) = spec.owner {
                if !state.record(owner)?.nested_scope {
                    return Err(DomainError::NotNestedScope(owner));
                }
            }
            if let Some(parent) = spec.attach_parent {
                let parent_owner = state.record(parent)?.owner;
                if parent_owner != spec.owner {
                    return Err(DomainError::Rejected(format!(
                        "Cannot attach {} across containers",
                        spec.label
                    )));
                }
            }
            let record = ObjectRecord {
                guid: spec.guid.unwrap_or_default(),
                label: spec.label,
                attach_parent: spec.attach_parent,
                socket: None,
                folder: spec.folder,
                owner: spec.owner,
                nested_scope: spec.nested_scope,
                editing: spec.editing,
                temporary: spec.temporary,
                locked: spec.locked,
                sockets: spec.sockets,
                sub_objects: Vec::new(),
            };
            let root = record.folder_root();
            let folder = record.folder.clone();
            state.ensure_folder(root, &folder, &mut events);
            let handle = ObjectHandle::from_index(state.objects.insert(record));
            events.push(DomainEvent::ObjectAdded(handle));
            handle
        };
        self.emit(events);
        Ok(handle)
    }

    /// Destroy an object. Attached children are detached first, objects owned
    /// by a destroyed nested scope are destroyed with it.
    #[instrument(level = "debug", skip(self))]
    pub fn destroy(&self, handle: ObjectHandle) -> DomainResult<()> {
        let mut events = Vec::new();
        {
            let mut state = self.write();
            state.record(handle)?;
            Self::destroy_locked(&mut state, handle, &mut events);
        }
        self.emit(events);
        Ok(())
    }

    fn destroy_locked(state: &mut WorldState, handle: ObjectHandle, events: &mut Vec<DomainEvent>) {
        let owned: Vec<ObjectHandle> = state
            .handles()
            .into_iter()
            .filter(|h| state.objects.get(h.index()).and_then(|r| r.owner) == Some(handle))
            .collect();
        for inner in owned {
            if state.objects.contains(inner.index()) {
                Self::destroy_locked(state, inner, events);
            }
        }

        let attached: Vec<ObjectHandle> = state
            .handles()
            .into_iter()
            .filter(|h| state.objects.get(h.index()).and_then(|r| r.attach_parent) == Some(handle))
            .collect();
        for child in attached {
            if let Some(record) = state.objects.get_mut(child.index()) {
                record.attach_parent = None;
                record.socket = None;
                events.push(DomainEvent::ObjectDetached {
                    child,
                    old_parent: handle,
                });
            }
        }

        if let Some(record) = state.objects.remove(handle.index()) {
            for sub in record.sub_objects {
                state.sub_objects.remove(sub.index());
            }
            state.folders.remove(&FolderRoot::Object(handle));
            events.push(DomainEvent::ObjectRemoved(handle));
        }
    }

    pub fn add_sub_object(&self, owner: ObjectHandle, label: impl Into<String>) -> DomainResult<SubObjectHandle> {
        let handle = {
            let mut state = self.write();
            state.record(owner)?;
            let handle = SubObjectHandle::from_index(state.sub_objects.insert(SubObjectRecord {
                owner,
                label: label.into(),
            }));
            state.record_mut(owner)?.sub_objects.push(handle);
            handle
        };
        self.emit(vec![DomainEvent::SubObjectsChanged(owner)]);
        Ok(handle)
    }

    pub fn remove_sub_object(&self, handle: SubObjectHandle) -> DomainResult<()> {
        let owner = {
            let mut state = self.write();
            let record = state
                .sub_objects
                .remove(handle.index())
                .ok_or(DomainError::StaleSubObject(handle))?;
            if let Some(owner) = state.objects.get_mut(record.owner.index()) {
                owner.sub_objects.retain(|&sub| sub != handle);
            }
            record.owner
        };
        self.emit(vec![DomainEvent::SubObjectsChanged(owner)]);
        Ok(())
    }

    /// Enter or leave edit mode of a nested scope.
    pub fn set_editing(&self, handle: ObjectHandle, editing: bool) -> DomainResult<()> {
        {
            let mut state = self.write();
            let record = state.record_mut(handle)?;
            if !record.nested_scope {
                return Err(DomainError::NotNestedScope(handle));
            }
            if record.editing == editing {
                return Ok(());
            }
            record.editing = editing;
        }
        self.emit(vec![DomainEvent::NestedScopeEditChanged(handle)]);
        Ok(())
    }

    /// Lock or unlock an object. Interactivity of the whole list may change.
    pub fn set_locked(&self, handle: ObjectHandle, locked: bool) -> DomainResult<()> {
        {
            let mut state = self.write();
            let record = state.record_mut(handle)?;
            if record.locked == locked {
                return Ok(());
            }
            record.locked = locked;
        }
        self.emit(vec![DomainEvent::BulkListChanged]);
        Ok(())
    }

    /// Register exactly one folder, without creating its ancestors.
    pub fn add_folder(&self, root: FolderRoot, path: impl Into<FolderPath>) -> DomainResult<()> {
        let path = path.into();
        {
            let mut state = self.write();
            if !state.root_exists(root) {
                return Err(DomainError::ScopeNotLoaded);
            }
            if !state.folders.entry(root).or_default().insert(path.clone()) {
                return Err(DomainError::FolderExists(path));
            }
        }
        self.emit(vec![DomainEvent::FolderCreated { root, path }]);
        Ok(())
    }

    pub fn add_unloaded(&self, label: impl Into<String>, folder: impl Into<FolderPath>) -> DomainResult<ObjectGuid> {
        let mut events = Vec::new();
        let guid = ObjectGuid::new();
        {
            let mut state = self.write();
            if state.scope.is_none() {
                return Err(DomainError::ScopeNotLoaded);
            }
            let folder = folder.into();
            state.ensure_folder(FolderRoot::Scope, &folder, &mut events);
            state.unloaded.insert(
                guid,
                UnloadedDescriptor {
                    guid,
                    label: label.into(),
                    folder,
                },
            );
        }
        events.push(DomainEvent::DescriptorAdded(guid));
        self.emit(events);
        Ok(guid)
    }

    /// Stream an unloaded object in; the descriptor is replaced by a live object.
    pub fn load_descriptor(&self, guid: ObjectGuid) -> DomainResult<ObjectHandle> {
        let descriptor = {
            let mut state = self.write();
            state
                .unloaded
                .remove(&guid)
                .ok_or(DomainError::UnknownDescriptor(guid))?
        };
        self.emit(vec![DomainEvent::DescriptorRemoved(guid)]);
        self.spawn(
            ObjectSpec::new(descriptor.label)
                .in_folder(descriptor.folder)
                .with_guid(guid),
        )
    }

    /// Stream a loaded object out, leaving a descriptor behind.
    pub fn unload_object(&self, handle: ObjectHandle) -> DomainResult<ObjectGuid> {
        let mut events = Vec::new();
        let guid = {
            let mut state = self.write();
            let record = state.record(handle)?.clone();
            if record.owner.is_some() {
                return Err(DomainError::Rejected(format!(
                    "{} lives in a nested scope and cannot be unloaded",
                    record.label
                )));
            }
            Self::destroy_locked(&mut state, handle, &mut events);
            state.unloaded.insert(
                record.guid,
                UnloadedDescriptor {
                    guid: record.guid,
                    label: record.label,
                    folder: record.folder,
                },
            );
            record.guid
        };
        events.push(DomainEvent::DescriptorAdded(guid));
        self.emit(events);
        Ok(guid)
    }

    pub fn unload_scope(&self) {
        {
            let mut state = self.write();
            *state = WorldState::default();
        }
        self.emit(vec![DomainEvent::ScopeUnloaded]);
    }

    pub fn load_scope(&self, label: impl Into<String>, partitioned: bool) {
        {
            let mut state = self.write();
            *state = WorldState::default();
            state.scope = Some(ScopeInfo {
                id: ScopeId::new(),
                label: label.into(),
                partitioned,
            });
        }
        self.emit(vec![DomainEvent::ScopeLoaded]);
    }

    /// Find a loaded object by label (first match).
    pub fn find_object(&self, label: &str) -> Option<ObjectHandle> {
        let state = self.read();
        state
            .objects
            .iter()
            .find(|(_, record)| record.label == label)
            .map(|(index, _)| ObjectHandle::from_index(index))
    }

    pub fn find_unloaded(&self, label: &str) -> Option<ObjectGuid> {
        self.read()
            .unloaded
            .values()
            .find(|descriptor| descriptor.label == label)
            .map(|descriptor| descriptor.guid)
    }

    /// Socket an attached object was parented with.
    pub fn attachment_socket(&self, handle: ObjectHandle) -> Option<String> {
        self.read()
            .objects
            .get(handle.index())
            .and_then(|record| record.socket.clone())
    }

    pub fn pinned(&self) -> Vec<ObjectGuid> {
        self.read().pinned.iter().copied().collect()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl DomainAdapter for InMemoryWorld {
    fn scope(&self) -> Option<ScopeInfo> {
        self.read().scope.clone()
    }

    fn objects(&self) -> Vec<ObjectHandle> {
        self.read().handles()
    }

    fn object(&self, handle: ObjectHandle) -> Option<ObjectInfo> {
        let state = self.read();
        let record = state.objects.get(handle.index())?;
        Some(ObjectInfo {
            handle,
            guid: record.guid,
            label: record.label.clone(),
            attach_parent: record.attach_parent,
            folder: record.folder.clone(),
            owner: record.owner,
            is_nested_scope: record.nested_scope,
            editing: record.editing,
            temporary: record.temporary,
            locked: record.locked,
        })
    }

    fn sub_objects(&self, owner: ObjectHandle) -> Vec<SubObjectHandle> {
        self.read()
            .objects
            .get(owner.index())
            .map(|record| record.sub_objects.clone())
            .unwrap_or_default()
    }

    fn sub_object(&self, handle: SubObjectHandle) -> Option<SubObjectInfo> {
        let state = self.read();
        let record = state.sub_objects.get(handle.index())?;
        Some(SubObjectInfo {
            handle,
            owner: record.owner,
            label: record.label.clone(),
        })
    }

    fn folders(&self, root: FolderRoot) -> Vec<FolderPath> {
        self.read()
            .folders
            .get(&root)
            .map(|paths| paths.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn folder_exists(&self, root: FolderRoot, path: &FolderPath) -> bool {
        self.read().folder_exists(root, path)
    }

    fn unloaded(&self) -> Vec<UnloadedDescriptor> {
        self.read().unloaded.values().cloned().collect()
    }

    fn unloaded_descriptor(&self, guid: ObjectGuid) -> Option<UnloadedDescriptor> {
        self.read().unloaded.get(&guid).cloned()
    }

    fn attachment_sockets(&self, parent: ObjectHandle) -> Vec<String> {
        self.read()
            .objects
            .get(parent.index())
            .map(|record| record.sockets.clone())
            .unwrap_or_default()
    }

    fn can_attach(&self, parent: ObjectHandle, child: ObjectHandle) -> Result<(), String> {
        self.read().can_attach(parent, child)
    }

    fn can_move_to_container(&self, object: ObjectHandle, root: FolderRoot) -> Result<(), String> {
        self.read().can_move_to_container(object, root)
    }

    #[instrument(level = "debug", skip(self))]
    fn attach(&self, parent: ObjectHandle, child: ObjectHandle, socket: Option<&str>) -> DomainResult<()> {
        {
            let mut state = self.write();
            if let Err(reason) = state.can_attach(parent, child) {
                if state.is_attached_below(parent, child) {
                    return Err(DomainError::CycleDetected { child, parent });
                }
                return Err(DomainError::Rejected(reason));
            }
            let record = state.record_mut(child)?;
            record.attach_parent = Some(parent);
            record.socket = socket.map(str::to_string);
        }
        self.emit(vec![DomainEvent::ObjectAttached { child, parent }]);
        Ok(())
    }

    #[instrument(level = "debug", skip(self))]
    fn detach(&self, child: ObjectHandle) -> DomainResult<()> {
        let old_parent = {
            let mut state = self.write();
            let record = state.record_mut(child)?;
            record.socket = None;
            record.attach_parent.take()
        };
        if let Some(old_parent) = old_parent {
            self.emit(vec![DomainEvent::ObjectDetached { child, old_parent }]);
        }
        Ok(())
    }

    #[instrument(level = "debug", skip(self))]
    fn set_folder_path(&self, object: ObjectHandle, path: &FolderPath) -> DomainResult<()> {
        let mut events = Vec::new();
        {
            let mut state = self.write();
            let record = state.record(object)?;
            if &record.folder == path {
                return Ok(());
            }
            let root = record.folder_root();
            state.ensure_folder(root, path, &mut events);
            let record = state.record_mut(object)?;
            let old_path = std::mem::replace(&mut record.folder, path.clone());
            events.push(DomainEvent::ObjectFolderChanged { object, old_path });
        }
        self.emit(events);
        Ok(())
    }

    #[instrument(level = "debug", skip(self))]
    fn move_to_container(&self, objects: &[ObjectHandle], root: FolderRoot) -> DomainResult<()> {
        let mut events = Vec::new();
        {
            let mut state = self.write();
            let owner = match root {
                FolderRoot::Scope => None,
                FolderRoot::Object(container) => Some(container),
            };
            for &object in objects {
                if let Err(reason) = state.can_move_to_container(object, root) {
                    return Err(DomainError::Rejected(reason));
                }
            }
            for &object in objects {
                let record = state.record(object)?;
                if record.owner == owner {
                    continue;
                }
                let folder = record.folder.clone();
                if let Some(old_parent) = record.attach_parent {
                    let parent_owner = state.record(old_parent).ok().and_then(|p| p.owner);
                    if parent_owner != owner {
                        let record = state.record_mut(object)?;
                        record.attach_parent = None;
                        record.socket = None;
                        events.push(DomainEvent::ObjectDetached {
                            child: object,
                            old_parent,
                        });
                    }
                }
                state.ensure_folder(root, &folder, &mut events);
                state.record_mut(object)?.owner = owner;
                events.push(DomainEvent::ObjectContainerChanged(object));
            }

            // attachments may not cross containers
            let crossing: Vec<(ObjectHandle, ObjectHandle)> = state
                .objects
                .iter()
                .filter_map(|(index, record)| {
                    let parent = record.attach_parent?;
                    let parent_owner = state.objects.get(parent.index()).map(|p| p.owner);
                    (parent_owner != Some(record.owner))
                        .then_some((ObjectHandle::from_index(index), parent))
                })
                .collect();
            for (child, old_parent) in crossing {
                let record = state.record_mut(child)?;
                record.attach_parent = None;
                record.socket = None;
                events.push(DomainEvent::ObjectDetached { child, old_parent });
            }
        }
        self.emit(events);
        Ok(())
    }

    fn create_folder(&self, root: FolderRoot, path: &FolderPath) -> DomainResult<()> {
        let mut events = Vec::new();
        {
            let mut state = self.write();
            if !state.root_exists(root) {
                return Err(DomainError::ScopeNotLoaded);
            }
            if path.is_none() {
                return Err(DomainError::Rejected("Folder name cannot be empty".to_string()));
            }
            if state.folder_exists(root, path) {
                return Err(DomainError::FolderExists(path.clone()));
            }
            state.ensure_folder(root, path, &mut events);
        }
        self.emit(events);
        Ok(())
    }

    #[instrument(level = "debug", skip(self))]
    fn rename_folder(&self, root: FolderRoot, old_path: &FolderPath, new_path: &FolderPath) -> DomainResult<()> {
        let mut events = Vec::new();
        {
            let mut state = self.write();
            if !state.folder_exists(root, old_path) {
                return Err(DomainError::FolderNotFound(old_path.clone()));
            }
            if state.folder_exists(root, new_path) {
                return Err(DomainError::FolderExists(new_path.clone()));
            }
            state.ensure_folder(root, &new_path.parent(), &mut events);
            let paths = state.folders.entry(root).or_default();
            paths.remove(old_path);
            paths.insert(new_path.clone());
            events.push(DomainEvent::FolderMoved {
                root,
                old_path: old_path.clone(),
                new_path: new_path.clone(),
            });

            // direct content follows the folder
            let contained: Vec<ObjectHandle> = state
                .objects
                .iter()
                .filter(|(_, record)| record.folder_root() == root && &record.folder == old_path)
                .map(|(index, _)| ObjectHandle::from_index(index))
                .collect();
            for object in contained {
                let record = state.record_mut(object)?;
                let old = std::mem::replace(&mut record.folder, new_path.clone());
                events.push(DomainEvent::ObjectFolderChanged { object, old_path: old });
            }
            if root == FolderRoot::Scope {
                for descriptor in state.unloaded.values_mut() {
                    if &descriptor.folder == old_path {
                        descriptor.folder = new_path.clone();
                    }
                }
            }
        }
        self.emit(events);
        Ok(())
    }

    /// Objects directly in the folder fall back to its parent folder.
    fn delete_folder(&self, root: FolderRoot, path: &FolderPath) -> DomainResult<()> {
        let mut events = Vec::new();
        {
            let mut state = self.write();
            if !state.folder_exists(root, path) {
                return Err(DomainError::FolderNotFound(path.clone()));
            }
            let parent = path.parent();
            let fallback = if state.folder_exists(root, &parent) {
                parent
            } else {
                FolderPath::none()
            };
            let contained: Vec<ObjectHandle> = state
                .objects
                .iter()
                .filter(|(_, record)| record.folder_root() == root && &record.folder == path)
                .map(|(index, _)| ObjectHandle::from_index(index))
                .collect();
            for object in contained {
                let record = state.record_mut(object)?;
                let old_path = std::mem::replace(&mut record.folder, fallback.clone());
                events.push(DomainEvent::ObjectFolderChanged { object, old_path });
            }
            if let Some(paths) = state.folders.get_mut(&root) {
                paths.remove(path);
            }
            events.push(DomainEvent::FolderDeleted {
                root,
                path: path.clone(),
            });
        }
        self.emit(events);
        Ok(())
    }

    fn pin(&self, guid: ObjectGuid) {
        let mut state = self.write();
        if state.scope.as_ref().map(|s| s.partitioned).unwrap_or(false) {
            debug!(%guid, "pin");
            state.pinned.insert(guid);
        }
    }

    fn unpin(&self, guid: ObjectGuid) {
        debug!(%guid, "unpin");
        self.write().pinned.remove(&guid);
    }

    fn is_pinned(&self, guid: ObjectGuid) -> bool {
        self.read().pinned.contains(&guid)
    }

    fn subscribe(&self, listener: DomainListener) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, listener));
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(existing, _)| *existing != id);
    }
}

#[derive(Debug, Default)]
struct SelectionState {
    selected: BTreeSet<ObjectHandle>,
    batch_depth: usize,
    dirty: bool,
}

/// Domain selection set with batching and change notification.
#[derive(Default)]
pub struct InMemorySelection {
    state: Mutex<SelectionState>,
    listeners: RwLock<Vec<(SubscriptionId, SelectionListener)>>,
    next_subscription: AtomicU64,
    notifications: AtomicUsize,
    batches: AtomicUsize,
}

impl InMemorySelection {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SelectionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self) {
        self.notifications.fetch_add(1, Ordering::Relaxed);
        let listeners: Vec<SelectionListener> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in listeners {
            listener();
        }
    }

    /// Number of change notifications raised so far.
    pub fn notification_count(&self) -> usize {
        self.notifications.load(Ordering::Relaxed)
    }

    /// Number of completed outermost batches.
    pub fn batch_count(&self) -> usize {
        self.batches.load(Ordering::Relaxed)
    }

    /// Replace the selection in one batch.
    pub fn set_selection(&self, handles: &[ObjectHandle]) {
        self.begin_batch();
        self.clear();
        for &handle in handles {
            self.select(handle, true);
        }
        self.end_batch(true);
    }
}

impl SelectionProvider for InMemorySelection {
    fn selected(&self) -> Vec<ObjectHandle> {
        self.lock().selected.iter().copied().collect()
    }

    fn is_selected(&self, handle: ObjectHandle) -> bool {
        self.lock().selected.contains(&handle)
    }

    fn begin_batch(&self) {
        self.lock().batch_depth += 1;
    }

    fn select(&self, handle: ObjectHandle, selected: bool) {
        let notify_now = {
            let mut state = self.lock();
            let changed = if selected {
                state.selected.insert(handle)
            } else {
                state.selected.remove(&handle)
            };
            state.dirty |= changed;
            changed && state.batch_depth == 0
        };
        if notify_now {
            self.lock().dirty = false;
            self.notify();
        }
    }

    fn clear(&self) {
        let notify_now = {
            let mut state = self.lock();
            let changed = !state.selected.is_empty();
            state.selected.clear();
            state.dirty |= changed;
            changed && state.batch_depth == 0
        };
        if notify_now {
            self.lock().dirty = false;
            self.notify();
        }
    }

    fn end_batch(&self, notify: bool) {
        let notify_now = {
            let mut state = self.lock();
            state.batch_depth = state.batch_depth.saturating_sub(1);
            if state.batch_depth > 0 {
                false
            } else {
                self.batches.fetch_add(1, Ordering::Relaxed);
                let dirty = std::mem::take(&mut state.dirty);
                notify && dirty
            }
        };
        if notify_now {
            self.notify();
        }
    }

    fn subscribe(&self, listener: SelectionListener) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, listener));
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(existing, _)| *existing != id);
    }
}

#[derive(Debug, Default)]
struct TransactionState {
    depth: usize,
    current: Option<String>,
    committed: Vec<String>,
}

/// Transaction provider that records committed undo units.
#[derive(Debug, Default)]
pub struct TransactionLog {
    state: Mutex<TransactionState>,
}

impl TransactionLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, TransactionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Descriptions of committed outermost transactions, oldest first.
    pub fn committed(&self) -> Vec<String> {
        self.lock().committed.clone()
    }

    pub fn depth(&self) -> usize {
        self.lock().depth
    }
}

impl TransactionProvider for TransactionLog {
    fn begin(&self, description: &str) {
        let mut state = self.lock();
        if state.depth == 0 {
            state.current = Some(description.to_string());
        }
        state.depth += 1;
    }

    fn end(&self) {
        let mut state = self.lock();
        if state.depth == 0 {
            return;
        }
        state.depth -= 1;
        if state.depth == 0 {
            if let Some(description) = state.current.take() {
                state.committed.push(description);
            }
        }
    }
}
