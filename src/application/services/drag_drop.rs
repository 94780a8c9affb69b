//! Drag/drop validation and execution
//!
//! Validation never mutates. Execution runs inside one transaction and
//! collects domain failures in a [`DropReport`] instead of propagating them.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, instrument};

use crate::application::services::folders::FolderService;
use crate::application::services::hierarchy::HierarchyResolver;
use crate::application::services::transaction::ScopedTransaction;
use crate::domain::{DomainError, DomainResult, FolderPath, FolderRoot, ItemId, ObjectHandle, ObjectInfo};
use crate::infrastructure::traits::{DomainAdapter, SocketChoice, SocketChooser, TransactionProvider};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropCompatibility {
    CompatibleAttach,
    CompatibleDetach,
    CompatibleMoveIntoFolder,
    IncompatibleGeneric,
    IncompatibleMultiple,
}

impl DropCompatibility {
    pub fn is_compatible(self) -> bool {
        matches!(
            self,
            DropCompatibility::CompatibleAttach
                | DropCompatibility::CompatibleDetach
                | DropCompatibility::CompatibleMoveIntoFolder
        )
    }
}

impl fmt::Display for DropCompatibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DropCompatibility::CompatibleAttach => "attach",
            DropCompatibility::CompatibleDetach => "detach",
            DropCompatibility::CompatibleMoveIntoFolder => "move",
            DropCompatibility::IncompatibleGeneric => "incompatible",
            DropCompatibility::IncompatibleMultiple => "incompatible (multiple)",
        };
        f.write_str(name)
    }
}

/// Classification of a candidate drop plus the text shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropValidation {
    pub compatibility: DropCompatibility,
    pub reason: String,
}

impl DropValidation {
    pub fn new(compatibility: DropCompatibility, reason: impl Into<String>) -> Self {
        Self {
            compatibility,
            reason: reason.into(),
        }
    }

    fn incompatible(reason: impl Into<String>) -> Self {
        Self::new(DropCompatibility::IncompatibleGeneric, reason)
    }

    pub fn is_compatible(&self) -> bool {
        self.compatibility.is_compatible()
    }
}

/// What is being dragged. Only objects and folders can be dragged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DragPayload {
    pub objects: Vec<ObjectHandle>,
    pub folders: Vec<(FolderRoot, FolderPath)>,
}

impl DragPayload {
    pub fn from_items(items: &[ItemId]) -> Self {
        let mut payload = Self::default();
        for item in items {
            match item {
                ItemId::Object(handle) if !payload.objects.contains(handle) => payload.objects.push(*handle),
                ItemId::Folder(root, path) if !payload.folders.iter().any(|(r, p)| r == root && p == path) => {
                    payload.folders.push((*root, path.clone()))
                }
                _ => {}
            }
        }
        payload
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty() && self.folders.is_empty()
    }
}

/// Outcome of executing a drop.
#[derive(Debug, Default)]
pub struct DropReport {
    /// A mutation was attempted.
    pub applied: bool,
    pub errors: Vec<DomainError>,
}

impl DropReport {
    fn started() -> Self {
        Self {
            applied: true,
            errors: Vec::new(),
        }
    }

    fn record(&mut self, result: DomainResult<()>) {
        if let Err(e) = result {
            debug!(error = %e, "drop step failed");
            self.errors.push(e);
        }
    }

    pub fn is_success(&self) -> bool {
        self.applied && self.errors.is_empty()
    }
}

pub struct DragDropService {
    domain: Arc<dyn DomainAdapter>,
    resolver: Arc<dyn HierarchyResolver>,
    transactions: Arc<dyn TransactionProvider>,
    folders: FolderService,
}

impl DragDropService {
    pub fn new(
        domain: Arc<dyn DomainAdapter>,
        resolver: Arc<dyn HierarchyResolver>,
        transactions: Arc<dyn TransactionProvider>,
    ) -> Self {
        let folders = FolderService::new(domain.clone(), transactions.clone());
        Self {
            domain,
            resolver,
            transactions,
            folders,
        }
    }

    #[instrument(level = "debug", skip(self, payload))]
    pub fn validate_drop(&self, target: &ItemId, payload: &DragPayload) -> DropValidation {
        if payload.is_empty() || self.resolver.create_item(target).is_none() {
            return DropValidation::incompatible("");
        }
        match target {
            ItemId::Object(handle) => self.validate_object_target(*handle, payload),
            ItemId::Folder(..) | ItemId::Scope(_) | ItemId::NestedScopeRoot(_) => match destination(target) {
                Some((root, path)) => self.validate_folder_target(target, root, &path, payload),
                None => DropValidation::incompatible(""),
            },
            ItemId::SubObject(_) | ItemId::Unloaded(_) => DropValidation::incompatible(""),
        }
    }

    /// True if `object` is `target` or one of its ancestors, through either
    /// the resolved hierarchy or the raw attachment chain.
    fn is_same_or_ancestor(&self, object: ObjectHandle, target: ObjectHandle) -> bool {
        let needle = ItemId::Object(object);
        let mut visited = BTreeSet::new();
        let mut current = Some(ItemId::Object(target));
        while let Some(id) = current {
            if id == needle {
                return true;
            }
            if !visited.insert(id.clone()) {
                break;
            }
            current = self.resolver.parent_id(&id);
        }

        let mut visited = BTreeSet::new();
        let mut current = self.domain.object(target).and_then(|info| info.attach_parent);
        while let Some(parent) = current {
            if parent == object {
                return true;
            }
            if !visited.insert(parent) {
                break;
            }
            current = self.domain.object(parent).and_then(|info| info.attach_parent);
        }
        false
    }

    fn movability(&self, info: &ObjectInfo) -> Result<(), String> {
        if info.locked {
            return Err(format!("Cannot move {} as it is locked", info.label));
        }
        if let Some(owner) = info.owner {
            let editing = self.domain.object(owner).map(|o| o.editing).unwrap_or(false);
            if !editing {
                return Err("Cannot detach from a nested scope which is not being edited".to_string());
            }
        }
        Ok(())
    }

    fn dragged_infos(&self, payload: &DragPayload) -> Option<Vec<ObjectInfo>> {
        payload
            .objects
            .iter()
            .map(|&handle| self.domain.object(handle))
            .collect()
    }

    fn validate_object_target(&self, target: ObjectHandle, payload: &DragPayload) -> DropValidation {
        if !payload.folders.is_empty() {
            return DropValidation::incompatible("Cannot attach folders to objects");
        }
        let Some(target_info) = self.domain.object(target) else {
            return DropValidation::incompatible("");
        };
        let Some(dragged) = self.dragged_infos(payload) else {
            return DropValidation::incompatible("");
        };
        if target_info.is_nested_scope && !target_info.editing {
            return DropValidation::incompatible("Cannot attach to nested scope which is not being edited");
        }
        for info in &dragged {
            if let Err(reason) = self.movability(info) {
                return DropValidation::incompatible(reason);
            }
        }

        let target_id = ItemId::Object(target);
        if dragged
            .iter()
            .all(|info| self.resolver.parent_id(&ItemId::Object(info.handle)).as_ref() == Some(&target_id))
        {
            return DropValidation::new(
                DropCompatibility::CompatibleDetach,
                format!("Detach from {}", target_info.label),
            );
        }

        for info in &dragged {
            if self.is_same_or_ancestor(info.handle, target) {
                return DropValidation::incompatible(format!(
                    "Cannot attach {} to be a child of itself",
                    info.label
                ));
            }
        }

        let first_failure = dragged.iter().find_map(|info| {
            let check = if target_info.is_nested_scope && info.owner != Some(target) {
                self.domain.can_move_to_container(info.handle, FolderRoot::Object(target))
            } else {
                self.domain.can_attach(target, info.handle)
            };
            check.err()
        });
        if let Some(reason) = first_failure {
            if dragged.len() > 1 {
                return DropValidation::new(
                    DropCompatibility::IncompatibleMultiple,
                    format!("{}. {}", target_info.label, reason),
                );
            }
            return DropValidation::incompatible(reason);
        }

        let reason = if target_info.is_nested_scope {
            format!("Move into {}", target_info.label)
        } else {
            format!("Attach to {}", target_info.label)
        };
        DropValidation::new(DropCompatibility::CompatibleAttach, reason)
    }

    fn validate_folder_target(
        &self,
        target: &ItemId,
        root: FolderRoot,
        path: &FolderPath,
        payload: &DragPayload,
    ) -> DropValidation {
        let destination_name = if path.is_none() {
            "root".to_string()
        } else {
            path.to_string()
        };

        for (folder_root, folder) in &payload.folders {
            if *folder_root != root {
                return DropValidation::incompatible("Cannot move folders between containers");
            }
            if &folder.parent() == path {
                return DropValidation::incompatible(format!(
                    "{} is already assigned to {}",
                    folder.leaf(),
                    destination_name
                ));
            }
            if path.is_same_or_descendant_of(folder) {
                return DropValidation::incompatible(format!(
                    "Cannot move \"{}\" to be a child of itself",
                    folder
                ));
            }
            if self.domain.folder_exists(root, &path.join(folder.leaf())) {
                return DropValidation::incompatible(format!(
                    "A folder called \"{}\" already exists at this level",
                    folder.leaf()
                ));
            }
        }

        let Some(dragged) = self.dragged_infos(payload) else {
            return DropValidation::incompatible("");
        };
        let mut already_assigned = payload.folders.is_empty();
        for info in &dragged {
            if let Err(reason) = self.movability(info) {
                return DropValidation::incompatible(reason);
            }
            if info.folder_root() != root {
                if let Err(reason) = self.domain.can_move_to_container(info.handle, root) {
                    return DropValidation::incompatible(reason);
                }
                already_assigned = false;
            } else if self.resolver.parent_id(&ItemId::Object(info.handle)).as_ref() != Some(target) {
                already_assigned = false;
            }
        }
        if already_assigned {
            let subject = match dragged.as_slice() {
                [single] => single.label.clone(),
                _ => "Selection".to_string(),
            };
            return DropValidation::incompatible(format!("{} is already assigned to {}", subject, destination_name));
        }

        let reason = if path.is_none() {
            "Move to root".to_string()
        } else {
            format!("Move into \"{}\"", path)
        };
        DropValidation::new(DropCompatibility::CompatibleMoveIntoFolder, reason)
    }

    /// Perform a validated drop. Incompatible validations are a no-op.
    #[instrument(level = "debug", skip(self, payload, validation, chooser), fields(compatibility = %validation.compatibility))]
    pub fn on_drop(
        &self,
        target: &ItemId,
        payload: &DragPayload,
        validation: &DropValidation,
        chooser: &dyn SocketChooser,
    ) -> DropReport {
        match (validation.compatibility, target) {
            (DropCompatibility::CompatibleDetach, ItemId::Object(handle)) => self.perform_detach(*handle, payload),
            (DropCompatibility::CompatibleAttach, ItemId::Object(handle)) => {
                self.perform_attach(*handle, payload, chooser)
            }
            (DropCompatibility::CompatibleMoveIntoFolder, _) => match destination(target) {
                Some((root, path)) => self.perform_move_into_folder(root, &path, payload),
                None => DropReport::default(),
            },
            _ => DropReport::default(),
        }
    }

    /// `objects` plus everything attached below them, without duplicates.
    fn with_attachment_descendants(&self, objects: &[ObjectHandle]) -> Vec<ObjectHandle> {
        let mut seen = BTreeSet::new();
        let mut result = Vec::new();
        for &object in objects {
            for handle in std::iter::once(object).chain(self.folders.attachment_descendants(object)) {
                if seen.insert(handle) {
                    result.push(handle);
                }
            }
        }
        result
    }

    fn perform_detach(&self, target: ObjectHandle, payload: &DragPayload) -> DropReport {
        let Some(target_info) = self.domain.object(target) else {
            return DropReport::default();
        };
        let mut report = DropReport::started();
        let _tx = ScopedTransaction::new(self.transactions.as_ref(), "Detach Objects");
        for &object in &payload.objects {
            let Some(info) = self.domain.object(object) else {
                report.errors.push(DomainError::StaleObject(object));
                continue;
            };
            if info.owner == Some(target) {
                let moving = self.with_attachment_descendants(&[object]);
                report.record(self.domain.move_to_container(&moving, target_info.folder_root()));
            } else {
                report.record(self.domain.detach(object));
            }
            report.record(self.folders.set_folder_recursive(object, &target_info.folder));
        }
        report
    }

    fn perform_attach(&self, target: ObjectHandle, payload: &DragPayload, chooser: &dyn SocketChooser) -> DropReport {
        let Some(target_info) = self.domain.object(target) else {
            return DropReport::default();
        };

        if target_info.is_nested_scope {
            let mut report = DropReport::started();
            let _tx = ScopedTransaction::new(self.transactions.as_ref(), "Move Objects Into Nested Scope");
            for &object in &payload.objects {
                report.record(self.folders.set_folder_recursive(object, &FolderPath::none()));
            }
            let moving = self.with_attachment_descendants(&payload.objects);
            report.record(self.domain.move_to_container(&moving, FolderRoot::Object(target)));
            return report;
        }

        let sockets = self.domain.attachment_sockets(target);
        let socket = if sockets.is_empty() {
            None
        } else {
            match chooser.choose_socket(&target_info, &sockets) {
                SocketChoice::Socket(socket) => Some(socket),
                SocketChoice::Default => None,
                SocketChoice::Cancelled => {
                    debug!("socket selection cancelled");
                    return DropReport::default();
                }
            }
        };

        let mut report = DropReport::started();
        let _tx = ScopedTransaction::new(self.transactions.as_ref(), "Attach Objects");
        for &object in &payload.objects {
            report.record(self.domain.attach(target, object, socket.as_deref()));
            report.record(self.folders.set_folder_recursive(object, &target_info.folder));
        }
        report
    }

    fn perform_move_into_folder(&self, root: FolderRoot, path: &FolderPath, payload: &DragPayload) -> DropReport {
        let mut report = DropReport::started();
        let _tx = ScopedTransaction::new(self.transactions.as_ref(), "Move To Folder");

        for (folder_root, folder) in &payload.folders {
            report.record(self.folders.move_folder(*folder_root, folder, &path.join(folder.leaf())));
        }

        let crossing: Vec<ObjectHandle> = payload
            .objects
            .iter()
            .copied()
            .filter(|&object| {
                self.domain
                    .object(object)
                    .map(|info| info.folder_root() != root)
                    .unwrap_or(false)
            })
            .collect();
        if !crossing.is_empty() {
            let moving = self.with_attachment_descendants(&crossing);
            report.record(self.domain.move_to_container(&moving, root));
        }

        for &object in &payload.objects {
            report.record(self.folders.set_folder_recursive(object, path));
        }

        let dragged: BTreeSet<ObjectHandle> = payload.objects.iter().copied().collect();
        for &object in &payload.objects {
            let attached_outside = self
                .domain
                .object(object)
                .and_then(|info| info.attach_parent)
                .map(|parent| !dragged.contains(&parent))
                .unwrap_or(false);
            if attached_outside {
                report.record(self.domain.detach(object));
            }
        }
        report
    }
}

/// Folder namespace and path a folder-like target stands for.
fn destination(target: &ItemId) -> Option<(FolderRoot, FolderPath)> {
    match target {
        ItemId::Folder(root, path) => Some((*root, path.clone())),
        ItemId::Scope(_) => Some((FolderRoot::Scope, FolderPath::none())),
        ItemId::NestedScopeRoot(handle) => Some((FolderRoot::Object(*handle), FolderPath::none())),
        _ => None,
    }
}
