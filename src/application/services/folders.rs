//! Grouping-folder operations

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::application::services::transaction::ScopedTransaction;
use crate::application::services::tree::OutlinerTree;
use crate::application::{ApplicationError, ApplicationResult};
use crate::domain::{DomainError, DomainResult, FolderPath, FolderRoot, ItemId, ObjectHandle};
use crate::infrastructure::traits::{DomainAdapter, TransactionProvider};

pub const DEFAULT_FOLDER_NAME: &str = "NewFolder";

pub struct FolderService {
    domain: Arc<dyn DomainAdapter>,
    transactions: Arc<dyn TransactionProvider>,
}

impl FolderService {
    pub fn new(domain: Arc<dyn DomainAdapter>, transactions: Arc<dyn TransactionProvider>) -> Self {
        Self { domain, transactions }
    }

    /// First free `<parent>/<base>`, `<parent>/<base>1`, `<parent>/<base>2`, ...
    pub fn unique_folder_path(&self, root: FolderRoot, parent: &FolderPath, base: &str) -> FolderPath {
        let mut candidate = parent.join(base);
        let mut suffix = 1;
        while self.domain.folder_exists(root, &candidate) {
            candidate = parent.join(&format!("{base}{suffix}"));
            suffix += 1;
        }
        candidate
    }

    #[instrument(level = "debug", skip(self))]
    pub fn create_folder(&self, root: FolderRoot, parent: &FolderPath, base: &str) -> ApplicationResult<FolderPath> {
        let base = base.trim();
        if base.is_empty() || base.contains(FolderPath::SEPARATOR) {
            return Err(ApplicationError::Refused(format!("invalid folder name '{base}'")));
        }
        let path = self.unique_folder_path(root, parent, base);
        let _tx = ScopedTransaction::new(self.transactions.as_ref(), "Create Folder");
        self.domain.create_folder(root, &path)?;
        Ok(path)
    }

    /// Create a new folder under `parent` and move `objects` into it.
    #[instrument(level = "debug", skip(self))]
    pub fn create_folder_containing(
        &self,
        root: FolderRoot,
        parent: &FolderPath,
        objects: &[ObjectHandle],
    ) -> ApplicationResult<FolderPath> {
        for &object in objects {
            let info = self
                .domain
                .object(object)
                .ok_or(DomainError::StaleObject(object))?;
            if info.folder_root() != root {
                warn!(object = %info.label, "selection contains nested-scope content");
                return Err(ApplicationError::Refused(format!(
                    "cannot create a folder containing {}: it lives in another container",
                    info.label
                )));
            }
        }

        let path = self.unique_folder_path(root, parent, DEFAULT_FOLDER_NAME);
        let _tx = ScopedTransaction::new(self.transactions.as_ref(), "Create Folder");
        self.domain.create_folder(root, &path)?;
        for &object in objects {
            self.domain.set_folder_path(object, &path)?;
        }
        Ok(path)
    }

    /// Rename the last segment of a folder, carrying its descendants along.
    #[instrument(level = "debug", skip(self))]
    pub fn rename_folder(&self, root: FolderRoot, path: &FolderPath, new_leaf: &str) -> ApplicationResult<FolderPath> {
        let leaf = new_leaf.trim();
        if leaf.is_empty() || leaf.contains(FolderPath::SEPARATOR) {
            return Err(ApplicationError::Refused(format!("invalid folder name '{new_leaf}'")));
        }
        if !self.domain.folder_exists(root, path) {
            return Err(DomainError::FolderNotFound(path.clone()).into());
        }
        let new_path = path.parent().join(leaf);
        if &new_path == path {
            return Ok(new_path);
        }
        if self.domain.folder_exists(root, &new_path) {
            return Err(DomainError::FolderExists(new_path).into());
        }

        let _tx = ScopedTransaction::new(self.transactions.as_ref(), "Rename Folder");
        self.move_folder(root, path, &new_path)?;
        Ok(new_path)
    }

    /// Re-home a folder and everything below it: sub-folders shallowest
    /// first, then any objects the adapter did not carry along.
    pub fn move_folder(&self, root: FolderRoot, folder: &FolderPath, new_path: &FolderPath) -> DomainResult<()> {
        if new_path.is_same_or_descendant_of(folder) {
            return Err(DomainError::Rejected(format!(
                "Cannot move \"{}\" to be a child of itself",
                folder
            )));
        }
        let mut folders: Vec<FolderPath> = self
            .domain
            .folders(root)
            .into_iter()
            .filter(|existing| existing.is_same_or_descendant_of(folder))
            .collect();
        folders.sort_by_key(FolderPath::depth);

        for existing in folders {
            if let Some(target) = existing.rebase(folder, new_path) {
                debug!(from = %existing, to = %target, "re-homing folder");
                self.domain.rename_folder(root, &existing, &target)?;
            }
        }

        for handle in self.domain.objects() {
            let Some(info) = self.domain.object(handle) else {
                continue;
            };
            if info.folder_root() != root {
                continue;
            }
            if let Some(target) = info.folder.rebase(folder, new_path) {
                self.domain.set_folder_path(handle, &target)?;
            }
        }
        Ok(())
    }

    /// Objects attached below `object`, breadth first (excluding `object`).
    pub fn attachment_descendants(&self, object: ObjectHandle) -> Vec<ObjectHandle> {
        let mut children: HashMap<ObjectHandle, Vec<ObjectHandle>> = HashMap::new();
        for handle in self.domain.objects() {
            if let Some(parent) = self.domain.object(handle).and_then(|info| info.attach_parent) {
                children.entry(parent).or_default().push(handle);
            }
        }

        let mut visited = BTreeSet::from([object]);
        let mut queue = VecDeque::from([object]);
        let mut result = Vec::new();
        while let Some(current) = queue.pop_front() {
            for &child in children.get(&current).into_iter().flatten() {
                if visited.insert(child) {
                    result.push(child);
                    queue.push_back(child);
                }
            }
        }
        result
    }

    /// Put `object` and its attached descendants into `path`.
    pub fn set_folder_recursive(&self, object: ObjectHandle, path: &FolderPath) -> DomainResult<()> {
        self.domain.set_folder_path(object, path)?;
        for descendant in self.attachment_descendants(object) {
            self.domain.set_folder_path(descendant, path)?;
        }
        Ok(())
    }

    #[instrument(level = "debug", skip(self))]
    pub fn reparent_item_to_folder(&self, item: &ItemId, root: FolderRoot, path: &FolderPath) -> ApplicationResult<()> {
        match item {
            ItemId::Object(handle) => {
                let info = self
                    .domain
                    .object(*handle)
                    .ok_or(DomainError::StaleObject(*handle))?;
                if info.folder_root() != root {
                    return Err(ApplicationError::Refused(format!(
                        "{} belongs to a different container",
                        info.label
                    )));
                }
                let _tx = ScopedTransaction::new(self.transactions.as_ref(), "Move To Folder");
                if info.attach_parent.is_some() {
                    self.domain.detach(*handle)?;
                }
                self.set_folder_recursive(*handle, path)?;
                Ok(())
            }
            ItemId::Folder(folder_root, folder) => {
                if *folder_root != root {
                    return Err(ApplicationError::Refused(
                        "cannot move folders between containers".to_string(),
                    ));
                }
                let target = path.join(folder.leaf());
                if &target == folder {
                    return Ok(());
                }
                if self.domain.folder_exists(root, &target) {
                    return Err(DomainError::FolderExists(target).into());
                }
                let _tx = ScopedTransaction::new(self.transactions.as_ref(), "Move Folder");
                self.move_folder(root, folder, &target)?;
                Ok(())
            }
            other => Err(ApplicationError::Refused(format!(
                "{} items cannot be placed in a folder",
                other.kind()
            ))),
        }
    }

    /// Objects below the given folders in the materialized tree.
    pub fn descendant_objects(&self, tree: &OutlinerTree, folders: &[ItemId], immediate_only: bool) -> Vec<ObjectHandle> {
        let mut seen = BTreeSet::new();
        let mut result = Vec::new();
        for folder in folders.iter().filter(|id| id.as_folder().is_some()) {
            let ids: Vec<ItemId> = if immediate_only {
                tree.children_of(folder).into_iter().cloned().collect()
            } else {
                tree.subtree(folder)
            };
            for handle in ids.iter().filter_map(ItemId::as_object) {
                if seen.insert(handle) {
                    result.push(handle);
                }
            }
        }
        result
    }
}
