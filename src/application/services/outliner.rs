//! The outliner facade: wires resolver, filters, delta stream, tree,
//! selection, drag/drop, pinning and folder operations together

use std::collections::{BTreeSet, VecDeque};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, Weak};

use tracing::{debug, info, instrument};

use crate::application::services::changes::{ChangeTranslator, DeltaListener, HierarchyEvents};
use crate::application::services::drag_drop::{DragDropService, DragPayload, DropReport, DropValidation};
use crate::application::services::filters::{
    FilterContext, FilterSet, HIDE_COMPONENTS, HIDE_NESTED_SCOPES, HIDE_UNLOADED, ONLY_SELECTED,
};
use crate::application::services::folders::{FolderService, DEFAULT_FOLDER_NAME};
use crate::application::services::hierarchy::{HierarchyResolver, WorldHierarchy};
use crate::application::services::nested_hierarchy::NestedScopeHierarchy;
use crate::application::services::pinning::PinController;
use crate::application::services::selection::SelectionSynchronizer;
use crate::application::services::tree::{ApplyOutcome, OutlinerTree, ViewContext};
use crate::application::{ApplicationError, ApplicationResult};
use crate::config::{PinnedColumn, Settings};
use crate::domain::{DomainError, DomainEvent, FolderPath, FolderRoot, ItemId, ItemKind, ObjectHandle, TreeDelta, TreeItem};
use crate::infrastructure::traits::{
    DomainAdapter, SelectionProvider, SocketChooser, SubscriptionId, TransactionProvider,
};

/// Which part of the domain an outliner shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutlinerMode {
    World,
    NestedScope(ObjectHandle),
}

pub struct Outliner {
    mode: OutlinerMode,
    pinned_column: PinnedColumn,
    domain: Arc<dyn DomainAdapter>,
    selection: Arc<dyn SelectionProvider>,
    resolver: Arc<dyn HierarchyResolver>,
    translator: ChangeTranslator,
    events: HierarchyEvents,
    pending: Mutex<VecDeque<TreeDelta>>,
    tree: RwLock<OutlinerTree>,
    filters: RwLock<FilterSet>,
    selection_sync: SelectionSynchronizer,
    drag_drop: DragDropService,
    pins: PinController,
    folders: FolderService,
    domain_subscription: SubscriptionId,
    selection_subscription: SubscriptionId,
}

impl Outliner {
    /// Build an outliner, subscribe it to the domain and selection, and
    /// materialize the initial tree.
    #[instrument(level = "debug", skip(domain, selection, transactions, settings))]
    pub fn new(
        domain: Arc<dyn DomainAdapter>,
        selection: Arc<dyn SelectionProvider>,
        transactions: Arc<dyn TransactionProvider>,
        mode: OutlinerMode,
        settings: &Settings,
    ) -> ApplicationResult<Arc<Self>> {
        let resolver: Arc<dyn HierarchyResolver> = match mode {
            OutlinerMode::World => Arc::new(WorldHierarchy::new(domain.clone(), settings.hierarchy)),
            OutlinerMode::NestedScope(handle) => {
                let info = domain.object(handle).ok_or(DomainError::StaleObject(handle))?;
                if !info.is_nested_scope {
                    return Err(DomainError::NotNestedScope(handle).into());
                }
                Arc::new(NestedScopeHierarchy::new(domain.clone(), handle, settings.hierarchy))
            }
        };

        let outliner = Arc::new_cyclic(|weak: &Weak<Outliner>| {
            let on_domain = weak.clone();
            let domain_subscription = domain.subscribe(Arc::new(move |event: &DomainEvent| {
                if let Some(outliner) = on_domain.upgrade() {
                    outliner.on_domain_event(event);
                }
            }));
            let on_selection = weak.clone();
            let selection_subscription = selection.subscribe(Arc::new(move || {
                if let Some(outliner) = on_selection.upgrade() {
                    outliner.on_domain_selection_changed();
                }
            }));

            Self {
                mode,
                pinned_column: settings.pinned_column,
                translator: ChangeTranslator::new(resolver.clone()),
                events: HierarchyEvents::new(),
                pending: Mutex::new(VecDeque::new()),
                tree: RwLock::new(OutlinerTree::new()),
                filters: RwLock::new(FilterSet::builtin(&settings.filters)),
                selection_sync: SelectionSynchronizer::new(domain.clone(), selection.clone()),
                drag_drop: DragDropService::new(domain.clone(), resolver.clone(), transactions.clone()),
                pins: PinController::new(domain.clone(), transactions.clone()),
                folders: FolderService::new(domain.clone(), transactions),
                domain_subscription,
                selection_subscription,
                domain,
                selection,
                resolver,
            }
        });
        outliner.refresh();
        info!(?mode, items = outliner.tree().len(), "outliner ready");
        Ok(outliner)
    }

    pub fn mode(&self) -> OutlinerMode {
        self.mode
    }

    pub fn resolver(&self) -> &dyn HierarchyResolver {
        self.resolver.as_ref()
    }

    /// Folder namespace new folders are created in.
    pub fn folder_root(&self) -> FolderRoot {
        match self.mode {
            OutlinerMode::World => FolderRoot::Scope,
            OutlinerMode::NestedScope(handle) => FolderRoot::Object(handle),
        }
    }

    /// Identifier of the tree's top item, if the scope is loaded.
    pub fn root_id(&self) -> Option<ItemId> {
        match self.mode {
            OutlinerMode::World => self.domain.scope().map(|scope| ItemId::Scope(scope.id)),
            OutlinerMode::NestedScope(handle) => Some(ItemId::NestedScopeRoot(handle)),
        }
    }

    pub fn tree(&self) -> RwLockReadGuard<'_, OutlinerTree> {
        self.tree.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Unfiltered children of an item, straight from the resolver.
    pub fn children(&self, id: &ItemId) -> Vec<TreeItem> {
        match self.resolver.create_item(id) {
            Some(item) => self.resolver.create_children(&item),
            None => Vec::new(),
        }
    }

    // --- delta stream ---

    fn on_domain_event(&self, event: &DomainEvent) {
        let delta = self.translator.translate(event);
        self.enqueue(delta.clone());
        self.events.broadcast(&delta);
    }

    fn on_domain_selection_changed(&self) {
        self.selection_sync.on_domain_selection_changed();
        let only_selected = self
            .filters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(ONLY_SELECTED)
            .map(|filter| filter.is_active())
            .unwrap_or(false);
        if only_selected {
            self.request_full_refresh();
        }
    }

    fn enqueue(&self, delta: TreeDelta) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if delta.is_full_refresh() {
            pending.clear();
        }
        pending.push_back(delta);
    }

    fn request_full_refresh(&self) {
        self.enqueue(TreeDelta::FullRefresh);
        self.events.broadcast(&TreeDelta::FullRefresh);
    }

    pub fn pending_len(&self) -> usize {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Apply all queued deltas in order, then drop stale items.
    /// Returns the number of deltas consumed.
    #[instrument(level = "debug", skip(self))]
    pub fn sync(&self) -> usize {
        let deltas: Vec<TreeDelta> = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        if deltas.is_empty() {
            return 0;
        }

        let filters = self.filters.read().unwrap_or_else(PoisonError::into_inner);
        let ctx = self.view_context(&filters);
        let mut tree = self.tree.write().unwrap_or_else(PoisonError::into_inner);
        for delta in &deltas {
            if tree.apply(delta, &ctx) == ApplyOutcome::NeedsFullRefresh {
                debug!(?delta, "delta not resolvable, rebuilding");
                tree.rebuild(&ctx);
            }
        }
        let pruned = tree.prune_stale(&ctx);
        if pruned > 0 {
            debug!(pruned, "stale items pruned");
        }
        deltas.len()
    }

    /// Discard queued deltas and rebuild the tree from scratch.
    pub fn refresh(&self) {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner).clear();
        let filters = self.filters.read().unwrap_or_else(PoisonError::into_inner);
        let ctx = self.view_context(&filters);
        self.tree
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .rebuild(&ctx);
    }

    fn view_context<'a>(&'a self, filters: &'a FilterSet) -> ViewContext<'a> {
        ViewContext {
            resolver: self.resolver.as_ref(),
            filters,
            filter: self.filter_context(),
        }
    }

    fn filter_context(&self) -> FilterContext<'_> {
        FilterContext {
            domain: self.domain.as_ref(),
            selection: self.selection.as_ref(),
        }
    }

    pub fn subscribe(&self, listener: DeltaListener) -> SubscriptionId {
        self.events.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.events.unsubscribe(id);
    }

    // --- filters ---

    /// Toggle a named filter. The component, nested-scope and unloaded
    /// filters also flip the matching hierarchy option.
    #[instrument(level = "debug", skip(self))]
    pub fn set_filter_active(&self, name: &str, active: bool) -> ApplicationResult<()> {
        let known = self
            .filters
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .set_active(name, active);
        if !known {
            return Err(ApplicationError::UnknownFilter(name.to_string()));
        }

        let mut options = self.resolver.options();
        match name {
            HIDE_COMPONENTS => options.show_components = !active,
            HIDE_NESTED_SCOPES => options.show_nested_scopes = !active,
            HIDE_UNLOADED => options.show_unloaded = !active,
            _ => {}
        }
        self.resolver.set_options(options);
        self.request_full_refresh();
        Ok(())
    }

    pub fn filter_names(&self) -> Vec<String> {
        self.filters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .names()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    /// Narrow visibility by label. An empty string clears the text filter.
    pub fn set_text_filter(&self, text: &str) -> ApplicationResult<()> {
        self.filters
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .set_text(text)?;
        self.request_full_refresh();
        Ok(())
    }

    // --- selection ---

    /// Tree selection changed. Items the view marks non-interactive are
    /// left out.
    pub fn select_items(&self, items: &[ItemId]) {
        let interactive: Vec<ItemId> = {
            let tree = self.tree();
            items
                .iter()
                .filter(|id| tree.item(id).map(TreeItem::can_interact).unwrap_or(true))
                .cloned()
                .collect()
        };
        self.selection_sync.on_tree_selection_changed(&interactive);
    }

    pub fn selected_items(&self) -> Vec<ItemId> {
        self.selection_sync.tree_selection()
    }

    pub fn selection_sync(&self) -> &SelectionSynchronizer {
        &self.selection_sync
    }

    /// Select the objects below the given folders as one batch.
    pub fn select_folder_descendants(&self, folders: &[ItemId], immediate_only: bool) -> usize {
        let objects = {
            let tree = self.tree();
            self.folders.descendant_objects(&tree, folders, immediate_only)
        };
        let items: Vec<ItemId> = objects.into_iter().map(ItemId::Object).collect();
        self.select_items(&items);
        items.len()
    }

    // --- drag and drop ---

    pub fn validate_drop(&self, target: &ItemId, items: &[ItemId]) -> DropValidation {
        self.drag_drop.validate_drop(target, &DragPayload::from_items(items))
    }

    /// Validate and, if compatible, perform a drop.
    pub fn perform_drop(&self, target: &ItemId, items: &[ItemId], chooser: &dyn SocketChooser) -> (DropValidation, DropReport) {
        let payload = DragPayload::from_items(items);
        let validation = self.drag_drop.validate_drop(target, &payload);
        let report = self.drag_drop.on_drop(target, &payload, &validation, chooser);
        (validation, report)
    }

    // --- pinning ---

    pub fn show_pinned_column(&self) -> bool {
        match self.pinned_column {
            PinnedColumn::On => true,
            PinnedColumn::Off => false,
            PinnedColumn::Auto => self.pins.is_supported(),
        }
    }

    pub fn is_pinned(&self, id: &ItemId) -> bool {
        self.pins.is_pinned(id)
    }

    pub fn pin_items(&self, items: &[ItemId]) -> usize {
        self.pins.pin_items(items, &self.tree())
    }

    pub fn unpin_items(&self, items: &[ItemId]) -> usize {
        self.pins.unpin_items(items, &self.tree())
    }

    pub fn pin_selected(&self) -> usize {
        self.pin_items(&self.selected_items())
    }

    pub fn unpin_selected(&self) -> usize {
        self.unpin_items(&self.selected_items())
    }

    // --- folders ---

    pub fn create_folder(&self, parent: &FolderPath, leaf: Option<&str>) -> ApplicationResult<FolderPath> {
        self.folders
            .create_folder(self.folder_root(), parent, leaf.unwrap_or(DEFAULT_FOLDER_NAME))
    }

    /// New folder holding the selected objects. It is created next to them
    /// when they share a folder, at the root otherwise.
    pub fn create_folder_containing_selection(&self) -> ApplicationResult<FolderPath> {
        let objects: Vec<ObjectHandle> = self
            .selected_items()
            .iter()
            .filter_map(ItemId::as_object)
            .collect();
        if objects.is_empty() {
            return Err(ApplicationError::Refused("no objects selected".to_string()));
        }
        let paths: BTreeSet<FolderPath> = objects
            .iter()
            .filter_map(|&handle| self.domain.object(handle))
            .map(|info| info.folder)
            .collect();
        let parent = match paths.len() {
            1 => paths.into_iter().next().unwrap_or_default(),
            _ => FolderPath::none(),
        };
        self.folders
            .create_folder_containing(self.folder_root(), &parent, &objects)
    }

    pub fn rename_folder(&self, path: &FolderPath, new_leaf: &str) -> ApplicationResult<FolderPath> {
        self.folders.rename_folder(self.folder_root(), path, new_leaf)
    }

    pub fn reparent_item_to_folder(&self, item: &ItemId, path: &FolderPath) -> ApplicationResult<()> {
        self.folders
            .reparent_item_to_folder(item, self.folder_root(), path)
    }

    // --- status ---

    /// Objects the hierarchy would show with no filters applied.
    fn total_objects(&self) -> usize {
        self.domain
            .objects()
            .into_iter()
            .filter(|&handle| self.resolver.create_item(&ItemId::Object(handle)).is_some())
            .count()
    }

    pub fn status_text(&self) -> String {
        let total = self.total_objects();
        let has_text = self
            .filters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .has_text();
        if has_text {
            let shown = self.tree().count_visible(ItemKind::Object);
            return if shown == 0 {
                format!("No matching objects ({} total)", total)
            } else {
                format!("Showing {} of {} objects", shown, total)
            };
        }

        let selected = self.selection.selected().len();
        if selected > 0 {
            return format!("{} objects ({} selected)", total, selected);
        }
        if self.pins.is_supported() && self.resolver.options().show_unloaded {
            let unloaded = self.tree().count_visible(ItemKind::Unloaded);
            return format!("{} objects ({} loaded)", total + unloaded, total);
        }
        format!("{} objects", total)
    }
}

impl Drop for Outliner {
    fn drop(&mut self) {
        self.domain.unsubscribe(self.domain_subscription);
        self.selection.unsubscribe(self.selection_subscription);
    }
}
