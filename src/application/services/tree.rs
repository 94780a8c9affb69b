//! Materialized tree: the consumer side of the delta stream
//!
//! Holds the items the view currently shows, in an arena keyed by item id.
//! Items failing the filters are kept only as "filtered out" ancestors of
//! items that pass.

use std::collections::BTreeMap;

use generational_arena::Index;
use tracing::{debug, instrument, trace};

use crate::application::services::filters::{FilterContext, FilterSet};
use crate::application::services::hierarchy::HierarchyResolver;
use crate::domain::{ItemArena, ItemId, ItemKind, TreeDelta, TreeItem};

/// Longest ancestor chain force-created for one item.
const MAX_ANCESTRY: usize = 1024;

/// Result of applying one delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// Nothing to do: the item is not shown.
    Ignored,
    /// The delta could not be resolved incrementally.
    NeedsFullRefresh,
}

/// Resolver, filters and filter inputs needed to place an item.
#[derive(Clone, Copy)]
pub struct ViewContext<'a> {
    pub resolver: &'a dyn HierarchyResolver,
    pub filters: &'a FilterSet,
    pub filter: FilterContext<'a>,
}

impl ViewContext<'_> {
    fn evaluate(&self, item: TreeItem) -> (TreeItem, bool) {
        self.filters.evaluate(item, &self.filter)
    }
}

#[derive(Debug, Default)]
pub struct OutlinerTree {
    arena: ItemArena,
}

impl OutlinerTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arena(&self) -> &ItemArena {
        &self.arena
    }

    pub fn contains(&self, id: &ItemId) -> bool {
        self.arena.contains(id)
    }

    pub fn item(&self, id: &ItemId) -> Option<&TreeItem> {
        self.arena.item(id)
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    pub fn parent_of(&self, id: &ItemId) -> Option<&ItemId> {
        self.arena.parent_id(id)
    }

    pub fn children_of(&self, id: &ItemId) -> Vec<&ItemId> {
        self.arena.children_ids(id)
    }

    pub fn is_filtered_out(&self, id: &ItemId) -> bool {
        self.arena
            .lookup(id)
            .and_then(|idx| self.arena.get_node(idx))
            .map(|node| node.filtered_out)
            .unwrap_or(false)
    }

    pub fn parent_map(&self) -> BTreeMap<ItemId, Option<ItemId>> {
        self.arena.parent_map()
    }

    /// Identifiers in display order.
    pub fn ids(&self) -> Vec<ItemId> {
        self.arena.iter().map(|(_, node)| node.item.id.clone()).collect()
    }

    /// Items that pass the filters (excludes kept-only ancestors).
    pub fn visible_items(&self) -> impl Iterator<Item = &TreeItem> {
        self.arena
            .iter()
            .filter(|(_, node)| !node.filtered_out)
            .map(|(_, node)| &node.item)
    }

    pub fn count_visible(&self, kind: ItemKind) -> usize {
        self.visible_items().filter(|item| item.kind() == kind).count()
    }

    /// `id` and everything below it, parents before children.
    pub fn subtree(&self, id: &ItemId) -> Vec<ItemId> {
        match self.arena.lookup(id) {
            Some(idx) => self
                .arena
                .iter_subtree(idx)
                .map(|(_, node)| node.item.id.clone())
                .collect(),
            None => Vec::new(),
        }
    }

    /// Full materialization, replacing whatever was there.
    #[instrument(level = "debug", skip_all)]
    pub fn rebuild(&mut self, ctx: &ViewContext<'_>) {
        self.arena.clear();
        for item in ctx.resolver.create_items() {
            let (item, visible) = ctx.evaluate(item);
            if visible {
                self.insert_with_ancestors(item, ctx, false, 0);
            }
        }
        debug!(nodes = self.arena.len(), "tree rebuilt");
    }

    #[instrument(level = "debug", skip(self, ctx))]
    pub fn apply(&mut self, delta: &TreeDelta, ctx: &ViewContext<'_>) -> ApplyOutcome {
        match delta {
            TreeDelta::FullRefresh => {
                self.rebuild(ctx);
                ApplyOutcome::Applied
            }
            TreeDelta::Added(item) => self.apply_added(&item.id, ctx),
            TreeDelta::Removed(id) => match self.arena.lookup(id) {
                Some(idx) => {
                    self.remove_and_rehome(idx, ctx);
                    ApplyOutcome::Applied
                }
                None => ApplyOutcome::Ignored,
            },
            TreeDelta::Moved(item) => self.apply_moved(&item.id, ctx),
            TreeDelta::ContainerMoved {
                root,
                old_path,
                new_path,
            } => self.apply_container_moved(
                &ItemId::Folder(*root, old_path.clone()),
                &ItemId::Folder(*root, new_path.clone()),
                ctx,
            ),
        }
    }

    /// Drop items whose backing entity no longer exists, re-homing any
    /// still-valid children. Returns the number of nodes removed.
    #[instrument(level = "debug", skip_all)]
    pub fn prune_stale(&mut self, ctx: &ViewContext<'_>) -> usize {
        let before = self.arena.len();
        let stale: Vec<ItemId> = self
            .arena
            .iter_postorder()
            .filter(|(_, node)| !ctx.filter.domain.contains_item(&node.item.id))
            .map(|(_, node)| node.item.id.clone())
            .collect();
        for id in stale {
            if let Some(idx) = self.arena.lookup(&id) {
                self.remove_and_rehome(idx, ctx);
            }
        }
        before.saturating_sub(self.arena.len())
    }

    /// Insert `item`, force-creating missing ancestors through the resolver.
    fn insert_with_ancestors(
        &mut self,
        item: TreeItem,
        ctx: &ViewContext<'_>,
        filtered_out: bool,
        depth: usize,
    ) -> Option<Index> {
        if let Some(idx) = self.arena.lookup(&item.id) {
            if let Some(node) = self.arena.get_node_mut(idx) {
                node.filtered_out &= filtered_out;
                node.item = item;
            }
            return Some(idx);
        }

        let parent = match ctx.resolver.parent_id(&item.id) {
            None if item.id.is_root_kind() => None,
            None => {
                trace!(id = %item.id, "not shown by this hierarchy");
                return None;
            }
            Some(parent_id) => match self.arena.lookup(&parent_id) {
                Some(parent_idx) => Some(parent_idx),
                None => {
                    if depth >= MAX_ANCESTRY {
                        debug!(id = %item.id, "ancestor chain too deep, skipping item");
                        return None;
                    }
                    let parent_item = ctx.resolver.create_parent_item(&item)?;
                    let (parent_item, visible) = ctx.evaluate(parent_item);
                    Some(self.insert_with_ancestors(parent_item, ctx, !visible, depth + 1)?)
                }
            },
        };
        Some(self.arena.insert_node(item, parent, filtered_out))
    }

    fn apply_added(&mut self, id: &ItemId, ctx: &ViewContext<'_>) -> ApplyOutcome {
        if self.arena.contains(id) {
            return self.apply_moved(id, ctx);
        }
        let Some(item) = ctx.resolver.create_item(id) else {
            return ApplyOutcome::Ignored;
        };
        let (item, visible) = ctx.evaluate(item);
        if !visible {
            return self.insert_kept_ancestor(item, ctx);
        }
        match self.insert_with_ancestors(item, ctx, false, 0) {
            Some(idx) => {
                self.adopt_children(idx, ctx);
                ApplyOutcome::Applied
            }
            None => ApplyOutcome::Ignored,
        }
    }

    /// Place an item that fails the filters only if something already in
    /// the tree now resolves below it.
    fn insert_kept_ancestor(&mut self, item: TreeItem, ctx: &ViewContext<'_>) -> ApplyOutcome {
        if !self.has_known_children(&item.id, ctx) {
            return ApplyOutcome::Ignored;
        }
        match self.insert_with_ancestors(item, ctx, true, 0) {
            Some(idx) => {
                self.adopt_children(idx, ctx);
                ApplyOutcome::Applied
            }
            None => ApplyOutcome::Ignored,
        }
    }

    fn apply_moved(&mut self, id: &ItemId, ctx: &ViewContext<'_>) -> ApplyOutcome {
        let known = self.arena.lookup(id);
        let fresh = ctx.resolver.create_item(id);
        match (known, fresh) {
            (None, None) => ApplyOutcome::Ignored,
            (None, Some(item)) => {
                let (item, visible) = ctx.evaluate(item);
                if visible {
                    debug!(%id, "moved item unknown to the tree");
                    ApplyOutcome::NeedsFullRefresh
                } else {
                    self.insert_kept_ancestor(item, ctx)
                }
            }
            (Some(idx), None) => {
                self.remove_and_rehome(idx, ctx);
                ApplyOutcome::Applied
            }
            (Some(idx), Some(item)) => {
                let (item, visible) = ctx.evaluate(item);
                if !self.refresh_node(idx, item, visible, ctx) {
                    return ApplyOutcome::Applied;
                }
                self.reposition(idx, ctx)
            }
        }
    }

    fn apply_container_moved(&mut self, old_id: &ItemId, new_id: &ItemId, ctx: &ViewContext<'_>) -> ApplyOutcome {
        let Some(idx) = self.arena.lookup(old_id) else {
            let Some(item) = ctx.resolver.create_item(new_id) else {
                return ApplyOutcome::Ignored;
            };
            let (item, visible) = ctx.evaluate(item);
            if visible {
                debug!(%old_id, "moved folder unknown to the tree");
                return ApplyOutcome::NeedsFullRefresh;
            }
            return self.insert_kept_ancestor(item, ctx);
        };
        let fresh = ctx.resolver.create_item(new_id);
        let Some(item) = fresh.filter(|_| !self.arena.contains(new_id)) else {
            self.remove_and_rehome(idx, ctx);
            return ApplyOutcome::Applied;
        };

        let (item, visible) = ctx.evaluate(item);
        self.arena.rekey(idx, item.clone());
        if !self.refresh_node(idx, item, visible, ctx) {
            return ApplyOutcome::Applied;
        }
        if self.reposition(idx, ctx) == ApplyOutcome::NeedsFullRefresh {
            return ApplyOutcome::NeedsFullRefresh;
        }

        // children may still resolve through the old path
        let children = self
            .arena
            .get_node(idx)
            .map(|node| node.children.clone())
            .unwrap_or_default();
        for child in children {
            if self.arena.get_node(child).is_some() && self.reposition(child, ctx) == ApplyOutcome::NeedsFullRefresh {
                return ApplyOutcome::NeedsFullRefresh;
            }
        }
        self.adopt_children(idx, ctx);
        ApplyOutcome::Applied
    }

    /// Update the cached item. Returns `false` if the node was dropped
    /// because it fails the filters and has nothing below it.
    fn refresh_node(&mut self, idx: Index, item: TreeItem, visible: bool, ctx: &ViewContext<'_>) -> bool {
        let Some(node) = self.arena.get_node_mut(idx) else {
            return false;
        };
        if !visible && node.children.is_empty() {
            self.remove_and_rehome(idx, ctx);
            return false;
        }
        node.item = item;
        node.filtered_out = !visible;
        true
    }

    /// Relink a node under its currently resolved parent.
    fn reposition(&mut self, idx: Index, ctx: &ViewContext<'_>) -> ApplyOutcome {
        let Some(node) = self.arena.get_node(idx) else {
            return ApplyOutcome::Ignored;
        };
        let id = node.item.id.clone();
        let old_parent = node.parent;

        let parent = match ctx.resolver.parent_id(&id) {
            None if id.is_root_kind() => None,
            None => {
                self.remove_and_rehome(idx, ctx);
                return ApplyOutcome::Applied;
            }
            Some(parent_id) => match self.arena.lookup(&parent_id) {
                Some(parent_idx) => Some(parent_idx),
                None => {
                    let Some(parent_item) = ctx.resolver.create_item(&parent_id) else {
                        debug!(%id, %parent_id, "parent vanished while placing item");
                        return ApplyOutcome::NeedsFullRefresh;
                    };
                    let (parent_item, visible) = ctx.evaluate(parent_item);
                    match self.insert_with_ancestors(parent_item, ctx, !visible, 0) {
                        Some(parent_idx) => Some(parent_idx),
                        None => return ApplyOutcome::NeedsFullRefresh,
                    }
                }
            },
        };

        if !self.arena.set_parent(idx, parent) {
            debug!(%id, "relink would create a cycle");
            return ApplyOutcome::NeedsFullRefresh;
        }
        if old_parent != parent {
            self.prune_empty_ancestors(old_parent);
        }
        ApplyOutcome::Applied
    }

    /// True if any item already in the tree now resolves its parent to `id`.
    fn has_known_children(&self, id: &ItemId, ctx: &ViewContext<'_>) -> bool {
        self.arena
            .iter()
            .any(|(_, node)| ctx.resolver.parent_id(&node.item.id).as_ref() == Some(id))
    }

    /// Pull known items that now resolve to the node at `idx` under it.
    fn adopt_children(&mut self, idx: Index, ctx: &ViewContext<'_>) {
        let Some(node) = self.arena.get_node(idx) else {
            return;
        };
        if matches!(node.item.kind(), ItemKind::SubObject | ItemKind::Unloaded) {
            return;
        }
        let id = node.item.id.clone();
        let adoptees: Vec<(Index, Option<Index>)> = self
            .arena
            .iter()
            .filter(|(other, other_node)| *other != idx && other_node.parent != Some(idx))
            .filter(|(_, other_node)| ctx.resolver.parent_id(&other_node.item.id).as_ref() == Some(&id))
            .map(|(other, other_node)| (other, other_node.parent))
            .collect();
        for (child, old_parent) in adoptees {
            trace!(%id, "adopting known child");
            if self.arena.set_parent(child, Some(idx)) {
                self.prune_empty_ancestors(old_parent);
            }
        }
    }

    /// Remove one node; children that are still shown are re-homed, the
    /// rest are removed in turn.
    fn remove_and_rehome(&mut self, idx: Index, ctx: &ViewContext<'_>) {
        let old_parent = self.arena.get_node(idx).and_then(|node| node.parent);
        let Some((removed, orphans)) = self.arena.remove_node(idx) else {
            return;
        };
        trace!(id = %removed.item.id, orphans = orphans.len(), "removed");
        for orphan in orphans {
            let Some(orphan_id) = self.arena.get_node(orphan).map(|node| node.item.id.clone()) else {
                continue;
            };
            if ctx.resolver.create_item(&orphan_id).is_some() {
                if self.reposition(orphan, ctx) == ApplyOutcome::NeedsFullRefresh {
                    debug!(%orphan_id, "orphan could not be re-homed, dropping it");
                    self.remove_and_rehome(orphan, ctx);
                }
            } else {
                self.remove_and_rehome(orphan, ctx);
            }
        }
        self.prune_empty_ancestors(old_parent);
    }

    /// Drop kept-only ancestors that no longer have anything below them.
    fn prune_empty_ancestors(&mut self, start: Option<Index>) {
        let mut current = start;
        while let Some(idx) = current {
            let Some(node) = self.arena.get_node(idx) else {
                break;
            };
            if !node.filtered_out || !node.children.is_empty() {
                break;
            }
            current = node.parent;
            self.arena.remove_node(idx);
        }
    }
}
