use std::collections::{BTreeMap, HashMap};

use generational_arena::{Arena, Index};
use tracing::instrument;

use crate::domain::item::{ItemId, TreeItem};

/// Tree node in the arena-based materialized hierarchy.
#[derive(Debug)]
pub struct TreeNode {
    pub item: TreeItem,
    /// Index of parent node in the arena, None for root nodes
    pub parent: Option<Index>,
    /// Indices of child nodes in the arena
    pub children: Vec<Index>,
    /// Kept only because a descendant passes the filters.
    pub filtered_out: bool,
}

/// Arena-based forest keyed by item identifier.
///
/// Uses generational arena for memory-safe node references and O(1) lookups.
/// The arena knows nothing about resolution; it only keeps parent and child
/// links consistent.
#[derive(Debug)]
pub struct ItemArena {
    arena: Arena<TreeNode>,
    index: HashMap<ItemId, Index>,
    roots: Vec<Index>,
}

impl Default for ItemArena {
    fn default() -> Self {
        Self::new()
    }
}

impl ItemArena {
    pub fn new() -> Self {
        Self {
            arena: Arena::new(),
            index: HashMap::new(),
            roots: Vec::new(),
        }
    }

    /// Insert an item, or replace the cached item of an existing node with
    /// the same id. Existing nodes keep their position.
    #[instrument(level = "trace", skip(self, item), fields(id = %item.id))]
    pub fn insert_node(&mut self, item: TreeItem, parent: Option<Index>, filtered_out: bool) -> Index {
        if let Some(&existing) = self.index.get(&item.id) {
            if let Some(node) = self.arena.get_mut(existing) {
                node.item = item;
                node.filtered_out = filtered_out;
            }
            return existing;
        }

        let id = item.id.clone();
        let node = TreeNode {
            item,
            parent: None,
            children: Vec::new(),
            filtered_out,
        };
        let node_idx = self.arena.insert(node);
        self.index.insert(id, node_idx);
        self.roots.push(node_idx);
        if parent.is_some() {
            self.set_parent(node_idx, parent);
        }
        node_idx
    }

    pub fn get_node(&self, idx: Index) -> Option<&TreeNode> {
        self.arena.get(idx)
    }

    pub fn get_node_mut(&mut self, idx: Index) -> Option<&mut TreeNode> {
        self.arena.get_mut(idx)
    }

    pub fn lookup(&self, id: &ItemId) -> Option<Index> {
        self.index.get(id).copied()
    }

    pub fn contains(&self, id: &ItemId) -> bool {
        self.index.contains_key(id)
    }

    pub fn item(&self, id: &ItemId) -> Option<&TreeItem> {
        self.lookup(id)
            .and_then(|idx| self.arena.get(idx))
            .map(|node| &node.item)
    }

    pub fn roots(&self) -> &[Index] {
        &self.roots
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    pub fn clear(&mut self) {
        self.arena.clear();
        self.index.clear();
        self.roots.clear();
    }

    /// True if `ancestor` is `idx` or lies on the parent chain of `idx`.
    pub fn is_same_or_ancestor(&self, ancestor: Index, idx: Index) -> bool {
        let mut current = Some(idx);
        while let Some(node_idx) = current {
            if node_idx == ancestor {
                return true;
            }
            current = self.arena.get(node_idx).and_then(|node| node.parent);
        }
        false
    }

    /// Relink `idx` under `parent` (or make it a root). Refuses links that
    /// would create a cycle.
    #[instrument(level = "trace", skip(self))]
    pub fn set_parent(&mut self, idx: Index, parent: Option<Index>) -> bool {
        if !self.arena.contains(idx) {
            return false;
        }
        if let Some(parent_idx) = parent {
            if !self.arena.contains(parent_idx) || self.is_same_or_ancestor(idx, parent_idx) {
                return false;
            }
        }

        let old_parent = self.arena.get(idx).and_then(|node| node.parent);
        if old_parent == parent && (parent.is_some() || self.roots.contains(&idx)) {
            return true;
        }
        match old_parent {
            Some(old) => {
                if let Some(old_node) = self.arena.get_mut(old) {
                    old_node.children.retain(|&child| child != idx);
                }
            }
            None => self.roots.retain(|&root| root != idx),
        }

        match parent {
            Some(parent_idx) => {
                if let Some(parent_node) = self.arena.get_mut(parent_idx) {
                    parent_node.children.push(idx);
                }
            }
            None => self.roots.push(idx),
        }
        if let Some(node) = self.arena.get_mut(idx) {
            node.parent = parent;
        }
        true
    }

    /// Remove a single node. Its children become roots and are returned so
    /// the caller can re-home or drop them.
    #[instrument(level = "trace", skip(self))]
    pub fn remove_node(&mut self, idx: Index) -> Option<(TreeNode, Vec<Index>)> {
        let parent = self.arena.get(idx)?.parent;
        match parent {
            Some(parent_idx) => {
                if let Some(parent_node) = self.arena.get_mut(parent_idx) {
                    parent_node.children.retain(|&child| child != idx);
                }
            }
            None => self.roots.retain(|&root| root != idx),
        }

        let mut node = self.arena.remove(idx)?;
        self.index.remove(&node.item.id);
        let orphans = std::mem::take(&mut node.children);
        for &orphan in &orphans {
            if let Some(orphan_node) = self.arena.get_mut(orphan) {
                orphan_node.parent = None;
            }
            self.roots.push(orphan);
        }
        Some((node, orphans))
    }

    /// Change the identity of a node in place (used for folder moves).
    pub fn rekey(&mut self, idx: Index, item: TreeItem) -> bool {
        let Some(node) = self.arena.get_mut(idx) else {
            return false;
        };
        let old_id = std::mem::replace(&mut node.item, item);
        self.index.remove(&old_id.id);
        self.index.insert(node.item.id.clone(), idx);
        true
    }

    pub fn parent_id(&self, id: &ItemId) -> Option<&ItemId> {
        let node = self.arena.get(self.lookup(id)?)?;
        node.parent
            .and_then(|parent| self.arena.get(parent))
            .map(|parent| &parent.item.id)
    }

    pub fn children_ids(&self, id: &ItemId) -> Vec<&ItemId> {
        let Some(node) = self.lookup(id).and_then(|idx| self.arena.get(idx)) else {
            return Vec::new();
        };
        node.children
            .iter()
            .filter_map(|&child| self.arena.get(child))
            .map(|child| &child.item.id)
            .collect()
    }

    /// Identifier → parent identifier for every node; the comparison basis for
    /// "same tree" checks.
    pub fn parent_map(&self) -> BTreeMap<ItemId, Option<ItemId>> {
        self.arena
            .iter()
            .map(|(_, node)| {
                let parent = node
                    .parent
                    .and_then(|parent| self.arena.get(parent))
                    .map(|parent| parent.item.id.clone());
                (node.item.id.clone(), parent)
            })
            .collect()
    }

    pub fn iter(&self) -> TreeIterator<'_> {
        TreeIterator::new(self)
    }

    pub fn iter_postorder(&self) -> PostOrderIterator<'_> {
        PostOrderIterator::new(self)
    }

    pub fn iter_subtree(&self, idx: Index) -> TreeIterator<'_> {
        TreeIterator {
            arena: self,
            stack: vec![idx],
        }
    }

    #[instrument(level = "debug", skip(self))]
    pub fn depth(&self) -> usize {
        self.roots
            .iter()
            .map(|&root| self.calculate_depth(root))
            .max()
            .unwrap_or(0)
    }

    fn calculate_depth(&self, node_idx: Index) -> usize {
        if let Some(node) = self.get_node(node_idx) {
            1 + node
                .children
                .iter()
                .map(|&child| self.calculate_depth(child))
                .max()
                .unwrap_or(0)
        } else {
            0
        }
    }
}

/// Pre-order traversal over every root, left to right.
pub struct TreeIterator<'a> {
    arena: &'a ItemArena,
    stack: Vec<Index>,
}

impl<'a> TreeIterator<'a> {
    fn new(arena: &'a ItemArena) -> Self {
        let stack = arena.roots().iter().rev().copied().collect();
        Self { arena, stack }
    }
}

impl<'a> Iterator for TreeIterator<'a> {
    type Item = (Index, &'a TreeNode);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(current_idx) = self.stack.pop() {
            if let Some(node) = self.arena.get_node(current_idx) {
                // Push children in reverse order for left-to-right traversal
                for &child in node.children.iter().rev() {
                    self.stack.push(child);
                }
                return Some((current_idx, node));
            }
        }
        None
    }
}

/// Children before parents; used when tearing subtrees down.
pub struct PostOrderIterator<'a> {
    arena: &'a ItemArena,
    stack: Vec<(Index, bool)>,
}

impl<'a> PostOrderIterator<'a> {
    fn new(arena: &'a ItemArena) -> Self {
        let stack = arena
            .roots()
            .iter()
            .rev()
            .map(|&root| (root, false))
            .collect();
        Self { arena, stack }
    }
}

impl<'a> Iterator for PostOrderIterator<'a> {
    type Item = (Index, &'a TreeNode);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some((current_idx, visited)) = self.stack.pop() {
            if let Some(node) = self.arena.get_node(current_idx) {
                if !visited {
                    self.stack.push((current_idx, true));
                    for &child in node.children.iter().rev() {
                        self.stack.push((child, false));
                    }
                } else {
                    return Some((current_idx, node));
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{FolderPath, FolderRoot};

    fn folder(path: &str) -> TreeItem {
        TreeItem::new(ItemId::Folder(FolderRoot::Scope, FolderPath::new(path)), path)
    }

    #[test]
    fn test_set_parent_refuses_cycles() {
        let mut arena = ItemArena::new();
        let a = arena.insert_node(folder("A"), None, false);
        let b = arena.insert_node(folder("A/B"), Some(a), false);

        assert!(!arena.set_parent(a, Some(b)));
        assert!(!arena.set_parent(a, Some(a)));
        assert_eq!(arena.roots(), &[a]);
        assert_eq!(arena.depth(), 2);
    }

    #[test]
    fn test_remove_node_returns_orphans_as_roots() {
        let mut arena = ItemArena::new();
        let a = arena.insert_node(folder("A"), None, false);
        let b = arena.insert_node(folder("A/B"), Some(a), false);

        let (removed, orphans) = arena.remove_node(a).unwrap();
        assert_eq!(removed.item.label, "A");
        assert_eq!(orphans, vec![b]);
        assert_eq!(arena.roots(), &[b]);
        assert!(!arena.contains(&folder("A").id));
    }

    #[test]
    fn test_postorder_visits_children_first() {
        let mut arena = ItemArena::new();
        let a = arena.insert_node(folder("A"), None, false);
        arena.insert_node(folder("A/B"), Some(a), false);
        arena.insert_node(folder("A/C"), Some(a), false);

        let labels: Vec<_> = arena
            .iter_postorder()
            .map(|(_, node)| node.item.label.as_str())
            .collect();
        assert_eq!(labels, vec!["A/B", "A/C", "A"]);

        let preorder: Vec<_> = arena.iter().map(|(_, n)| n.item.label.as_str()).collect();
        assert_eq!(preorder, vec!["A", "A/B", "A/C"]);
    }
}
