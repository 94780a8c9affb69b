//! Keep-loaded pinning for partitioned domains

use std::sync::Arc;

use tracing::{debug, instrument};

use crate::application::services::transaction::ScopedTransaction;
use crate::application::services::tree::OutlinerTree;
use crate::domain::{ItemId, ObjectGuid};
use crate::infrastructure::traits::{DomainAdapter, TransactionProvider};

pub struct PinController {
    domain: Arc<dyn DomainAdapter>,
    transactions: Arc<dyn TransactionProvider>,
}

impl PinController {
    pub fn new(domain: Arc<dyn DomainAdapter>, transactions: Arc<dyn TransactionProvider>) -> Self {
        Self { domain, transactions }
    }

    pub fn is_supported(&self) -> bool {
        self.domain.scope().map(|scope| scope.partitioned).unwrap_or(false)
    }

    /// Persistent identity backing an item, if it has a loadable one.
    fn guid_of(&self, id: &ItemId) -> Option<ObjectGuid> {
        match id {
            ItemId::Object(handle) => self.domain.object(*handle).map(|info| info.guid),
            ItemId::Unloaded(guid) => Some(*guid),
            _ => None,
        }
    }

    pub fn is_pinned(&self, id: &ItemId) -> bool {
        self.guid_of(id)
            .map(|guid| self.domain.is_pinned(guid))
            .unwrap_or(false)
    }

    /// Pin each item and its materialized descendants, parents first.
    /// Returns the number of newly pinned entries.
    #[instrument(level = "debug", skip(self, items, tree), fields(count = items.len()))]
    pub fn pin_items(&self, items: &[ItemId], tree: &OutlinerTree) -> usize {
        if !self.is_supported() {
            debug!("pinning ignored: scope is not partitioned");
            return 0;
        }
        let _tx = ScopedTransaction::new(self.transactions.as_ref(), "Pin Items");
        let mut pinned = 0;
        for item in items {
            self.pin_recursive(item, tree, &mut pinned);
        }
        pinned
    }

    fn pin_recursive(&self, id: &ItemId, tree: &OutlinerTree, pinned: &mut usize) {
        if let Some(guid) = self.guid_of(id) {
            if !self.domain.is_pinned(guid) {
                self.domain.pin(guid);
                *pinned += 1;
            }
        }
        let children: Vec<ItemId> = tree.children_of(id).into_iter().cloned().collect();
        for child in &children {
            self.pin_recursive(child, tree, pinned);
        }
    }

    /// Unpin each item and its materialized descendants, children first.
    /// Returns the number of entries unpinned.
    #[instrument(level = "debug", skip(self, items, tree), fields(count = items.len()))]
    pub fn unpin_items(&self, items: &[ItemId], tree: &OutlinerTree) -> usize {
        if !self.is_supported() {
            debug!("unpinning ignored: scope is not partitioned");
            return 0;
        }
        let _tx = ScopedTransaction::new(self.transactions.as_ref(), "Unpin Items");
        let mut unpinned = 0;
        for item in items {
            self.unpin_recursive(item, tree, &mut unpinned);
        }
        unpinned
    }

    fn unpin_recursive(&self, id: &ItemId, tree: &OutlinerTree, unpinned: &mut usize) {
        let children: Vec<ItemId> = tree.children_of(id).into_iter().cloned().collect();
        for child in &children {
            self.unpin_recursive(child, tree, unpinned);
        }
        if let Some(guid) = self.guid_of(id) {
            if self.domain.is_pinned(guid) {
                self.domain.unpin(guid);
                *unpinned += 1;
            }
        }
    }
}
