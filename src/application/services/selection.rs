//! Bidirectional selection synchronization between the tree and the domain

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, instrument, trace};

use crate::domain::{ItemId, ObjectHandle};
use crate::infrastructure::traits::{DomainAdapter, SelectionProvider, SubscriptionId};

pub type TreeSelectionListener = Arc<dyn Fn(&[ItemId]) + Send + Sync>;

/// Set while one direction is propagating; the other direction is
/// suppressed until the guard drops.
struct Latch<'a>(&'a AtomicBool);

impl<'a> Latch<'a> {
    fn engage(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for Latch<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct SelectionSynchronizer {
    domain: Arc<dyn DomainAdapter>,
    selection: Arc<dyn SelectionProvider>,
    tree_selection: RwLock<BTreeSet<ItemId>>,
    latch: AtomicBool,
    listeners: RwLock<Vec<(SubscriptionId, TreeSelectionListener)>>,
    next_subscription: AtomicU64,
    domain_pushes: AtomicUsize,
    tree_updates: AtomicUsize,
}

impl SelectionSynchronizer {
    pub fn new(domain: Arc<dyn DomainAdapter>, selection: Arc<dyn SelectionProvider>) -> Self {
        Self {
            domain,
            selection,
            tree_selection: RwLock::new(BTreeSet::new()),
            latch: AtomicBool::new(false),
            listeners: RwLock::new(Vec::new()),
            next_subscription: AtomicU64::new(1),
            domain_pushes: AtomicUsize::new(0),
            tree_updates: AtomicUsize::new(0),
        }
    }

    pub fn tree_selection(&self) -> Vec<ItemId> {
        self.tree_selection
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// Number of batched tree→domain pushes performed.
    pub fn domain_push_count(&self) -> usize {
        self.domain_pushes.load(Ordering::Relaxed)
    }

    /// Number of domain→tree updates performed.
    pub fn tree_update_count(&self) -> usize {
        self.tree_updates.load(Ordering::Relaxed)
    }

    /// Tree selection changed (user input). Pushes the selected objects into
    /// the domain selection as one batch.
    #[instrument(level = "debug", skip(self, items), fields(count = items.len()))]
    pub fn on_tree_selection_changed(&self, items: &[ItemId]) {
        let Some(_latch) = Latch::engage(&self.latch) else {
            trace!("tree selection change suppressed");
            return;
        };
        *self.tree_selection.write().unwrap_or_else(PoisonError::into_inner) = items.iter().cloned().collect();

        let desired: BTreeSet<ObjectHandle> = items
            .iter()
            .filter_map(ItemId::as_object)
            .filter(|&handle| self.domain.object(handle).is_some())
            .collect();
        let current: BTreeSet<ObjectHandle> = self.selection.selected().into_iter().collect();
        if desired == current {
            trace!("domain selection already matches");
            return;
        }

        self.selection.begin_batch();
        self.selection.clear();
        for handle in &desired {
            self.selection.select(*handle, true);
        }
        self.selection.end_batch(true);
        self.domain_pushes.fetch_add(1, Ordering::Relaxed);
        debug!(selected = desired.len(), "pushed selection to domain");
    }

    /// Domain selection changed. Mirrors it into the tree selection and
    /// notifies tree listeners once.
    #[instrument(level = "debug", skip(self))]
    pub fn on_domain_selection_changed(&self) {
        let Some(_latch) = Latch::engage(&self.latch) else {
            trace!("domain selection change suppressed");
            return;
        };
        let selected: BTreeSet<ItemId> = self
            .selection
            .selected()
            .into_iter()
            .filter(|&handle| self.domain.object(handle).is_some())
            .map(ItemId::Object)
            .collect();
        {
            let mut tree_selection = self.tree_selection.write().unwrap_or_else(PoisonError::into_inner);
            if *tree_selection == selected {
                return;
            }
            *tree_selection = selected.clone();
        }
        self.tree_updates.fetch_add(1, Ordering::Relaxed);

        let items: Vec<ItemId> = selected.into_iter().collect();
        let listeners: Vec<TreeSelectionListener> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in listeners {
            listener(&items);
        }
    }

    pub fn subscribe(&self, listener: TreeSelectionListener) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, listener));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(existing, _)| *existing != id);
    }
}
