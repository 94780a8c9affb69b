//! Domain notifications to tree deltas, and the delta event stream

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::trace;

use crate::application::services::hierarchy::HierarchyResolver;
use crate::domain::{DomainEvent, ItemId, TreeDelta, TreeItem};
use crate::infrastructure::traits::SubscriptionId;

/// Maps each domain notification to exactly one delta.
pub struct ChangeTranslator {
    resolver: Arc<dyn HierarchyResolver>,
}

impl ChangeTranslator {
    pub fn new(resolver: Arc<dyn HierarchyResolver>) -> Self {
        Self { resolver }
    }

    /// Item for a delta. Items the hierarchy does not show still get a
    /// placeholder; the consumer decides what to do with them.
    fn item(&self, id: ItemId) -> TreeItem {
        self.resolver.create_item(&id).unwrap_or_else(|| {
            let label = id.to_string();
            TreeItem::new(id, label)
        })
    }

    pub fn translate(&self, event: &DomainEvent) -> TreeDelta {
        let delta = match event {
            DomainEvent::ObjectAdded(handle) => TreeDelta::Added(self.item(ItemId::Object(*handle))),
            DomainEvent::ObjectRemoved(handle) => TreeDelta::Removed(ItemId::Object(*handle)),
            DomainEvent::ObjectAttached { child, .. }
            | DomainEvent::ObjectDetached { child, .. }
            | DomainEvent::ObjectFolderChanged { object: child, .. }
            | DomainEvent::ObjectContainerChanged(child) => {
                TreeDelta::Moved(self.item(ItemId::Object(*child)))
            }
            DomainEvent::FolderCreated { root, path } => {
                TreeDelta::Added(self.item(ItemId::Folder(*root, path.clone())))
            }
            DomainEvent::FolderMoved {
                root,
                old_path,
                new_path,
            } => TreeDelta::ContainerMoved {
                root: *root,
                old_path: old_path.clone(),
                new_path: new_path.clone(),
            },
            DomainEvent::FolderDeleted { root, path } => TreeDelta::Removed(ItemId::Folder(*root, path.clone())),
            DomainEvent::DescriptorAdded(guid) => TreeDelta::Added(self.item(ItemId::Unloaded(*guid))),
            DomainEvent::DescriptorRemoved(guid) => TreeDelta::Removed(ItemId::Unloaded(*guid)),
            DomainEvent::NestedScopeEditChanged(_)
            | DomainEvent::SubObjectsChanged(_)
            | DomainEvent::ScopeLoaded
            | DomainEvent::ScopeUnloaded
            | DomainEvent::BulkListChanged => TreeDelta::FullRefresh,
        };
        trace!(?event, ?delta, "translated");
        delta
    }
}

pub type DeltaListener = Arc<dyn Fn(&TreeDelta) + Send + Sync>;

/// Multicast "hierarchy changed" stream. Delivery is synchronous, on the
/// thread that broadcasts.
#[derive(Default)]
pub struct HierarchyEvents {
    listeners: RwLock<Vec<(SubscriptionId, DeltaListener)>>,
    next_subscription: AtomicU64,
}

impl HierarchyEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, listener: DeltaListener) -> SubscriptionId {
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

    pub fn broadcast(&self, delta: &TreeDelta) {
        let listeners: Vec<DeltaListener> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in listeners {
            listener(delta);
        }
    }

    pub fn len(&self) -> usize {
        self.listeners.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
