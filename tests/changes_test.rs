//! Tests for domain notification to tree delta translation and the delta stream

use std::sync::{Arc, Mutex};

use rstest::rstest;

use outliner::application::services::{ChangeTranslator, HierarchyResolver, Outliner, OutlinerMode, WorldHierarchy};
use outliner::config::{HierarchySettings, Settings};
use outliner::domain::{DomainEvent, FolderPath, FolderRoot, ItemId, ObjectGuid, TreeDelta};
use outliner::infrastructure::memory::{InMemorySelection, InMemoryWorld, ObjectSpec, TransactionLog};
use outliner::infrastructure::traits::DomainAdapter;
use outliner::util::testing;

fn translator(world: &Arc<InMemoryWorld>) -> ChangeTranslator {
    testing::init_test_setup();
    let resolver: Arc<dyn HierarchyResolver> =
        Arc::new(WorldHierarchy::new(world.clone(), HierarchySettings::default()));
    ChangeTranslator::new(resolver)
}

#[rstest]
#[case(DomainEvent::BulkListChanged)]
#[case(DomainEvent::ScopeLoaded)]
#[case(DomainEvent::ScopeUnloaded)]
fn given_bulk_notification_when_translating_then_full_refresh(#[case] event: DomainEvent) {
    let world = Arc::new(InMemoryWorld::default());
    let translator = translator(&world);

    assert_eq!(translator.translate(&event), TreeDelta::FullRefresh);
}

#[test]
fn given_object_notifications_when_translating_then_one_delta_each() {
    let world = Arc::new(InMemoryWorld::default());
    let parent = world.spawn(ObjectSpec::new("Parent")).unwrap();
    let child = world.spawn(ObjectSpec::new("Child")).unwrap();
    let translator = translator(&world);

    let added = translator.translate(&DomainEvent::ObjectAdded(child));
    assert!(matches!(added, TreeDelta::Added(ref item) if item.id == ItemId::Object(child) && item.label == "Child"));

    let attached = translator.translate(&DomainEvent::ObjectAttached { child, parent });
    assert!(matches!(attached, TreeDelta::Moved(ref item) if item.id == ItemId::Object(child)));

    let folder_changed = translator.translate(&DomainEvent::ObjectFolderChanged {
        object: child,
        old_path: FolderPath::new("Old"),
    });
    assert!(matches!(folder_changed, TreeDelta::Moved(_)));

    assert_eq!(
        translator.translate(&DomainEvent::ObjectRemoved(child)),
        TreeDelta::Removed(ItemId::Object(child))
    );
}

#[test]
fn given_folder_notifications_when_translating_then_container_deltas() {
    let world = Arc::new(InMemoryWorld::default());
    let translator = translator(&world);

    let moved = translator.translate(&DomainEvent::FolderMoved {
        root: FolderRoot::Scope,
        old_path: FolderPath::new("A"),
        new_path: FolderPath::new("B/A"),
    });
    assert_eq!(
        moved,
        TreeDelta::ContainerMoved {
            root: FolderRoot::Scope,
            old_path: FolderPath::new("A"),
            new_path: FolderPath::new("B/A"),
        }
    );

    let deleted = translator.translate(&DomainEvent::FolderDeleted {
        root: FolderRoot::Scope,
        path: FolderPath::new("A"),
    });
    assert_eq!(deleted, TreeDelta::Removed(ItemId::folder(FolderRoot::Scope, "A")));
}

#[test]
fn given_vanished_object_when_translating_add_then_placeholder_item() {
    let world = Arc::new(InMemoryWorld::default());
    let handle = world.spawn(ObjectSpec::new("Ghost")).unwrap();
    world.destroy(handle).unwrap();
    let translator = translator(&world);

    let delta = translator.translate(&DomainEvent::ObjectAdded(handle));

    assert_eq!(delta.item_id(), Some(ItemId::Object(handle)));
}

#[test]
fn given_descriptor_notifications_when_translating_then_unloaded_deltas() {
    let world = Arc::new(InMemoryWorld::new("Open", true));
    let translator = translator(&world);
    let guid = ObjectGuid::new();

    assert_eq!(
        translator.translate(&DomainEvent::DescriptorRemoved(guid)),
        TreeDelta::Removed(ItemId::Unloaded(guid))
    );
}

#[test]
fn given_outliner_subscriber_when_domain_mutates_then_deltas_arrive_in_emission_order() {
    testing::init_test_setup();
    let world = Arc::new(InMemoryWorld::default());
    let outliner = Outliner::new(
        world.clone(),
        Arc::new(InMemorySelection::new()),
        Arc::new(TransactionLog::new()),
        OutlinerMode::World,
        &Settings::default(),
    )
    .unwrap();
    let received: Arc<Mutex<Vec<TreeDelta>>> = Arc::default();
    let sink = received.clone();
    let subscription = outliner.subscribe(Arc::new(move |delta: &TreeDelta| {
        sink.lock().unwrap().push(delta.clone());
    }));

    let lamp = world.spawn(ObjectSpec::new("Lamp").in_folder("Lights")).unwrap();
    world.detach(lamp).unwrap();
    world.destroy(lamp).unwrap();
    outliner.unsubscribe(subscription);
    world.spawn(ObjectSpec::new("Late")).unwrap();

    let received = received.lock().unwrap();
    let kinds: Vec<&str> = received
        .iter()
        .map(|delta| match delta {
            TreeDelta::Added(_) => "added",
            TreeDelta::Removed(_) => "removed",
            TreeDelta::Moved(_) => "moved",
            TreeDelta::ContainerMoved { .. } => "container",
            TreeDelta::FullRefresh => "full",
        })
        .collect();
    // detach of an unattached object raises nothing
    assert_eq!(kinds, vec!["added", "added", "removed"]);
    assert_eq!(received[0].item_id(), Some(ItemId::folder(FolderRoot::Scope, "Lights")));
    assert_eq!(received[2].item_id(), Some(ItemId::Object(lamp)));
}
