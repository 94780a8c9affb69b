//! Tests for hierarchy resolution
//!
//! Parent priority for objects: attachment parent, enclosing nested scope,
//! grouping folder, scope root.

use std::sync::Arc;

use rstest::rstest;

use outliner::application::services::{HierarchyResolver, NestedScopeHierarchy, WorldHierarchy};
use outliner::config::HierarchySettings;
use outliner::domain::{FolderRoot, ItemId, ItemKind};
use outliner::infrastructure::memory::{InMemoryWorld, ObjectSpec};
use outliner::util::testing;

fn world() -> Arc<InMemoryWorld> {
    testing::init_test_setup();
    Arc::new(InMemoryWorld::new("Level", false))
}

fn child_ids(resolver: &dyn HierarchyResolver, id: &ItemId) -> Vec<ItemId> {
    let item = resolver.create_item(id).expect("item should resolve");
    resolver.create_children(&item).into_iter().map(|child| child.id).collect()
}

// ============================================================
// folders
// ============================================================

#[test]
fn given_nested_folder_paths_when_resolving_group_children_then_only_direct_content() {
    // Arrange
    let world = world();
    let foo = world.spawn(ObjectSpec::new("Foo").in_folder("Group/Sub")).unwrap();
    let bar = world.spawn(ObjectSpec::new("Bar").in_folder("Group")).unwrap();
    let resolver = WorldHierarchy::new(world.clone(), HierarchySettings::default());

    // Act
    let children = child_ids(&resolver, &ItemId::folder(FolderRoot::Scope, "Group"));

    // Assert
    assert!(children.contains(&ItemId::folder(FolderRoot::Scope, "Group/Sub")));
    assert!(children.contains(&ItemId::Object(bar)));
    assert!(!children.contains(&ItemId::Object(foo)));
    assert_eq!(children.len(), 2);

    let sub_children = child_ids(&resolver, &ItemId::folder(FolderRoot::Scope, "Group/Sub"));
    assert_eq!(sub_children, vec![ItemId::Object(foo)]);
}

#[test]
fn given_folder_when_resolving_parent_then_parent_folder_or_scope() {
    let world = world();
    world.spawn(ObjectSpec::new("Foo").in_folder("Group/Sub")).unwrap();
    let resolver = WorldHierarchy::new(world.clone(), HierarchySettings::default());

    assert_eq!(
        resolver.parent_id(&ItemId::folder(FolderRoot::Scope, "Group/Sub")),
        Some(ItemId::folder(FolderRoot::Scope, "Group"))
    );
    assert_eq!(
        resolver.parent_id(&ItemId::folder(FolderRoot::Scope, "Group")),
        resolver.scope_item_id()
    );
}

#[test]
fn given_folder_without_registered_parent_when_resolving_then_parented_to_scope() {
    let world = world();
    world.add_folder(FolderRoot::Scope, "Missing/Leaf").unwrap();
    let resolver = WorldHierarchy::new(world.clone(), HierarchySettings::default());

    assert_eq!(
        resolver.parent_id(&ItemId::folder(FolderRoot::Scope, "Missing/Leaf")),
        resolver.scope_item_id()
    );
}

#[test]
fn given_folders_hidden_when_materializing_then_no_folder_items() {
    let world = world();
    let foo = world.spawn(ObjectSpec::new("Foo").in_folder("Group/Sub")).unwrap();
    let settings = HierarchySettings {
        show_folders: false,
        ..HierarchySettings::default()
    };
    let resolver = WorldHierarchy::new(world.clone(), settings);

    let items = resolver.create_items();

    assert!(items.iter().all(|item| item.kind() != ItemKind::Folder));
    assert_eq!(resolver.parent_id(&ItemId::Object(foo)), resolver.scope_item_id());
}

// ============================================================
// attachment
// ============================================================

#[test]
fn given_attached_object_in_other_folder_when_resolving_then_attachment_wins() {
    let world = world();
    let table = world.spawn(ObjectSpec::new("Table").in_folder("Props")).unwrap();
    let lamp = world
        .spawn(ObjectSpec::new("Lamp").attached_to(table).in_folder("Lights"))
        .unwrap();
    let resolver = WorldHierarchy::new(world.clone(), HierarchySettings::default());

    assert_eq!(resolver.parent_id(&ItemId::Object(lamp)), Some(ItemId::Object(table)));
    assert_eq!(child_ids(&resolver, &ItemId::Object(table)), vec![ItemId::Object(lamp)]);
    assert!(child_ids(&resolver, &ItemId::folder(FolderRoot::Scope, "Lights")).is_empty());
}

#[test]
fn given_attachment_parent_destroyed_when_resolving_then_falls_back_to_folder() {
    let world = world();
    let table = world.spawn(ObjectSpec::new("Table")).unwrap();
    let lamp = world
        .spawn(ObjectSpec::new("Lamp").attached_to(table).in_folder("Lights"))
        .unwrap();
    let resolver = WorldHierarchy::new(world.clone(), HierarchySettings::default());

    world.destroy(table).unwrap();

    assert_eq!(
        resolver.parent_id(&ItemId::Object(lamp)),
        Some(ItemId::folder(FolderRoot::Scope, "Lights"))
    );
    assert!(resolver.create_item(&ItemId::Object(table)).is_none());
}

// ============================================================
// nested scopes
// ============================================================

#[rstest]
#[case(true, false, true)]
#[case(false, true, true)]
#[case(false, false, false)]
fn given_nested_scope_content_when_resolving_then_visibility_follows_options(
    #[case] show_nested_scopes: bool,
    #[case] editing: bool,
    #[case] visible: bool,
) {
    let world = world();
    let house = world.spawn(ObjectSpec::new("House").nested_scope(editing)).unwrap();
    let chair = world.spawn(ObjectSpec::new("Chair").owned_by(house).in_folder("Rooms")).unwrap();
    let settings = HierarchySettings {
        show_nested_scopes,
        ..HierarchySettings::default()
    };
    let resolver = WorldHierarchy::new(world.clone(), settings);

    let item = resolver.create_item(&ItemId::Object(chair));

    assert_eq!(item.is_some(), visible);
    if visible {
        assert_eq!(resolver.parent_id(&ItemId::Object(chair)), Some(ItemId::Object(house)));
    }
    // nested-scope folders belong to the nested scope, not the world
    assert!(resolver
        .create_item(&ItemId::folder(FolderRoot::Object(house), "Rooms"))
        .is_none());
}

#[test]
fn given_nested_scope_hierarchy_when_materializing_then_only_its_content() {
    let world = world();
    let house = world.spawn(ObjectSpec::new("House").nested_scope(true)).unwrap();
    let chair = world.spawn(ObjectSpec::new("Chair").owned_by(house).in_folder("Rooms")).unwrap();
    let outside = world.spawn(ObjectSpec::new("Tree")).unwrap();
    let resolver = NestedScopeHierarchy::new(world.clone(), house, HierarchySettings::default());

    let ids: Vec<ItemId> = resolver.create_items().into_iter().map(|item| item.id).collect();

    assert_eq!(ids.first(), Some(&resolver.root_item_id()));
    assert!(ids.contains(&ItemId::Object(chair)));
    assert!(ids.contains(&ItemId::folder(FolderRoot::Object(house), "Rooms")));
    assert!(!ids.contains(&ItemId::Object(outside)));
    assert!(!ids.contains(&ItemId::Object(house)));
    assert_eq!(
        resolver.parent_id(&ItemId::Object(chair)),
        Some(ItemId::folder(FolderRoot::Object(house), "Rooms"))
    );
    assert_eq!(
        resolver.parent_id(&ItemId::folder(FolderRoot::Object(house), "Rooms")),
        Some(resolver.root_item_id())
    );
}

// ============================================================
// components and unloaded descriptors
// ============================================================

#[rstest]
#[case(true, true)]
#[case(false, false)]
fn given_sub_object_when_resolving_then_shown_only_with_components(#[case] show_components: bool, #[case] shown: bool) {
    let world = world();
    let lamp = world.spawn(ObjectSpec::new("Lamp")).unwrap();
    let bulb = world.add_sub_object(lamp, "Bulb").unwrap();
    let settings = HierarchySettings {
        show_components,
        ..HierarchySettings::default()
    };
    let resolver = WorldHierarchy::new(world.clone(), settings);

    let children = child_ids(&resolver, &ItemId::Object(lamp));

    assert_eq!(children.contains(&ItemId::SubObject(bulb)), shown);
    assert_eq!(resolver.create_item(&ItemId::SubObject(bulb)).is_some(), shown);
}

#[test]
fn given_unloaded_descriptor_when_resolving_then_placed_in_its_folder() {
    testing::init_test_setup();
    let world = Arc::new(InMemoryWorld::new("Open", true));
    let far = world.add_unloaded("FarHouse", "Streaming").unwrap();
    let resolver = WorldHierarchy::new(world.clone(), HierarchySettings::default());

    let item = resolver.create_item(&ItemId::Unloaded(far)).unwrap();

    assert_eq!(item.label, "FarHouse");
    assert!(!item.has_visibility_info);
    assert_eq!(
        resolver.parent_id(&ItemId::Unloaded(far)),
        Some(ItemId::folder(FolderRoot::Scope, "Streaming"))
    );

    resolver.set_options(HierarchySettings {
        show_unloaded: false,
        ..resolver.options()
    });
    assert!(resolver.create_item(&ItemId::Unloaded(far)).is_none());
}

#[test]
fn given_no_scope_loaded_when_materializing_then_empty() {
    testing::init_test_setup();
    let world = Arc::new(InMemoryWorld::unloaded_scope());
    let resolver = WorldHierarchy::new(world.clone(), HierarchySettings::default());

    assert!(resolver.scope_item_id().is_none());
    assert!(resolver.create_items().is_empty());
}
