//! Tests for TOML world fixtures and container wiring

use std::fs;

use tempfile::TempDir;

use outliner::application::services::OutlinerMode;
use outliner::config::{HierarchySettings, Settings};
use outliner::domain::{FolderPath, FolderRoot, ItemId};
use outliner::infrastructure::di::ServiceContainer;
use outliner::infrastructure::fixture::WorldFixture;
use outliner::infrastructure::traits::DomainAdapter;
use outliner::infrastructure::InfraError;
use outliner::util::testing;

const TOWN: &str = r#"
[scope]
label = "Town"
partitioned = true

[[folders]]
path = "Lights/Indoor"

[[objects]]
label = "House"
folder = "Center"
nested_scope = true

[[folders]]
path = "Rooms"
nested = "House"

[[objects]]
label = "Chair"
owner = "House"
folder = "Rooms"

[[objects]]
label = "Table"
folder = "Props"
sockets = ["top"]
components = ["Leg"]
pinned = true

[[objects]]
label = "Lamp"
attach = "Table"
socket = "top"
selected = true

[[unloaded]]
label = "Barn"
folder = "Center"
pinned = true
"#;

#[test]
fn given_fixture_file_when_loaded_then_world_is_populated() {
    // Arrange
    testing::init_test_setup();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("town.toml");
    fs::write(&path, TOWN).unwrap();

    // Act
    let loaded = WorldFixture::load(&path).unwrap().build().unwrap();

    // Assert
    let world = &loaded.world;
    let scope = world.scope().unwrap();
    assert_eq!(scope.label, "Town");
    assert!(scope.partitioned);

    let house = world.find_object("House").unwrap();
    let chair = world.find_object("Chair").unwrap();
    assert_eq!(world.object(chair).unwrap().owner, Some(house));
    assert!(world.folder_exists(FolderRoot::Object(house), &FolderPath::new("Rooms")));
    assert!(world.folder_exists(FolderRoot::Scope, &FolderPath::new("Lights/Indoor")));
    assert!(world.folder_exists(FolderRoot::Scope, &FolderPath::new("Lights")));

    let table = world.find_object("Table").unwrap();
    assert_eq!(world.sub_objects(table).len(), 1);
    assert_eq!(world.pinned().len(), 2);
    assert!(world.is_pinned(world.object(table).unwrap().guid));
    assert!(world.is_pinned(world.find_unloaded("Barn").unwrap()));
}

#[test]
fn given_missing_fixture_file_when_loaded_then_io_error() {
    let dir = TempDir::new().unwrap();

    let result = WorldFixture::load(&dir.path().join("absent.toml"));

    assert!(matches!(result, Err(InfraError::Io { .. })));
}

#[test]
fn given_malformed_fixture_when_parsed_then_fixture_error() {
    let result = WorldFixture::from_toml("[[objects]\nlabel = ");

    assert!(matches!(result, Err(InfraError::Fixture { .. })));
}

#[test]
fn given_duplicate_labels_when_built_then_fixture_error() {
    let fixture = WorldFixture::from_toml(
        r#"
        [[objects]]
        label = "Crate"

        [[objects]]
        label = "Crate"
        "#,
    )
    .unwrap();

    match fixture.build() {
        Err(InfraError::Fixture { message, .. }) => assert!(message.contains("duplicate"), "{message}"),
        Err(other) => panic!("expected fixture error, got {other}"),
        Ok(_) => panic!("expected fixture error"),
    }
}

#[test]
fn given_unknown_attachment_parent_when_built_then_fixture_error() {
    let fixture = WorldFixture::from_toml(
        r#"
        [[objects]]
        label = "Lamp"
        attach = "Ghost"
        "#,
    )
    .unwrap();

    assert!(matches!(fixture.build(), Err(InfraError::Fixture { .. })));
}

#[test]
fn given_container_over_fixture_when_outliner_built_then_tree_mirrors_world() {
    // Arrange
    testing::init_test_setup();
    let loaded = WorldFixture::from_toml(TOWN).unwrap().build().unwrap();
    let world = loaded.world.clone();
    let settings = Settings {
        hierarchy: HierarchySettings {
            show_components: true,
            ..HierarchySettings::default()
        },
        ..Settings::default()
    };
    let container = ServiceContainer::new(settings, loaded);

    // Act
    let outliner = container.outliner(OutlinerMode::World).unwrap();

    // Assert
    let table = world.find_object("Table").unwrap();
    let lamp = world.find_object("Lamp").unwrap();
    let leg = world.sub_objects(table)[0];
    let barn = world.find_unloaded("Barn").unwrap();
    let tree = outliner.tree();
    assert_eq!(tree.parent_of(&ItemId::Object(lamp)), Some(&ItemId::Object(table)));
    assert_eq!(tree.parent_of(&ItemId::SubObject(leg)), Some(&ItemId::Object(table)));
    assert_eq!(
        tree.parent_of(&ItemId::Unloaded(barn)),
        Some(&ItemId::folder(FolderRoot::Scope, "Center"))
    );
    assert!(outliner.is_pinned(&ItemId::Object(table)));
}

#[test]
fn given_container_over_fixture_when_nested_scope_outliner_built_then_rooted_at_scope() {
    testing::init_test_setup();
    let loaded = WorldFixture::from_toml(TOWN).unwrap().build().unwrap();
    let world = loaded.world.clone();
    let container = ServiceContainer::new(Settings::default(), loaded);
    let house = world.find_object("House").unwrap();
    let chair = world.find_object("Chair").unwrap();

    let outliner = container.outliner(OutlinerMode::NestedScope(house)).unwrap();

    let tree = outliner.tree();
    let rooms = ItemId::folder(FolderRoot::Object(house), "Rooms");
    assert_eq!(tree.parent_of(&ItemId::Object(chair)), Some(&rooms));
    assert_eq!(tree.parent_of(&rooms), Some(&ItemId::NestedScopeRoot(house)));
    assert!(!tree.contains(&ItemId::Object(world.find_object("Table").unwrap())));
}
