//! Tests for drag and drop validation and execution
//!
//! Incompatible drops never mutate the domain and never open a transaction.

use std::sync::Arc;

use outliner::application::services::{DropCompatibility, Outliner, OutlinerMode};
use outliner::config::Settings;
use outliner::domain::{FolderPath, FolderRoot, ItemId, ObjectHandle, ObjectInfo};
use outliner::infrastructure::memory::{InMemorySelection, InMemoryWorld, ObjectSpec, TransactionLog};
use outliner::infrastructure::traits::{DomainAdapter, SocketChoice, SocketChooser};
use outliner::util::testing;

struct FixedChoice(SocketChoice);

impl SocketChooser for FixedChoice {
    fn choose_socket(&self, _parent: &ObjectInfo, _sockets: &[String]) -> SocketChoice {
        self.0.clone()
    }
}

struct Harness {
    world: Arc<InMemoryWorld>,
    log: Arc<TransactionLog>,
    outliner: Arc<Outliner>,
}

impl Harness {
    fn new(world: Arc<InMemoryWorld>) -> Self {
        testing::init_test_setup();
        let log = Arc::new(TransactionLog::new());
        let outliner = Outliner::new(
            world.clone(),
            Arc::new(InMemorySelection::new()),
            log.clone(),
            OutlinerMode::World,
            &Settings::default(),
        )
        .unwrap();
        Self { world, log, outliner }
    }

    fn info(&self, handle: ObjectHandle) -> ObjectInfo {
        self.world.object(handle).unwrap()
    }
}

fn default_socket() -> FixedChoice {
    FixedChoice(SocketChoice::Default)
}

// ============================================================
// cycles
// ============================================================

#[test]
fn given_a_attached_to_b_when_dropping_b_onto_a_then_incompatible() {
    // Arrange
    let world = Arc::new(InMemoryWorld::default());
    let b = world.spawn(ObjectSpec::new("B")).unwrap();
    let a = world.spawn(ObjectSpec::new("A").attached_to(b)).unwrap();
    let h = Harness::new(world);

    // Act
    let validation = h.outliner.validate_drop(&ItemId::Object(a), &[ItemId::Object(b)]);

    // Assert
    assert!(!validation.is_compatible());
    assert!(validation.reason.contains("child of itself"), "{}", validation.reason);
}

#[test]
fn given_attachment_chain_when_dropping_root_onto_leaf_then_incompatible() {
    let world = Arc::new(InMemoryWorld::default());
    let b = world.spawn(ObjectSpec::new("B")).unwrap();
    let a = world.spawn(ObjectSpec::new("A").attached_to(b)).unwrap();
    let c = world.spawn(ObjectSpec::new("C").attached_to(a)).unwrap();
    let h = Harness::new(world);

    let (validation, report) =
        h.outliner
            .perform_drop(&ItemId::Object(c), &[ItemId::Object(b)], &default_socket());

    assert!(!validation.is_compatible());
    assert!(!report.applied);
    assert_eq!(h.info(b).attach_parent, None);
    assert!(h.log.committed().is_empty());
}

// ============================================================
// folders
// ============================================================

#[test]
fn given_folder_a_when_dropping_onto_a_b_then_rejected_without_mutation() {
    // Arrange
    let world = Arc::new(InMemoryWorld::default());
    world.create_folder(FolderRoot::Scope, &FolderPath::new("A/B")).unwrap();
    let h = Harness::new(world);
    let folders_before = h.world.folders(FolderRoot::Scope);

    // Act
    let (validation, report) = h.outliner.perform_drop(
        &ItemId::folder(FolderRoot::Scope, "A/B"),
        &[ItemId::folder(FolderRoot::Scope, "A")],
        &default_socket(),
    );

    // Assert
    assert_eq!(validation.compatibility, DropCompatibility::IncompatibleGeneric);
    assert_eq!(validation.reason, "Cannot move \"A\" to be a child of itself");
    assert!(!report.applied);
    assert_eq!(h.world.folders(FolderRoot::Scope), folders_before);
    assert!(h.log.committed().is_empty());
}

#[test]
fn given_folder_at_root_when_dropping_onto_scope_then_already_assigned() {
    let world = Arc::new(InMemoryWorld::default());
    world.create_folder(FolderRoot::Scope, &FolderPath::new("A")).unwrap();
    let h = Harness::new(world);
    let scope = h.outliner.root_id().unwrap();

    let validation = h
        .outliner
        .validate_drop(&scope, &[ItemId::folder(FolderRoot::Scope, "A")]);

    assert!(!validation.is_compatible());
    assert_eq!(validation.reason, "A is already assigned to root");
}

#[test]
fn given_folder_when_dropping_onto_sibling_then_moved_with_content() {
    let world = Arc::new(InMemoryWorld::default());
    let crate_handle = world.spawn(ObjectSpec::new("Crate").in_folder("Props/Boxes")).unwrap();
    world.create_folder(FolderRoot::Scope, &FolderPath::new("Storage")).unwrap();
    let h = Harness::new(world);

    let (validation, report) = h.outliner.perform_drop(
        &ItemId::folder(FolderRoot::Scope, "Storage"),
        &[ItemId::folder(FolderRoot::Scope, "Props")],
        &default_socket(),
    );

    assert_eq!(validation.compatibility, DropCompatibility::CompatibleMoveIntoFolder);
    assert_eq!(validation.reason, "Move into \"Storage\"");
    assert!(report.is_success());
    assert_eq!(h.info(crate_handle).folder, FolderPath::new("Storage/Props/Boxes"));
    assert!(!h.world.folder_exists(FolderRoot::Scope, &FolderPath::new("Props")));
    assert_eq!(h.log.committed(), vec!["Move To Folder".to_string()]);
}

// ============================================================
// attach / detach / move
// ============================================================

#[test]
fn given_parent_with_sockets_when_dropping_then_attached_with_chosen_socket() {
    // Arrange
    let world = Arc::new(InMemoryWorld::default());
    let table = world
        .spawn(ObjectSpec::new("Table").in_folder("Props").with_sockets(["top", "side"]))
        .unwrap();
    let lamp = world.spawn(ObjectSpec::new("Lamp").in_folder("Lights")).unwrap();
    let h = Harness::new(world);

    // Act
    let (validation, report) = h.outliner.perform_drop(
        &ItemId::Object(table),
        &[ItemId::Object(lamp)],
        &FixedChoice(SocketChoice::Socket("side".to_string())),
    );

    // Assert
    assert_eq!(validation.compatibility, DropCompatibility::CompatibleAttach);
    assert_eq!(validation.reason, "Attach to Table");
    assert!(report.is_success());
    let info = h.info(lamp);
    assert_eq!(info.attach_parent, Some(table));
    assert_eq!(info.folder, FolderPath::new("Props"));
    assert_eq!(h.world.attachment_socket(lamp), Some("side".to_string()));
    assert_eq!(h.log.committed(), vec!["Attach Objects".to_string()]);

    h.outliner.sync();
    assert_eq!(h.outliner.tree().parent_of(&ItemId::Object(lamp)), Some(&ItemId::Object(table)));
}

#[test]
fn given_socket_choice_cancelled_when_dropping_then_nothing_changes() {
    let world = Arc::new(InMemoryWorld::default());
    let table = world.spawn(ObjectSpec::new("Table").with_sockets(["top", "side"])).unwrap();
    let lamp = world.spawn(ObjectSpec::new("Lamp")).unwrap();
    let h = Harness::new(world);

    let (validation, report) = h.outliner.perform_drop(
        &ItemId::Object(table),
        &[ItemId::Object(lamp)],
        &FixedChoice(SocketChoice::Cancelled),
    );

    assert!(validation.is_compatible());
    assert!(!report.applied);
    assert_eq!(h.info(lamp).attach_parent, None);
    assert!(h.log.committed().is_empty());
}

#[test]
fn given_child_dropped_onto_own_parent_when_validating_then_detach() {
    let world = Arc::new(InMemoryWorld::default());
    let table = world.spawn(ObjectSpec::new("Table").in_folder("Props")).unwrap();
    let lamp = world
        .spawn(ObjectSpec::new("Lamp").attached_to(table).in_folder("Lights"))
        .unwrap();
    let h = Harness::new(world);

    let (validation, report) =
        h.outliner
            .perform_drop(&ItemId::Object(table), &[ItemId::Object(lamp)], &default_socket());

    assert_eq!(validation.compatibility, DropCompatibility::CompatibleDetach);
    assert_eq!(validation.reason, "Detach from Table");
    assert!(report.is_success());
    let info = h.info(lamp);
    assert_eq!(info.attach_parent, None);
    assert_eq!(info.folder, FolderPath::new("Props"));
    assert_eq!(h.log.committed(), vec!["Detach Objects".to_string()]);
}

#[test]
fn given_attached_object_when_dropping_onto_folder_then_detached_into_folder() {
    let world = Arc::new(InMemoryWorld::default());
    let table = world.spawn(ObjectSpec::new("Table").in_folder("Props")).unwrap();
    let lamp = world
        .spawn(ObjectSpec::new("Lamp").attached_to(table).in_folder("Props"))
        .unwrap();
    world.create_folder(FolderRoot::Scope, &FolderPath::new("Lights")).unwrap();
    let h = Harness::new(world);

    let (validation, report) = h.outliner.perform_drop(
        &ItemId::folder(FolderRoot::Scope, "Lights"),
        &[ItemId::Object(lamp)],
        &default_socket(),
    );

    assert_eq!(validation.compatibility, DropCompatibility::CompatibleMoveIntoFolder);
    assert!(report.is_success());
    let info = h.info(lamp);
    assert_eq!(info.attach_parent, None);
    assert_eq!(info.folder, FolderPath::new("Lights"));
}

#[test]
fn given_locked_object_when_dropping_then_incompatible_with_reason() {
    let world = Arc::new(InMemoryWorld::default());
    let table = world.spawn(ObjectSpec::new("Table")).unwrap();
    let statue = world.spawn(ObjectSpec::new("Statue").locked()).unwrap();
    let h = Harness::new(world);

    let validation = h
        .outliner
        .validate_drop(&ItemId::Object(table), &[ItemId::Object(statue)]);

    assert_eq!(validation.compatibility, DropCompatibility::IncompatibleGeneric);
    assert_eq!(validation.reason, "Cannot move Statue as it is locked");
}

// ============================================================
// nested scopes
// ============================================================

#[test]
fn given_nested_scope_not_edited_when_dropping_onto_it_then_incompatible() {
    let world = Arc::new(InMemoryWorld::default());
    let house = world.spawn(ObjectSpec::new("House").nested_scope(false)).unwrap();
    let chair = world.spawn(ObjectSpec::new("Chair")).unwrap();
    let h = Harness::new(world);

    let validation = h
        .outliner
        .validate_drop(&ItemId::Object(house), &[ItemId::Object(chair)]);

    assert!(!validation.is_compatible());
    assert_eq!(validation.reason, "Cannot attach to nested scope which is not being edited");
}

#[test]
fn given_edited_nested_scope_when_dropping_onto_it_then_moved_inside() {
    let world = Arc::new(InMemoryWorld::default());
    let house = world.spawn(ObjectSpec::new("House").nested_scope(true)).unwrap();
    let chair = world.spawn(ObjectSpec::new("Chair").in_folder("Furniture")).unwrap();
    let h = Harness::new(world);

    let (validation, report) =
        h.outliner
            .perform_drop(&ItemId::Object(house), &[ItemId::Object(chair)], &default_socket());

    assert_eq!(validation.compatibility, DropCompatibility::CompatibleAttach);
    assert_eq!(validation.reason, "Move into House");
    assert!(report.is_success());
    let info = h.info(chair);
    assert_eq!(info.owner, Some(house));
    assert!(info.folder.is_none());
    assert_eq!(h.log.committed(), vec!["Move Objects Into Nested Scope".to_string()]);
}

#[test]
fn given_several_failing_items_when_validating_then_multiple_wording() {
    let world = Arc::new(InMemoryWorld::default());
    let house = world.spawn(ObjectSpec::new("House").nested_scope(true)).unwrap();
    let chair = world.spawn(ObjectSpec::new("Chair").owned_by(house)).unwrap();
    let stool = world.spawn(ObjectSpec::new("Stool").owned_by(house)).unwrap();
    let table = world.spawn(ObjectSpec::new("Table")).unwrap();
    let h = Harness::new(world);

    let single = h
        .outliner
        .validate_drop(&ItemId::Object(table), &[ItemId::Object(chair)]);
    let multiple = h.outliner.validate_drop(
        &ItemId::Object(table),
        &[ItemId::Object(chair), ItemId::Object(stool)],
    );

    assert_eq!(single.compatibility, DropCompatibility::IncompatibleGeneric);
    assert!(single.reason.contains("different containers"), "{}", single.reason);
    assert_eq!(multiple.compatibility, DropCompatibility::IncompatibleMultiple);
    assert!(multiple.reason.starts_with("Table. "), "{}", multiple.reason);
}

#[test]
fn given_two_dragged_items_with_one_failing_when_validating_then_multiple_wording() {
    let world = Arc::new(InMemoryWorld::default());
    let house = world.spawn(ObjectSpec::new("House").nested_scope(true)).unwrap();
    let chair = world.spawn(ObjectSpec::new("Chair").owned_by(house)).unwrap();
    let lamp = world.spawn(ObjectSpec::new("Lamp")).unwrap();
    let table = world.spawn(ObjectSpec::new("Table")).unwrap();
    let h = Harness::new(world);

    let validation = h.outliner.validate_drop(
        &ItemId::Object(table),
        &[ItemId::Object(chair), ItemId::Object(lamp)],
    );

    assert_eq!(validation.compatibility, DropCompatibility::IncompatibleMultiple);
    assert!(validation.reason.starts_with("Table. "), "{}", validation.reason);
    assert!(validation.reason.contains("different containers"), "{}", validation.reason);
    assert_eq!(h.info(lamp).attach_parent, None);
}

#[test]
fn given_empty_payload_when_validating_then_incompatible_without_reason() {
    let world = Arc::new(InMemoryWorld::default());
    let table = world.spawn(ObjectSpec::new("Table")).unwrap();
    let h = Harness::new(world);

    let validation = h.outliner.validate_drop(&ItemId::Object(table), &[]);

    assert_eq!(validation.compatibility, DropCompatibility::IncompatibleGeneric);
    assert!(validation.reason.is_empty());
}
