//! Tests for keep-loaded pinning

use std::sync::Arc;

use rstest::rstest;

use outliner::application::services::{Outliner, OutlinerMode};
use outliner::config::{PinnedColumn, Settings};
use outliner::domain::{FolderRoot, ItemId};
use outliner::infrastructure::memory::{InMemorySelection, InMemoryWorld, ObjectSpec, TransactionLog};
use outliner::util::testing;

struct Town {
    world: Arc<InMemoryWorld>,
    selection: Arc<InMemorySelection>,
    log: Arc<TransactionLog>,
    outliner: Arc<Outliner>,
}

fn town(partitioned: bool, pinned_column: PinnedColumn) -> Town {
    testing::init_test_setup();
    let world = Arc::new(InMemoryWorld::new("Town", partitioned));
    let house = world.spawn(ObjectSpec::new("House").in_folder("Center")).unwrap();
    world.spawn(ObjectSpec::new("Lamp").attached_to(house)).unwrap();
    world.spawn(ObjectSpec::new("Well")).unwrap();
    if partitioned {
        world.add_unloaded("Barn", "Center").unwrap();
    }
    let selection = Arc::new(InMemorySelection::new());
    let log = Arc::new(TransactionLog::new());
    let settings = Settings {
        pinned_column,
        ..Settings::default()
    };
    let outliner = Outliner::new(world.clone(), selection.clone(), log.clone(), OutlinerMode::World, &settings).unwrap();
    Town {
        world,
        selection,
        log,
        outliner,
    }
}

fn object(town: &Town, label: &str) -> ItemId {
    ItemId::Object(town.world.find_object(label).unwrap())
}

#[test]
fn given_folder_when_pinned_then_descendants_pinned_in_one_transaction() {
    // Arrange
    let town = town(true, PinnedColumn::Auto);
    let center = ItemId::folder(FolderRoot::Scope, "Center");
    let barn = ItemId::Unloaded(town.world.find_unloaded("Barn").unwrap());

    // Act
    let pinned = town.outliner.pin_items(&[center]);

    // Assert
    assert_eq!(pinned, 3);
    assert!(town.outliner.is_pinned(&object(&town, "House")));
    assert!(town.outliner.is_pinned(&object(&town, "Lamp")));
    assert!(town.outliner.is_pinned(&barn));
    assert!(!town.outliner.is_pinned(&object(&town, "Well")));
    assert_eq!(town.log.committed(), vec!["Pin Items".to_string()]);
}

#[test]
fn given_pinned_subtree_when_unpinning_parent_then_children_unpinned_too() {
    let town = town(true, PinnedColumn::Auto);
    town.outliner.pin_items(&[ItemId::folder(FolderRoot::Scope, "Center")]);

    let unpinned = town.outliner.unpin_items(&[object(&town, "House")]);

    assert_eq!(unpinned, 2);
    assert!(!town.outliner.is_pinned(&object(&town, "Lamp")));
    let barn = ItemId::Unloaded(town.world.find_unloaded("Barn").unwrap());
    assert!(town.outliner.is_pinned(&barn));
    assert_eq!(town.world.pinned().len(), 1);
}

#[test]
fn given_already_pinned_item_when_pinning_again_then_nothing_new() {
    let town = town(true, PinnedColumn::Auto);
    let well = object(&town, "Well");
    town.outliner.pin_items(&[well.clone()]);

    assert_eq!(town.outliner.pin_items(&[well]), 0);
}

#[test]
fn given_selection_when_pinning_selected_then_selected_objects_pinned() {
    let town = town(true, PinnedColumn::Auto);
    let well = town.world.find_object("Well").unwrap();
    town.selection.set_selection(&[well]);

    let pinned = town.outliner.pin_selected();

    assert_eq!(pinned, 1);
    assert!(town.outliner.is_pinned(&ItemId::Object(well)));
    assert_eq!(town.outliner.unpin_selected(), 1);
}

#[test]
fn given_unpartitioned_world_when_pinning_then_ignored() {
    let town = town(false, PinnedColumn::Auto);

    let pinned = town.outliner.pin_items(&[object(&town, "Well")]);

    assert_eq!(pinned, 0);
    assert!(town.world.pinned().is_empty());
    assert!(town.log.committed().is_empty());
}

#[rstest]
#[case(true, PinnedColumn::Auto, true)]
#[case(false, PinnedColumn::Auto, false)]
#[case(false, PinnedColumn::On, true)]
#[case(true, PinnedColumn::Off, false)]
fn given_pinned_column_setting_when_asked_then_visibility_follows(
    #[case] partitioned: bool,
    #[case] setting: PinnedColumn,
    #[case] shown: bool,
) {
    let town = town(partitioned, setting);

    assert_eq!(town.outliner.show_pinned_column(), shown);
}
