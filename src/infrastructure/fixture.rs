//! TOML world fixtures for the in-memory domain
//!
//! ```toml
//! [scope]
//! label = "Level"
//! partitioned = true
//!
//! [[folders]]
//! path = "Lights/Indoor"
//!
//! [[objects]]
//! label = "Table"
//! folder = "Props"
//! sockets = ["top"]
//!
//! [[objects]]
//! label = "Lamp"
//! attach = "Table"
//! socket = "top"
//! components = ["Bulb"]
//! selected = true
//!
//! [[unloaded]]
//! label = "FarHouse"
//! folder = "Streaming"
//! ```
//!
//! Owners (`owner = "<nested scope label>"`) must be declared before the
//! objects they own. Attachments are applied after all objects exist.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, instrument};

use crate::domain::{FolderPath, FolderRoot, ObjectHandle};
use crate::infrastructure::error::{InfraError, InfraResult};
use crate::infrastructure::memory::{InMemorySelection, InMemoryWorld, ObjectSpec};
use crate::infrastructure::traits::DomainAdapter;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScopeFixture {
    pub label: String,
    pub partitioned: bool,
}

impl Default for ScopeFixture {
    fn default() -> Self {
        Self {
            label: "World".to_string(),
            partitioned: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FolderFixture {
    pub path: String,
    /// Label of the nested scope this folder belongs to.
    #[serde(default)]
    pub nested: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ObjectFixture {
    pub label: String,
    pub folder: Option<String>,
    pub attach: Option<String>,
    pub socket: Option<String>,
    pub owner: Option<String>,
    pub nested_scope: bool,
    pub editing: bool,
    pub temporary: bool,
    pub locked: bool,
    pub sockets: Vec<String>,
    pub components: Vec<String>,
    pub selected: bool,
    pub pinned: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct UnloadedFixture {
    pub label: String,
    pub folder: Option<String>,
    pub pinned: bool,
}

/// A world description parsed from TOML.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WorldFixture {
    pub scope: ScopeFixture,
    pub folders: Vec<FolderFixture>,
    pub objects: Vec<ObjectFixture>,
    pub unloaded: Vec<UnloadedFixture>,
}

/// The in-memory domain built from a fixture.
pub struct LoadedWorld {
    pub world: Arc<InMemoryWorld>,
    pub selection: Arc<InMemorySelection>,
}

impl WorldFixture {
    pub fn load(path: &Path) -> InfraResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| InfraError::io(format!("read fixture {}", path.display()), e))?;
        Self::parse(&content, path)
    }

    pub fn from_toml(content: &str) -> InfraResult<Self> {
        Self::parse(content, Path::new("<inline>"))
    }

    fn parse(content: &str, path: &Path) -> InfraResult<Self> {
        toml::from_str(content).map_err(|e| InfraError::fixture(path, e.to_string()))
    }

    /// Populate a fresh in-memory domain.
    #[instrument(level = "debug", skip(self), fields(objects = self.objects.len()))]
    pub fn build(&self) -> InfraResult<LoadedWorld> {
        let origin = PathBuf::from(&self.scope.label);
        let invalid = |message: String| InfraError::fixture(&origin, message);

        let world = Arc::new(InMemoryWorld::new(self.scope.label.clone(), self.scope.partitioned));
        let selection = Arc::new(InMemorySelection::new());
        let mut handles: HashMap<String, ObjectHandle> = HashMap::new();

        for object in &self.objects {
            if object.label.is_empty() {
                return Err(invalid("object without label".to_string()));
            }
            if handles.contains_key(&object.label) {
                return Err(invalid(format!("duplicate object label '{}'", object.label)));
            }
            let mut spec = ObjectSpec::new(object.label.clone()).with_sockets(object.sockets.clone());
            if let Some(folder) = &object.folder {
                spec = spec.in_folder(folder.as_str());
            }
            if let Some(owner) = &object.owner {
                let owner = handles.get(owner).copied().ok_or_else(|| {
                    invalid(format!(
                        "owner '{}' of '{}' must be declared first",
                        owner, object.label
                    ))
                })?;
                spec = spec.owned_by(owner);
            }
            if object.nested_scope {
                spec = spec.nested_scope(object.editing);
            }
            if object.temporary {
                spec = spec.temporary();
            }
            let handle = world.spawn(spec)?;
            for component in &object.components {
                world.add_sub_object(handle, component.clone())?;
            }
            handles.insert(object.label.clone(), handle);
        }

        for folder in &self.folders {
            let root = match &folder.nested {
                Some(label) => FolderRoot::Object(
                    handles
                        .get(label)
                        .copied()
                        .ok_or_else(|| invalid(format!("unknown nested scope '{}'", label)))?,
                ),
                None => FolderRoot::Scope,
            };
            let path = FolderPath::new(&folder.path);
            if !world.folder_exists(root, &path) {
                world.create_folder(root, &path)?;
            }
        }

        for object in &self.objects {
            let Some(parent) = &object.attach else {
                continue;
            };
            let parent = handles
                .get(parent)
                .copied()
                .ok_or_else(|| invalid(format!("unknown attachment parent '{}'", parent)))?;
            world.attach(parent, handles[&object.label], object.socket.as_deref())?;
        }

        // Locking last, so attachments above are not refused.
        for object in self.objects.iter().filter(|object| object.locked) {
            world.set_locked(handles[&object.label], true)?;
        }

        for descriptor in &self.unloaded {
            let guid = world.add_unloaded(
                descriptor.label.clone(),
                descriptor.folder.as_deref().unwrap_or_default(),
            )?;
            if descriptor.pinned {
                world.pin(guid);
            }
        }

        for object in self.objects.iter().filter(|object| object.pinned) {
            if let Some(info) = world.object(handles[&object.label]) {
                world.pin(info.guid);
            }
        }

        let selected: Vec<ObjectHandle> = self
            .objects
            .iter()
            .filter(|object| object.selected)
            .map(|object| handles[&object.label])
            .collect();
        if !selected.is_empty() {
            selection.set_selection(&selected);
        }

        debug!(objects = handles.len(), unloaded = self.unloaded.len(), "fixture loaded");
        Ok(LoadedWorld { world, selection })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::traits::SelectionProvider;

    #[test]
    fn test_owner_must_be_declared_first() {
        let fixture = WorldFixture::from_toml(
            r#"
            [[objects]]
            label = "Inner"
            owner = "Instance"

            [[objects]]
            label = "Instance"
            nested_scope = true
            "#,
        )
        .unwrap();

        assert!(matches!(fixture.build(), Err(InfraError::Fixture { .. })));
    }

    #[test]
    fn test_attachments_and_selection_are_applied() {
        let loaded = WorldFixture::from_toml(
            r#"
            [[objects]]
            label = "Lamp"
            attach = "Table"
            socket = "top"
            selected = true

            [[objects]]
            label = "Table"
            sockets = ["top"]
            locked = true
            "#,
        )
        .unwrap()
        .build()
        .unwrap();

        let lamp = loaded.world.find_object("Lamp").unwrap();
        let table = loaded.world.find_object("Table").unwrap();
        assert_eq!(loaded.world.object(lamp).unwrap().attach_parent, Some(table));
        assert_eq!(loaded.world.attachment_socket(lamp).as_deref(), Some("top"));
        assert!(loaded.world.object(table).unwrap().locked);
        assert_eq!(loaded.selection.selected(), vec![lamp]);
    }
}
