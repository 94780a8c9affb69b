//! Service container for dependency injection
//!
//! Wires the outliner with its collaborators.

use std::sync::Arc;

use crate::application::services::{Outliner, OutlinerMode};
use crate::config::Settings;
use crate::infrastructure::error::InfraResult;
use crate::infrastructure::fixture::LoadedWorld;
use crate::infrastructure::memory::{InMemorySelection, InMemoryWorld, TransactionLog};
use crate::infrastructure::traits::{DomainAdapter, SelectionProvider, TransactionProvider};

/// Container holding the collaborators every outliner needs.
pub struct ServiceContainer {
    /// Application settings
    pub settings: Arc<Settings>,

    /// Domain adapter
    pub domain: Arc<dyn DomainAdapter>,

    /// Domain-side selection
    pub selection: Arc<dyn SelectionProvider>,

    /// Undo boundary
    pub transactions: Arc<dyn TransactionProvider>,
}

impl ServiceContainer {
    /// Create a container around an in-memory domain built from a fixture.
    pub fn new(settings: Settings, loaded: LoadedWorld) -> Self {
        Self::with_deps(
            settings,
            loaded.world,
            loaded.selection,
            Arc::new(TransactionLog::new()),
        )
    }

    /// Create a container around an empty in-memory world.
    pub fn in_memory(settings: Settings) -> Self {
        Self::with_deps(
            settings,
            Arc::new(InMemoryWorld::default()),
            Arc::new(InMemorySelection::new()),
            Arc::new(TransactionLog::new()),
        )
    }

    /// Create a service container with custom dependencies (for testing).
    pub fn with_deps(
        settings: Settings,
        domain: Arc<dyn DomainAdapter>,
        selection: Arc<dyn SelectionProvider>,
        transactions: Arc<dyn TransactionProvider>,
    ) -> Self {
        let settings = Arc::new(settings);

        Self {
            settings,
            domain,
            selection,
            transactions,
        }
    }

    /// Build an outliner over this container's collaborators.
    pub fn outliner(&self, mode: OutlinerMode) -> InfraResult<Arc<Outliner>> {
        Ok(Outliner::new(
            self.domain.clone(),
            self.selection.clone(),
            self.transactions.clone(),
            mode,
            &self.settings,
        )?)
    }
}
