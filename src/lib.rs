//! outliner: a live hierarchical view-model over an externally mutable world
//!
//! The engine resolves a displayable tree (scope, objects, sub-objects,
//! grouping folders, nested scopes, unloaded descriptors) from a domain
//! adapter, keeps it current from domain notifications, and turns selection,
//! pinning and drag/drop gestures back into domain mutations.
//!
//! Layers, innermost first: [`domain`] (values), [`application`] (the
//! engine), [`infrastructure`] (boundary traits, in-memory domain, fixtures),
//! [`cli`] (the inspection binary).

pub mod application;
pub mod cli;
pub mod config;
pub mod domain;
pub mod exitcode;
pub mod infrastructure;
pub mod util;
