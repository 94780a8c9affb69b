//! Infrastructure layer: boundary traits, in-memory domain and DI container
//!
//! This layer defines the traits the engine talks through, provides the
//! in-memory reference implementations and the fixture loader, and wires up
//! services.

pub mod di;
pub mod error;
pub mod fixture;
pub mod memory;
pub mod traits;

pub use error::{InfraError, InfraResult};
