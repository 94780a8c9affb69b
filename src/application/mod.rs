//! Application layer: the outliner engine
//!
//! This layer orchestrates domain logic and depends on the boundary traits.

pub mod error;
pub mod services;

pub use error::{ApplicationError, ApplicationResult};
