//! Domain-level errors (no external dependencies)

use thiserror::Error;

use crate::domain::entities::{FolderPath, ObjectGuid, ObjectHandle, SubObjectHandle};

/// Domain errors represent rejected or impossible mutations of the domain.
/// Resolution and validation never produce these; only mutating calls do.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("object no longer exists: {0}")]
    StaleObject(ObjectHandle),

    #[error("sub-object no longer exists: {0}")]
    StaleSubObject(SubObjectHandle),

    #[error("folder not found: {0}")]
    FolderNotFound(FolderPath),

    #[error("folder already exists: {0}")]
    FolderExists(FolderPath),

    #[error("unknown object descriptor: {0}")]
    UnknownDescriptor(ObjectGuid),

    #[error("cycle detected: {child} cannot be attached under {parent}")]
    CycleDetected {
        child: ObjectHandle,
        parent: ObjectHandle,
    },

    #[error("object is locked: {0}")]
    Locked(String),

    #[error("not a nested scope: {0}")]
    NotNestedScope(ObjectHandle),

    #[error("no scope is loaded")]
    ScopeNotLoaded,

    #[error("{0}")]
    Rejected(String),
}

/// Result type for domain mutations.
pub type DomainResult<T> = Result<T, DomainError>;
