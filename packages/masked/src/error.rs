//! Errors returned by fallible world operations.

use std::collections::TryReserveError;

use thiserror::Error;

use crate::component::MAX_COMPONENT_TYPES;

/// The error type for operations that return a value and can fail.
///
/// Operations which only mutate the world (attach, detach and so on) do not
/// return errors: unknown entities and component types make them no-ops.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Every bit of the component mask has already been assigned.
    #[error("all {} component type slots are in use", MAX_COMPONENT_TYPES)]
    ComponentTypesExhausted,

    /// Growing a registry or store failed. The world is left unchanged.
    #[error("failed to grow storage: {0}")]
    Allocation(#[from] TryReserveError),
}

/// Shorthand for results carrying an [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
