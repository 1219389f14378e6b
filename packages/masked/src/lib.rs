//! An entity component system which matches entities to systems by component masks.
//!
//! Every component type gets one bit of a `ComponentMask` and its own dense
//! store, sorted by entity ID. Systems select entities with a `Query` over
//! those masks and are run once per frame, optionally split over worker
//! threads. Structural changes which could disturb a running frame are queued
//! as `Task`s and applied when the frame ends.

pub use command_buffer::{CommandBuffer, Task};
pub use component::{Component, ComponentMask, ComponentType, MAX_COMPONENT_TYPES};
pub use entity::EntityID;
pub use error::{Error, Result};
pub use store::ComponentStore;
pub use system::{
    Batch,
    Comparison,
    Query,
    System,
    SystemToken,
};
pub use world::{ComponentRef, ComponentRefMut, World, WorldConfig};

pub mod component;
pub mod entity;
pub mod store;
pub mod error;

pub mod system;
pub mod command_buffer;

pub mod world;
