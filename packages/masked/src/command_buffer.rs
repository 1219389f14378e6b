//! Deferred structural changes.

use crossbeam_queue::SegQueue;

use crate::component::ComponentMask;
use crate::entity::EntityID;
use crate::system::{SystemDescriptor, SystemToken};

/// A structural change which is recorded now and applied later.
#[derive(Debug)]
pub enum Task {
    /// Detach every component of an entity and remove it from the registry.
    DestroyEntity(EntityID),
    /// Attach default-valued components to an entity.
    AttachComponents(EntityID, ComponentMask),
    /// Detach the given components from an entity.
    DetachComponents(EntityID, ComponentMask),
    /// Add a system to the schedule.
    EnableSystem(SystemDescriptor),
    /// Remove a system from the schedule.
    DisableSystem(SystemToken),
}

/// A FIFO command buffer of `Task`s.
///
/// Systems push into the buffer while the world is being iterated, including
/// from worker threads. The world applies the buffer in push order once every
/// system in the frame has returned.
#[derive(Debug, Default)]
pub struct CommandBuffer {
    tasks: SegQueue<Task>,
}

impl CommandBuffer {
    /// Create a new, empty, command buffer.
    pub fn new() -> CommandBuffer {
        CommandBuffer {
            tasks: SegQueue::new(),
        }
    }

    /// Queue a task at the back of the buffer.
    pub fn push(&self, task: Task) {
        self.tasks.push(task);
    }

    /// Take the oldest task from the buffer.
    pub fn pop(&self) -> Option<Task> {
        self.tasks.pop()
    }

    /// Return the number of queued tasks.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Returns true if no tasks are queued.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Remove every queued task, oldest first.
    pub fn drain(&mut self) -> Drain<'_> {
        Drain(self)
    }
}

/// An iterator which empties a `CommandBuffer` in FIFO order.
pub struct Drain<'a>(&'a mut CommandBuffer);

impl<'a> Iterator for Drain<'a> {
    type Item = Task;

    fn next(&mut self) -> Option<Task> {
        self.0.pop()
    }
}
