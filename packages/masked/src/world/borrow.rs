//! Guards over component payloads, and the per-thread record of which stores
//! they keep borrowed.
//!
//! Store locks cannot be re-entered for writing by the thread holding them, so
//! the world consults this record before locking a store a guard on the same
//! thread may already hold.

use std::cell::RefCell;
use std::fmt::{self, Debug, Formatter};
use std::ops::{Deref, DerefMut};

use parking_lot::{MappedRwLockReadGuard, MappedRwLockWriteGuard};

/// How a store is borrowed by the current thread.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Access {
    Read,
    Write,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Held {
    world: usize,
    store: usize,
    access: Access,
}

thread_local! {
    static HELD: RefCell<Vec<Held>> = RefCell::new(Vec::new());
}

/// Return how the current thread borrows `store` of `world`, if at all.
///
/// A write borrow takes precedence over any read borrows.
pub(crate) fn held(world: usize, store: usize) -> Option<Access> {
    HELD.with(|held| {
        let mut found = None;
        for h in held.borrow().iter().filter(|h| h.world == world && h.store == store) {
            if h.access == Access::Write {
                return Some(Access::Write);
            }
            found = Some(Access::Read);
        }
        found
    })
}

/// One entry in the current thread's borrow record, removed on drop.
pub(crate) struct BorrowToken(Held);

impl BorrowToken {
    pub(crate) fn new(world: usize, store: usize, access: Access) -> BorrowToken {
        let entry = Held { world, store, access };
        HELD.with(|held| held.borrow_mut().push(entry));
        BorrowToken(entry)
    }
}

impl Drop for BorrowToken {
    fn drop(&mut self) {
        let entry = self.0;
        // The record may already be gone during thread teardown.
        let _ = HELD.try_with(|held| {
            let mut held = held.borrow_mut();
            if let Some(pos) = held.iter().rposition(|h| *h == entry) {
                held.swap_remove(pos);
            }
        });
    }
}

/// A shared borrow of a component payload, or of a whole store.
///
/// The store stays locked for reading until the guard is dropped. Structural
/// changes to the same store made by this thread in the meantime are deferred.
pub struct ComponentRef<'a, T> {
    guard: MappedRwLockReadGuard<'a, T>,
    _token: BorrowToken,
}

impl<'a, T> ComponentRef<'a, T> {
    pub(crate) fn new(guard: MappedRwLockReadGuard<'a, T>, token: BorrowToken) -> ComponentRef<'a, T> {
        ComponentRef {
            guard,
            _token: token,
        }
    }
}

impl<'a, T> Deref for ComponentRef<'a, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<'a, T: Debug> Debug for ComponentRef<'a, T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Debug::fmt(&**self, f)
    }
}

/// An exclusive borrow of a component payload.
///
/// The store stays locked for writing until the guard is dropped.
pub struct ComponentRefMut<'a, T> {
    guard: MappedRwLockWriteGuard<'a, T>,
    _token: BorrowToken,
}

impl<'a, T> ComponentRefMut<'a, T> {
    pub(crate) fn new(guard: MappedRwLockWriteGuard<'a, T>, token: BorrowToken) -> ComponentRefMut<'a, T> {
        ComponentRefMut {
            guard,
            _token: token,
        }
    }
}

impl<'a, T> Deref for ComponentRefMut<'a, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<'a, T> DerefMut for ComponentRefMut<'a, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

impl<'a, T: Debug> Debug for ComponentRefMut<'a, T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Debug::fmt(&**self, f)
    }
}
