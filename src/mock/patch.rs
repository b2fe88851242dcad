//! Scoped replacement of shared collaborators

use crate::error::{Error, Result};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// A shared, replaceable value that code under test reads through
///
/// Production code holds a `Slot` for each collaborator it wants to be
/// patchable (a client, a clock, a fetch function); tests swap the contents
/// with [`patch`] or a [`Patcher`] and the original comes back afterwards.
pub struct Slot<T> {
    cell: Rc<RefCell<T>>,
}

impl<T> Clone for Slot<T> {
    fn clone(&self) -> Self {
        Slot {
            cell: self.cell.clone(),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Slot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Slot").field(&self.cell.borrow()).finish()
    }
}

impl<T: Clone> Slot<T> {
    pub fn new(value: T) -> Self {
        Slot {
            cell: Rc::new(RefCell::new(value)),
        }
    }

    pub fn get(&self) -> T {
        self.cell.borrow().clone()
    }

    /// Replace the contents, returning the previous value
    pub fn replace(&self, value: T) -> T {
        self.cell.replace(value)
    }
}

/// Restores a slot's original value when dropped
#[must_use = "the patch is undone as soon as the guard is dropped"]
pub struct PatchGuard<T: Clone> {
    slot: Slot<T>,
    original: Option<T>,
}

impl<T: Clone> Drop for PatchGuard<T> {
    fn drop(&mut self) {
        if let Some(original) = self.original.take() {
            self.slot.replace(original);
        }
    }
}

/// Patch `slot` with `replacement` until the returned guard is dropped
pub fn patch<T: Clone>(slot: &Slot<T>, replacement: T) -> PatchGuard<T> {
    let original = slot.replace(replacement);
    PatchGuard {
        slot: slot.clone(),
        original: Some(original),
    }
}

/// A patch with explicit `start`/`stop`, for fixtures that span many tests
pub struct Patcher<T: Clone> {
    slot: Slot<T>,
    replacement: T,
    original: Option<T>,
}

impl<T: Clone> Patcher<T> {
    pub fn new(slot: &Slot<T>, replacement: T) -> Self {
        Patcher {
            slot: slot.clone(),
            replacement,
            original: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.original.is_some()
    }

    /// Install the replacement and return it
    pub fn start(&mut self) -> Result<T> {
        if self.is_active() {
            return Err(Error::Generic("patch is already started".to_string()));
        }
        self.original = Some(self.slot.replace(self.replacement.clone()));
        Ok(self.replacement.clone())
    }

    /// Restore the original value
    pub fn stop(&mut self) -> Result<()> {
        match self.original.take() {
            Some(original) => {
                self.slot.replace(original);
                Ok(())
            }
            None => Err(Error::Generic("stop called on unstarted patcher".to_string())),
        }
    }
}
