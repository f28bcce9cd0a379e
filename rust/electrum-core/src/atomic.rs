//! Guarded state container.
//!
//! [`Atomic`] owns one value behind a reader-writer lock. Every read and every
//! mutation of the session's routing tables and transport handle goes through
//! it; there is no other access path.
//!
//! None of the accessors may be called with a closure that awaits or blocks on
//! I/O: the lock is a `parking_lot` lock and is never held across `.await`.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use parking_lot::RwLock;

/// Reports whether a value is "absent": an unset slot or an empty collection.
///
/// This replaces a runtime nil check with a static contract.
pub trait Vacancy {
    fn is_vacant(&self) -> bool;
}

impl<T> Vacancy for Option<T> {
    fn is_vacant(&self) -> bool {
        self.is_none()
    }
}

impl<T> Vacancy for Vec<T> {
    fn is_vacant(&self) -> bool {
        self.is_empty()
    }
}

impl<K, V, S> Vacancy for HashMap<K, V, S> {
    fn is_vacant(&self) -> bool {
        self.is_empty()
    }
}

impl<K, V> Vacancy for BTreeMap<K, V> {
    fn is_vacant(&self) -> bool {
        self.is_empty()
    }
}

/// A value that is either installed or not.
///
/// Used for the session's transport handle: `Unset` means the session has no
/// active transport (never installed, or released by shutdown).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Slot<T> {
    #[default]
    Unset,
    Set(T),
}

impl<T> Slot<T> {
    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Unset => None,
            Self::Set(value) => Some(value),
        }
    }

    /// Take the value out, leaving `Unset` behind.
    pub fn take(&mut self) -> Option<T> {
        match std::mem::take(self) {
            Self::Unset => None,
            Self::Set(value) => Some(value),
        }
    }
}

impl<T> Vacancy for Slot<T> {
    fn is_vacant(&self) -> bool {
        matches!(self, Self::Unset)
    }
}

/// Mutual-exclusion wrapper around a single shared value.
pub struct Atomic<T> {
    value: RwLock<T>,
}

impl<T> Atomic<T> {
    pub fn new(value: T) -> Self {
        Self {
            value: RwLock::new(value),
        }
    }

    /// Project the value under a shared lock.
    pub fn get<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.value.read())
    }

    /// Run a fallible read-only operation under a shared lock.
    pub fn with<R, E>(&self, f: impl FnOnce(&T) -> Result<R, E>) -> Result<R, E> {
        f(&self.value.read())
    }

    /// Validate, then mutate, under one exclusive lock.
    ///
    /// `check` only sees a shared reference, so a refused change leaves the
    /// value exactly as it was; `apply` runs only once `check` has passed.
    pub fn change<R, E>(
        &self,
        check: impl FnOnce(&T) -> Result<(), E>,
        apply: impl FnOnce(&mut T) -> R,
    ) -> Result<R, E> {
        let mut value = self.value.write();
        check(&value)?;
        Ok(apply(&mut value))
    }

    /// Infallible form of [`Atomic::change`].
    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.value.write())
    }
}

impl<T: Default> Atomic<T> {
    /// Replace the value with its empty form, returning what was there.
    pub fn reset(&self) -> T {
        std::mem::take(&mut *self.value.write())
    }
}

impl<T: Vacancy> Atomic<T> {
    pub fn is_vacant(&self) -> bool {
        self.value.read().is_vacant()
    }
}

impl<T: Default> Default for Atomic<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for Atomic<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Atomic").field(&*self.value.read()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_error_leaves_value_untouched() {
        let atomic = Atomic::new(vec![1, 2, 3]);

        let result = atomic.change(
            |v| if v.len() >= 3 { Err("full") } else { Ok(()) },
            |v| v.push(4),
        );

        assert_eq!(result, Err("full"));
        assert_eq!(atomic.get(|v| v.clone()), vec![1, 2, 3]);
    }

    #[test]
    fn change_commits_and_returns() {
        let atomic = Atomic::new(HashMap::new());
        let len = atomic
            .change(
                |_| Ok::<_, ()>(()),
                |m| {
                    m.insert("a", 1);
                    m.len()
                },
            )
            .unwrap();
        assert_eq!(len, 1);
        assert_eq!(atomic.get(|m| m.get("a").copied()), Some(1));
    }

    #[test]
    fn with_propagates_failure() {
        let atomic = Atomic::new(7u32);
        let err = atomic.with(|v| if *v > 5 { Err(*v) } else { Ok(()) });
        assert_eq!(err, Err(7));
    }

    #[test]
    fn reset_returns_previous_and_empties() {
        let atomic = Atomic::new(Slot::Set("transport"));
        assert!(!atomic.is_vacant());

        let previous = atomic.reset();
        assert_eq!(previous, Slot::Set("transport"));
        assert!(atomic.is_vacant());
    }

    #[test]
    fn vacancy_of_collections() {
        assert!(Atomic::new(HashMap::<u64, ()>::new()).is_vacant());
        assert!(!Atomic::new(vec![()]).is_vacant());
        assert!(Atomic::new(None::<u8>).is_vacant());
    }

    #[test]
    fn slot_take_leaves_unset() {
        let mut slot = Slot::Set(3);
        assert_eq!(slot.take(), Some(3));
        assert_eq!(slot, Slot::Unset);
        assert_eq!(slot.take(), None);
    }
}
