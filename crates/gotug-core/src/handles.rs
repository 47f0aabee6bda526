//! Handle registry: opaque string names for in-memory values.
//!
//! Callers receive a handle such as `index_1` instead of the value itself and
//! pass it back on later requests. Every value carries a type tag so a handle
//! created for one kind of value cannot be resolved as another.
//!
//! The registry is shared between request handlers, so all access goes
//! through a mutex. Values are stored behind `Arc` and resolved values are
//! cloned `Arc`s: releasing a handle while a query is still running is safe.

use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use thiserror::Error;
use tracing::debug;

/// A value that can be stored in a [`HandleRegistry`].
pub trait HandleKind: Any + Send + Sync {
    /// Type tag checked on resolve, e.g. `code_index`.
    const TAG: &'static str;
    /// Prefix of generated handle strings, e.g. `index`.
    const PREFIX: &'static str;
}

/// Errors from handle resolution.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HandleError {
    #[error("unknown handle: {handle}")]
    Unknown { handle: String },

    #[error("handle {handle} is a {actual}, expected {expected}")]
    WrongType {
        handle: String,
        expected: &'static str,
        actual: &'static str,
    },
}

struct Entry {
    tag: &'static str,
    value: Arc<dyn Any + Send + Sync>,
}

/// Mutex-guarded map from handle string to tagged value.
pub struct HandleRegistry {
    entries: Mutex<HashMap<String, Entry>>,
    counter: AtomicU64,
}

impl Default for HandleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for HandleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandleRegistry")
            .field("len", &self.len())
            .finish()
    }
}

impl HandleRegistry {
    pub fn new() -> Self {
        HandleRegistry {
            entries: Mutex::new(HashMap::new()),
            counter: AtomicU64::new(0),
        }
    }

    // A panic while holding the lock cannot leave the map half-updated, so a
    // poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Store `value` and return its new handle.
    pub fn register<T: HandleKind>(&self, value: T) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        let handle = format!("{}_{}", T::PREFIX, n);
        self.lock().insert(
            handle.clone(),
            Entry {
                tag: T::TAG,
                value: Arc::new(value),
            },
        );
        debug!(handle = %handle, tag = T::TAG, "registered handle");
        handle
    }

    /// Look up `handle`, checking that it names a `T`.
    pub fn resolve<T: HandleKind>(&self, handle: &str) -> Result<Arc<T>, HandleError> {
        let (tag, value) = {
            let entries = self.lock();
            let entry = entries.get(handle).ok_or_else(|| HandleError::Unknown {
                handle: handle.to_string(),
            })?;
            (entry.tag, Arc::clone(&entry.value))
        };
        if tag != T::TAG {
            return Err(HandleError::WrongType {
                handle: handle.to_string(),
                expected: T::TAG,
                actual: tag,
            });
        }
        value.downcast::<T>().map_err(|_| HandleError::WrongType {
            handle: handle.to_string(),
            expected: T::TAG,
            actual: tag,
        })
    }

    /// Drop the value named by `handle`.
    pub fn release(&self, handle: &str) -> Result<(), HandleError> {
        match self.lock().remove(handle) {
            Some(_) => {
                debug!(handle = %handle, "released handle");
                Ok(())
            }
            None => Err(HandleError::Unknown {
                handle: handle.to_string(),
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Counter(u32);
    impl HandleKind for Counter {
        const TAG: &'static str = "counter";
        const PREFIX: &'static str = "counter";
    }

    struct Label(&'static str);
    impl HandleKind for Label {
        const TAG: &'static str = "label";
        const PREFIX: &'static str = "label";
    }

    #[test]
    fn register_then_resolve() {
        let reg = HandleRegistry::new();
        let h = reg.register(Counter(7));
        assert_eq!(h, "counter_1");
        let v = reg.resolve::<Counter>(&h).unwrap();
        assert_eq!(v.0, 7);
    }

    #[test]
    fn handles_are_unique() {
        let reg = HandleRegistry::new();
        let a = reg.register(Counter(1));
        let b = reg.register(Counter(2));
        assert_ne!(a, b);
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn unknown_handle_errors() {
        let reg = HandleRegistry::new();
        let err = reg.resolve::<Counter>("counter_99").unwrap_err();
        assert_eq!(
            err,
            HandleError::Unknown {
                handle: "counter_99".to_string()
            }
        );
    }

    #[test]
    fn wrong_type_errors() {
        let reg = HandleRegistry::new();
        let h = reg.register(Label("x"));
        let err = reg.resolve::<Counter>(&h).unwrap_err();
        assert!(matches!(
            err,
            HandleError::WrongType {
                expected: "counter",
                actual: "label",
                ..
            }
        ));
        assert_eq!(reg.resolve::<Label>(&h).unwrap().0, "x");
    }

    #[test]
    fn release_removes_and_second_release_fails() {
        let reg = HandleRegistry::new();
        let h = reg.register(Counter(1));
        let held = reg.resolve::<Counter>(&h).unwrap();
        reg.release(&h).unwrap();
        assert!(reg.is_empty());
        assert_eq!(held.0, 1);
        assert!(reg.release(&h).is_err());
        assert!(reg.resolve::<Counter>(&h).is_err());
    }
}
