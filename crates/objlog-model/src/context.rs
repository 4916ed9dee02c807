use std::fmt;
use std::sync::{Arc, Mutex};

use objlog_journal::JournalWriter;

use crate::registry::TypeRegistry;
use crate::tracker::Tracker;

/// Shared handle every persisted object keeps to its store.
///
/// Holds the identity registry of the current generation and the type
/// registry. Clones are cheap and refer to the same store. The handle does
/// not own any object, so objects holding it never form a cycle with the
/// store.
#[derive(Clone)]
pub struct StoreContext {
    inner: Arc<Inner>,
}

struct Inner {
    tracker: Mutex<Tracker>,
    types: TypeRegistry,
}

impl StoreContext {
    pub fn new(types: TypeRegistry) -> Self {
        Self {
            inner: Arc::new(Inner {
                tracker: Mutex::new(Tracker::new()),
                types,
            }),
        }
    }

    pub fn types(&self) -> &TypeRegistry {
        &self.inner.types
    }

    /// Run `f` with exclusive access to the identity registry.
    pub fn with_tracker<T>(&self, f: impl FnOnce(&mut Tracker) -> T) -> T {
        let mut tracker = self.inner.tracker.lock().expect("tracker mutex poisoned");
        f(&mut tracker)
    }

    /// Swap in the registry of a new session, keeping the attached
    /// journal. Returns the new session.
    pub fn replace_tracker(&self, tracker: Tracker) -> u64 {
        self.with_tracker(|current| current.advance(tracker))
    }

    /// Session objects created now are stamped with.
    pub fn session(&self) -> u64 {
        self.with_tracker(|tracker| tracker.session())
    }

    /// Attach (or with `None`, detach) the live journal.
    pub fn attach(&self, writer: Option<JournalWriter>) -> Option<JournalWriter> {
        self.with_tracker(|tracker| tracker.attach(writer))
    }

    /// Returns `true` if both handles refer to the same store.
    pub fn same_store(&self, other: &StoreContext) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Default for StoreContext {
    fn default() -> Self {
        Self::new(TypeRegistry::new())
    }
}

impl fmt::Debug for StoreContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreContext")
            .field("types", &self.inner.types)
            .finish_non_exhaustive()
    }
}
