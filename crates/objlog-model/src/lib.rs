//! Persisted object graph for objlog.
//!
//! A [`Store`] keeps a graph of shared objects rooted at one object of a
//! known type. Every mutation is appended to the live journal before memory
//! changes; a snapshot of everything reachable from the root is written on a
//! clean close and after any recovery replay.
//!
//! Types take part by embedding an [`ObjectCore`], implementing
//! [`Persisted`] (how they save and load) and [`PersistedType`] (how they
//! are named and constructed). Value fields are wrapped in [`Field`] and
//! changed through [`ObjectCore::set`]. [`PersistList`] and [`PersistMap`]
//! log compact custom commands instead of whole-field rewrites.
//!
//! # Design Rules
//!
//! 1. The journal is never behind memory: a mutation that fails to log is
//!    not applied.
//! 2. Object ids are assigned in creation order and checked on replay.
//! 3. A snapshot is self-contained; ids are renumbered from 1 by a
//!    depth-first walk from the root and adopted once the file is durable.
//! 4. Objects hold a [`StoreContext`], never the store itself.

pub mod collections;
pub mod context;
pub mod error;
pub mod field;
pub mod loader;
pub mod object;
pub mod registry;
pub mod saver;
pub mod store;
pub mod tracker;

#[cfg(test)]
mod testing;

pub use collections::{PersistList, PersistMap};
pub use context::StoreContext;
pub use error::{ModelError, ModelResult};
pub use field::{decode_id, Element, ElementKind, Field, FieldValue, ObjectKey};
pub use loader::Loader;
pub use object::{downcast, AsAny, ObjectCore, ObjectRef, ObjectResolver, Persisted, PersistedType};
pub use registry::{Constructor, TypeRegistry};
pub use saver::{SavedGraph, Saver};
pub use store::Store;
pub use tracker::Tracker;
