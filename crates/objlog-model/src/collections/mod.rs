//! Persistent collections.
//!
//! Both collections snapshot as a custom model and journal each mutation as
//! a compact custom command instead of whole-field rewrites.

pub mod list;
pub mod map;

pub use list::PersistList;
pub use map::PersistMap;
