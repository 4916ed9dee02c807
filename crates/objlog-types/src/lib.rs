//! Foundation types for objlog.
//!
//! This crate provides the identity and naming primitives shared by every
//! other objlog crate.
//!
//! # Key Types
//!
//! - [`ObjectId`]: append-only integer identity of a persisted object
//! - [`TypeIndex`]: per-generation integer identity of a persisted type
//! - [`TypeDescriptor`]: canonical, reversible name of a persisted type
//! - [`GenerationStamp`]: millisecond timestamp naming a snapshot or journal
//! - [`GenerationClock`]: issues strictly increasing generation stamps

pub mod descriptor;
pub mod error;
pub mod object;
pub mod temporal;

pub use descriptor::TypeDescriptor;
pub use error::TypeError;
pub use object::{ObjectId, TypeIndex};
pub use temporal::{GenerationClock, GenerationStamp};
