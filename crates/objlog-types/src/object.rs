use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity of a persisted object within one store generation.
///
/// Ids are allocated densely starting at 1 and are never reused while the
/// generation is live. A snapshot renumbers the reachable graph compactly, so
/// an id is only meaningful together with the snapshot/journal pair that
/// issued it. `0` is reserved for "no object".
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(u32);

impl ObjectId {
    /// The reserved "no object" id.
    pub const NULL: Self = Self(0);

    /// The id of the root object of every store.
    pub const ROOT: Self = Self(1);

    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u32 {
        self.0
    }

    /// Returns `true` if this is the reserved null id.
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// The slot this id occupies in an id-indexed object table.
    pub const fn slot(self) -> usize {
        self.0 as usize
    }

    /// The id allocated right after this one.
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.0)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for ObjectId {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

/// Index of a registered type descriptor within one store generation.
///
/// Indices are assigned on first use starting at 1; `0` means "no type".
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeIndex(u32);

impl TypeIndex {
    /// The reserved "no type" index.
    pub const NONE: Self = Self(0);

    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u32 {
        self.0
    }

    pub const fn is_none(self) -> bool {
        self.0 == 0
    }

    pub const fn slot(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for TypeIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeIndex({})", self.0)
    }
}

impl fmt::Display for TypeIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for TypeIndex {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}
