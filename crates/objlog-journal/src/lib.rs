//! Snapshot and journal file lifecycle for objlog.
//!
//! A store directory holds one *generation*: the latest snapshot
//! `<stamp>.map` and the journal `<stamp>.log` that follows it. Older
//! generations are moved into the `logs/` sub-directory.
//!
//! [`BinlogStore`] drives the lifecycle:
//!
//! 1. **Open**: load the newest snapshot (or ask for a fresh root), replay
//!    the newest journal, compact if a journal was replayed, then start a
//!    new journal and hand out its [`JournalWriter`].
//! 2. **Close**: flush and close the journal; unless interrupted, write a
//!    fresh snapshot and archive the previous generation.
//!
//! # Design Rules
//!
//! 1. A journal's stamp is strictly greater than its snapshot's stamp.
//! 2. A snapshot becomes visible only after it was written completely.
//! 3. Every I/O or ordering failure aborts the operation in progress.
//! 4. The live journal is shared between writers and the flush timer behind
//!    one mutex.

pub mod config;
pub mod directory;
pub mod error;
pub mod generation;
pub mod memory;
pub mod store;
pub mod writer;

pub use config::{FlushPolicy, JournalConfig};
pub use directory::{DirEntry, Directory, LocalDirectory, StagedFile};
pub use error::{JournalError, JournalResult};
pub use generation::{FileKind, GenerationFile, GenerationListing};
pub use memory::InMemoryDirectory;
pub use store::{BinlogAccess, BinlogStore};
pub use writer::JournalWriter;
