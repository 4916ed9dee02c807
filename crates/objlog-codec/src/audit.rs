//! Structural audit of record streams.
//!
//! The audit replays a snapshot followed by its journal without constructing
//! any objects. It checks the invariants every valid generation obeys:
//! type indices and object ids are issued densely in order, every record
//! targets an object created earlier with the type it was created with, and
//! snapshot-only / journal-only commands stay in their section.
//!
//! Field values are opaque to the audit, so references hidden inside field
//! maps and custom models are not checked here; the model loader does that.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::io::BufRead;

use objlog_types::{ObjectId, TypeIndex};
use tracing::debug;

use crate::error::{AuditError, CodecResult};
use crate::record::{CommandKind, Record};
use crate::stream::RecordReader;

/// Which kind of generation file a stream comes from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Section {
    Snapshot,
    Journal,
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Snapshot => f.write_str("snapshot"),
            Self::Journal => f.write_str("journal"),
        }
    }
}

/// Summary of an audited generation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AuditReport {
    pub types: usize,
    pub objects: usize,
    pub snapshot_records: u64,
    pub journal_records: u64,
    pub by_command: BTreeMap<String, u64>,
}

/// Incremental structural checker.
#[derive(Debug, Default)]
pub struct Audit {
    type_names: HashSet<String>,
    types: usize,
    /// Type of each object, indexed by `id - 1`.
    objects: Vec<TypeIndex>,
    report: AuditReport,
}

impl Audit {
    /// An audit for a generation that starts from a snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// An audit for a journal written without a preceding snapshot.
    ///
    /// A fresh store creates its root (type 1, object 1) before the journal
    /// is attached, so neither appears in the journal.
    pub fn with_implicit_root() -> Self {
        Self {
            types: 1,
            objects: vec![TypeIndex::new(1)],
            ..Self::default()
        }
    }

    /// Check one record.
    pub fn check(&mut self, section: Section, record: &Record) -> Result<(), AuditError> {
        let kind = record.kind();
        let allowed = match section {
            Section::Snapshot => kind.in_snapshot(),
            Section::Journal => kind.in_journal(),
        };
        if !allowed {
            return Err(AuditError::MisplacedCommand {
                command: record.command(),
                section,
            });
        }

        match record {
            Record::TypeRegistered { descriptor, index } => {
                let expected = TypeIndex::new(self.types as u32 + 1);
                if *index != expected {
                    return Err(AuditError::TypeIndexOutOfOrder {
                        expected,
                        found: *index,
                    });
                }
                if !self.type_names.insert(descriptor.to_string()) {
                    return Err(AuditError::DuplicateType(descriptor.to_string()));
                }
                self.types += 1;
            }
            Record::ObjectCreated {
                type_index,
                object_id,
            } => {
                self.check_type(*type_index)?;
                let expected = ObjectId::new(self.objects.len() as u32 + 1);
                if *object_id != expected {
                    return Err(AuditError::ObjectIdOutOfOrder {
                        expected,
                        found: *object_id,
                    });
                }
                self.objects.push(*type_index);
            }
            other => {
                if let Some((type_index, object_id)) = other.target() {
                    self.check_type(type_index)?;
                    self.check_object(type_index, object_id)?;
                }
            }
        }

        match section {
            Section::Snapshot => self.report.snapshot_records += 1,
            Section::Journal => self.report.journal_records += 1,
        }
        let label = match kind {
            CommandKind::CustomOp => record.command(),
            other => other.label().to_string(),
        };
        *self.report.by_command.entry(label).or_default() += 1;
        Ok(())
    }

    /// Check every record of a stream, returning how many were read.
    pub fn scan<R: BufRead>(&mut self, section: Section, reader: R) -> CodecResult<u64> {
        let mut records = RecordReader::new(reader);
        let mut count = 0u64;
        while let Some(record) = records.next() {
            let record = record?;
            self.check(section, &record)
                .map_err(|e| crate::CodecError::from(e).at_line(records.line()))?;
            count += 1;
        }
        debug!(%section, records = count, "audit scan complete");
        Ok(count)
    }

    pub fn report(&self) -> AuditReport {
        AuditReport {
            types: self.types,
            objects: self.objects.len(),
            ..self.report.clone()
        }
    }

    fn check_type(&self, type_index: TypeIndex) -> Result<(), AuditError> {
        if type_index.is_none() || type_index.slot() > self.types {
            return Err(AuditError::UnknownType(type_index));
        }
        Ok(())
    }

    fn check_object(&self, claimed: TypeIndex, object_id: ObjectId) -> Result<(), AuditError> {
        let actual = object_id
            .get()
            .checked_sub(1)
            .and_then(|slot| self.objects.get(slot as usize))
            .copied()
            .ok_or(AuditError::UnknownObject(object_id))?;
        if actual != claimed {
            return Err(AuditError::TypeMismatch {
                object: object_id,
                actual,
                claimed,
            });
        }
        Ok(())
    }
}
