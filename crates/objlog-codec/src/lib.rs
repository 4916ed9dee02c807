//! Record codec for objlog.
//!
//! Snapshots and journals are text files holding one JSON object per line.
//! Each line is a [`Record`] tagged by its `c` field:
//!
//! | tag | record | where |
//! |---|---|---|
//! | `ty` | [`Record::TypeRegistered`] | snapshot, journal |
//! | `oc` | [`Record::ObjectCreated`] | snapshot, journal |
//! | `cv` | [`Record::ValueChanged`] | journal |
//! | `sfs` | [`Record::FieldsSet`] | snapshot |
//! | `ctm` | [`Record::CustomModel`] | snapshot |
//! | `<ns>:<op>` | [`Record::CustomOp`] | journal |
//!
//! Records are applied strictly in file order.

pub mod audit;
pub mod error;
pub mod record;
pub mod stream;

pub use audit::{Audit, AuditReport, Section};
pub use error::{AuditError, CodecError, CodecResult};
pub use record::{CommandKind, CustomTag, Record};
pub use stream::{RecordReader, RecordWriter};
