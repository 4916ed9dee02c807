use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;

use objlog_codec::{Record, RecordWriter};
use objlog_types::{ObjectId, TypeIndex};
use serde_json::{Map, Value};
use tracing::debug;

use crate::context::StoreContext;
use crate::error::ModelResult;
use crate::field::FieldValue;
use crate::object::ObjectRef;
use crate::tracker::Tracker;

/// Writes a self-contained snapshot of the graph reachable from a root.
///
/// Every object is visited once. Its creation record is written as soon as
/// it is first reached and its field or model record once it comes off the
/// work stack, so every id is created before any record uses it and deep
/// graphs do not grow the call stack. Ids and type indices are assigned
/// afresh; unreachable objects are left out.
pub struct Saver<'w> {
    out: RecordWriter<&'w mut dyn Write>,
    tracker: Tracker,
    seen: HashMap<*const (), usize>,
    visited: Vec<(ObjectRef, TypeIndex, ObjectId)>,
    pending: Vec<usize>,
}

impl<'w> Saver<'w> {
    pub fn new(out: &'w mut dyn Write) -> Self {
        Self {
            out: RecordWriter::new(out),
            tracker: Tracker::new(),
            seen: HashMap::new(),
            visited: Vec::new(),
            pending: Vec::new(),
        }
    }

    /// Save `object` and everything it reaches; returns its snapshot id.
    pub fn save_object(&mut self, object: &ObjectRef) -> ModelResult<ObjectId> {
        let object_id = self.reach(object)?;
        while let Some(slot) = self.pending.pop() {
            self.write_state(slot)?;
        }
        Ok(object_id)
    }

    /// Snapshot encoding of a value. Objects reached for the first time are
    /// created now and written later.
    pub fn encode(&mut self, value: &FieldValue) -> ModelResult<Value> {
        match value {
            FieldValue::Scalar(value) => Ok(value.clone()),
            FieldValue::Object(Some(object)) => Ok(Value::from(self.reach(object)?.get())),
            FieldValue::Object(None) => Ok(Value::Null),
        }
    }

    /// Snapshot id of `object`, writing its creation record on first visit.
    fn reach(&mut self, object: &ObjectRef) -> ModelResult<ObjectId> {
        let key = Arc::as_ptr(object) as *const ();
        if let Some(&slot) = self.seen.get(&key) {
            return Ok(self.visited[slot].2);
        }

        let descriptor = object.core().descriptor();
        let type_index = match self.tracker.type_index(descriptor) {
            Some(index) => index,
            None => {
                let index = self.tracker.register_type(descriptor)?;
                self.out.write(&Record::TypeRegistered {
                    descriptor: descriptor.clone(),
                    index,
                })?;
                index
            }
        };
        let object_id = self.tracker.object_created(type_index)?;
        self.out.write(&Record::ObjectCreated {
            type_index,
            object_id,
        })?;
        let slot = self.visited.len();
        self.seen.insert(key, slot);
        self.visited.push((object.clone(), type_index, object_id));
        self.pending.push(slot);
        Ok(object_id)
    }

    fn write_state(&mut self, slot: usize) -> ModelResult<()> {
        let (object, type_index, object_id) = self.visited[slot].clone();
        let record = match object.save_fields() {
            Some(fields) => {
                let mut encoded = Map::new();
                for (name, value) in fields {
                    let value = self.encode(&value)?;
                    encoded.insert(name.to_string(), value);
                }
                Record::FieldsSet {
                    type_index,
                    object_id,
                    fields: encoded,
                }
            }
            None => Record::CustomModel {
                type_index,
                object_id,
                model: object.save_custom_model(self)?,
            },
        };
        self.out.write(&record)?;
        Ok(())
    }

    /// Number of objects written so far.
    pub fn objects(&self) -> usize {
        self.visited.len()
    }

    /// Finish writing. The returned graph is adopted once the snapshot is
    /// durable.
    pub fn finish(mut self) -> ModelResult<SavedGraph> {
        self.out.flush()?;
        debug!(
            objects = self.visited.len(),
            types = self.tracker.type_count(),
            records = self.out.written(),
            "snapshot graph written"
        );
        Ok(SavedGraph {
            tracker: self.tracker,
            visited: self.visited,
        })
    }
}

/// Identities assigned by a finished snapshot, not yet applied to the
/// live objects.
pub struct SavedGraph {
    tracker: Tracker,
    visited: Vec<(ObjectRef, TypeIndex, ObjectId)>,
}

impl SavedGraph {
    pub fn objects(&self) -> usize {
        self.visited.len()
    }

    /// Renumber the saved objects and make the snapshot's registry current.
    ///
    /// Objects the snapshot left out keep their old session and can no
    /// longer log.
    pub fn adopt(self, ctx: &StoreContext) {
        let visited = self.visited;
        ctx.with_tracker(|current| {
            let session = current.advance(self.tracker);
            for (object, type_index, object_id) in &visited {
                object.core().renumber(*type_index, *object_id, session);
            }
        });
    }
}
