use std::collections::HashMap;

use objlog_codec::{CustomTag, Record};
use objlog_journal::JournalWriter;
use objlog_types::{ObjectId, TypeDescriptor, TypeIndex};
use serde_json::Value;

use crate::error::ModelResult;

/// Identity registry of one store generation.
///
/// Assigns type indices and object ids and turns every mutation into a
/// journal record. While a [`JournalWriter`] is attached each call appends
/// its record before the bookkeeping is updated, so a failed append leaves
/// the registry unchanged. Without a writer only bookkeeping happens.
///
/// Each registry belongs to a session. Loading a store and adopting a
/// snapshot start a new session; objects stamped with an older one may no
/// longer log.
#[derive(Debug, Default)]
pub struct Tracker {
    session: u64,
    indices: HashMap<String, TypeIndex>,
    descriptors: Vec<TypeDescriptor>,
    last_object: ObjectId,
    writer: Option<JournalWriter>,
}

impl Tracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach the live journal; returns the previously attached one.
    pub fn attach(&mut self, writer: Option<JournalWriter>) -> Option<JournalWriter> {
        std::mem::replace(&mut self.writer, writer)
    }

    pub fn writer(&self) -> Option<&JournalWriter> {
        self.writer.as_ref()
    }

    pub fn session(&self) -> u64 {
        self.session
    }

    /// Make `next` the current registry under a new session, keeping the
    /// attached journal. Returns the new session.
    pub fn advance(&mut self, mut next: Tracker) -> u64 {
        next.session = self.session + 1;
        next.writer = self.writer.take();
        *self = next;
        self.session
    }

    /// Index of a descriptor, registering it on first use.
    pub fn register_type(&mut self, descriptor: &TypeDescriptor) -> ModelResult<TypeIndex> {
        let key = descriptor.to_string();
        if let Some(index) = self.indices.get(&key) {
            return Ok(*index);
        }
        let index = TypeIndex::new(self.descriptors.len() as u32 + 1);
        self.append(|| Record::TypeRegistered {
            descriptor: descriptor.clone(),
            index,
        })?;
        self.indices.insert(key, index);
        self.descriptors.push(descriptor.clone());
        Ok(index)
    }

    /// Index of a descriptor if it was registered.
    pub fn type_index(&self, descriptor: &TypeDescriptor) -> Option<TypeIndex> {
        self.indices.get(&descriptor.to_string()).copied()
    }

    pub fn descriptor(&self, index: TypeIndex) -> Option<&TypeDescriptor> {
        index
            .get()
            .checked_sub(1)
            .and_then(|slot| self.descriptors.get(slot as usize))
    }

    /// Allocate the next object id.
    pub fn object_created(&mut self, type_index: TypeIndex) -> ModelResult<ObjectId> {
        let object_id = self.last_object.next();
        self.append(|| Record::ObjectCreated {
            type_index,
            object_id,
        })?;
        self.last_object = object_id;
        Ok(object_id)
    }

    /// Log a value field change; references arrive already reduced to ids.
    pub fn value_changed(
        &mut self,
        type_index: TypeIndex,
        object_id: ObjectId,
        field: &str,
        value: Value,
    ) -> ModelResult<()> {
        self.append(|| Record::ValueChanged {
            type_index,
            object_id,
            field: field.to_string(),
            value,
        })
    }

    /// Log a collection-specific command.
    pub fn custom_command(
        &mut self,
        tag: CustomTag,
        type_index: TypeIndex,
        object_id: ObjectId,
        model: Value,
    ) -> ModelResult<()> {
        self.append(|| Record::CustomOp {
            tag,
            type_index,
            object_id,
            model,
        })
    }

    pub fn type_count(&self) -> usize {
        self.descriptors.len()
    }

    /// Largest object id issued so far.
    pub fn last_object(&self) -> ObjectId {
        self.last_object
    }

    fn append(&self, record: impl FnOnce() -> Record) -> ModelResult<()> {
        if let Some(writer) = &self.writer {
            writer.append(&record())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ModelError;
    use objlog_journal::{Directory, FlushPolicy, InMemoryDirectory, JournalError};
    use serde_json::json;

    fn attached(dir: &InMemoryDirectory) -> (Tracker, JournalWriter) {
        let writer = JournalWriter::start("1.log", dir.create_append("1.log").unwrap(), &FlushPolicy::EveryRecord);
        let mut tracker = Tracker::new();
        tracker.attach(Some(writer.clone()));
        (tracker, writer)
    }

    #[test]
    fn type_registration_is_idempotent_and_starts_at_one() {
        let mut tracker = Tracker::new();
        let user = TypeDescriptor::plain("app.User");
        let list = TypeDescriptor::parse("*persist.List:(app.User)").unwrap();
        assert_eq!(tracker.register_type(&user).unwrap(), TypeIndex::new(1));
        assert_eq!(tracker.register_type(&list).unwrap(), TypeIndex::new(2));
        assert_eq!(tracker.register_type(&user).unwrap(), TypeIndex::new(1));
        assert_eq!(tracker.type_count(), 2);
        assert_eq!(tracker.descriptor(TypeIndex::new(2)), Some(&list));
        assert_eq!(tracker.descriptor(TypeIndex::NONE), None);
    }

    #[test]
    fn object_ids_strictly_increase() {
        let mut tracker = Tracker::new();
        let ti = tracker.register_type(&TypeDescriptor::plain("a")).unwrap();
        let ids: Vec<ObjectId> = (0..3).map(|_| tracker.object_created(ti).unwrap()).collect();
        assert_eq!(ids, vec![ObjectId::new(1), ObjectId::new(2), ObjectId::new(3)]);
        assert_eq!(tracker.last_object(), ObjectId::new(3));
    }

    #[test]
    fn attached_writer_receives_every_record() {
        let dir = InMemoryDirectory::new();
        let (mut tracker, _writer) = attached(&dir);
        let ti = tracker.register_type(&TypeDescriptor::plain("app.User")).unwrap();
        let oi = tracker.object_created(ti).unwrap();
        tracker.value_changed(ti, oi, "name", json!("Ann")).unwrap();
        tracker
            .custom_command(CustomTag::new("ls", "ad").unwrap(), ti, oi, json!(3))
            .unwrap();

        let text = dir.read_to_string("1.log").unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                r#"{"c":"ty","n":"app.User","i":1}"#,
                r#"{"c":"oc","ti":1,"oi":1}"#,
                r#"{"c":"cv","ti":1,"oi":1,"n":"name","v":"Ann"}"#,
                r#"{"c":"ls:ad","ti":1,"oi":1,"m":3}"#,
            ]
        );
    }

    #[test]
    fn advance_starts_a_new_session_on_the_same_journal() {
        let dir = InMemoryDirectory::new();
        let (mut tracker, _writer) = attached(&dir);
        tracker.register_type(&TypeDescriptor::plain("a")).unwrap();
        assert_eq!(tracker.session(), 0);

        assert_eq!(tracker.advance(Tracker::new()), 1);
        assert_eq!(tracker.session(), 1);
        assert_eq!(tracker.type_count(), 0);
        assert!(tracker.writer().is_some());
        assert_eq!(tracker.advance(Tracker::new()), 2);
    }

    #[test]
    fn failed_append_leaves_bookkeeping_unchanged() {
        let dir = InMemoryDirectory::new();
        let (mut tracker, writer) = attached(&dir);
        writer.close().unwrap();

        let err = tracker.register_type(&TypeDescriptor::plain("a")).unwrap_err();
        assert!(matches!(err, ModelError::Journal(JournalError::Closed(_))));
        assert_eq!(tracker.type_count(), 0);
        assert!(tracker.object_created(TypeIndex::new(1)).is_err());
        assert_eq!(tracker.last_object(), ObjectId::NULL);
    }
}
