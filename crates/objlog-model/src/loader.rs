use std::io::BufRead;

use objlog_codec::{AuditError, CodecError, Record, RecordReader, Section};
use objlog_types::{ObjectId, TypeIndex};
use tracing::debug;

use crate::context::StoreContext;
use crate::error::{ModelError, ModelResult};
use crate::object::{ObjectRef, ObjectResolver};

/// Rebuilds a graph from a snapshot and replays journals on top of it.
///
/// Objects live in an id-indexed table (slot 0 unused) so references,
/// including cyclic ones, resolve by lookup once their creation record has
/// been applied.
pub struct Loader {
    ctx: StoreContext,
    objects: Vec<Option<ObjectRef>>,
}

impl Loader {
    pub fn new(ctx: StoreContext) -> Self {
        Self {
            ctx,
            objects: vec![None],
        }
    }

    /// Apply every record of a snapshot.
    pub fn load_map(&mut self, input: &mut dyn BufRead) -> ModelResult<u64> {
        let count = self.load(Section::Snapshot, input)?;
        debug!(records = count, objects = self.len(), "snapshot records applied");
        Ok(count)
    }

    /// Apply every record of a journal.
    pub fn load_log(&mut self, input: &mut dyn BufRead) -> ModelResult<u64> {
        let count = self.load(Section::Journal, input)?;
        debug!(records = count, objects = self.len(), "journal records replayed");
        Ok(count)
    }

    /// Put an object built outside the record stream (a fresh root) into
    /// its slot.
    pub fn adopt(&mut self, object: ObjectRef) -> ModelResult<()> {
        let id = object.core().id();
        let expected = ObjectId::new(self.objects.len() as u32);
        if id != expected {
            return Err(ModelError::ObjectIdMismatch { expected, found: id });
        }
        self.objects.push(Some(object));
        Ok(())
    }

    /// The object with id 1, if created.
    pub fn root(&self) -> Option<ObjectRef> {
        self.objects.get(ObjectId::ROOT.slot()).cloned().flatten()
    }

    /// Number of objects created so far.
    pub fn len(&self) -> usize {
        self.objects.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn load(&mut self, section: Section, input: &mut dyn BufRead) -> ModelResult<u64> {
        let mut records = RecordReader::new(input);
        let mut count = 0u64;
        while let Some(record) = records.next() {
            let record = record?;
            self.apply(section, record)
                .map_err(|e| e.at_line(records.line()))?;
            count += 1;
        }
        Ok(count)
    }

    /// Apply one record.
    pub fn apply(&mut self, section: Section, record: Record) -> ModelResult<()> {
        let kind = record.kind();
        let allowed = match section {
            Section::Snapshot => kind.in_snapshot(),
            Section::Journal => kind.in_journal(),
        };
        if !allowed {
            return Err(CodecError::from(AuditError::MisplacedCommand {
                command: record.command(),
                section,
            })
            .into());
        }

        match record {
            Record::TypeRegistered { descriptor, index } => {
                let assigned = self.ctx.with_tracker(|t| t.register_type(&descriptor))?;
                if assigned != index {
                    return Err(ModelError::TypeIndexMismatch {
                        expected: assigned,
                        found: index,
                    });
                }
            }
            Record::ObjectCreated {
                type_index,
                object_id,
            } => self.create(type_index, object_id)?,
            Record::ValueChanged {
                type_index,
                object_id,
                field,
                value,
            } => {
                let object = self.target(type_index, object_id)?;
                object.load_field(&field, &value, &*self)?;
            }
            Record::FieldsSet {
                type_index,
                object_id,
                fields,
            } => {
                let object = self.target(type_index, object_id)?;
                object.load_fields(&fields, &*self)?;
            }
            Record::CustomModel {
                type_index,
                object_id,
                model,
            } => {
                let object = self.target(type_index, object_id)?;
                object.load_custom_model(&model, &*self)?;
            }
            Record::CustomOp {
                tag,
                type_index,
                object_id,
                model,
            } => {
                let object = self.target(type_index, object_id)?;
                object.load_custom_op(&tag, &model, &*self)?;
            }
        }
        Ok(())
    }

    fn create(&mut self, type_index: TypeIndex, object_id: ObjectId) -> ModelResult<()> {
        let descriptor = self
            .ctx
            .with_tracker(|t| t.descriptor(type_index).cloned())
            .ok_or_else(|| ModelError::UnknownType(format!("type index {type_index}")))?;
        let object = self.ctx.types().construct(&descriptor, &self.ctx)?;

        let core = object.core();
        if core.type_index() != type_index {
            return Err(ModelError::TypeIndexMismatch {
                expected: core.type_index(),
                found: type_index,
            });
        }
        if core.id() != object_id {
            return Err(ModelError::ObjectIdMismatch {
                expected: core.id(),
                found: object_id,
            });
        }
        self.adopt(object)
    }

    /// The object a record targets, checked against the record's type.
    fn target(&self, type_index: TypeIndex, object_id: ObjectId) -> ModelResult<ObjectRef> {
        let object = self.resolve(object_id)?;
        let actual = object.core().type_index();
        if actual != type_index {
            return Err(ModelError::TypeIndexMismatch {
                expected: actual,
                found: type_index,
            });
        }
        Ok(object)
    }
}

impl ObjectResolver for Loader {
    fn resolve(&self, id: ObjectId) -> ModelResult<ObjectRef> {
        self.objects
            .get(id.slot())
            .cloned()
            .flatten()
            .ok_or(ModelError::DanglingReference(id))
    }
}

impl std::fmt::Debug for Loader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Loader").field("objects", &self.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{downcast, PersistedType};
    use crate::testing::{Team, User};
    use std::io::Cursor;

    fn loader() -> Loader {
        let ctx = StoreContext::default();
        ctx.types().register::<Team>().unwrap();
        Loader::new(ctx)
    }

    const SNAPSHOT: &str = r#"{"c":"ty","n":"app.User","i":1}
{"c":"oc","ti":1,"oi":1}
{"c":"oc","ti":1,"oi":2}
{"c":"sfs","ti":1,"oi":2,"m":{"name":"Bob","age":40,"manager":1}}
{"c":"sfs","ti":1,"oi":1,"m":{"name":"Ann","age":35,"manager":2}}
"#;

    #[test]
    fn snapshot_with_cycle_loads() {
        let mut loader = loader();
        assert_eq!(loader.load_map(&mut Cursor::new(SNAPSHOT)).unwrap(), 5);
        let ann = downcast::<User>(loader.root().unwrap()).unwrap();
        assert_eq!(ann.name(), "Ann");
        let bob = ann.manager().unwrap();
        assert_eq!(bob.name(), "Bob");
        assert_eq!(bob.age(), 40);
        assert!(std::sync::Arc::ptr_eq(&bob.manager().unwrap(), &ann));
    }

    #[test]
    fn journal_replays_after_snapshot() {
        let mut loader = loader();
        loader.load_map(&mut Cursor::new(SNAPSHOT)).unwrap();
        let journal = r#"{"c":"oc","ti":1,"oi":3}
{"c":"cv","ti":1,"oi":3,"n":"name","v":"Cid"}
{"c":"cv","ti":1,"oi":1,"n":"manager","v":3}
"#;
        assert_eq!(loader.load_log(&mut Cursor::new(journal)).unwrap(), 3);
        let ann = downcast::<User>(loader.root().unwrap()).unwrap();
        assert_eq!(ann.manager().unwrap().name(), "Cid");
        assert_eq!(loader.len(), 3);
    }

    #[test]
    fn replaying_a_journal_twice_fails() {
        let mut loader = loader();
        loader.load_map(&mut Cursor::new(SNAPSHOT)).unwrap();
        let journal = "{\"c\":\"oc\",\"ti\":1,\"oi\":3}\n";
        loader.load_log(&mut Cursor::new(journal)).unwrap();
        let err = loader.load_log(&mut Cursor::new(journal)).unwrap_err();
        assert!(matches!(err.root_cause(), ModelError::ObjectIdMismatch { .. }));
    }

    #[test]
    fn type_index_mismatch_is_corruption() {
        let mut loader = loader();
        let err = loader
            .load_map(&mut Cursor::new("{\"c\":\"ty\",\"n\":\"app.User\",\"i\":2}\n"))
            .unwrap_err();
        match err {
            ModelError::AtLine { line, source } => {
                assert_eq!(line, 1);
                assert!(matches!(*source, ModelError::TypeIndexMismatch { .. }));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn reference_before_creation_is_dangling() {
        let mut loader = loader();
        let text = r#"{"c":"ty","n":"app.User","i":1}
{"c":"oc","ti":1,"oi":1}
{"c":"sfs","ti":1,"oi":1,"m":{"manager":2}}
"#;
        let err = loader.load_map(&mut Cursor::new(text)).unwrap_err();
        assert!(matches!(
            err.root_cause(),
            ModelError::DanglingReference(id) if *id == ObjectId::new(2)
        ));
    }

    #[test]
    fn unregistered_type_cannot_be_constructed() {
        let mut loader = Loader::new(StoreContext::default());
        let text = "{\"c\":\"ty\",\"n\":\"app.Ghost\",\"i\":1}\n{\"c\":\"oc\",\"ti\":1,\"oi\":1}\n";
        let err = loader.load_map(&mut Cursor::new(text)).unwrap_err();
        assert!(matches!(err.root_cause(), ModelError::UnknownType(_)));
    }

    #[test]
    fn misplaced_and_unknown_commands_are_rejected() {
        let mut loader = loader();
        loader.load_map(&mut Cursor::new(SNAPSHOT)).unwrap();
        let err = loader
            .load_log(&mut Cursor::new("{\"c\":\"sfs\",\"ti\":1,\"oi\":1,\"m\":{}}\n"))
            .unwrap_err();
        assert!(matches!(err.root_cause(), ModelError::Codec(_)));

        let err = loader
            .load_log(&mut Cursor::new("{\"c\":\"zz:op\",\"ti\":1,\"oi\":1,\"m\":null}\n"))
            .unwrap_err();
        assert!(matches!(err.root_cause(), ModelError::UnknownCustomOp { .. }));

        let err = loader
            .load_log(&mut Cursor::new("{\"c\":\"cv\",\"ti\":1,\"oi\":1,\"n\":\"height\",\"v\":1}\n"))
            .unwrap_err();
        assert!(matches!(err.root_cause(), ModelError::UnknownField { .. }));
    }

    #[test]
    fn adopt_checks_slot() {
        let ctx = StoreContext::default();
        let mut loader = Loader::new(ctx.clone());
        let _skipped = User::construct(&ctx).unwrap();
        let second = User::construct(&ctx).unwrap();
        assert!(matches!(
            loader.adopt(second),
            Err(ModelError::ObjectIdMismatch { .. })
        ));
    }
}
