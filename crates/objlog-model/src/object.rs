use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use objlog_codec::CustomTag;
use objlog_types::{ObjectId, TypeDescriptor, TypeIndex};
use serde_json::{Map, Value};

use crate::context::StoreContext;
use crate::error::{ModelError, ModelResult};
use crate::field::{Element, Field, FieldValue};
use crate::registry::TypeRegistry;
use crate::saver::Saver;
use crate::tracker::Tracker;

/// Shared handle to a persisted object of any type.
pub type ObjectRef = Arc<dyn Persisted>;

/// Upcast to [`Any`] for downcasting trait objects to concrete types.
pub trait AsAny: Any + Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn as_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Any + Send + Sync> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Looks up objects by id while a snapshot or journal is replayed.
pub trait ObjectResolver {
    fn resolve(&self, id: ObjectId) -> ModelResult<ObjectRef>;
}

/// Contract of every durable entity.
///
/// An object snapshots either as named value fields ([`Persisted::save_fields`]
/// returns `Some`) or as a custom model ([`Persisted::save_custom_model`]),
/// never both. Live mutations go through [`ObjectCore::set`] or
/// [`ObjectCore::custom_command`] so the journal is never behind memory.
pub trait Persisted: AsAny {
    fn core(&self) -> &ObjectCore;

    /// Value fields written to a snapshot, or `None` to use the custom model.
    fn save_fields(&self) -> Option<Vec<(&'static str, FieldValue)>> {
        None
    }

    /// Custom snapshot model; references are saved through `saver`.
    fn save_custom_model(&self, saver: &mut Saver<'_>) -> ModelResult<Value> {
        let _ = saver;
        Err(ModelError::UnsupportedModel(self.core().descriptor().to_string()))
    }

    /// Apply one value field from a snapshot or a journal.
    fn load_field(&self, name: &str, value: &Value, objects: &dyn ObjectResolver) -> ModelResult<()> {
        let _ = (value, objects);
        Err(self.core().unknown_field(name))
    }

    /// Apply the value fields of a snapshot.
    fn load_fields(&self, fields: &Map<String, Value>, objects: &dyn ObjectResolver) -> ModelResult<()> {
        for (name, value) in fields {
            self.load_field(name, value, objects)?;
        }
        Ok(())
    }

    /// Apply a custom snapshot model.
    fn load_custom_model(&self, model: &Value, objects: &dyn ObjectResolver) -> ModelResult<()> {
        let _ = (model, objects);
        Err(ModelError::UnsupportedModel(self.core().descriptor().to_string()))
    }

    /// Apply one custom journal command.
    fn load_custom_op(&self, tag: &CustomTag, model: &Value, objects: &dyn ObjectResolver) -> ModelResult<()> {
        let _ = (model, objects);
        Err(ModelError::UnknownCustomOp {
            tag: tag.to_string(),
            object: self.core().id(),
        })
    }
}

/// A persisted type that can be named and constructed by the loader.
///
/// `construct` must build an empty instance through [`ObjectCore::new`] and
/// must not create other persisted objects: on replay the loader expects
/// exactly one new id per creation record.
pub trait PersistedType: Persisted + Sized {
    fn descriptor() -> TypeDescriptor;

    fn construct(ctx: &StoreContext) -> ModelResult<Arc<Self>>;

    /// Register the persisted types this type refers to.
    fn register_types(types: &TypeRegistry) -> ModelResult<()> {
        let _ = types;
        Ok(())
    }
}

/// Downcast a shared object to its concrete type.
pub fn downcast<T: PersistedType>(object: ObjectRef) -> ModelResult<Arc<T>> {
    let id = object.core().id();
    object
        .as_any_arc()
        .downcast::<T>()
        .map_err(|_| ModelError::WrongObjectType {
            object: id,
            expected: T::descriptor().to_string(),
        })
}

/// Identity and store link embedded in every persisted object.
pub struct ObjectCore {
    ctx: StoreContext,
    descriptor: TypeDescriptor,
    type_index: AtomicU32,
    object_id: AtomicU32,
    session: AtomicU64,
}

impl ObjectCore {
    /// Register `T` and allocate a fresh object id.
    pub fn new<T: PersistedType>(ctx: &StoreContext) -> ModelResult<Self> {
        ctx.types().register::<T>()?;
        let descriptor = T::descriptor();
        let (type_index, object_id, session) = ctx.with_tracker(|tracker| {
            let type_index = tracker.register_type(&descriptor)?;
            let object_id = tracker.object_created(type_index)?;
            Ok::<_, ModelError>((type_index, object_id, tracker.session()))
        })?;
        Ok(Self {
            ctx: ctx.clone(),
            descriptor,
            type_index: AtomicU32::new(type_index.get()),
            object_id: AtomicU32::new(object_id.get()),
            session: AtomicU64::new(session),
        })
    }

    pub fn id(&self) -> ObjectId {
        ObjectId::new(self.object_id.load(Ordering::Acquire))
    }

    pub fn type_index(&self) -> TypeIndex {
        TypeIndex::new(self.type_index.load(Ordering::Acquire))
    }

    pub fn descriptor(&self) -> &TypeDescriptor {
        &self.descriptor
    }

    pub fn context(&self) -> &StoreContext {
        &self.ctx
    }

    /// Error for a field name this object does not have.
    pub fn unknown_field(&self, name: &str) -> ModelError {
        ModelError::UnknownField {
            type_name: self.descriptor.to_string(),
            field: name.to_string(),
        }
    }

    /// Session of the identity registry this object's id belongs to.
    pub fn session(&self) -> u64 {
        self.session.load(Ordering::Acquire)
    }

    /// Identity assigned by a snapshot.
    pub(crate) fn renumber(&self, type_index: TypeIndex, object_id: ObjectId, session: u64) {
        self.type_index.store(type_index.get(), Ordering::Release);
        self.object_id.store(object_id.get(), Ordering::Release);
        self.session.store(session, Ordering::Release);
    }

    /// Journal encoding of a value about to be stored in this object.
    ///
    /// Fails for values that would not load back (non-finite numbers) and
    /// for references to objects of another store or session.
    pub fn encode<T: Element>(&self, value: &T) -> ModelResult<Value> {
        value.check()?;
        let value = value.to_field_value();
        if let FieldValue::Object(Some(object)) = &value {
            let target = object.core();
            if !target.ctx.same_store(&self.ctx) {
                return Err(ModelError::ForeignObject(target.id()));
            }
            if target.session() != self.session() {
                return Err(ModelError::StaleObject(target.id()));
            }
        }
        Ok(value.to_journal())
    }

    /// Log a field change, then apply it.
    ///
    /// The field stays locked across both steps so concurrent setters reach
    /// the journal in the order they reach memory.
    pub fn set<T: Element>(&self, field: &Field<T>, name: &str, value: T) -> ModelResult<()> {
        let mut current = field.lock();
        let wire = self.encode(&value)?;
        self.log(|tracker, type_index, object_id| tracker.value_changed(type_index, object_id, name, wire))?;
        *current = value;
        Ok(())
    }

    /// Log a custom command `<namespace>:<op>`.
    ///
    /// Callers hold their own state lock while logging, build `model` with
    /// [`ObjectCore::encode`], and apply the change only after this returns
    /// `Ok`.
    pub fn custom_command(&self, namespace: &str, op: &str, model: Value) -> ModelResult<()> {
        let tag = CustomTag::new(namespace, op)?;
        self.log(|tracker, type_index, object_id| tracker.custom_command(tag, type_index, object_id, model))
    }

    fn log(&self, f: impl FnOnce(&mut Tracker, TypeIndex, ObjectId) -> ModelResult<()>) -> ModelResult<()> {
        self.ctx.with_tracker(|tracker| {
            if tracker.session() != self.session() {
                return Err(ModelError::StaleObject(self.id()));
            }
            f(tracker, self.type_index(), self.id())
        })
    }
}

impl fmt::Debug for ObjectCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectCore")
            .field("descriptor", &self.descriptor.to_string())
            .field("type_index", &self.type_index())
            .field("id", &self.id())
            .field("session", &self.session())
            .finish()
    }
}
