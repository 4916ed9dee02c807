use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use objlog_types::{ObjectId, TypeDescriptor};
use serde_json::Value;

use crate::error::{ModelError, ModelResult};
use crate::object::{downcast, ObjectRef, ObjectResolver, PersistedType};
use crate::registry::TypeRegistry;

/// How an element is persisted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ElementKind {
    /// Written as its own value.
    Scalar,
    /// Written as the id of a persisted object.
    Object,
}

/// A value a field or collection can hold.
pub trait Element: Clone + Send + Sync + 'static {
    const KIND: ElementKind;

    fn descriptor() -> TypeDescriptor;

    /// Make this element type known to `types`.
    ///
    /// Object elements register their constructor; scalars check that they
    /// are a known scalar.
    fn register(types: &TypeRegistry) -> ModelResult<()>;

    fn to_field_value(&self) -> FieldValue;

    /// Reject values that would not decode back to themselves.
    fn check(&self) -> ModelResult<()> {
        Ok(())
    }

    /// Decode a stored value, resolving object ids through `objects`.
    fn from_wire(value: &Value, objects: &dyn ObjectResolver) -> ModelResult<Self>;
}

/// A field or element value on its way to the registry or a snapshot.
#[derive(Clone)]
pub enum FieldValue {
    Scalar(Value),
    /// A reference; `None` is the null reference.
    Object(Option<ObjectRef>),
}

impl FieldValue {
    /// Encoding used in journal records: references become ids.
    pub fn to_journal(&self) -> Value {
        match self {
            Self::Scalar(value) => value.clone(),
            Self::Object(Some(object)) => Value::from(object.core().id().get()),
            Self::Object(None) => Value::Null,
        }
    }
}

impl fmt::Debug for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(value) => write!(f, "Scalar({value})"),
            Self::Object(Some(object)) => write!(f, "Object({})", object.core().id()),
            Self::Object(None) => f.write_str("Object(null)"),
        }
    }
}

/// A persisted value field.
///
/// Reads are free; writes go through [`crate::ObjectCore::set`] so they are
/// logged. [`Field::load`] bypasses logging and is meant for replay.
pub struct Field<T> {
    value: Mutex<T>,
}

impl<T: Element> Field<T> {
    pub fn new(value: T) -> Self {
        Self {
            value: Mutex::new(value),
        }
    }

    pub fn get(&self) -> T {
        self.lock().clone()
    }

    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.lock())
    }

    pub fn field_value(&self) -> FieldValue {
        self.lock().to_field_value()
    }

    /// Replace the value without logging.
    pub fn load(&self, value: T) {
        *self.lock() = value;
    }

    /// Decode a stored value and replace the current one without logging.
    pub fn load_wire(&self, value: &Value, objects: &dyn ObjectResolver) -> ModelResult<()> {
        self.load(T::from_wire(value, objects)?);
        Ok(())
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, T> {
        self.value.lock().expect("field mutex poisoned")
    }
}

impl<T: Element + Default> Default for Field<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: Element + fmt::Debug> fmt::Debug for Field<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.with(|value| value.fmt(f))
    }
}

/// Names of the built-in scalar element types.
pub const SCALAR_TYPES: &[&str] = &[
    "bool",
    "i32",
    "i64",
    "u32",
    "u64",
    "f32",
    "f64",
    "String",
    "*Option:(bool)",
    "*Option:(i64)",
    "*Option:(f64)",
    "*Option:(String)",
];

fn decode_scalar<T: serde::de::DeserializeOwned>(value: &Value) -> ModelResult<T> {
    T::deserialize(value).map_err(|e| ModelError::invalid_value(std::any::type_name::<T>(), e))
}

/// JSON has no encoding for NaN or the infinities.
trait Encodable {
    fn encodable(&self) -> bool {
        true
    }
}

impl Encodable for bool {}
impl Encodable for i32 {}
impl Encodable for i64 {}
impl Encodable for u32 {}
impl Encodable for u64 {}
impl Encodable for String {}

impl Encodable for f32 {
    fn encodable(&self) -> bool {
        self.is_finite()
    }
}

impl Encodable for f64 {
    fn encodable(&self) -> bool {
        self.is_finite()
    }
}

macro_rules! scalar_element {
    ($($ty:ty => $name:expr),* $(,)?) => {
        $(
            impl Element for $ty {
                const KIND: ElementKind = ElementKind::Scalar;

                fn descriptor() -> TypeDescriptor {
                    TypeDescriptor::plain($name)
                }

                fn register(types: &TypeRegistry) -> ModelResult<()> {
                    types.check_element(&Self::descriptor(), Self::KIND)
                }

                fn to_field_value(&self) -> FieldValue {
                    FieldValue::Scalar(Value::from(self.clone()))
                }

                fn check(&self) -> ModelResult<()> {
                    if self.encodable() {
                        Ok(())
                    } else {
                        Err(ModelError::invalid_value($name, format!("{:?} cannot be stored", self)))
                    }
                }

                fn from_wire(value: &Value, _objects: &dyn ObjectResolver) -> ModelResult<Self> {
                    decode_scalar(value)
                }
            }
        )*
    };
}

scalar_element! {
    bool => "bool",
    i32 => "i32",
    i64 => "i64",
    u32 => "u32",
    u64 => "u64",
    f32 => "f32",
    f64 => "f64",
    String => "String",
}

macro_rules! optional_scalar_element {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Element for Option<$ty> {
                const KIND: ElementKind = ElementKind::Scalar;

                fn descriptor() -> TypeDescriptor {
                    TypeDescriptor::generic("Option", vec![<$ty as Element>::descriptor()])
                }

                fn register(types: &TypeRegistry) -> ModelResult<()> {
                    types.check_element(&Self::descriptor(), Self::KIND)
                }

                fn to_field_value(&self) -> FieldValue {
                    match self {
                        Some(value) => value.to_field_value(),
                        None => FieldValue::Scalar(Value::Null),
                    }
                }

                fn check(&self) -> ModelResult<()> {
                    self.as_ref().map_or(Ok(()), |value| value.check())
                }

                fn from_wire(value: &Value, objects: &dyn ObjectResolver) -> ModelResult<Self> {
                    match value {
                        Value::Null => Ok(None),
                        other => <$ty as Element>::from_wire(other, objects).map(Some),
                    }
                }
            }
        )*
    };
}

optional_scalar_element!(bool, i64, f64, String);

/// Decode a stored reference; `null` and `0` are the null reference.
pub fn decode_id(value: &Value) -> ModelResult<Option<ObjectId>> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => match n.as_u64().map(u32::try_from) {
            Some(Ok(0)) => Ok(None),
            Some(Ok(raw)) => Ok(Some(ObjectId::new(raw))),
            _ => Err(ModelError::invalid_value("object reference", format!("{n} is not an object id"))),
        },
        other => Err(ModelError::invalid_value(
            "object reference",
            format!("expected an object id, found {other}"),
        )),
    }
}

impl<T: PersistedType> Element for Arc<T> {
    const KIND: ElementKind = ElementKind::Object;

    fn descriptor() -> TypeDescriptor {
        T::descriptor()
    }

    fn register(types: &TypeRegistry) -> ModelResult<()> {
        types.register::<T>()
    }

    fn to_field_value(&self) -> FieldValue {
        FieldValue::Object(Some(self.clone() as ObjectRef))
    }

    fn from_wire(value: &Value, objects: &dyn ObjectResolver) -> ModelResult<Self> {
        let id = decode_id(value)?.ok_or(ModelError::DanglingReference(ObjectId::NULL))?;
        downcast::<T>(objects.resolve(id)?)
    }
}

impl<T: PersistedType> Element for Option<Arc<T>> {
    const KIND: ElementKind = ElementKind::Object;

    /// `*Option:(T)`, so collections of nullable and non-null references
    /// name different types.
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::generic("Option", vec![T::descriptor()])
    }

    fn register(types: &TypeRegistry) -> ModelResult<()> {
        types.register::<T>()
    }

    fn to_field_value(&self) -> FieldValue {
        FieldValue::Object(self.as_ref().map(|object| object.clone() as ObjectRef))
    }

    fn from_wire(value: &Value, objects: &dyn ObjectResolver) -> ModelResult<Self> {
        match decode_id(value)? {
            Some(id) => downcast::<T>(objects.resolve(id)?).map(Some),
            None => Ok(None),
        }
    }
}

/// A persisted object used as a map key.
///
/// Keys compare by object identity: two keys are equal only when they hold
/// the same object. Stored as the object's id, like any reference.
pub struct ObjectKey<T>(Arc<T>);

impl<T> ObjectKey<T> {
    pub fn new(object: Arc<T>) -> Self {
        Self(object)
    }

    pub fn object(&self) -> &Arc<T> {
        &self.0
    }

    pub fn into_inner(self) -> Arc<T> {
        self.0
    }

    fn addr(&self) -> *const () {
        Arc::as_ptr(&self.0) as *const ()
    }
}

impl<T> Clone for ObjectKey<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> From<Arc<T>> for ObjectKey<T> {
    fn from(object: Arc<T>) -> Self {
        Self(object)
    }
}

impl<T> PartialEq for ObjectKey<T> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl<T> Eq for ObjectKey<T> {}

impl<T> PartialOrd for ObjectKey<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for ObjectKey<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.addr().cmp(&other.addr())
    }
}

impl<T: PersistedType> fmt::Debug for ObjectKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectKey({})", self.0.core().id())
    }
}

impl<T: PersistedType> Element for ObjectKey<T> {
    const KIND: ElementKind = ElementKind::Object;

    fn descriptor() -> TypeDescriptor {
        T::descriptor()
    }

    fn register(types: &TypeRegistry) -> ModelResult<()> {
        types.register::<T>()
    }

    fn to_field_value(&self) -> FieldValue {
        FieldValue::Object(Some(self.0.clone() as ObjectRef))
    }

    fn from_wire(value: &Value, objects: &dyn ObjectResolver) -> ModelResult<Self> {
        <Arc<T>>::from_wire(value, objects).map(Self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct NoObjects;

    impl ObjectResolver for NoObjects {
        fn resolve(&self, id: ObjectId) -> ModelResult<ObjectRef> {
            Err(ModelError::DanglingReference(id))
        }
    }

    #[test]
    fn scalars_encode_as_plain_values() {
        assert_eq!(7i64.to_field_value().to_journal(), json!(7));
        assert_eq!("Ann".to_string().to_field_value().to_journal(), json!("Ann"));
        assert_eq!(true.to_field_value().to_journal(), json!(true));
        assert_eq!(None::<String>.to_field_value().to_journal(), Value::Null);
        assert_eq!(Some(2.5f64).to_field_value().to_journal(), json!(2.5));
    }

    #[test]
    fn scalars_decode_and_reject_wrong_shapes() {
        assert_eq!(i64::from_wire(&json!(-3), &NoObjects).unwrap(), -3);
        assert_eq!(u32::from_wire(&json!(3), &NoObjects).unwrap(), 3);
        assert!(u32::from_wire(&json!(-3), &NoObjects).is_err());
        assert!(String::from_wire(&json!(1), &NoObjects).is_err());
        assert_eq!(Option::<String>::from_wire(&Value::Null, &NoObjects).unwrap(), None);
        assert!(matches!(
            bool::from_wire(&json!("yes"), &NoObjects),
            Err(ModelError::InvalidValue { .. })
        ));
    }

    #[test]
    fn reference_ids_decode() {
        assert_eq!(decode_id(&Value::Null).unwrap(), None);
        assert_eq!(decode_id(&json!(0)).unwrap(), None);
        assert_eq!(decode_id(&json!(9)).unwrap(), Some(ObjectId::new(9)));
        assert!(decode_id(&json!(-1)).is_err());
        assert!(decode_id(&json!("9")).is_err());
        assert!(decode_id(&json!(u64::MAX)).is_err());
    }

    #[test]
    fn scalar_descriptors() {
        assert_eq!(<String as Element>::descriptor().to_string(), "String");
        assert_eq!(<Option<i64> as Element>::descriptor().to_string(), "*Option:(i64)");
        for name in SCALAR_TYPES {
            assert!(TypeDescriptor::parse(name).is_ok(), "{name}");
        }
    }

    #[test]
    fn non_finite_floats_are_rejected() {
        assert!(2.5f64.check().is_ok());
        assert!(matches!(f64::NAN.check(), Err(ModelError::InvalidValue { .. })));
        assert!(f32::INFINITY.check().is_err());
        assert!(Some(f64::NEG_INFINITY).check().is_err());
        assert!(None::<f64>.check().is_ok());
        assert!(i64::MAX.check().is_ok());
    }

    #[test]
    fn field_load_bypasses_logging() {
        let field = Field::new(1i64);
        field.load(5);
        assert_eq!(field.get(), 5);
        field.load_wire(&json!(8), &NoObjects).unwrap();
        assert_eq!(field.with(|v| *v), 8);
        assert!(field.load_wire(&json!("x"), &NoObjects).is_err());
        assert_eq!(field.get(), 8);
    }
}
