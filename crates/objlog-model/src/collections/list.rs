use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use objlog_codec::CustomTag;
use objlog_types::TypeDescriptor;
use serde_json::{json, Value};

use crate::context::StoreContext;
use crate::error::{ModelError, ModelResult};
use crate::field::Element;
use crate::object::{ObjectCore, ObjectResolver, Persisted, PersistedType};
use crate::registry::TypeRegistry;
use crate::saver::Saver;

const LIST_NAMESPACE: &str = "ls";
const OP_ADD: &str = "ad";
const OP_SET: &str = "st";
const OP_EXTEND: &str = "ext";
const OP_REMOVE: &str = "red";

/// Persistent ordered sequence.
///
/// Snapshots as an array of element encodings. Each mutation logs one
/// compact command:
///
/// | op | model |
/// |---|---|
/// | `ls:ad` | the appended element |
/// | `ls:st` | `{"i":index,"v":element}` |
/// | `ls:ext` | `{"n":count,"v":element}` (append `count` copies) |
/// | `ls:red` | `{"i":index,"n":count}` (remove a range) |
pub struct PersistList<T: Element> {
    core: ObjectCore,
    items: Mutex<Vec<T>>,
}

impl<T: Element> PersistList<T> {
    pub fn new(ctx: &StoreContext) -> ModelResult<Arc<Self>> {
        Self::construct(ctx)
    }

    pub fn len(&self) -> usize {
        self.items().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items().is_empty()
    }

    pub fn get(&self, index: usize) -> Option<T> {
        self.items().get(index).cloned()
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.items().clone()
    }

    pub fn push(&self, value: T) -> ModelResult<()> {
        let mut items = self.items();
        let model = self.core.encode(&value)?;
        self.core.custom_command(LIST_NAMESPACE, OP_ADD, model)?;
        items.push(value);
        Ok(())
    }

    pub fn set(&self, index: usize, value: T) -> ModelResult<()> {
        let mut items = self.items();
        check_index(index, items.len())?;
        self.core.custom_command(
            LIST_NAMESPACE,
            OP_SET,
            json!({"i": index, "v": self.core.encode(&value)?}),
        )?;
        items[index] = value;
        Ok(())
    }

    /// Append `count` copies of `value`.
    pub fn extend_with(&self, count: usize, value: T) -> ModelResult<()> {
        if count == 0 {
            return Ok(());
        }
        let mut items = self.items();
        self.core.custom_command(
            LIST_NAMESPACE,
            OP_EXTEND,
            json!({"n": count, "v": self.core.encode(&value)?}),
        )?;
        let len = items.len();
        items.resize(len + count, value);
        Ok(())
    }

    /// Remove `count` elements starting at `index`.
    pub fn remove_range(&self, index: usize, count: usize) -> ModelResult<()> {
        if count == 0 {
            return Ok(());
        }
        let mut items = self.items();
        check_range(index, count, items.len())?;
        self.core
            .custom_command(LIST_NAMESPACE, OP_REMOVE, json!({"i": index, "n": count}))?;
        items.drain(index..index + count);
        Ok(())
    }

    pub fn truncate(&self, len: usize) -> ModelResult<()> {
        let current = self.len();
        if len < current {
            self.remove_range(len, current - len)?;
        }
        Ok(())
    }

    /// Grow with copies of `fill` or shrink to `len`.
    pub fn resize(&self, len: usize, fill: T) -> ModelResult<()> {
        let current = self.len();
        if len > current {
            self.extend_with(len - current, fill)
        } else {
            self.truncate(len)
        }
    }

    pub fn clear(&self) -> ModelResult<()> {
        self.truncate(0)
    }

    fn items(&self) -> MutexGuard<'_, Vec<T>> {
        self.items.lock().expect("list mutex poisoned")
    }

    fn apply_op(&self, op: &str, model: &Value, objects: &dyn ObjectResolver) -> ModelResult<bool> {
        let mut items = self.items();
        match op {
            OP_ADD => items.push(T::from_wire(model, objects)?),
            OP_SET => {
                let index = usize_arg(model, "i")?;
                check_index(index, items.len())?;
                items[index] = T::from_wire(&model["v"], objects)?;
            }
            OP_EXTEND => {
                let count = usize_arg(model, "n")?;
                let value = T::from_wire(&model["v"], objects)?;
                let len = items.len();
                items.resize(len + count, value);
            }
            OP_REMOVE => {
                let index = usize_arg(model, "i")?;
                let count = usize_arg(model, "n")?;
                check_range(index, count, items.len())?;
                items.drain(index..index + count);
            }
            _ => return Ok(false),
        }
        Ok(true)
    }
}

fn check_index(index: usize, len: usize) -> ModelResult<()> {
    if index >= len {
        return Err(ModelError::IndexOutOfRange { index, len });
    }
    Ok(())
}

fn check_range(index: usize, count: usize, len: usize) -> ModelResult<()> {
    match index.checked_add(count) {
        Some(end) if end <= len => Ok(()),
        _ => Err(ModelError::IndexOutOfRange { index, len }),
    }
}

fn usize_arg(model: &Value, key: &str) -> ModelResult<usize> {
    model
        .get(key)
        .and_then(Value::as_u64)
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| ModelError::invalid_value(format!("list op argument {key:?}"), format!("{model}")))
}

impl<T: Element> Persisted for PersistList<T> {
    fn core(&self) -> &ObjectCore {
        &self.core
    }

    fn save_custom_model(&self, saver: &mut Saver<'_>) -> ModelResult<Value> {
        let items = self.to_vec();
        let mut model = Vec::with_capacity(items.len());
        for item in &items {
            model.push(saver.encode(&item.to_field_value())?);
        }
        Ok(Value::Array(model))
    }

    fn load_custom_model(&self, model: &Value, objects: &dyn ObjectResolver) -> ModelResult<()> {
        let elements = model
            .as_array()
            .ok_or_else(|| ModelError::invalid_value(self.core.descriptor().to_string(), "expected an array"))?;
        let items = elements
            .iter()
            .map(|element| T::from_wire(element, objects))
            .collect::<ModelResult<Vec<T>>>()?;
        *self.items() = items;
        Ok(())
    }

    fn load_custom_op(&self, tag: &CustomTag, model: &Value, objects: &dyn ObjectResolver) -> ModelResult<()> {
        if tag.namespace() == LIST_NAMESPACE && self.apply_op(tag.op(), model, objects)? {
            return Ok(());
        }
        Err(ModelError::UnknownCustomOp {
            tag: tag.to_string(),
            object: self.core.id(),
        })
    }
}

impl<T: Element> PersistedType for PersistList<T> {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::generic("persist.List", [T::descriptor()])
    }

    fn construct(ctx: &StoreContext) -> ModelResult<Arc<Self>> {
        Ok(Arc::new(Self {
            core: ObjectCore::new::<Self>(ctx)?,
            items: Mutex::new(Vec::new()),
        }))
    }

    fn register_types(types: &TypeRegistry) -> ModelResult<()> {
        T::register(types)?;
        types.check_element(&T::descriptor(), T::KIND)
    }
}

impl<T: Element + fmt::Debug> fmt::Debug for PersistList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistList")
            .field("id", &self.core.id())
            .field("items", &*self.items())
            .finish()
    }
}
