use std::collections::BTreeMap;
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

const MAP_NAMESPACE: &str = "dc";
const OP_ADD: &str = "a";
const OP_REMOVE: &str = "r";

/// Persistent key/value map with unique keys.
///
/// Keys are scalars or, wrapped in [`ObjectKey`](crate::ObjectKey),
/// persisted objects compared by identity. Snapshots as an array of
/// `{"k":key,"v":value}` pairs in key order.
/// Logs `dc:a` with `{"k","v"}` on insert and `dc:r` with `{"k"}` on
/// removal.
pub struct PersistMap<K: Element + Ord, V: Element> {
    core: ObjectCore,
    entries: Mutex<BTreeMap<K, V>>,
}

impl<K: Element + Ord, V: Element> PersistMap<K, V> {
    pub fn new(ctx: &StoreContext) -> ModelResult<Arc<Self>> {
        Self::construct(ctx)
    }

    pub fn len(&self) -> usize {
        self.locked().len()
    }

    pub fn is_empty(&self) -> bool {
        self.locked().is_empty()
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.locked().get(key).cloned()
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.locked().contains_key(key)
    }

    pub fn keys(&self) -> Vec<K> {
        self.locked().keys().cloned().collect()
    }

    /// Pairs in key order.
    pub fn entries(&self) -> Vec<(K, V)> {
        self.locked()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Insert a new key. Fails with [`ModelError::DuplicateKey`] if the key
    /// is present.
    pub fn add(&self, key: K, value: V) -> ModelResult<()> {
        let mut entries = self.locked();
        let wire_key = self.core.encode(&key)?;
        if entries.contains_key(&key) {
            return Err(ModelError::DuplicateKey(wire_key.to_string()));
        }
        self.core.custom_command(
            MAP_NAMESPACE,
            OP_ADD,
            json!({"k": wire_key, "v": self.core.encode(&value)?}),
        )?;
        entries.insert(key, value);
        Ok(())
    }

    /// Remove a key, returning its value. Absent keys are not logged.
    pub fn remove(&self, key: &K) -> ModelResult<Option<V>> {
        let mut entries = self.locked();
        if !entries.contains_key(key) {
            return Ok(None);
        }
        self.core.custom_command(
            MAP_NAMESPACE,
            OP_REMOVE,
            json!({"k": self.core.encode(key)?}),
        )?;
        Ok(entries.remove(key))
    }

    fn locked(&self) -> MutexGuard<'_, BTreeMap<K, V>> {
        self.entries.lock().expect("map mutex poisoned")
    }

    fn apply_op(&self, op: &str, model: &Value, objects: &dyn ObjectResolver) -> ModelResult<bool> {
        let mut entries = self.locked();
        match op {
            OP_ADD => {
                let key = K::from_wire(&model["k"], objects)?;
                if entries.contains_key(&key) {
                    return Err(ModelError::DuplicateKey(model["k"].to_string()));
                }
                entries.insert(key, V::from_wire(&model["v"], objects)?);
            }
            OP_REMOVE => {
                let key = K::from_wire(&model["k"], objects)?;
                if entries.remove(&key).is_none() {
                    return Err(ModelError::invalid_value(
                        self.core.descriptor().to_string(),
                        format!("removal of absent key {}", model["k"]),
                    ));
                }
            }
            _ => return Ok(false),
        }
        Ok(true)
    }
}

impl<K: Element + Ord, V: Element> Persisted for PersistMap<K, V> {
    fn core(&self) -> &ObjectCore {
        &self.core
    }

    fn save_custom_model(&self, saver: &mut Saver<'_>) -> ModelResult<Value> {
        let pairs = self.entries();
        let mut model = Vec::with_capacity(pairs.len());
        for (key, value) in &pairs {
            model.push(json!({
                "k": saver.encode(&key.to_field_value())?,
                "v": saver.encode(&value.to_field_value())?,
            }));
        }
        Ok(Value::Array(model))
    }

    fn load_custom_model(&self, model: &Value, objects: &dyn ObjectResolver) -> ModelResult<()> {
        let pairs = model
            .as_array()
            .ok_or_else(|| ModelError::invalid_value(self.core.descriptor().to_string(), "expected an array"))?;
        let mut loaded = BTreeMap::new();
        for pair in pairs {
            let key = K::from_wire(&pair["k"], objects)?;
            let value = V::from_wire(&pair["v"], objects)?;
            if loaded.insert(key, value).is_some() {
                return Err(ModelError::DuplicateKey(pair["k"].to_string()));
            }
        }
        *self.locked() = loaded;
        Ok(())
    }

    fn load_custom_op(&self, tag: &CustomTag, model: &Value, objects: &dyn ObjectResolver) -> ModelResult<()> {
        if tag.namespace() == MAP_NAMESPACE && self.apply_op(tag.op(), model, objects)? {
            return Ok(());
        }
        Err(ModelError::UnknownCustomOp {
            tag: tag.to_string(),
            object: self.core.id(),
        })
    }
}

impl<K: Element + Ord, V: Element> PersistedType for PersistMap<K, V> {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::generic("persist.Map", [K::descriptor(), V::descriptor()])
    }

    fn construct(ctx: &StoreContext) -> ModelResult<Arc<Self>> {
        Ok(Arc::new(Self {
            core: ObjectCore::new::<Self>(ctx)?,
            entries: Mutex::new(BTreeMap::new()),
        }))
    }

    fn register_types(types: &TypeRegistry) -> ModelResult<()> {
        K::register(types)?;
        V::register(types)
    }
}

impl<K: Element + Ord + fmt::Debug, V: Element + fmt::Debug> fmt::Debug for PersistMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistMap")
            .field("id", &self.core.id())
            .field("entries", &*self.locked())
            .finish()
    }
}
