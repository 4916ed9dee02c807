use std::any::{type_name, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;

use objlog_types::TypeDescriptor;
use tracing::debug;

use crate::context::StoreContext;
use crate::error::{ModelError, ModelResult};
use crate::field::{ElementKind, SCALAR_TYPES};
use crate::object::{ObjectRef, PersistedType};

/// Builds an empty instance of a registered type.
pub type Constructor = fn(&StoreContext) -> ModelResult<ObjectRef>;

fn construct_erased<T: PersistedType>(ctx: &StoreContext) -> ModelResult<ObjectRef> {
    let object: ObjectRef = T::construct(ctx)?;
    Ok(object)
}

/// Maps canonical type descriptors to constructors.
///
/// Owned by one store. Types register themselves (and, through
/// [`PersistedType::register_types`], the types they refer to) before a
/// snapshot naming them can be loaded.
#[derive(Default)]
pub struct TypeRegistry {
    constructors: RwLock<HashMap<String, Registered>>,
}

#[derive(Clone, Copy)]
struct Registered {
    constructor: Constructor,
    type_id: TypeId,
    type_name: &'static str,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `T` and every type it refers to. Registering twice is a
    /// no-op; registering another Rust type under a taken descriptor fails.
    pub fn register<T: PersistedType>(&self) -> ModelResult<()> {
        let descriptor = T::descriptor();
        descriptor.validate()?;
        let key = descriptor.to_string();
        {
            let mut constructors = self.constructors.write().expect("registry lock poisoned");
            if let Some(existing) = constructors.get(&key) {
                if existing.type_id == TypeId::of::<T>() {
                    return Ok(());
                }
                return Err(ModelError::DescriptorConflict {
                    descriptor: key,
                    registered: existing.type_name.to_string(),
                    offered: type_name::<T>().to_string(),
                });
            }
            constructors.insert(
                key.clone(),
                Registered {
                    constructor: construct_erased::<T>,
                    type_id: TypeId::of::<T>(),
                    type_name: type_name::<T>(),
                },
            );
        }
        // Inserted before recursing so self-referencing types terminate.
        if let Err(e) = T::register_types(self) {
            self.constructors
                .write()
                .expect("registry lock poisoned")
                .remove(&key);
            return Err(e);
        }
        debug!(descriptor = %key, "type registered");
        Ok(())
    }

    pub fn contains(&self, descriptor: &TypeDescriptor) -> bool {
        self.constructors
            .read()
            .expect("registry lock poisoned")
            .contains_key(&descriptor.to_string())
    }

    /// Constructor registered for a descriptor.
    pub fn constructor(&self, descriptor: &TypeDescriptor) -> ModelResult<Constructor> {
        self.constructors
            .read()
            .expect("registry lock poisoned")
            .get(&descriptor.to_string())
            .map(|registered| registered.constructor)
            .ok_or_else(|| ModelError::UnknownType(descriptor.to_string()))
    }

    /// Build an empty instance of a registered type.
    pub fn construct(&self, descriptor: &TypeDescriptor, ctx: &StoreContext) -> ModelResult<ObjectRef> {
        let constructor = self.constructor(descriptor)?;
        constructor(ctx)
    }

    /// Classify a collection element or key type.
    ///
    /// `*Option:(T)` of a registered object type is a nullable reference.
    pub fn classify(&self, descriptor: &TypeDescriptor) -> ModelResult<ElementKind> {
        let name = descriptor.to_string();
        if SCALAR_TYPES.contains(&name.as_str()) {
            return Ok(ElementKind::Scalar);
        }
        let target = match descriptor.args() {
            [inner] if descriptor.name() == "Option" => inner,
            _ => descriptor,
        };
        if self.contains(target) {
            Ok(ElementKind::Object)
        } else {
            Err(ModelError::UnsupportedElement(name))
        }
    }

    /// Reject element types that do not classify as `kind`.
    pub fn check_element(&self, descriptor: &TypeDescriptor, kind: ElementKind) -> ModelResult<()> {
        if self.classify(descriptor)? != kind {
            return Err(ModelError::UnsupportedElement(descriptor.to_string()));
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.constructors.read().expect("registry lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registered descriptors, sorted.
    pub fn descriptors(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .constructors
            .read()
            .expect("registry lock poisoned")
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("descriptors", &self.descriptors())
            .finish()
    }
}
