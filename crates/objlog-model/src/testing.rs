//! Object types and helpers shared by the unit tests.

use std::fmt;
use std::sync::Arc;

use objlog_journal::{Directory, FlushPolicy, InMemoryDirectory, JournalWriter};
use objlog_types::TypeDescriptor;
use serde_json::Value;

use crate::collections::{PersistList, PersistMap};
use crate::context::StoreContext;
use crate::error::ModelResult;
use crate::field::{Element, Field, FieldValue};
use crate::object::{ObjectCore, ObjectResolver, Persisted, PersistedType};
use crate::registry::TypeRegistry;

const JOURNAL: &str = "test.log";

/// A context whose tracker logs into `test.log` of the returned directory.
pub fn live_context() -> (StoreContext, InMemoryDirectory) {
    let dir = InMemoryDirectory::new();
    let out = dir.create_append(JOURNAL).unwrap();
    let ctx = StoreContext::default();
    ctx.attach(Some(JournalWriter::start(JOURNAL, out, &FlushPolicy::EveryRecord)));
    (ctx, dir)
}

pub fn journal_lines(dir: &InMemoryDirectory) -> Vec<String> {
    dir.read_to_string(JOURNAL)
        .unwrap()
        .lines()
        .map(String::from)
        .collect()
}

pub struct User {
    core: ObjectCore,
    name: Field<String>,
    age: Field<i64>,
    manager: Field<Option<Arc<User>>>,
}

impl User {
    pub fn named(ctx: &StoreContext, name: &str) -> Arc<User> {
        let user = User::construct(ctx).unwrap();
        user.set_name(name).unwrap();
        user
    }

    pub fn name(&self) -> String {
        self.name.get()
    }

    pub fn set_name(&self, name: &str) -> ModelResult<()> {
        self.core.set(&self.name, "name", name.to_string())
    }

    pub fn age(&self) -> i64 {
        self.age.get()
    }

    pub fn set_age(&self, age: i64) -> ModelResult<()> {
        self.core.set(&self.age, "age", age)
    }

    pub fn manager(&self) -> Option<Arc<User>> {
        self.manager.get()
    }

    pub fn set_manager(&self, manager: Option<Arc<User>>) -> ModelResult<()> {
        self.core.set(&self.manager, "manager", manager)
    }
}

impl Persisted for User {
    fn core(&self) -> &ObjectCore {
        &self.core
    }

    fn save_fields(&self) -> Option<Vec<(&'static str, FieldValue)>> {
        Some(vec![
            ("name", self.name.field_value()),
            ("age", self.age.field_value()),
            ("manager", self.manager.field_value()),
        ])
    }

    fn load_field(&self, name: &str, value: &Value, objects: &dyn ObjectResolver) -> ModelResult<()> {
        match name {
            "name" => self.name.load_wire(value, objects),
            "age" => self.age.load_wire(value, objects),
            "manager" => self.manager.load_wire(value, objects),
            _ => Err(self.core.unknown_field(name)),
        }
    }
}

impl PersistedType for User {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::plain("app.User")
    }

    fn construct(ctx: &StoreContext) -> ModelResult<Arc<Self>> {
        Ok(Arc::new(Self {
            core: ObjectCore::new::<Self>(ctx)?,
            name: Field::default(),
            age: Field::default(),
            manager: Field::new(None),
        }))
    }

    fn register_types(types: &TypeRegistry) -> ModelResult<()> {
        <Option<Arc<User>>>::register(types)
    }
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("id", &self.core.id())
            .field("name", &self.name())
            .finish_non_exhaustive()
    }
}

pub struct Team {
    core: ObjectCore,
    name: Field<String>,
    lead: Field<Option<Arc<User>>>,
    members: Field<Option<Arc<PersistList<Arc<User>>>>>,
    scores: Field<Option<Arc<PersistMap<String, i64>>>>,
    numbers: Field<Option<Arc<PersistList<i64>>>>,
}

impl Team {
    pub fn construct_in(ctx: &StoreContext) -> Arc<Team> {
        Team::construct(ctx).unwrap()
    }

    pub fn name(&self) -> String {
        self.name.get()
    }

    pub fn set_name(&self, name: &str) -> ModelResult<()> {
        self.core.set(&self.name, "name", name.to_string())
    }

    pub fn lead(&self) -> Option<Arc<User>> {
        self.lead.get()
    }

    pub fn set_lead(&self, lead: Option<Arc<User>>) -> ModelResult<()> {
        self.core.set(&self.lead, "lead", lead)
    }

    pub fn members(&self) -> Option<Arc<PersistList<Arc<User>>>> {
        self.members.get()
    }

    pub fn set_members(&self, members: Option<Arc<PersistList<Arc<User>>>>) -> ModelResult<()> {
        self.core.set(&self.members, "members", members)
    }

    pub fn scores(&self) -> Option<Arc<PersistMap<String, i64>>> {
        self.scores.get()
    }

    pub fn set_scores(&self, scores: Option<Arc<PersistMap<String, i64>>>) -> ModelResult<()> {
        self.core.set(&self.scores, "scores", scores)
    }

    pub fn numbers(&self) -> Option<Arc<PersistList<i64>>> {
        self.numbers.get()
    }

    pub fn set_numbers(&self, numbers: Option<Arc<PersistList<i64>>>) -> ModelResult<()> {
        self.core.set(&self.numbers, "numbers", numbers)
    }
}

impl Persisted for Team {
    fn core(&self) -> &ObjectCore {
        &self.core
    }

    fn save_fields(&self) -> Option<Vec<(&'static str, FieldValue)>> {
        Some(vec![
            ("name", self.name.field_value()),
            ("lead", self.lead.field_value()),
            ("members", self.members.field_value()),
            ("scores", self.scores.field_value()),
            ("numbers", self.numbers.field_value()),
        ])
    }

    fn load_field(&self, name: &str, value: &Value, objects: &dyn ObjectResolver) -> ModelResult<()> {
        match name {
            "name" => self.name.load_wire(value, objects),
            "lead" => self.lead.load_wire(value, objects),
            "members" => self.members.load_wire(value, objects),
            "scores" => self.scores.load_wire(value, objects),
            "numbers" => self.numbers.load_wire(value, objects),
            _ => Err(self.core.unknown_field(name)),
        }
    }
}

impl PersistedType for Team {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::plain("app.Team")
    }

    fn construct(ctx: &StoreContext) -> ModelResult<Arc<Self>> {
        Ok(Arc::new(Self {
            core: ObjectCore::new::<Self>(ctx)?,
            name: Field::default(),
            lead: Field::new(None),
            members: Field::new(None),
            scores: Field::new(None),
            numbers: Field::new(None),
        }))
    }

    fn register_types(types: &TypeRegistry) -> ModelResult<()> {
        <Option<Arc<User>>>::register(types)?;
        <Option<Arc<PersistList<Arc<User>>>>>::register(types)?;
        <Option<Arc<PersistMap<String, i64>>>>::register(types)?;
        <Option<Arc<PersistList<i64>>>>::register(types)
    }
}

impl fmt::Debug for Team {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Team")
            .field("id", &self.core.id())
            .field("name", &self.name())
            .finish_non_exhaustive()
    }
}
