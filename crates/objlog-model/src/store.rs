use std::io::{BufRead, Write};
use std::path::Path;
use std::sync::Arc;

use objlog_journal::{BinlogAccess, BinlogStore, Directory, JournalConfig};
use objlog_types::ObjectId;
use tracing::{debug, info};

use crate::context::StoreContext;
use crate::error::{ModelError, ModelResult};
use crate::loader::Loader;
use crate::object::{downcast, ObjectRef, PersistedType};
use crate::registry::TypeRegistry;
use crate::saver::{SavedGraph, Saver};
use crate::tracker::Tracker;

/// Binds a [`BinlogStore`] to a graph rooted at an `R`.
struct GraphAccess<R> {
    ctx: StoreContext,
    root: Option<Arc<R>>,
    loader: Option<Loader>,
    pending: Option<SavedGraph>,
}

impl<R: PersistedType> GraphAccess<R> {
    fn new(ctx: StoreContext, root: Option<Arc<R>>) -> Self {
        Self {
            ctx,
            root,
            loader: None,
            pending: None,
        }
    }

    fn loader(&mut self) -> &mut Loader {
        self.loader.get_or_insert_with(|| Loader::new(self.ctx.clone()))
    }
}

impl<R: PersistedType> BinlogAccess for GraphAccess<R> {
    type Error = ModelError;

    fn load_started(&mut self) -> ModelResult<()> {
        self.ctx.replace_tracker(Tracker::new());
        self.root = None;
        self.loader = Some(Loader::new(self.ctx.clone()));
        Ok(())
    }

    fn make_new(&mut self) -> ModelResult<()> {
        let root = R::construct(&self.ctx)?;
        let id = root.core().id();
        if id != ObjectId::ROOT {
            return Err(ModelError::ObjectIdMismatch {
                expected: ObjectId::ROOT,
                found: id,
            });
        }
        self.loader().adopt(root as ObjectRef)?;
        debug!(root = %R::descriptor(), "fresh root created");
        Ok(())
    }

    fn load_map(&mut self, input: &mut dyn BufRead) -> ModelResult<()> {
        self.loader().load_map(input)?;
        Ok(())
    }

    fn load_log(&mut self, input: &mut dyn BufRead) -> ModelResult<()> {
        self.loader().load_log(input)?;
        Ok(())
    }

    fn load_completed(&mut self) -> ModelResult<()> {
        let loader = self.loader.take().ok_or(ModelError::DanglingReference(ObjectId::ROOT))?;
        let object = loader.root().ok_or(ModelError::DanglingReference(ObjectId::ROOT))?;
        let found = object.core().descriptor().to_string();
        let root = downcast::<R>(object).map_err(|_| ModelError::RootTypeMismatch {
            expected: R::descriptor().to_string(),
            found,
        })?;
        info!(root = %R::descriptor(), objects = loader.len(), "graph loaded");
        self.root = Some(root);
        Ok(())
    }

    fn save_map(&mut self, out: &mut dyn Write) -> ModelResult<()> {
        let root = self.root.clone().ok_or(ModelError::StoreNotOpen)?;
        let mut saver = Saver::new(out);
        saver.save_object(&(root as ObjectRef))?;
        self.pending = Some(saver.finish()?);
        Ok(())
    }

    fn save_completed(&mut self) -> ModelResult<()> {
        if let Some(graph) = self.pending.take() {
            debug!(objects = graph.objects(), "snapshot identities adopted");
            graph.adopt(&self.ctx);
        }
        Ok(())
    }
}

/// An open object store: a root object, its reachable graph, and the
/// files that make it durable.
///
/// ```text
/// open  -> load snapshot + journal (or construct a fresh root)
///       -> every mutation appends to the live journal
/// close -> snapshot the graph reachable from the root
/// ```
pub struct Store<R: PersistedType> {
    binlog: BinlogStore,
    ctx: StoreContext,
    root: Option<Arc<R>>,
}

impl<R: PersistedType> Store<R> {
    pub fn new(dir: Arc<dyn Directory>, config: JournalConfig) -> Self {
        Self {
            binlog: BinlogStore::new(dir, config),
            ctx: StoreContext::default(),
            root: None,
        }
    }

    /// Store over a local directory, created if missing.
    pub fn open_local(path: &Path, config: JournalConfig) -> ModelResult<Self> {
        Ok(Self {
            binlog: BinlogStore::open_local(path, config)?,
            ctx: StoreContext::default(),
            root: None,
        })
    }

    pub fn types(&self) -> &TypeRegistry {
        self.ctx.types()
    }

    /// Register a type that is stored but not reachable through `R`'s
    /// declared fields.
    pub fn register<T: PersistedType>(&self) -> ModelResult<()> {
        self.ctx.types().register::<T>()
    }

    /// Handle new objects of this store are created with.
    pub fn context(&self) -> &StoreContext {
        &self.ctx
    }

    /// Load the graph and start journaling.
    pub fn open(&mut self) -> ModelResult<Arc<R>> {
        self.ctx.types().register::<R>()?;
        let mut access = GraphAccess::<R>::new(self.ctx.clone(), None);
        self.binlog.open(&mut access)?;
        let root = access.root.take().ok_or(ModelError::StoreNotOpen)?;
        self.ctx.attach(self.binlog.accept());
        self.root = Some(root.clone());
        info!(
            root = %R::descriptor(),
            journal = %self.journal_name().unwrap_or_default(),
            "store opened"
        );
        Ok(root)
    }

    pub fn root(&self) -> ModelResult<Arc<R>> {
        match &self.root {
            Some(root) if self.binlog.is_open() => Ok(root.clone()),
            _ => Err(ModelError::StoreNotOpen),
        }
    }

    pub fn is_open(&self) -> bool {
        self.binlog.is_open()
    }

    /// Name of the live journal file.
    pub fn journal_name(&self) -> Option<String> {
        self.binlog.accept().map(|writer| writer.name().to_string())
    }

    /// Push buffered journal records to the file.
    pub fn flush(&self) -> ModelResult<()> {
        if !self.binlog.is_open() {
            return Err(ModelError::StoreNotOpen);
        }
        self.binlog.flush()?;
        Ok(())
    }

    /// Stop journaling. Unless `interrupt` is set the graph is snapshotted
    /// and the closed generation archived.
    ///
    /// Objects stay usable afterwards, but their changes are no longer
    /// durable.
    pub fn close(&mut self, interrupt: bool) -> ModelResult<()> {
        if !self.binlog.is_open() {
            return Err(ModelError::StoreNotOpen);
        }
        self.ctx.attach(None);
        let mut access = GraphAccess::new(self.ctx.clone(), self.root.clone());
        self.binlog.close(&mut access, interrupt)?;
        Ok(())
    }
}

impl<R: PersistedType> std::fmt::Debug for Store<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("root", &R::descriptor().to_string())
            .field("binlog", &self.binlog)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collections::PersistList;
    use crate::object::Persisted;
    use crate::testing::{Team, User};
    use objlog_journal::{FlushPolicy, InMemoryDirectory};

    fn store(dir: &InMemoryDirectory) -> Store<Team> {
        let config = JournalConfig {
            flush_policy: FlushPolicy::EveryRecord,
            ..JournalConfig::default()
        };
        Store::new(Arc::new(dir.clone()), config)
    }

    #[test]
    fn fresh_store_has_root_with_id_one() {
        let dir = InMemoryDirectory::new();
        let mut store = store(&dir);
        let team = store.open().unwrap();
        assert_eq!(team.core().id(), ObjectId::ROOT);
        assert!(store.is_open());
        assert!(store.journal_name().unwrap().ends_with(".log"));
        store.close(false).unwrap();
        assert!(matches!(store.root(), Err(ModelError::StoreNotOpen)));
        assert!(matches!(store.close(false), Err(ModelError::StoreNotOpen)));
    }

    #[test]
    fn graph_survives_close_and_reopen() {
        let dir = InMemoryDirectory::new();
        let mut store = store(&dir);
        let team = store.open().unwrap();
        let ctx = store.context().clone();
        team.set_name("core").unwrap();
        let ann = User::named(&ctx, "Ann");
        let members = PersistList::new(&ctx).unwrap();
        members.push(ann.clone()).unwrap();
        team.set_members(Some(members)).unwrap();
        team.set_lead(Some(ann)).unwrap();
        store.close(false).unwrap();

        let team = store.open().unwrap();
        assert_eq!(team.name(), "core");
        let lead = team.lead().unwrap();
        assert_eq!(lead.name(), "Ann");
        let members = team.members().unwrap();
        assert!(Arc::ptr_eq(&members.get(0).unwrap(), &lead));
        store.close(false).unwrap();
    }

    #[test]
    fn interrupted_close_replays_the_journal() {
        let dir = InMemoryDirectory::new();
        let mut store = store(&dir);
        let team = store.open().unwrap();
        team.set_name("draft").unwrap();
        store.close(true).unwrap();

        let mut reopened = self::store(&dir);
        let team = reopened.open().unwrap();
        assert_eq!(team.name(), "draft");
        let journal = reopened.journal_name().unwrap();
        assert_eq!(dir.read_to_string(&journal).unwrap(), "");
    }

    #[test]
    fn snapshot_renumbers_live_objects() {
        let dir = InMemoryDirectory::new();
        let mut store = store(&dir);
        let team = store.open().unwrap();
        let ctx = store.context().clone();
        let _unreachable = User::named(&ctx, "Gone");
        let bob = User::named(&ctx, "Bob");
        assert_eq!(bob.core().id(), ObjectId::new(3));
        team.set_lead(Some(bob.clone())).unwrap();
        store.close(false).unwrap();
        assert_eq!(bob.core().id(), ObjectId::new(2));
    }

    #[test]
    fn objects_of_a_previous_session_are_rejected() {
        let dir = InMemoryDirectory::new();
        let mut store = store(&dir);
        let old_team = store.open().unwrap();
        let ctx = store.context().clone();
        let stale = User::named(&ctx, "Gone");
        let kept = User::named(&ctx, "Kept");
        old_team.set_lead(Some(kept.clone())).unwrap();
        store.close(false).unwrap();

        let team = store.open().unwrap();
        let journal = store.journal_name().unwrap();
        assert!(matches!(stale.set_name("mutated after reopen"), Err(ModelError::StaleObject(_))));
        assert!(matches!(kept.set_name("old handle"), Err(ModelError::StaleObject(_))));
        assert!(matches!(old_team.set_name("old root"), Err(ModelError::StaleObject(_))));
        assert!(matches!(team.set_lead(Some(stale.clone())), Err(ModelError::StaleObject(_))));
        assert_eq!(dir.read_to_string(&journal).unwrap(), "");

        let fresh = User::named(&ctx, "Fresh");
        team.set_lead(Some(fresh)).unwrap();
        store.close(true).unwrap();

        let mut reopened = self::store(&dir);
        let team = reopened.open().unwrap();
        assert_eq!(team.lead().unwrap().name(), "Fresh");
        reopened.close(false).unwrap();
    }

    #[test]
    fn foreign_objects_cannot_be_referenced() {
        let dir = InMemoryDirectory::new();
        let mut store = store(&dir);
        let team = store.open().unwrap();
        let elsewhere = User::named(&StoreContext::default(), "Elsewhere");
        assert!(matches!(
            team.set_lead(Some(elsewhere)),
            Err(ModelError::ForeignObject(_))
        ));
        store.close(false).unwrap();
    }

    #[test]
    fn wrong_root_type_is_rejected() {
        let dir = InMemoryDirectory::new();
        let mut users: Store<User> = Store::new(Arc::new(dir.clone()), JournalConfig::default());
        users.open().unwrap();
        users.close(false).unwrap();

        let mut teams = store(&dir);
        teams.register::<User>().unwrap();
        let err = teams.open().unwrap_err();
        assert!(matches!(err, ModelError::RootTypeMismatch { .. }));
        assert!(!teams.is_open());
    }
}
