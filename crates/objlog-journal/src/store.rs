use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use objlog_types::{GenerationClock, GenerationStamp};
use tracing::{debug, info};

use crate::config::JournalConfig;
use crate::directory::{Directory, LocalDirectory};
use crate::error::{JournalError, JournalResult};
use crate::generation::{FileKind, GenerationFile, GenerationListing};
use crate::writer::JournalWriter;

/// Callbacks through which [`BinlogStore`] loads and saves the object graph.
///
/// The store owns the files; the implementor owns the graph and the record
/// semantics.
pub trait BinlogAccess {
    type Error: From<JournalError>;

    /// Called once before anything is loaded.
    fn load_started(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    /// No snapshot exists: create a fresh root.
    fn make_new(&mut self) -> Result<(), Self::Error>;

    /// Load a complete snapshot.
    fn load_map(&mut self, input: &mut dyn BufRead) -> Result<(), Self::Error>;

    /// Replay a journal on top of what was loaded.
    fn load_log(&mut self, input: &mut dyn BufRead) -> Result<(), Self::Error>;

    /// Called once after the snapshot and journal were applied.
    fn load_completed(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Write a complete snapshot of the current graph.
    fn save_map(&mut self, out: &mut dyn Write) -> Result<(), Self::Error>;

    /// The snapshot written by the last `save_map` is now durable.
    fn save_completed(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// File lifecycle manager of one store directory.
///
/// ```text
/// open:  scan -> load newest map | make_new -> replay newest log
///        -> [compact if a log was replayed] -> start new log
/// close: close log -> [snapshot + archive unless interrupted]
/// ```
pub struct BinlogStore {
    dir: Arc<dyn Directory>,
    config: JournalConfig,
    clock: GenerationClock,
    writer: Option<JournalWriter>,
}

impl BinlogStore {
    pub fn new(dir: Arc<dyn Directory>, config: JournalConfig) -> Self {
        Self {
            dir,
            config,
            clock: GenerationClock::new(),
            writer: None,
        }
    }

    /// Store on a local directory, creating it when missing.
    pub fn open_local(path: &Path, config: JournalConfig) -> JournalResult<Self> {
        config.validate()?;
        let dir = LocalDirectory::create(path)?;
        Ok(Self::new(Arc::new(dir), config))
    }

    pub fn directory(&self) -> &Arc<dyn Directory> {
        &self.dir
    }

    pub fn config(&self) -> &JournalConfig {
        &self.config
    }

    pub fn is_open(&self) -> bool {
        self.writer.is_some()
    }

    /// The live journal, while open.
    pub fn accept(&self) -> Option<JournalWriter> {
        self.writer.clone()
    }

    /// Push buffered journal records to the directory.
    pub fn flush(&self) -> JournalResult<()> {
        self.writer.as_ref().ok_or(JournalError::NotOpen)?.flush()
    }

    /// Load the newest generation and start a new journal.
    ///
    /// When a journal was replayed the graph is compacted into a fresh
    /// snapshot first and the replayed generation is archived.
    pub fn open<A: BinlogAccess>(&mut self, access: &mut A) -> Result<(), A::Error> {
        if self.writer.is_some() {
            return Err(JournalError::AlreadyOpen.into());
        }
        let listing = GenerationListing::scan(&*self.dir, &self.config)?;
        debug!(files = listing.files.len(), "store directory scanned");
        if let Some(stamp) = listing.newest_stamp() {
            self.clock.observe(stamp).map_err(JournalError::from)?;
        }

        access.load_started()?;
        let snapshot_stamp = match &listing.snapshot {
            Some(file) => {
                let mut input = self.reader(file)?;
                access.load_map(&mut input)?;
                info!(snapshot = %file.name, "snapshot loaded");
                file.stamp
            }
            None => {
                access.make_new()?;
                info!("no snapshot found, created new root");
                GenerationStamp::ZERO
            }
        };

        let mut replayed = false;
        if let Some(file) = &listing.journal {
            if file.stamp <= snapshot_stamp {
                return Err(JournalError::WrongBinlogTime {
                    snapshot: snapshot_stamp,
                    journal: file.stamp,
                }
                .into());
            }
            let mut input = self.reader(file)?;
            access.load_log(&mut input)?;
            info!(journal = %file.name, "journal replayed");
            replayed = true;
        }
        access.load_completed()?;

        if replayed {
            self.compact(access, &listing)?;
        }
        self.start_journal()?;
        Ok(())
    }

    /// Close the live journal.
    ///
    /// Unless `interrupt` is set, a fresh snapshot is written and the closed
    /// generation archived, so the next open has nothing to replay. An
    /// interrupted close leaves the journal as the next open will find it
    /// after a crash.
    pub fn close<A: BinlogAccess>(&mut self, access: &mut A, interrupt: bool) -> Result<(), A::Error> {
        let writer = self.writer.take().ok_or(JournalError::NotOpen)?;
        let records = writer.close()?;
        if interrupt {
            info!(journal = writer.name(), records, "store closed without snapshot");
            return Ok(());
        }

        let listing = GenerationListing::scan(&*self.dir, &self.config)?;
        if let Some(stamp) = listing.newest_stamp() {
            self.clock.observe(stamp).map_err(JournalError::from)?;
        }
        self.compact(access, &listing)?;
        info!(journal = writer.name(), records, "store closed");
        Ok(())
    }

    fn reader(&self, file: &GenerationFile) -> JournalResult<BufReader<Box<dyn std::io::Read + Send>>> {
        Ok(BufReader::new(self.dir.open_read(&file.name)?))
    }

    /// Write a staged snapshot and archive `previous` once it is adopted.
    fn compact<A: BinlogAccess>(&mut self, access: &mut A, previous: &GenerationListing) -> Result<(), A::Error> {
        let stamp = self.clock.issue().map_err(JournalError::from)?;
        let snapshot = GenerationFile::new(stamp, FileKind::Snapshot, &self.config);
        let staged = self
            .dir
            .create_staged(&snapshot.name)
            .map_err(JournalError::from)?;
        let mut out = BufWriter::new(staged);
        access.save_map(&mut out)?;
        let staged = out
            .into_inner()
            .map_err(|e| JournalError::Io(e.into_error()))?;
        staged.commit().map_err(JournalError::from)?;
        access.save_completed()?;
        info!(snapshot = %snapshot.name, "snapshot written");

        self.archive(previous)?;
        Ok(())
    }

    fn archive(&self, listing: &GenerationListing) -> JournalResult<()> {
        if listing.is_empty() {
            return Ok(());
        }
        self.dir.create_dir(&self.config.archive_dir)?;
        for file in &listing.files {
            self.dir.move_into(&file.name, &self.config.archive_dir)?;
            debug!(file = %file.name, archive = %self.config.archive_dir, "archived");
        }
        info!(files = listing.files.len(), "previous generation archived");
        Ok(())
    }

    fn start_journal(&mut self) -> JournalResult<()> {
        let journal = GenerationFile::new(self.clock.issue()?, FileKind::Journal, &self.config);
        let out = self.dir.create_append(&journal.name)?;
        self.writer = Some(JournalWriter::start(&journal.name, out, &self.config.flush_policy));
        info!(journal = %journal.name, "journal started");
        Ok(())
    }
}

impl std::fmt::Debug for BinlogStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinlogStore")
            .field("config", &self.config)
            .field("last_stamp", &self.clock.last())
            .field("writer", &self.writer)
            .finish()
    }
}
