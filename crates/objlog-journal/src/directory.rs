use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::error::{JournalError, JournalResult};

/// One entry of a directory listing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub is_dir: bool,
}

impl DirEntry {
    pub fn file(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_dir: false,
        }
    }

    pub fn dir(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_dir: true,
        }
    }
}

/// A file being written under a temporary name.
///
/// Dropping a staged file without committing discards it.
pub trait StagedFile: Write + Send {
    /// Publish the written content under its final name.
    ///
    /// Fails if a file with that name already exists.
    fn commit(self: Box<Self>) -> io::Result<()>;
}

/// Storage directory holding snapshot and journal files.
///
/// Names are relative to the directory root; `dir/name` addresses a file in
/// a sub-directory.
pub trait Directory: Send + Sync {
    /// Entries directly inside the directory root.
    fn list(&self) -> io::Result<Vec<DirEntry>>;

    /// Open an existing file for reading.
    fn open_read(&self, name: &str) -> io::Result<Box<dyn Read + Send>>;

    /// Create a new file whose writes become visible as they happen.
    ///
    /// Fails if the file already exists.
    fn create_append(&self, name: &str) -> io::Result<Box<dyn Write + Send>>;

    /// Create a file that only appears under `name` once committed.
    fn create_staged(&self, name: &str) -> io::Result<Box<dyn StagedFile>>;

    /// Create a sub-directory; succeeds if it already exists.
    fn create_dir(&self, name: &str) -> io::Result<()>;

    /// Move the file `name` into the sub-directory `dir`, keeping its name.
    fn move_into(&self, name: &str, dir: &str) -> io::Result<()>;

    /// Delete a file.
    fn delete(&self, name: &str) -> io::Result<()>;
}

/// [`Directory`] backed by a directory of the local file system.
#[derive(Clone, Debug)]
pub struct LocalDirectory {
    root: PathBuf,
}

impl LocalDirectory {
    /// Use an existing directory.
    pub fn open(root: &Path) -> JournalResult<Self> {
        if !root.is_dir() {
            return Err(JournalError::DirectoryNotFound(root.display().to_string()));
        }
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    /// Use a directory, creating it and its parents when missing.
    pub fn create(root: &Path) -> JournalResult<Self> {
        fs::create_dir_all(root)?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

impl Directory for LocalDirectory {
    fn list(&self) -> io::Result<Vec<DirEntry>> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            let is_dir = entry.file_type()?.is_dir();
            entries.push(DirEntry { name, is_dir });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn open_read(&self, name: &str) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(File::open(self.path(name))?))
    }

    fn create_append(&self, name: &str) -> io::Result<Box<dyn Write + Send>> {
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(self.path(name))?;
        Ok(Box::new(file))
    }

    fn create_staged(&self, name: &str) -> io::Result<Box<dyn StagedFile>> {
        // Staging in the same directory keeps the final rename atomic.
        let temp = tempfile::Builder::new()
            .prefix(".staged-")
            .tempfile_in(&self.root)?;
        Ok(Box::new(LocalStagedFile {
            temp,
            target: self.path(name),
        }))
    }

    fn create_dir(&self, name: &str) -> io::Result<()> {
        fs::create_dir_all(self.path(name))
    }

    fn move_into(&self, name: &str, dir: &str) -> io::Result<()> {
        fs::rename(self.path(name), self.path(dir).join(name))
    }

    fn delete(&self, name: &str) -> io::Result<()> {
        fs::remove_file(self.path(name))
    }
}

struct LocalStagedFile {
    temp: NamedTempFile,
    target: PathBuf,
}

impl Write for LocalStagedFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.temp.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.temp.flush()
    }
}

impl StagedFile for LocalStagedFile {
    fn commit(mut self: Box<Self>) -> io::Result<()> {
        self.temp.flush()?;
        self.temp.as_file().sync_all()?;
        let Self { temp, target } = *self;
        temp.persist_noclobber(&target)?;
        Ok(())
    }
}
