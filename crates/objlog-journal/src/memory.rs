use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, Cursor, Read, Write};
use std::sync::{Arc, Mutex, RwLock};

use crate::directory::{DirEntry, Directory, StagedFile};

type FileData = Arc<Mutex<Vec<u8>>>;

#[derive(Debug, Default)]
struct Tree {
    files: BTreeMap<String, FileData>,
    dirs: BTreeSet<String>,
}

/// In-memory [`Directory`], used by tests and tooling.
///
/// Clones share the same contents.
#[derive(Clone, Debug, Default)]
pub struct InMemoryDirectory {
    tree: Arc<RwLock<Tree>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Full content of a file as UTF-8 text.
    pub fn read_to_string(&self, name: &str) -> io::Result<String> {
        let data = self.file(name)?;
        let bytes = data.lock().expect("file mutex poisoned").clone();
        String::from_utf8(bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    /// Names of every file, including files inside sub-directories.
    pub fn file_names(&self) -> Vec<String> {
        let tree = self.tree.read().expect("directory lock poisoned");
        tree.files.keys().cloned().collect()
    }

    /// Create or replace a file.
    pub fn write_file(&self, name: &str, content: impl Into<Vec<u8>>) {
        let mut tree = self.tree.write().expect("directory lock poisoned");
        tree.files
            .insert(name.to_string(), Arc::new(Mutex::new(content.into())));
    }

    fn file(&self, name: &str) -> io::Result<FileData> {
        let tree = self.tree.read().expect("directory lock poisoned");
        tree.files.get(name).cloned().ok_or_else(|| not_found(name))
    }
}

fn not_found(name: &str) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, format!("{name}: no such file"))
}

fn already_exists(name: &str) -> io::Error {
    io::Error::new(io::ErrorKind::AlreadyExists, format!("{name}: file exists"))
}

impl Directory for InMemoryDirectory {
    fn list(&self) -> io::Result<Vec<DirEntry>> {
        let tree = self.tree.read().expect("directory lock poisoned");
        let mut entries: Vec<DirEntry> = tree
            .files
            .keys()
            .filter(|name| !name.contains('/'))
            .map(DirEntry::file)
            .chain(tree.dirs.iter().map(DirEntry::dir))
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn open_read(&self, name: &str) -> io::Result<Box<dyn Read + Send>> {
        let data = self.file(name)?;
        let snapshot = data.lock().expect("file mutex poisoned").clone();
        Ok(Box::new(Cursor::new(snapshot)))
    }

    fn create_append(&self, name: &str) -> io::Result<Box<dyn Write + Send>> {
        let mut tree = self.tree.write().expect("directory lock poisoned");
        if tree.files.contains_key(name) {
            return Err(already_exists(name));
        }
        let data = FileData::default();
        tree.files.insert(name.to_string(), data.clone());
        Ok(Box::new(AppendFile { data }))
    }

    fn create_staged(&self, name: &str) -> io::Result<Box<dyn StagedFile>> {
        Ok(Box::new(MemoryStagedFile {
            tree: self.tree.clone(),
            name: name.to_string(),
            buf: Vec::new(),
        }))
    }

    fn create_dir(&self, name: &str) -> io::Result<()> {
        let mut tree = self.tree.write().expect("directory lock poisoned");
        tree.dirs.insert(name.to_string());
        Ok(())
    }

    fn move_into(&self, name: &str, dir: &str) -> io::Result<()> {
        let mut tree = self.tree.write().expect("directory lock poisoned");
        if !tree.dirs.contains(dir) {
            return Err(not_found(dir));
        }
        let target = format!("{dir}/{name}");
        if tree.files.contains_key(&target) {
            return Err(already_exists(&target));
        }
        let data = tree.files.remove(name).ok_or_else(|| not_found(name))?;
        tree.files.insert(target, data);
        Ok(())
    }

    fn delete(&self, name: &str) -> io::Result<()> {
        let mut tree = self.tree.write().expect("directory lock poisoned");
        tree.files.remove(name).map(|_| ()).ok_or_else(|| not_found(name))
    }
}

struct AppendFile {
    data: FileData,
}

impl Write for AppendFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.data
            .lock()
            .expect("file mutex poisoned")
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

struct MemoryStagedFile {
    tree: Arc<RwLock<Tree>>,
    name: String,
    buf: Vec<u8>,
}

impl Write for MemoryStagedFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl StagedFile for MemoryStagedFile {
    fn commit(self: Box<Self>) -> io::Result<()> {
        let Self { tree, name, buf } = *self;
        let mut tree = tree.write().expect("directory lock poisoned");
        if tree.files.contains_key(&name) {
            return Err(already_exists(&name));
        }
        tree.files.insert(name, Arc::new(Mutex::new(buf)));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_writes_are_visible_immediately() {
        let dir = InMemoryDirectory::new();
        let mut w = dir.create_append("1.log").unwrap();
        w.write_all(b"one\n").unwrap();
        assert_eq!(dir.read_to_string("1.log").unwrap(), "one\n");
        w.write_all(b"two\n").unwrap();
        assert_eq!(dir.read_to_string("1.log").unwrap(), "one\ntwo\n");
        assert!(dir.create_append("1.log").is_err());
    }

    #[test]
    fn staged_file_is_invisible_until_commit() {
        let dir = InMemoryDirectory::new();
        let mut staged = dir.create_staged("2.map").unwrap();
        staged.write_all(b"snapshot").unwrap();
        assert!(dir.list().unwrap().is_empty());
        staged.commit().unwrap();
        assert_eq!(dir.list().unwrap(), vec![DirEntry::file("2.map")]);

        let staged = dir.create_staged("2.map").unwrap();
        assert!(staged.commit().is_err());
    }

    #[test]
    fn listing_hides_files_in_sub_directories() {
        let dir = InMemoryDirectory::new();
        dir.write_file("1.map", "");
        dir.write_file("1.log", "");
        dir.create_dir("logs").unwrap();
        dir.move_into("1.log", "logs").unwrap();

        assert_eq!(
            dir.list().unwrap(),
            vec![DirEntry::file("1.map"), DirEntry::dir("logs")]
        );
        assert_eq!(dir.file_names(), vec!["1.map".to_string(), "logs/1.log".to_string()]);
    }

    #[test]
    fn move_into_requires_target_directory() {
        let dir = InMemoryDirectory::new();
        dir.write_file("1.log", "");
        assert!(dir.move_into("1.log", "logs").is_err());
        assert!(dir.move_into("missing.log", "logs").is_err());
    }

    #[test]
    fn clones_share_contents() {
        let dir = InMemoryDirectory::new();
        let other = dir.clone();
        other.write_file("a", "x");
        let mut text = String::new();
        dir.open_read("a").unwrap().read_to_string(&mut text).unwrap();
        assert_eq!(text, "x");
        dir.delete("a").unwrap();
        assert!(other.open_read("a").is_err());
    }
}
