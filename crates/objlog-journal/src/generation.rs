use std::fmt;

use objlog_types::GenerationStamp;
use tracing::warn;

use crate::config::JournalConfig;
use crate::directory::Directory;
use crate::error::JournalResult;

/// Role of a generation file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FileKind {
    Snapshot,
    Journal,
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Snapshot => f.write_str("snapshot"),
            Self::Journal => f.write_str("journal"),
        }
    }
}

/// A snapshot or journal file named `<stamp>.<ext>`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GenerationFile {
    pub stamp: GenerationStamp,
    pub kind: FileKind,
    /// File name as found in the directory.
    pub name: String,
}

impl GenerationFile {
    /// Build the canonical file for `stamp`.
    pub fn new(stamp: GenerationStamp, kind: FileKind, config: &JournalConfig) -> Self {
        Self {
            stamp,
            kind,
            name: Self::file_name(stamp, kind, config),
        }
    }

    /// Canonical name of a generation file.
    pub fn file_name(stamp: GenerationStamp, kind: FileKind, config: &JournalConfig) -> String {
        let ext = match kind {
            FileKind::Snapshot => &config.snapshot_ext,
            FileKind::Journal => &config.journal_ext,
        };
        format!("{stamp}.{ext}")
    }

    /// Recognize a generation file name; extensions match case-insensitively.
    pub fn parse(name: &str, config: &JournalConfig) -> Option<Self> {
        let (stem, ext) = name.rsplit_once('.')?;
        let kind = if ext.eq_ignore_ascii_case(&config.snapshot_ext) {
            FileKind::Snapshot
        } else if ext.eq_ignore_ascii_case(&config.journal_ext) {
            FileKind::Journal
        } else {
            return None;
        };
        let stamp = stem.parse().ok()?;
        Some(Self {
            stamp,
            kind,
            name: name.to_string(),
        })
    }
}

/// Generation files found at the top level of a store directory.
#[derive(Clone, Debug, Default)]
pub struct GenerationListing {
    /// Newest snapshot, if any.
    pub snapshot: Option<GenerationFile>,
    /// Newest journal, if any.
    pub journal: Option<GenerationFile>,
    /// Every generation file, sorted by stamp.
    pub files: Vec<GenerationFile>,
}

impl GenerationListing {
    pub fn scan(dir: &dyn Directory, config: &JournalConfig) -> JournalResult<Self> {
        let mut files = Vec::new();
        for entry in dir.list()? {
            if entry.is_dir {
                continue;
            }
            match GenerationFile::parse(&entry.name, config) {
                Some(file) => files.push(file),
                None if entry.name.starts_with('.') => {}
                None => warn!(file = %entry.name, "ignoring unrecognized file in store directory"),
            }
        }
        files.sort_by(|a, b| a.stamp.cmp(&b.stamp).then_with(|| a.name.cmp(&b.name)));

        let newest = |kind: FileKind| files.iter().filter(|f| f.kind == kind).last().cloned();
        Ok(Self {
            snapshot: newest(FileKind::Snapshot),
            journal: newest(FileKind::Journal),
            files,
        })
    }

    /// Largest stamp of any listed file.
    pub fn newest_stamp(&self) -> Option<GenerationStamp> {
        self.files.last().map(|f| f.stamp)
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryDirectory;

    fn stamp(ms: u64) -> GenerationStamp {
        GenerationStamp::from_millis(ms)
    }

    #[test]
    fn parse_generation_names() {
        let config = JournalConfig::default();
        let map = GenerationFile::parse("1700000000000.map", &config).unwrap();
        assert_eq!(map.kind, FileKind::Snapshot);
        assert_eq!(map.stamp, stamp(1_700_000_000_000));

        let log = GenerationFile::parse("12.LOG", &config).unwrap();
        assert_eq!(log.kind, FileKind::Journal);
        assert_eq!(log.name, "12.LOG");

        assert!(GenerationFile::parse("notes.txt", &config).is_none());
        assert!(GenerationFile::parse("abc.map", &config).is_none());
        assert!(GenerationFile::parse("map", &config).is_none());
        assert!(GenerationFile::parse(".map", &config).is_none());
    }

    #[test]
    fn file_name_uses_configured_extensions() {
        let config = JournalConfig {
            snapshot_ext: "snap".into(),
            journal_ext: "jrn".into(),
            ..JournalConfig::default()
        };
        let file = GenerationFile::new(stamp(5), FileKind::Journal, &config);
        assert_eq!(file.name, "5.jrn");
        assert_eq!(GenerationFile::parse("5.jrn", &config), Some(file));
    }

    #[test]
    fn scan_picks_numerically_newest() {
        let dir = InMemoryDirectory::new();
        for name in ["9.map", "10.map", "11.log", "9.log", "readme.md", ".staged-x"] {
            dir.write_file(name, "");
        }
        dir.create_dir("logs").unwrap();

        let listing = GenerationListing::scan(&dir, &JournalConfig::default()).unwrap();
        assert_eq!(listing.snapshot.as_ref().unwrap().name, "10.map");
        assert_eq!(listing.journal.as_ref().unwrap().name, "11.log");
        assert_eq!(listing.files.len(), 4);
        assert_eq!(listing.newest_stamp(), Some(stamp(11)));
    }

    #[test]
    fn scan_empty_directory() {
        let listing = GenerationListing::scan(&InMemoryDirectory::new(), &JournalConfig::default()).unwrap();
        assert!(listing.is_empty());
        assert!(listing.snapshot.is_none());
        assert!(listing.journal.is_none());
    }
}
