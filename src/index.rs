//! Directory index and file set
//!
//! Built in a single sequential pass over the record stream, then shared
//! read-only with the resolver workers.

use crate::error::Result;
use crate::filter::NamePattern;
use crate::ntfs::structs::{EntryKind, RawRecord, ROOT_RECORD_NUMBER};
use std::collections::HashMap;

// ============================================================================
// Directory Index
// ============================================================================

/// Directories keyed by file reference number
#[derive(Debug, Clone, Default)]
pub struct DirectoryIndex {
    entries: HashMap<u64, RawRecord>,
    /// Explicit root reference, when the caller knows it
    root: Option<u64>,
}

impl DirectoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index whose walk stops at `root_frn` instead of climbing past it
    pub fn with_root(root_frn: u64) -> Self {
        Self {
            entries: HashMap::new(),
            root: Some(root_frn),
        }
    }

    /// Insert a directory. Returns the record previously stored under the
    /// same reference, if any (last write wins).
    pub fn insert(&mut self, record: RawRecord) -> Option<RawRecord> {
        self.entries.insert(record.file_reference_number, record)
    }

    pub fn get(&self, file_reference_number: u64) -> Option<&RawRecord> {
        self.entries.get(&file_reference_number)
    }

    pub fn contains(&self, file_reference_number: u64) -> bool {
        self.entries.contains_key(&file_reference_number)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Is this directory the volume root? The explicit root, a directory that
    /// is its own parent, one with no parent reference at all, and MFT
    /// record 5 all count.
    pub fn is_root(&self, dir: &RawRecord) -> bool {
        self.root == Some(dir.file_reference_number)
            || dir.parent_file_reference_number == dir.file_reference_number
            || dir.parent_file_reference_number == 0
            || dir.record_number() == ROOT_RECORD_NUMBER
    }
}

// ============================================================================
// File Set
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct FileSet {
    files: Vec<RawRecord>,
}

impl FileSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: RawRecord) {
        self.files.push(record);
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn as_slice(&self) -> &[RawRecord] {
        &self.files
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RawRecord> {
        self.files.iter()
    }
}

impl FromIterator<RawRecord> for FileSet {
    fn from_iter<T: IntoIterator<Item = RawRecord>>(iter: T) -> Self {
        Self {
            files: iter.into_iter().collect(),
        }
    }
}

// ============================================================================
// Index Builder
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexStats {
    pub directories: u64,
    pub files: u64,
    /// Files rejected by the name pattern
    pub filtered_out: u64,
    /// Records that are neither file nor directory
    pub other: u64,
    pub duplicate_directories: u64,
}

/// Partitions decoded records into a `DirectoryIndex` and a `FileSet`
pub struct IndexBuilder {
    directories: DirectoryIndex,
    files: FileSet,
    name_pattern: Option<NamePattern>,
    stats: IndexStats,
}

impl IndexBuilder {
    pub fn new(name_pattern: Option<NamePattern>) -> Self {
        Self {
            directories: DirectoryIndex::new(),
            files: FileSet::new(),
            name_pattern,
            stats: IndexStats::default(),
        }
    }

    pub fn add(&mut self, record: RawRecord) {
        match record.kind {
            EntryKind::Directory => {
                let frn = record.file_reference_number;
                if self.directories.insert(record).is_some() {
                    self.stats.duplicate_directories += 1;
                    log::warn!("Duplicate directory reference 0x{:016X}, keeping the latest", frn);
                } else {
                    self.stats.directories += 1;
                }
            }
            EntryKind::File => {
                let keep = self
                    .name_pattern
                    .as_ref()
                    .map_or(true, |pattern| pattern.is_match(&record.name));
                if keep {
                    self.files.push(record);
                    self.stats.files += 1;
                } else {
                    self.stats.filtered_out += 1;
                }
            }
            EntryKind::Other => self.stats.other += 1,
        }
    }

    pub fn stats(&self) -> IndexStats {
        self.stats
    }

    /// Consume a record stream. The first error aborts the build.
    pub fn extend<I>(mut self, records: I) -> Result<Self>
    where
        I: IntoIterator<Item = Result<RawRecord>>,
    {
        for record in records {
            self.add(record?);
        }
        Ok(self)
    }

    pub fn finish(self) -> (DirectoryIndex, FileSet, IndexStats) {
        (self.directories, self.files, self.stats)
    }
}
