//! Path resolution
//!
//! Every file is resolved on its own by climbing parent references through
//! the directory index. The index is read-only here, so files are spread
//! across rayon workers without locks and results come back over a channel.

use crate::filter::PathFilter;
use crate::index::{DirectoryIndex, FileSet};
use crate::ntfs::structs::RawRecord;
use crossbeam_channel::{Receiver, Sender};
use rayon::prelude::*;
use rayon::ThreadPool;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Ancestors visited before an entry is treated as part of a cycle
pub const DEFAULT_MAX_DEPTH: usize = 1024;

pub const PATH_SEPARATOR: char = '\\';

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedPath {
    pub file_reference_number: u64,
    pub full_path: String,
}

/// Builds full paths for file records against one directory index
pub struct PathResolver<'a> {
    index: &'a DirectoryIndex,
    root_label: &'a str,
    max_depth: usize,
}

impl<'a> PathResolver<'a> {
    pub fn new(index: &'a DirectoryIndex, root_label: &'a str, max_depth: usize) -> Self {
        Self {
            index,
            root_label,
            max_depth,
        }
    }

    /// Resolve one file. `None` means the ancestor chain ran past
    /// `max_depth` and the entry is skipped.
    pub fn resolve(&self, file: &RawRecord) -> Option<ResolvedPath> {
        let mut names: Vec<&str> = vec![&file.name];
        let mut parent = file.parent_file_reference_number;

        // A missing parent means we reached the top of what the volume knows
        while let Some(dir) = self.index.get(parent) {
            if self.index.is_root(dir) || self.is_volume_entry(dir) {
                break;
            }
            if names.len() > self.max_depth {
                return None;
            }
            names.push(&dir.name);
            parent = dir.parent_file_reference_number;
        }

        let capacity = self.root_label.len() + names.iter().map(|n| n.len() + 1).sum::<usize>();
        let mut full_path = String::with_capacity(capacity);
        full_path.push_str(self.root_label);
        if !full_path.is_empty() && !full_path.ends_with(PATH_SEPARATOR) {
            full_path.push(PATH_SEPARATOR);
        }
        for (i, name) in names.iter().rev().enumerate() {
            if i > 0 {
                full_path.push(PATH_SEPARATOR);
            }
            full_path.push_str(name);
        }

        Some(ResolvedPath {
            file_reference_number: file.file_reference_number,
            full_path,
        })
    }
}

impl PathResolver<'_> {
    /// A top-level directory named after the volume itself (`C:`) stands
    /// for the root; its name is already the label.
    fn is_volume_entry(&self, dir: &RawRecord) -> bool {
        let label = self.root_label.trim_end_matches(PATH_SEPARATOR);
        !label.is_empty()
            && !self.index.contains(dir.parent_file_reference_number)
            && dir.name.trim_end_matches(PATH_SEPARATOR).eq_ignore_ascii_case(label)
    }
}

/// Resolve every file in parallel and collect the results (unordered)
pub fn resolve_all(
    index: &DirectoryIndex,
    files: &FileSet,
    root_label: &str,
    max_depth: usize,
) -> Vec<ResolvedPath> {
    let resolver = PathResolver::new(index, root_label, max_depth);
    files
        .as_slice()
        .par_iter()
        .filter_map(|file| resolver.resolve(file))
        .collect()
}

/// Start resolving in the background and hand back a lazy stream.
///
/// Work runs on `pool` when given, otherwise on the global rayon pool.
/// A caller that is itself a rayon worker gets a fresh pool instead, since
/// draining the stream blocks that worker and its pool may have no other.
/// Dropping the stream makes workers stop at their next send.
pub fn spawn_resolution(
    index: Arc<DirectoryIndex>,
    files: Arc<FileSet>,
    root_label: String,
    max_depth: usize,
    pool: Option<ThreadPool>,
) -> PathStream {
    let (tx, rx) = crossbeam_channel::unbounded();
    let skipped = Arc::new(AtomicU64::new(0));
    let worker_skipped = Arc::clone(&skipped);

    let job = move || {
        let resolver = PathResolver::new(&index, &root_label, max_depth);
        let _ = files
            .as_slice()
            .par_iter()
            .try_for_each_with(tx, |tx: &mut Sender<ResolvedPath>, file| {
                match resolver.resolve(file) {
                    Some(path) => tx.send(path).map_err(|_| ()),
                    None => {
                        worker_skipped.fetch_add(1, Ordering::Relaxed);
                        log::trace!(
                            "Skipping '{}' (0x{:016X}): ancestor chain deeper than {}",
                            file.name,
                            file.file_reference_number,
                            max_depth
                        );
                        Ok(())
                    }
                }
            });
    };

    let pool = pool.or_else(pool_for_nested_caller).map(Arc::new);
    match &pool {
        Some(pool) => pool.spawn(job),
        None => rayon::spawn(job),
    }

    PathStream {
        rx,
        filter: PathFilter::default(),
        skipped,
        _pool: pool,
    }
}

fn pool_for_nested_caller() -> Option<ThreadPool> {
    rayon::current_thread_index()?;
    match rayon::ThreadPoolBuilder::new().build() {
        Ok(pool) => Some(pool),
        Err(e) => {
            log::warn!("Cannot build a resolver pool, sharing the caller's: {}", e);
            None
        }
    }
}

/// Lazy, unordered sequence of resolved paths
pub struct PathStream {
    rx: Receiver<ResolvedPath>,
    filter: PathFilter,
    skipped: Arc<AtomicU64>,
    /// Keeps a dedicated pool alive until the stream is dropped
    _pool: Option<Arc<ThreadPool>>,
}

impl PathStream {
    /// Only yield paths accepted by `filter`
    pub fn with_filter(mut self, filter: PathFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Entries dropped so far because their ancestor chain was too deep.
    /// Final once the stream is exhausted.
    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }

    /// Just the path strings
    pub fn paths(self) -> impl Iterator<Item = String> {
        self.map(|resolved| resolved.full_path)
    }
}

impl Iterator for PathStream {
    type Item = ResolvedPath;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let resolved = self.rx.recv().ok()?;
            if self.filter.matches(&resolved.full_path) {
                return Some(resolved);
            }
        }
    }
}
