//! Volume Enumerator
//!
//! Ties the pieces together: query the journal, stream every USN record
//! into the directory index and file set, then hand the read-only snapshot
//! to the parallel resolver and return its lazy output.

use crate::error::{EnumError, Result};
use crate::filter::{NamePattern, PathFilter};
use crate::index::{DirectoryIndex, FileSet, IndexBuilder};
use crate::ntfs::{self, RecordStream, UsnDevice, UsnJournalData};
use crate::ntfs::usn::DEFAULT_BUFFER_SIZE;
use crate::resolver::{spawn_resolution, PathStream, DEFAULT_MAX_DEPTH};
use crate::volume::VolumeId;
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

// ============================================================================
// Configuration
// ============================================================================

/// Tuning knobs for one enumeration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnumConfig {
    /// Bytes handed to each FSCTL_ENUM_USN_DATA request
    pub buffer_size: usize,
    /// Ancestors followed before an entry is treated as corrupt
    pub max_depth: usize,
    /// Resolver threads; 0 uses the global rayon pool
    pub threads: usize,
    /// Show a spinner while records are decoded
    pub show_progress: bool,
}

impl Default for EnumConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            max_depth: DEFAULT_MAX_DEPTH,
            threads: 0,
            show_progress: false,
        }
    }
}

impl EnumConfig {
    /// Load from a JSON file; missing keys keep their defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| EnumError::Config(format!("{}: {}", path.display(), e)))?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|e| EnumError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.buffer_size < ntfs::usn::MIN_PAGE_SIZE {
            return Err(EnumError::Config(format!(
                "buffer_size must be at least {} bytes",
                ntfs::usn::MIN_PAGE_SIZE
            )));
        }
        if self.max_depth == 0 {
            return Err(EnumError::Config("max_depth must be positive".to_string()));
        }
        Ok(())
    }
}

// ============================================================================
// Results
// ============================================================================

/// What one run read from the device
#[derive(Debug, Clone, Default, Serialize)]
pub struct EnumStats {
    pub requests: u64,
    pub records: u64,
    pub bytes_decoded: u64,
    pub directories: u64,
    pub files: u64,
    pub filtered_out: u64,
    pub other: u64,
    pub duplicate_directories: u64,
    pub decode_time: Duration,
}

/// Everything read from the device; nothing here borrows it
struct Snapshot {
    journal: UsnJournalData,
    stats: EnumStats,
    index: DirectoryIndex,
    files: FileSet,
    root_label: String,
}

/// A finished decode pass plus the resolver output still being produced
pub struct Enumeration {
    pub journal: UsnJournalData,
    pub stats: EnumStats,
    pub paths: PathStream,
}

// ============================================================================
// Volume Enumerator
// ============================================================================

pub struct VolumeEnumerator {
    volume: String,
    config: EnumConfig,
    name_pattern: Option<NamePattern>,
    filter: PathFilter,
}

impl VolumeEnumerator {
    pub fn new(volume: impl Into<String>) -> Self {
        Self {
            volume: volume.into(),
            config: EnumConfig::default(),
            name_pattern: None,
            filter: PathFilter::default(),
        }
    }

    pub fn with_config(mut self, config: EnumConfig) -> Self {
        self.config = config;
        self
    }

    /// Keep only files whose name matches
    pub fn with_name_pattern(mut self, pattern: Option<NamePattern>) -> Self {
        self.name_pattern = pattern;
        self
    }

    /// Keep only paths under one of these prefixes (case-insensitive)
    pub fn with_path_prefixes<I, S>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.filter = PathFilter::new(prefixes);
        self
    }

    /// Open the volume, read it, and close it again before resolving
    pub fn enumerate(&self) -> Result<Enumeration> {
        let volume = VolumeId::parse(&self.volume)?;
        let snapshot = {
            let mut handle = ntfs::open_volume(&volume)?;
            self.read_device(&mut handle)?
        };
        log::debug!("Closed {}", volume.device_path());
        self.start_resolution(snapshot)
    }

    /// Run against any device that speaks the journal protocol
    pub fn enumerate_device<D: UsnDevice + ?Sized>(&self, device: &mut D) -> Result<Enumeration> {
        let snapshot = self.read_device(device)?;
        self.start_resolution(snapshot)
    }

    /// Decode the whole device into an index and file set
    fn read_device<D: UsnDevice + ?Sized>(&self, device: &mut D) -> Result<Snapshot> {
        self.config.validate()?;
        let start = Instant::now();
        let root_label = device.root_label().to_string();

        log::info!(
            "Enumerating {} (buffer={}, max_depth={}, pattern={:?}, prefixes={})",
            root_label,
            self.config.buffer_size,
            self.config.max_depth,
            self.name_pattern.as_ref().map(NamePattern::as_str),
            !self.filter.is_empty()
        );

        let journal = device.query_journal()?;
        log::info!(
            "Journal 0x{:016X}: next_usn={}",
            journal.usn_journal_id,
            journal.next_usn
        );

        let pb = if self.config.show_progress {
            let pb = ProgressBar::new_spinner();
            pb.set_style(
                ProgressStyle::default_spinner()
                    .template("{spinner:.green} [{elapsed_precise}] {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            pb.enable_steady_tick(Duration::from_millis(120));
            pb.set_message(format!("Reading {}", root_label));
            Some(pb)
        } else {
            None
        };

        let mut stream = RecordStream::new(device, &journal, self.config.buffer_size)?;
        let mut builder = IndexBuilder::new(self.name_pattern.clone());

        let decoded = (|| -> Result<()> {
            while let Some(record) = stream.next() {
                builder.add(record?);

                if let Some(ref pb) = pb {
                    let records = stream.stats().records;
                    if records % 10_000 == 0 {
                        pb.set_message(format!("{}: {} records", root_label, records));
                    }
                }
            }
            Ok(())
        })();

        if let Some(ref pb) = pb {
            pb.finish_and_clear();
        }
        decoded?;

        let stream_stats = stream.stats();
        let (index, files, index_stats) = builder.finish();
        let stats = EnumStats {
            requests: stream_stats.requests,
            records: stream_stats.records,
            bytes_decoded: stream_stats.bytes_decoded,
            directories: index_stats.directories,
            files: index_stats.files,
            filtered_out: index_stats.filtered_out,
            other: index_stats.other,
            duplicate_directories: index_stats.duplicate_directories,
            decode_time: start.elapsed(),
        };

        log::info!(
            "Decoded {} records in {} requests: {} directories, {} files ({:.2}s)",
            stats.records,
            stats.requests,
            stats.directories,
            stats.files,
            stats.decode_time.as_secs_f64()
        );

        Ok(Snapshot {
            journal,
            stats,
            index,
            files,
            root_label,
        })
    }

    fn start_resolution(&self, snapshot: Snapshot) -> Result<Enumeration> {
        let Snapshot {
            journal,
            stats,
            index,
            files,
            root_label,
        } = snapshot;

        let pool = if self.config.threads > 0 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.config.threads)
                .build()
                .map_err(|e| EnumError::Config(format!("resolver pool: {}", e)))?;
            Some(pool)
        } else {
            None
        };

        let paths = spawn_resolution(
            Arc::new(index),
            Arc::new(files),
            root_label,
            self.config.max_depth,
            pool,
        )
        .with_filter(self.filter.clone());

        Ok(Enumeration {
            journal,
            stats,
            paths,
        })
    }
}

/// Every file path on `volume`, lazily and in no particular order.
///
/// `name_pattern` is applied to file names while the volume is read;
/// `path_prefixes` to the finished paths. An empty prefix list keeps all.
pub fn enumerate_volume(
    volume: &str,
    name_pattern: Option<NamePattern>,
    path_prefixes: &[String],
) -> Result<impl Iterator<Item = String>> {
    let enumeration = VolumeEnumerator::new(volume)
        .with_name_pattern(name_pattern)
        .with_path_prefixes(path_prefixes)
        .enumerate()?;
    Ok(enumeration.paths.paths())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::*;
    use std::io::Write;

    fn sample_device() -> ScriptedDevice {
        ScriptedDevice::new("C:\\", 4242)
            .page(encode_page(
                300,
                &[
                    dir(0x0001_0000_0000_0100, 0x0005_0000_0000_0005, "Shows"),
                    dir(0x0001_0000_0000_0101, 0x0001_0000_0000_0100, "Lost"),
                    file(0x0001_0000_0000_0200, 0x0001_0000_0000_0101, "s01e01.mkv"),
                    file(0x0001_0000_0000_0201, 0x0001_0000_0000_0101, "s01e01.srt"),
                ],
            ))
            .page(encode_page(
                400,
                &[
                    file(0x0001_0000_0000_0300, 0x0005_0000_0000_0005, "pagefile.sys"),
                    file(0x0001_0000_0000_0301, 0x0001_0000_0000_0999, "orphan.mkv"),
                ],
            ))
    }

    fn sorted(paths: impl Iterator<Item = String>) -> Vec<String> {
        let mut paths: Vec<_> = paths.collect();
        paths.sort();
        paths
    }

    #[test]
    fn test_enumerates_all_files() {
        let mut device = sample_device();
        let enumeration = VolumeEnumerator::new("C").enumerate_device(&mut device).unwrap();

        assert_eq!(enumeration.journal.next_usn, 4242);
        assert_eq!(enumeration.stats.directories, 2);
        assert_eq!(enumeration.stats.files, 4);
        assert_eq!(enumeration.stats.requests, 3);

        let paths = sorted(enumeration.paths.paths());
        assert_eq!(
            paths,
            [
                r"C:\Shows\Lost\s01e01.mkv",
                r"C:\Shows\Lost\s01e01.srt",
                r"C:\orphan.mkv",
                r"C:\pagefile.sys",
            ]
        );
    }

    #[test]
    fn test_labelled_root_entry_not_repeated() {
        let mut device = ScriptedDevice::new("C:\\", 10).page(encode_page(
            90,
            &[
                dir(1, 0, "C:\\"),
                dir(2, 1, "Shows"),
                file(10, 2, "s01e01.mkv"),
            ],
        ));
        let enumeration = VolumeEnumerator::new("C").enumerate_device(&mut device).unwrap();
        assert_eq!(sorted(enumeration.paths.paths()), [r"C:\Shows\s01e01.mkv"]);
    }

    #[test]
    fn test_resolution_outlives_device() {
        let enumerator = VolumeEnumerator::new("C");
        let snapshot = {
            let mut device = sample_device();
            enumerator.read_device(&mut device).unwrap()
        };
        assert_eq!(snapshot.stats.requests, 3);

        let enumeration = enumerator.start_resolution(snapshot).unwrap();
        assert_eq!(enumeration.paths.count(), 4);
    }

    #[test]
    fn test_name_pattern_and_prefixes() {
        let mut device = sample_device();
        let enumeration = VolumeEnumerator::new("C")
            .with_name_pattern(Some(NamePattern::glob("*.mkv").unwrap()))
            .with_path_prefixes([r"c:\SHOWS"])
            .enumerate_device(&mut device)
            .unwrap();

        assert_eq!(enumeration.stats.filtered_out, 2);
        assert_eq!(sorted(enumeration.paths.paths()), [r"C:\Shows\Lost\s01e01.mkv"]);
    }

    #[test]
    fn test_corrupt_page_returns_no_results() {
        let mut first = file(10, 5, "s01e01.mkv");
        let second = file(11, 5, "s01e02.mkv");
        let overrun = (first.len() + second.len() + 8) as u32;
        first[0..4].copy_from_slice(&overrun.to_le_bytes());

        let mut device = ScriptedDevice::new("C:\\", 1).page(encode_page(50, &[first, second]));
        match VolumeEnumerator::new("C").enumerate_device(&mut device) {
            Err(e) => assert!(e.is_device_error()),
            Ok(enumeration) => panic!("got {} paths", enumeration.paths.count()),
        }
    }

    #[test]
    fn test_device_failure_mid_run() {
        let mut device = sample_device().fail(21);
        // sample pages end with a live cursor, so a third request is made
        assert!(matches!(
            VolumeEnumerator::new("C").enumerate_device(&mut device),
            Err(EnumError::Device { .. })
        ));
    }

    #[test]
    fn test_dedicated_threads() {
        let mut device = sample_device();
        let config = EnumConfig {
            threads: 2,
            buffer_size: 4096,
            ..Default::default()
        };
        let enumeration = VolumeEnumerator::new("C")
            .with_config(config)
            .enumerate_device(&mut device)
            .unwrap();
        assert_eq!(enumeration.paths.count(), 4);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut device = sample_device();
        let config = EnumConfig {
            buffer_size: 16,
            ..Default::default()
        };
        assert!(matches!(
            VolumeEnumerator::new("C").with_config(config).enumerate_device(&mut device),
            Err(EnumError::Config(_))
        ));
    }

    #[test]
    fn test_config_from_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{ "max_depth": 64, "threads": 3 }}"#).unwrap();

        let config = EnumConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.max_depth, 64);
        assert_eq!(config.threads, 3);
        assert_eq!(config.buffer_size, DEFAULT_BUFFER_SIZE);
    }

    #[test]
    fn test_config_file_errors() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{ "max_depth": 0 }}"#).unwrap();
        assert!(matches!(EnumConfig::from_json_file(file.path()), Err(EnumError::Config(_))));

        assert!(EnumConfig::from_json_file("/nonexistent/mftpath.json").is_err());
    }

    #[cfg(not(windows))]
    #[test]
    fn test_enumerate_volume_needs_windows() {
        assert!(matches!(
            enumerate_volume("C:", None, &[]),
            Err(EnumError::Access(..))
        ));
    }

    #[test]
    fn test_enumerate_volume_rejects_bad_identifier() {
        assert!(matches!(enumerate_volume("not a volume", None, &[]), Err(EnumError::Access(..))));
    }
}
