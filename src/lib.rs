//! mftpath - full file paths for a whole NTFS volume, read from the USN journal
//!
//! Instead of walking directories, mftpath asks the NTFS change journal for
//! every entry on the volume (FSCTL_ENUM_USN_DATA), keeps directories in an
//! index keyed by file reference number, and rebuilds each file's path by
//! following parent references through that index in parallel.
//!
//! # Example
//!
//! ```no_run
//! use mftpath::{enumerate_volume, NamePattern};
//!
//! fn main() -> mftpath::Result<()> {
//!     let pattern = NamePattern::glob("*.mkv")?;
//!     let prefixes = vec![r"C:\Shows".to_string()];
//!
//!     for path in enumerate_volume("C:", Some(pattern), &prefixes)? {
//!         println!("{}", path);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! Raw volume access needs Windows and administrator rights. Everything past
//! the device layer (`UsnDevice`) is platform independent.

pub mod enumerator;
pub mod error;
pub mod filter;
pub mod index;
pub mod logging;
pub mod ntfs;
pub mod resolver;
pub mod volume;

#[cfg(test)]
mod testutil;

// Re-export main types
pub use enumerator::{enumerate_volume, EnumConfig, EnumStats, Enumeration, VolumeEnumerator};
pub use error::{EnumError, Result};
pub use filter::{filter_paths, NamePattern, PathFilter};
pub use index::{DirectoryIndex, FileSet, IndexBuilder, IndexStats};
pub use resolver::{resolve_all, spawn_resolution, PathResolver, PathStream, ResolvedPath};
pub use volume::VolumeId;

// Re-export NTFS types that users might need
pub use ntfs::{EntryKind, RawRecord, UsnDevice, UsnJournalData};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
