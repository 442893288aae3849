//! Volume identifiers
//!
//! Accepts a drive letter (`C`, `c:`, `C:\`), a raw device path (`\\.\C:`),
//! or a volume GUID path (`\\?\Volume{...}\`).

use crate::error::{EnumError, Result};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeId {
    /// Path handed to CreateFileW
    device_path: String,
    /// Root directory, used to ask for the filesystem name
    root_path: String,
    /// Prefix of every resolved path
    root_label: String,
}

impl VolumeId {
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        let body = trimmed
            .strip_prefix(r"\\.\")
            .or_else(|| trimmed.strip_prefix(r"\\?\"))
            .unwrap_or(trimmed);

        let is_guid = body
            .get(..7)
            .map_or(false, |head| head.eq_ignore_ascii_case("volume{"));
        if is_guid {
            let guid = body.trim_end_matches('\\');
            if !guid.ends_with('}') {
                return Err(unknown_volume(input));
            }
            let root_path = format!(r"\\?\{}\", guid);
            return Ok(Self {
                device_path: format!(r"\\?\{}", guid),
                root_label: root_path.clone(),
                root_path,
            });
        }

        let letter = body.trim_end_matches('\\');
        let letter = letter.strip_suffix(':').unwrap_or(letter);
        let mut chars = letter.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) if c.is_ascii_alphabetic() => Ok(Self::from_letter(c)),
            _ => Err(unknown_volume(input)),
        }
    }

    pub fn from_letter(letter: char) -> Self {
        let letter = letter.to_ascii_uppercase();
        Self {
            device_path: format!(r"\\.\{}:", letter),
            root_path: format!(r"{}:\", letter),
            root_label: format!(r"{}:\", letter),
        }
    }

    pub fn device_path(&self) -> &str {
        &self.device_path
    }

    pub fn root_path(&self) -> &str {
        &self.root_path
    }

    pub fn root_label(&self) -> &str {
        &self.root_label
    }

    /// Accept only volumes whose root reports NTFS
    pub fn check_filesystem(&self, fs_name: &str) -> Result<()> {
        if fs_name.trim().eq_ignore_ascii_case("NTFS") {
            Ok(())
        } else {
            log::warn!("{} reports filesystem '{}'", self, fs_name);
            Err(EnumError::Format(self.to_string()))
        }
    }
}

impl fmt::Display for VolumeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.root_label)
    }
}

fn unknown_volume(input: &str) -> EnumError {
    EnumError::Access(
        input.to_string(),
        std::io::Error::new(std::io::ErrorKind::NotFound, "unrecognized volume identifier"),
    )
}
