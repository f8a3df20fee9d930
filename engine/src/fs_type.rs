//! Destination filesystem classification.
//!
//! The destination's filesystem decides two things: which file names must be
//! rewritten (see `sanitize`) and whether range-based flushing is available.
//! Both are looked up in a small rule table keyed by `FileSystemType`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::volume::VolumeProbe;

/// Coarse filesystem family of a destination volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileSystemType {
    Ntfs,
    /// FAT12/16/32 and exFAT
    Fat,
    /// ext2/3/4 and XFS
    PosixExtended,
    Generic,
}

/// Per-filesystem behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FsRules {
    /// Windows naming rules apply (reserved device names, forbidden glyphs)
    pub restricted_names: bool,

    /// The kernel's range flush can start writeback early and wait on it
    pub range_flush: bool,
}

const NTFS_RULES: FsRules = FsRules {
    restricted_names: true,
    range_flush: false,
};

const FAT_RULES: FsRules = FsRules {
    restricted_names: true,
    range_flush: false,
};

const POSIX_EXTENDED_RULES: FsRules = FsRules {
    restricted_names: false,
    range_flush: true,
};

const GENERIC_RULES: FsRules = FsRules {
    restricted_names: false,
    range_flush: false,
};

impl FileSystemType {
    /// Classify a filesystem type name as reported by the mount table.
    pub fn from_name(name: &str) -> Self {
        let name = name.trim().to_lowercase();
        match name.as_str() {
            "ntfs" | "ntfs3" => FileSystemType::Ntfs,
            "vfat" | "fat" | "fat32" | "msdos" | "exfat" => FileSystemType::Fat,
            _ if name.starts_with("ext") || name.starts_with("xfs") => {
                FileSystemType::PosixExtended
            }
            _ => FileSystemType::Generic,
        }
    }

    /// Classify the volume holding `path`. Unknown volumes are `Generic`.
    pub fn detect(probe: &dyn VolumeProbe, path: &Path) -> Self {
        match probe.filesystem_name(path) {
            Some(name) => Self::from_name(&name),
            None => FileSystemType::Generic,
        }
    }

    pub fn rules(self) -> &'static FsRules {
        match self {
            FileSystemType::Ntfs => &NTFS_RULES,
            FileSystemType::Fat => &FAT_RULES,
            FileSystemType::PosixExtended => &POSIX_EXTENDED_RULES,
            FileSystemType::Generic => &GENERIC_RULES,
        }
    }

    pub fn restricted_names(self) -> bool {
        self.rules().restricted_names
    }

    pub fn supports_range_flush(self) -> bool {
        self.rules().range_flush
    }
}

impl fmt::Display for FileSystemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileSystemType::Ntfs => write!(f, "NTFS"),
            FileSystemType::Fat => write!(f, "FAT"),
            FileSystemType::PosixExtended => write!(f, "ext/xfs"),
            FileSystemType::Generic => write!(f, "generic"),
        }
    }
}
