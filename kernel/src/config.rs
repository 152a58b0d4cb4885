// SPDX-License-Identifier: MPL-2.0

//! Build-time and boot-time knobs of the mount core.
//!
//! Which classes of file systems exist is decided by Cargo features
//! (`block_fs`, `mtd_fs` and `pseudo_fs`). The size of the inode namespace
//! is decided when the namespace is constructed.

/// The maximum length of a single path component.
pub const NAME_MAX: usize = 255;

/// The default number of inodes a namespace may hold, the root included.
pub const DEFAULT_MAX_INODES: usize = 256;

/// Limits of an [`InodeNamespace`].
///
/// [`InodeNamespace`]: crate::fs::namespace::InodeNamespace
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NamespaceConfig {
    /// Upper bound of live inodes, the root included.
    ///
    /// Reserving past this bound fails with `ENOMEM`, which is how an
    /// exhausted inode pool shows up on a memory-constrained target.
    pub max_inodes: usize,
    /// Upper bound of the length of one path component.
    pub max_name_len: usize,
}

impl NamespaceConfig {
    pub const fn new(max_inodes: usize, max_name_len: usize) -> Self {
        Self {
            max_inodes,
            max_name_len,
        }
    }
}

impl Default for NamespaceConfig {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_INODES, NAME_MAX)
    }
}

/// Returns whether file systems bound to block drivers are compiled in.
pub const fn block_fs_enabled() -> bool {
    cfg!(feature = "block_fs")
}

/// Returns whether file systems bound to MTD drivers are compiled in.
pub const fn mtd_fs_enabled() -> bool {
    cfg!(feature = "mtd_fs")
}

/// Returns whether driver-less file systems are compiled in.
pub const fn pseudo_fs_enabled() -> bool {
    cfg!(feature = "pseudo_fs")
}
