// SPDX-License-Identifier: MPL-2.0

//! Per-scope log levels.
//!
//! A filter list is plain text, one entry per line. Empty lines and lines
//! starting with `//` are skipped. Three kinds of entries exist:
//!
//! ```text
//! module <module_path> <log_level>
//! file <file_path> <log_level>
//! line <file_path> <line_number> <log_level>
//! ```
//!
//! For instance, with `error` as the global level,
//!
//! ```text
//! module vfs_mount::fs::mount debug
//! ```
//!
//! still lets every `debug!` of the mount operation through, while the
//! namespace and the registry stay quiet.

use alloc::{
    string::{String, ToString},
    vec::Vec,
};
use core::str::FromStr;

use log::{LevelFilter, Record};

/// One entry of a filter list.
///
/// The first entry matching a record decides whether the record is logged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum FilterEntry {
    /// Overrides the level of a module and of its submodules.
    Module {
        module: String,
        log_level: LevelFilter,
    },
    /// Overrides the level of a source file.
    File { file: String, log_level: LevelFilter },
    /// Overrides the level of one line of a source file.
    Line {
        file: String,
        line_number: u32,
        log_level: LevelFilter,
    },
}

impl FilterEntry {
    /// Parses one line of a filter list.
    pub(crate) fn from_line(line: &str) -> Option<FilterEntry> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        match parts.as_slice() {
            ["module", module, level] => Some(FilterEntry::Module {
                module: module.to_string(),
                log_level: LevelFilter::from_str(level).ok()?,
            }),
            ["file", file, level] => Some(FilterEntry::File {
                file: file.to_string(),
                log_level: LevelFilter::from_str(level).ok()?,
            }),
            ["line", file, line_number, level] => Some(FilterEntry::Line {
                file: file.to_string(),
                line_number: line_number.parse().ok()?,
                log_level: LevelFilter::from_str(level).ok()?,
            }),
            _ => None,
        }
    }

    pub(crate) fn log_level(&self) -> LevelFilter {
        match self {
            FilterEntry::Module { log_level, .. }
            | FilterEntry::File { log_level, .. }
            | FilterEntry::Line { log_level, .. } => *log_level,
        }
    }

    /// Returns whether this entry covers `record`.
    pub(crate) fn matches(&self, record: &Record) -> bool {
        match self {
            FilterEntry::Module { module, .. } => record
                .module_path()
                .is_some_and(|path| is_module_or_submodule(path, module)),
            FilterEntry::File { file, .. } => record.file().is_some_and(|path| path == file),
            FilterEntry::Line {
                file, line_number, ..
            } => {
                record.line() == Some(*line_number)
                    && record.file().is_some_and(|path| path == file)
            }
        }
    }
}

fn is_module_or_submodule(path: &str, module: &str) -> bool {
    path.strip_prefix(module)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with("::"))
}

/// A parsed filter list.
#[derive(Debug)]
pub(crate) struct FilterList {
    pub(crate) entries: Vec<FilterEntry>,
    /// The most verbose level of all entries.
    pub(crate) max_level: LevelFilter,
    /// The lines that are not valid entries.
    pub(crate) rejected: Vec<String>,
}

impl FilterList {
    pub(crate) fn parse(text: &str) -> Self {
        let mut list = FilterList {
            entries: Vec::new(),
            max_level: LevelFilter::Off,
            rejected: Vec::new(),
        };

        for line in text.lines().map(str::trim) {
            if line.starts_with("//") || line.is_empty() {
                continue;
            }
            match FilterEntry::from_line(line) {
                Some(entry) => {
                    list.max_level = list.max_level.max(entry.log_level());
                    list.entries.push(entry);
                }
                None => list.rejected.push(line.to_string()),
            }
        }
        list
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_entries() {
        assert_eq!(
            FilterEntry::from_line("module vfs_mount::fs Debug"),
            Some(FilterEntry::Module {
                module: "vfs_mount::fs".to_string(),
                log_level: LevelFilter::Debug,
            })
        );
        assert_eq!(
            FilterEntry::from_line("file src/fs/mount.rs off"),
            Some(FilterEntry::File {
                file: "src/fs/mount.rs".to_string(),
                log_level: LevelFilter::Off,
            })
        );
        assert_eq!(
            FilterEntry::from_line("line  src/fs/mount.rs   42 trace"),
            Some(FilterEntry::Line {
                file: "src/fs/mount.rs".to_string(),
                line_number: 42,
                log_level: LevelFilter::Trace,
            })
        );
    }

    #[test]
    fn reject_malformed_entries() {
        assert_eq!(FilterEntry::from_line("module vfs_mount"), None);
        assert_eq!(FilterEntry::from_line("module vfs_mount loud"), None);
        assert_eq!(FilterEntry::from_line("line src/lib.rs x info"), None);
        assert_eq!(FilterEntry::from_line("crate vfs_mount info"), None);
    }

    #[test]
    fn parse_list() {
        let list = FilterList::parse(
            "// quiet the namespace\n\
             module vfs_mount::fs::namespace error\n\
             \n\
             module vfs_mount::fs::mount debug\n\
             nonsense\n",
        );
        assert_eq!(list.entries.len(), 2);
        assert_eq!(list.max_level, LevelFilter::Debug);
        assert_eq!(list.rejected, ["nonsense"]);

        assert_eq!(FilterList::parse("").max_level, LevelFilter::Off);
    }

    #[test]
    fn module_prefix_stops_at_path_separator() {
        assert!(is_module_or_submodule("vfs_mount::fs", "vfs_mount::fs"));
        assert!(is_module_or_submodule("vfs_mount::fs::mount", "vfs_mount::fs"));
        assert!(!is_module_or_submodule("vfs_mount::fsck", "vfs_mount::fs"));
        assert!(!is_module_or_submodule("vfs_mount", "vfs_mount::fs"));
    }
}
