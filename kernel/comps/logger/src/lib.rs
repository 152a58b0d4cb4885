// SPDX-License-Identifier: MPL-2.0

//! The logging backend of the VFS mount core.
//!
//! The mount core only uses the macros of the `log` crate. Whoever embeds
//! it installs this backend once at startup with [`init`], passing the
//! global level, an optional filter list (see the format in the `filter`
//! module), and the function that puts lines on the console.

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

extern crate alloc;

use core::str::FromStr;

pub use log::LevelFilter;

pub use self::filter_logger::LogSink;
use self::filter::FilterList;

mod filter;
mod filter_logger;

/// Installs the logger.
///
/// Returns `false` if a logger was installed before, in which case this call
/// has no effect.
pub fn init(max_level: LevelFilter, filter_list: &str, sink: LogSink) -> bool {
    let filter = FilterList::parse(filter_list);
    let rejected = filter.rejected.clone();

    if !filter_logger::init(max_level, filter, sink) {
        return false;
    }
    for line in rejected {
        log::error!("Invalid logger filter entry: {}", line);
    }
    true
}

/// Parses a log level such as `"info"` or `"Debug"`.
///
/// Unknown names give `None`.
pub fn parse_level(level: &str) -> Option<LevelFilter> {
    LevelFilter::from_str(level.trim()).ok()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn levels() {
        assert_eq!(parse_level("info"), Some(LevelFilter::Info));
        assert_eq!(parse_level(" TRACE "), Some(LevelFilter::Trace));
        assert_eq!(parse_level("off"), Some(LevelFilter::Off));
        assert_eq!(parse_level("chatty"), None);
    }
}
