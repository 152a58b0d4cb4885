// SPDX-License-Identifier: MPL-2.0

use alloc::vec::Vec;
use core::{
    fmt::Arguments,
    sync::atomic::{AtomicUsize, Ordering},
};

use log::{LevelFilter, Metadata, Record};
use spin::{Mutex, Once};

use crate::filter::{FilterEntry, FilterList};

/// Where formatted log lines go.
pub type LogSink = fn(Arguments);

/// A logger with per-scope levels.
///
/// Records are checked against the filter entries first; the first entry
/// covering a record decides. Records no entry covers are checked against
/// the global max level.
///
/// Each line is numbered, so that interleaved output of several CPUs can be
/// put back in order.
pub(super) struct FilterLogger {
    filter: Vec<FilterEntry>,
    global_max_level: LevelFilter,
    filter_max_level: LevelFilter,
    sink: LogSink,
    sequence: AtomicUsize,
}

impl FilterLogger {
    pub(super) fn new(global_max_level: LevelFilter, filter: FilterList, sink: LogSink) -> Self {
        Self {
            filter: filter.entries,
            global_max_level,
            filter_max_level: filter.max_level,
            sink,
            sequence: AtomicUsize::new(0),
        }
    }

    fn filter(&self, record: &Record) -> bool {
        let max_level = self
            .filter
            .iter()
            .find(|entry| entry.matches(record))
            .map_or(self.global_max_level, FilterEntry::log_level);
        record.metadata().level() <= max_level
    }

    /// The level the `log` facade must let through.
    ///
    /// It is relaxed to the most verbose filter entry, unless logging is off.
    pub(super) fn facade_max_level(&self) -> LevelFilter {
        if self.global_max_level == LevelFilter::Off {
            LevelFilter::Off
        } else {
            self.global_max_level.max(self.filter_max_level)
        }
    }

    fn set_global(&'static self) -> bool {
        if log::set_logger(self).is_err() {
            return false;
        }
        log::set_max_level(self.facade_max_level());
        true
    }
}

pub(super) static LOGGER: Once<FilterLogger> = Once::new();

impl log::Log for FilterLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.filter(record) {
            return;
        }

        // Use a global lock to prevent interleaving of log messages.
        static RECORD_LOCK: Mutex<()> = Mutex::new(());
        let _lock = RECORD_LOCK.lock();

        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let level = record.level();
        let sink = self.sink;

        cfg_if::cfg_if! {
            if #[cfg(feature = "log_color")] {
                use owo_colors::Style;

                let sequence_style = Style::new().green();
                let record_style = Style::new().default_color();
                let level_style = match level {
                    log::Level::Error => Style::new().red(),
                    log::Level::Warn => Style::new().bright_yellow(),
                    log::Level::Info => Style::new().blue(),
                    log::Level::Debug => Style::new().bright_green(),
                    log::Level::Trace => Style::new().bright_black(),
                };

                sink(format_args!(
                    "{} {:<5}: {}\n",
                    sequence_style.style(format_args!("[{:>8}]", sequence)),
                    level_style.style(level),
                    record_style.style(record.args())
                ));
            } else {
                sink(format_args!(
                    "{} {:<5}: {}\n",
                    format_args!("[{:>8}]", sequence),
                    level,
                    record.args()
                ));
            }
        }
    }

    fn flush(&self) {}
}

/// Installs the logger, unless one is already installed.
pub(super) fn init(global_max_level: LevelFilter, filter: FilterList, sink: LogSink) -> bool {
    let mut installed = false;
    LOGGER.call_once(|| {
        installed = true;
        FilterLogger::new(global_max_level, filter, sink)
    });
    installed && LOGGER.get().is_some_and(FilterLogger::set_global)
}
