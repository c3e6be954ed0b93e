use std::collections::HashSet;
use std::fmt::Display;
use std::fs::File;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{info, warn, LevelFilter};
use simplelog::{ColorChoice, CombinedLogger, ConfigBuilder, SharedLogger, TermLogger, TerminalMode, WriteLogger};

static LOGGER_INSTALLED: AtomicBool = AtomicBool::new(false);

/// Install the terminal + file logger. Returns false if a logger was already set.
///
/// If the log file cannot be created the terminal logger is installed alone.
pub fn init_logger(log_path: &Path) -> bool {
    if LOGGER_INSTALLED.swap(true, Ordering::SeqCst) {
        return false;
    }

    let config = ConfigBuilder::new()
        .set_time_offset_to_local()
        .unwrap_or_else(|builder| builder)
        .build();

    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
        LevelFilter::Info,
        config.clone(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )];

    let file_error = match File::create(log_path) {
        Ok(file) => {
            loggers.push(WriteLogger::new(LevelFilter::Info, config, file));
            None
        }
        Err(e) => Some(e),
    };

    if CombinedLogger::init(loggers).is_err() {
        return false;
    }

    match file_error {
        None => info!("[LOG] Log file created at: {:?}", log_path),
        Some(e) => warn!("[LOG] Could not create {:?} ({}), logging to terminal only", log_path, e),
    }
    true
}

/// A latch for messages that should appear once per condition, not once per frame.
#[derive(Debug, Default, Clone)]
pub struct LogOnce {
    fired: bool,
}

impl LogOnce {
    pub const fn new() -> Self {
        Self { fired: false }
    }

    /// True the first time it is called after construction or `rearm`.
    pub fn fire(&mut self) -> bool {
        !std::mem::replace(&mut self.fired, true)
    }

    pub fn rearm(&mut self) {
        self.fired = false;
    }

    pub fn has_fired(&self) -> bool {
        self.fired
    }
}

/// Remembers which guest addresses have already been reported as failing.
#[derive(Debug, Default)]
pub struct FailureLog {
    reported: HashSet<u32>,
}

impl FailureLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// True if `addr` has not been reported before.
    pub fn first_failure(&mut self, addr: u32) -> bool {
        self.reported.insert(addr)
    }

    /// Warn under `tag` the first time `addr` fails. Returns whether it logged.
    pub fn warn_once(&mut self, tag: &str, name: &str, addr: u32, error: impl Display) -> bool {
        let first = self.first_failure(addr);
        if first {
            warn!("{}", failure_message(tag, name, &error));
        }
        first
    }

    pub fn clear(&mut self) {
        self.reported.clear();
    }
}

fn failure_message(tag: &str, name: &str, error: &dyn Display) -> String {
    format!("[{}] {} skipped: {}", tag, name, error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_once_fires_until_rearmed() {
        let mut latch = LogOnce::new();
        assert!(latch.fire());
        assert!(!latch.fire());
        assert!(latch.has_fired());
        latch.rearm();
        assert!(latch.fire());
    }

    #[test]
    fn failure_log_reports_each_address_once() {
        let mut failures = FailureLog::new();
        assert!(failures.first_failure(0x8038_9C3E));
        assert!(!failures.first_failure(0x8038_9C3E));
        assert!(failures.first_failure(0x8038_9C48));
        failures.clear();
        assert!(failures.first_failure(0x8038_9C3E));
    }

    #[test]
    fn failure_warnings_carry_the_subsystem_tag() {
        let mut failures = FailureLog::new();
        assert!(failures.warn_once("PERF", "Lag reduction", 0x8038_9D00, "out of bounds"));
        assert!(!failures.warn_once("PERF", "Lag reduction", 0x8038_9D00, "out of bounds"));
        assert_eq!(
            failure_message("FOG", "Draw distance", &"detached"),
            "[FOG] Draw distance skipped: detached"
        );
    }
}
