//! Logging capability injected into the simulation context.
//!
//! Layers report through an [`EventLog`] rather than a process-wide logger.
//! The default sink forwards to the `log` facade; binaries install
//! `env_logger` to see the output.

use std::sync::{Arc, Mutex};

use log::Level;

pub trait EventLog {
    fn log(&self, level: Level, target: &str, message: &str);
}

/// Forwards every event to the `log` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogFacade;

impl EventLog for LogFacade {
    fn log(&self, level: Level, target: &str, message: &str) {
        log::log!(target: target, level, "{}", message);
    }
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullLog;

impl EventLog for NullLog {
    fn log(&self, _level: Level, _target: &str, _message: &str) {}
}

/// One recorded event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub level: Level,
    pub target: String,
    pub message: String,
}

/// Records events in memory. Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct MemoryLog {
    entries: Arc<Mutex<Vec<LogEntry>>>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        match self.entries.lock() {
            Ok(entries) => entries.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Entries whose message contains `needle`.
    pub fn matching(&self, needle: &str) -> Vec<LogEntry> {
        self.entries()
            .into_iter()
            .filter(|entry| entry.message.contains(needle))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventLog for MemoryLog {
    fn log(&self, level: Level, target: &str, message: &str) {
        let entry = LogEntry {
            level,
            target: target.to_string(),
            message: message.to_string(),
        };
        match self.entries.lock() {
            Ok(mut entries) => entries.push(entry),
            Err(poisoned) => poisoned.into_inner().push(entry),
        }
    }
}

/// Shared handle stored by the network and handed to each layer.
pub type SharedLog = Arc<dyn EventLog + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_log_clones_share_entries() {
        let log = MemoryLog::new();
        let handle = log.clone();
        handle.log(Level::Debug, "qnet::link", "attempt 1 failed");
        handle.log(Level::Info, "qnet::link", "request served");

        assert_eq!(log.len(), 2);
        assert_eq!(log.matching("attempt").len(), 1);
        assert_eq!(log.entries()[1].target, "qnet::link");
    }

    #[test]
    fn null_log_accepts_everything() {
        let log = NullLog;
        log.log(Level::Error, "qnet", "ignored");
        let facade = LogFacade;
        facade.log(Level::Trace, "qnet", "forwarded without a logger installed");
    }
}
