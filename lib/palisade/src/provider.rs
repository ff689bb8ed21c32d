// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Providers let the engine run in different contexts by plugging
//! implementations of core services into it. Today that is only
//! logging: a unit test wants `println!`, a long-running host wants
//! a structured logger. If a service doesn't have at least two
//! obvious implementations, it probably doesn't need to be a
//! provider.

use alloc::boxed::Box;
use core::fmt;
use core::fmt::Display;

/// The set of all platform-specific providers required by the engine.
pub struct Providers {
    pub log: Box<dyn LogProvider>,
}

/// A logging provider provides the means to log messages to some
/// destination based on the context in which the engine is running.
///
/// Logging levels are provided by [`LogLevel`]. These levels will map
/// to the underlying provider with varying degrees of success.
pub trait LogProvider: Send + Sync {
    /// Log a message at the specified level.
    fn log(&self, level: LogLevel, msg: &str);
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LogLevel {
    Note,
    Warn,
    Error,
}

impl Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let level_s = match self {
            Self::Note => "[NOTE]",
            Self::Warn => "[WARN]",
            Self::Error => "[ERROR]",
        };
        write!(f, "{level_s}")
    }
}

#[derive(Clone, Copy)]
pub struct PrintlnLog;

impl LogProvider for PrintlnLog {
    fn log(&self, level: LogLevel, msg: &str) {
        println!("{level} {msg}");
    }
}

/// Forward engine messages to a [`slog::Logger`].
pub struct SlogLog {
    log: slog::Logger,
}

impl SlogLog {
    pub fn new(log: slog::Logger) -> Self {
        Self { log }
    }

    /// A logger writing to the terminal through an async drain.
    #[cfg(feature = "std")]
    pub fn terminal() -> Self {
        use slog::Drain;

        let decorator = slog_term::TermDecorator::new().build();
        let drain = slog_term::FullFormat::new(decorator).build().fuse();
        let drain = slog_async::Async::new(drain).build().fuse();
        let root =
            slog::Logger::root(drain, slog::o!("component" => "palisade"));
        Self::new(root)
    }
}

impl LogProvider for SlogLog {
    fn log(&self, level: LogLevel, msg: &str) {
        match level {
            LogLevel::Note => slog::info!(self.log, "{}", msg),
            LogLevel::Warn => slog::warn!(self.log, "{}", msg),
            LogLevel::Error => slog::error!(self.log, "{}", msg),
        }
    }
}

impl Providers {
    pub fn println() -> Self {
        Self { log: Box::new(PrintlnLog) }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use alloc::string::String;
    use alloc::string::ToString;
    use alloc::sync::Arc;
    use std::sync::Mutex;

    struct VecDrain(Arc<Mutex<Vec<String>>>);

    impl slog::Drain for VecDrain {
        type Ok = ();
        type Err = slog::Never;

        fn log(
            &self,
            record: &slog::Record,
            _values: &slog::OwnedKVList,
        ) -> Result<(), slog::Never> {
            let line = format!("{} {}", record.level(), record.msg());
            self.0.lock().unwrap().push(line);
            Ok(())
        }
    }

    #[test]
    fn slog_levels() {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let root = slog::Logger::root(VecDrain(lines.clone()), slog::o!());
        let log = SlogLog::new(root);

        log.log(LogLevel::Note, "rules loaded");
        log.log(LogLevel::Warn, "bad batch");
        log.log(LogLevel::Error, "oops");

        let lines = lines.lock().unwrap();
        assert_eq!(
            *lines,
            vec![
                "INFO rules loaded".to_string(),
                "WARN bad batch".to_string(),
                "ERRO oops".to_string(),
            ]
        );
    }

    #[test]
    fn level_display() {
        assert_eq!(LogLevel::Warn.to_string(), "[WARN]");
    }
}
