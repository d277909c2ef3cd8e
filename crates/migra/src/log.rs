//! The capture logger: forwards every line to `tracing` *and* buffers it so
//! the transcript can be persisted alongside a version's log row.

use std::sync::Mutex;
use tracing::Span;

#[cfg(windows)]
const EOL: &str = "\r\n";
#[cfg(not(windows))]
const EOL: &str = "\n";

/// Severity of a captured log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Trace,
    Info,
    Warn,
}

impl Level {
    fn prefix(self) -> &'static str {
        match self {
            Level::Trace => "[TRACE] ",
            Level::Info => "[INFO] ",
            Level::Warn => "[WARN] ",
        }
    }
}

/// A per-execution logger that interposes a `tracing::Span` and buffers
/// every line it forwards. `flush()` drains the buffer, joined by the
/// platform EOL, for persistence as a version log row's `log_text`.
///
/// All `is_*_enabled` queries report `true`: the buffer must capture
/// everything regardless of the ambient subscriber's filtering, since the
/// log row is part of the engine's contract, not a diagnostics nicety.
pub struct CaptureLogger {
    span: Span,
    buffer: Mutex<Vec<String>>,
}

impl CaptureLogger {
    /// Create a capture logger nested under `parent` as a child span named
    /// after `version_name`.
    pub fn new(parent: &Span, version_name: &str) -> Self {
        let span = tracing::info_span!(parent: parent, "version", name = %version_name);
        Self {
            span,
            buffer: Mutex::new(Vec::new()),
        }
    }

    pub fn trace(&self, message: impl AsRef<str>) {
        self.emit(Level::Trace, message.as_ref());
    }

    pub fn info(&self, message: impl AsRef<str>) {
        self.emit(Level::Info, message.as_ref());
    }

    pub fn warn(&self, message: impl AsRef<str>) {
        self.emit(Level::Warn, message.as_ref());
    }

    pub fn is_trace_enabled(&self) -> bool {
        true
    }

    pub fn is_info_enabled(&self) -> bool {
        true
    }

    pub fn is_warn_enabled(&self) -> bool {
        true
    }

    /// Drain the buffer, returning its contents joined by the platform EOL.
    pub fn flush(&self) -> String {
        let mut buffer = self.buffer.lock().expect("capture logger buffer poisoned");
        let text = buffer.join(EOL);
        buffer.clear();
        text
    }

    fn emit(&self, level: Level, message: &str) {
        let _entered = self.span.enter();
        match level {
            Level::Trace => tracing::trace!(target: "migra", "{message}"),
            Level::Info => tracing::info!(target: "migra", "{message}"),
            Level::Warn => tracing::warn!(target: "migra", "{message}"),
        }
        self.buffer
            .lock()
            .expect("capture logger buffer poisoned")
            .push(format!("{}{message}", level.prefix()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flush_joins_lines_and_resets() {
        let logger = CaptureLogger::new(&Span::none(), "v0001");
        logger.info("Execute SQL script: 01-init.sql");
        logger.trace("CREATE TABLE t(id int);");
        logger.warn("Skip script 'v0001:99-notes.txt' due unknown kind of script");

        let text = logger.flush();
        assert!(text.contains("[INFO] Execute SQL script: 01-init.sql"));
        assert!(text.contains("[TRACE] CREATE TABLE t(id int);"));
        assert!(text.contains("[WARN] Skip script 'v0001:99-notes.txt' due unknown kind of script"));

        assert_eq!(logger.flush(), "");
    }

    #[test]
    fn enabled_flags_always_true() {
        let logger = CaptureLogger::new(&Span::none(), "v0001");
        assert!(logger.is_trace_enabled());
        assert!(logger.is_info_enabled());
        assert!(logger.is_warn_enabled());
    }
}
