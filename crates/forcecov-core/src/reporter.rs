//! Human-readable run output
//!
//! Deploy reports and test summaries are written here rather than through
//! `tracing`, so they stay readable on a CI console and can be captured in tests.

use parking_lot::Mutex;
use std::io::Write;
use std::sync::Arc;

/// Line-oriented sink for the run report
#[derive(Clone)]
pub struct Reporter {
    sink: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl Reporter {
    /// Report to stdout
    #[must_use]
    pub fn stdout() -> Self {
        Self::from_writer(std::io::stdout())
    }

    /// Report to any writer
    #[must_use]
    pub fn from_writer(writer: impl Write + Send + 'static) -> Self {
        Self {
            sink: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    /// Report into memory
    #[must_use]
    pub fn capture() -> (Self, CapturedOutput) {
        let captured = CapturedOutput::default();
        (Self::from_writer(captured.clone()), captured)
    }

    /// Write one line
    pub fn line(&self, text: impl AsRef<str>) {
        let mut sink = self.sink.lock();
        if let Err(e) = writeln!(sink, "{}", text.as_ref()) {
            tracing::warn!("Failed to write report output: {}", e);
        }
    }

    /// Write a block of text, one line at a time
    pub fn block(&self, text: &str) {
        for line in text.lines() {
            self.line(line);
        }
    }

    /// Flush the sink
    pub fn flush(&self) {
        if let Err(e) = self.sink.lock().flush() {
            tracing::warn!("Failed to flush report output: {}", e);
        }
    }
}

impl Default for Reporter {
    fn default() -> Self {
        Self::stdout()
    }
}

impl std::fmt::Debug for Reporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reporter").finish_non_exhaustive()
    }
}

/// In-memory report output
#[derive(Debug, Clone, Default)]
pub struct CapturedOutput {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl CapturedOutput {
    /// Everything written so far
    #[must_use]
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.buf.lock()).into_owned()
    }
}

impl Write for CapturedOutput {
    fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
        self.buf.lock().extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
