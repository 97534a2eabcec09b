//! Where execution unit output goes.

use std::io::Write;
use std::sync::Mutex;

use tracing::warn;

/// Receives raw log bytes from execution units.
pub trait LogSink: Send + Sync {
    fn write(&self, chunk: &[u8]);
}

/// Writes to the process's standard output.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutSink;

impl LogSink for StdoutSink {
    fn write(&self, chunk: &[u8]) {
        let mut out = std::io::stdout().lock();
        if let Err(e) = out.write_all(chunk).and_then(|_| out.flush()) {
            warn!(error = %e, "couldn't write logs to stdout");
        }
    }
}

/// Collects everything written, for inspection.
#[derive(Debug, Default)]
pub struct BufferSink {
    buf: Mutex<Vec<u8>>,
}

impl BufferSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        match self.buf.lock() {
            Ok(buf) => String::from_utf8_lossy(&buf).into_owned(),
            Err(poisoned) => String::from_utf8_lossy(&poisoned.into_inner()).into_owned(),
        }
    }
}

impl LogSink for BufferSink {
    fn write(&self, chunk: &[u8]) {
        match self.buf.lock() {
            Ok(mut buf) => buf.extend_from_slice(chunk),
            Err(poisoned) => poisoned.into_inner().extend_from_slice(chunk),
        }
    }
}
