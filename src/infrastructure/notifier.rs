use crate::infrastructure::error::InfraError;
use std::io::Write;
use std::sync::Mutex;

/// User-facing side effects fired on timer transitions. Both are
/// best-effort: callers log failures and carry on.
pub trait Notifier: Send + Sync {
    fn notify(&self, title: &str, body: &str) -> Result<(), InfraError>;
    fn play_cue(&self) -> Result<(), InfraError>;
}

/// Writes notifications to a terminal stream and rings the bell as the cue.
pub struct TerminalNotifier<W> {
    out: Mutex<W>,
}

impl TerminalNotifier<std::io::Stderr> {
    pub fn stderr() -> Self {
        Self::new(std::io::stderr())
    }
}

impl<W: Write + Send> TerminalNotifier<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    fn write_bytes(&self, bytes: &[u8]) -> Result<(), InfraError> {
        let mut out = self
            .out
            .lock()
            .map_err(|error| InfraError::Io(std::io::Error::other(format!("notifier lock poisoned: {error}"))))?;
        out.write_all(bytes)?;
        out.flush()?;
        Ok(())
    }
}

impl<W: Write + Send> Notifier for TerminalNotifier<W> {
    fn notify(&self, title: &str, body: &str) -> Result<(), InfraError> {
        self.write_bytes(format!("[{title}] {body}\n").as_bytes())
    }

    fn play_cue(&self) -> Result<(), InfraError> {
        self.write_bytes(b"\x07")
    }
}
