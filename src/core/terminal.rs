//! Terminal trait.

use std::io;
use std::sync::Arc;

/// Reads the current `(columns, rows)` of the output device. Callable from
/// any thread; the resize watcher holds one.
pub type SizeProbe = Arc<dyn Fn() -> io::Result<(u16, u16)> + Send + Sync>;

/// The descriptors a program draws on.
///
/// Only the terminal controller holds a `Terminal`; mode snapshots are
/// single-writer.
pub trait Terminal: Send {
    /// Snapshot the current input/output modes and switch to raw mode.
    fn enter_raw_mode(&mut self) -> io::Result<()>;

    /// Restore the snapshot taken by `enter_raw_mode`, consuming it.
    ///
    /// Each descriptor is restored independently; one without a snapshot
    /// is skipped. Calling this again, or before `enter_raw_mode`, is a
    /// no-op. A snapshot that failed to apply is kept for the next call.
    fn restore_mode(&mut self) -> io::Result<()>;

    fn write(&mut self, data: &str) -> io::Result<()>;

    fn size_probe(&self) -> Option<SizeProbe>;
}
