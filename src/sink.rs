//! Output sinks for reports and memory snapshots.
//!
//! Rendering happens outside any sink lock; sinks only move bytes. Report
//! text goes through [`OutputSink`]; periodic memory snapshots go through
//! [`SnapshotSink`], which receives the structured view so tests can assert
//! on it without parsing files.

use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::sync::Mutex;

use crate::memory::MemorySnapshot;

// ============================================================================
// OutputSink
// ============================================================================

/// Byte-level output destination shared across threads.
pub trait OutputSink: Send + Sync + 'static {
    /// Write one pre-formatted batch. Batches from different callers do not
    /// interleave at the byte level.
    fn write_all(&self, bytes: &[u8]);

    /// Flush buffered data to the OS.
    fn flush(&self);
}

/// Stdout sink with internal buffering.
#[derive(Default)]
pub struct StdoutSink;

impl StdoutSink {
    pub fn new() -> Self {
        Self
    }
}

impl OutputSink for StdoutSink {
    fn write_all(&self, bytes: &[u8]) {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        // BrokenPipe is the usual `emulator | head` ending; ignore it.
        let _ = out.write_all(bytes);
    }

    fn flush(&self) {
        let _ = io::stdout().flush();
    }
}

/// File sink: creates/truncates the file and buffers writes.
pub struct FileSink {
    out: Mutex<BufWriter<fs::File>>,
}

impl FileSink {
    /// # Errors
    ///
    /// Returns an error if the file cannot be created.
    pub fn create(path: impl AsRef<std::path::Path>) -> io::Result<Self> {
        let file = fs::File::create(path)?;
        Ok(Self {
            out: Mutex::new(BufWriter::new(file)),
        })
    }
}

impl OutputSink for FileSink {
    fn write_all(&self, bytes: &[u8]) {
        let mut out = self.out.lock().expect("file sink mutex poisoned");
        out.write_all(bytes).expect("file write failed");
    }

    fn flush(&self) {
        let mut out = self.out.lock().expect("file sink mutex poisoned");
        out.flush().expect("file flush failed");
    }
}

/// Test sink capturing bytes in memory.
#[derive(Default)]
pub struct VecSink {
    buf: Mutex<Vec<u8>>,
}

impl VecSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Extract captured bytes, leaving the buffer empty.
    pub fn take(&self) -> Vec<u8> {
        std::mem::take(&mut *self.buf.lock().expect("vec sink mutex poisoned"))
    }
}

impl OutputSink for VecSink {
    fn write_all(&self, bytes: &[u8]) {
        self.buf
            .lock()
            .expect("vec sink mutex poisoned")
            .extend_from_slice(bytes);
    }

    fn flush(&self) {}
}

// ============================================================================
// SnapshotSink
// ============================================================================

/// Destination for quantum-tagged memory snapshots.
pub trait SnapshotSink: Send + Sync + 'static {
    fn emit(&self, snapshot: &MemorySnapshot);
}

/// Sinks are shareable: an `Arc<S>` sinks wherever `S` does, which lets a
/// caller keep a handle on a sink it has handed to the scheduler.
impl<S: SnapshotSink> SnapshotSink for std::sync::Arc<S> {
    fn emit(&self, snapshot: &MemorySnapshot) {
        (**self).emit(snapshot);
    }
}

/// Writes each snapshot to `<dir>/memory_stamp_<quantum>.txt`.
///
/// Emission failures are reported to stderr and dropped; a full disk must
/// not take down the scheduler.
pub struct DirSnapshotSink {
    dir: PathBuf,
}

impl DirSnapshotSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl Default for DirSnapshotSink {
    fn default() -> Self {
        Self::new("memory_snapshots")
    }
}

impl SnapshotSink for DirSnapshotSink {
    fn emit(&self, snapshot: &MemorySnapshot) {
        let path = self.dir.join(format!("memory_stamp_{}.txt", snapshot.quantum));
        let result = fs::create_dir_all(&self.dir)
            .and_then(|()| fs::write(&path, snapshot.render()));
        if let Err(err) = result {
            eprintln!("snapshot: failed to write {}: {err}", path.display());
        }
    }
}

/// Test sink capturing structured snapshots.
#[derive(Default)]
pub struct VecSnapshotSink {
    snapshots: Mutex<Vec<MemorySnapshot>>,
}

impl VecSnapshotSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&self) -> Vec<MemorySnapshot> {
        std::mem::take(&mut *self.snapshots.lock().expect("snapshot sink mutex poisoned"))
    }

    pub fn len(&self) -> usize {
        self.snapshots.lock().expect("snapshot sink mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SnapshotSink for VecSnapshotSink {
    fn emit(&self, snapshot: &MemorySnapshot) {
        self.snapshots
            .lock()
            .expect("snapshot sink mutex poisoned")
            .push(snapshot.clone());
    }
}

/// Discards snapshots; the FCFS default, where no quantum ever rolls over.
#[derive(Default)]
pub struct NullSnapshotSink;

impl SnapshotSink for NullSnapshotSink {
    fn emit(&self, _snapshot: &MemorySnapshot) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryManager;

    #[test]
    fn vec_sink_captures_and_clears() {
        let sink = VecSink::new();
        sink.write_all(b"alpha ");
        sink.write_all(b"beta");
        assert_eq!(sink.take(), b"alpha beta");
        assert!(sink.take().is_empty());
    }

    #[test]
    fn file_sink_roundtrip() {
        let path = std::env::temp_dir().join(format!(
            "schedsim_sink_{}_{:?}.txt",
            std::process::id(),
            std::thread::current().id()
        ));
        {
            let sink = FileSink::create(&path).unwrap();
            sink.write_all(b"line1\n");
            sink.flush();
        }
        assert_eq!(fs::read_to_string(&path).unwrap(), "line1\n");
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn dir_snapshot_sink_writes_quantum_named_files() {
        let dir = std::env::temp_dir().join(format!(
            "schedsim_snaps_{}_{:?}",
            std::process::id(),
            std::thread::current().id()
        ));
        let sink = DirSnapshotSink::new(&dir);
        let mgr = MemoryManager::new(100, 40);
        sink.emit(&mgr.snapshot(5, "ts".to_string()));
        let text = fs::read_to_string(dir.join("memory_stamp_5.txt")).unwrap();
        assert!(text.starts_with("Timestamp: ts\n"));
        assert!(text.ends_with("----start---- = 0\n"));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn vec_snapshot_sink_collects() {
        let sink = VecSnapshotSink::new();
        let mgr = MemoryManager::new(100, 40);
        sink.emit(&mgr.snapshot(1, "a".to_string()));
        sink.emit(&mgr.snapshot(2, "b".to_string()));
        let snaps = sink.take();
        assert_eq!(snaps.len(), 2);
        assert_eq!(snaps[1].quantum, 2);
    }
}
