//! Byte sinks for encoded frames
//!
//! Two destinations exist for the captured elementary stream: the preview
//! player's stdin pipe and the record file. Both are only ever touched
//! under [`crate::control::ControlState`]'s lock, which is what serializes
//! writes against closes.

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};

use crate::error::SinkError;

/// A destination for encoded frame payloads.
///
/// `finish` releases the underlying resource and is idempotent; writing
/// after `finish` fails with `BrokenPipe`.
pub trait Sink: Send {
    /// Write one frame payload in full
    fn write_frame(&mut self, payload: &[u8]) -> io::Result<()>;

    /// Flush and release the sink
    fn finish(&mut self) -> io::Result<()>;
}

/// External preview process consuming raw H.264 on stdin.
///
/// The player is launched once at startup with a fixed argument list and
/// fed every frame as it arrives.
pub struct PreviewSink {
    child: Child,
    stdin: Option<ChildStdin>,
    bytes_sent: u64,
    reaped: bool,
}

impl PreviewSink {
    /// Launch the preview player
    pub fn spawn() -> Result<Self, SinkError> {
        let mut child = Command::new("ffplay")
            .args([
                "-f",
                "h264",
                "-i",
                "-",
                "-hide_banner",
                "-loglevel",
                "error",
                "-window_title",
                "UVC H.264 Preview",
            ])
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| SinkError::PreviewSpawn(e.to_string()))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| SinkError::PreviewSpawn("no stdin pipe".to_string()))?;

        tracing::info!("preview player started");

        Ok(Self {
            child,
            stdin: Some(stdin),
            bytes_sent: 0,
            reaped: false,
        })
    }

    /// Total bytes forwarded to the player
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }
}

impl Sink for PreviewSink {
    fn write_frame(&mut self, payload: &[u8]) -> io::Result<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| io::Error::from(io::ErrorKind::BrokenPipe))?;
        stdin.write_all(payload)?;
        self.bytes_sent += payload.len() as u64;
        Ok(())
    }

    fn finish(&mut self) -> io::Result<()> {
        // Dropping stdin sends EOF before the process is reaped
        drop(self.stdin.take());

        if !self.reaped {
            self.reaped = true;
            let _ = self.child.kill();
            self.child.wait()?;
            tracing::debug!(bytes = self.bytes_sent, "preview player stopped");
        }
        Ok(())
    }
}

impl Drop for PreviewSink {
    fn drop(&mut self) {
        let _ = self.finish();
    }
}

/// Fixed-name record file, truncated on every toggle-on.
///
/// Writes are unbuffered so each payload reaches the kernel before the
/// frame callback returns.
pub struct RecordSink {
    file: Option<File>,
    path: PathBuf,
    bytes_written: u64,
}

impl RecordSink {
    /// Create (truncate) the record file
    pub fn create(path: &Path) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            file: Some(file),
            path: path.to_path_buf(),
            bytes_written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Total bytes written so far
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }
}

impl Sink for RecordSink {
    fn write_frame(&mut self, payload: &[u8]) -> io::Result<()> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| io::Error::from(io::ErrorKind::BrokenPipe))?;
        file.write_all(payload)?;
        self.bytes_written += payload.len() as u64;
        Ok(())
    }

    fn finish(&mut self) -> io::Result<()> {
        if let Some(mut file) = self.file.take() {
            file.flush()?;
            tracing::info!(
                path = %self.path.display(),
                bytes = self.bytes_written,
                "record file closed"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! In-memory sink used by dispatcher and control tests

    use super::Sink;
    use std::io;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    pub struct MemorySink {
        pub data: Arc<Mutex<Vec<u8>>>,
        pub fail_writes: Arc<AtomicBool>,
        pub finished: Arc<AtomicBool>,
    }

    impl MemorySink {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn contents(&self) -> Vec<u8> {
            self.data.lock().unwrap().clone()
        }
    }

    impl Sink for MemorySink {
        fn write_frame(&mut self, payload: &[u8]) -> io::Result<()> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(io::Error::from(io::ErrorKind::Other));
            }
            if self.finished.load(Ordering::SeqCst) {
                return Err(io::Error::from(io::ErrorKind::BrokenPipe));
            }
            self.data.lock().unwrap().extend_from_slice(payload);
            Ok(())
        }

        fn finish(&mut self) -> io::Result<()> {
            self.finished.store(true, Ordering::SeqCst);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("uvc-capture-{}-{}", std::process::id(), name))
    }

    #[test]
    fn test_record_sink_writes_in_order() {
        let path = temp_path("order.h264");
        let mut sink = RecordSink::create(&path).unwrap();

        sink.write_frame(&[1, 2, 3]).unwrap();
        sink.write_frame(&[4, 5]).unwrap();
        assert_eq!(sink.bytes_written(), 5);
        sink.finish().unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), vec![1, 2, 3, 4, 5]);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_record_sink_truncates_on_create() {
        let path = temp_path("truncate.h264");
        let mut sink = RecordSink::create(&path).unwrap();
        sink.write_frame(&[0xFF; 64]).unwrap();
        sink.finish().unwrap();

        let sink = RecordSink::create(&path).unwrap();
        drop(sink);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_record_sink_rejects_writes_after_finish() {
        let path = temp_path("closed.h264");
        let mut sink = RecordSink::create(&path).unwrap();
        sink.write_frame(&[9]).unwrap();
        sink.finish().unwrap();

        let err = sink.write_frame(&[10]).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::BrokenPipe);

        // Second finish is a no-op
        sink.finish().unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), vec![9]);
        std::fs::remove_file(&path).unwrap();
    }
}
