//! Shared control state
//!
//! The one piece of mutable state shared by the main thread, the frame
//! delivery thread, and the key listener. The running flag and frame
//! counter are atomics; the recording flag and both sink handles live
//! behind a single mutex so that `recording == true` always implies an
//! open record sink, and so that no writer can race a close.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::error::SinkError;
use crate::sink::{RecordSink, Sink};

/// Sink table guarded by one lock.
///
/// Invariant: `recording` is true iff `record` is `Some` whenever the lock
/// is released.
struct Sinks {
    recording: bool,
    record: Option<RecordSink>,
    preview: Option<Box<dyn Sink>>,
}

/// Synchronized state driving all three threads
pub struct ControlState {
    running: AtomicBool,
    frames: AtomicU64,
    record_path: PathBuf,
    sinks: Mutex<Sinks>,
}

impl ControlState {
    /// Create the state with an open preview sink and the record file path
    /// used on toggle-on
    pub fn new(preview: Box<dyn Sink>, record_path: impl Into<PathBuf>) -> Self {
        Self {
            running: AtomicBool::new(true),
            frames: AtomicU64::new(0),
            record_path: record_path.into(),
            sinks: Mutex::new(Sinks {
                recording: false,
                record: None,
                preview: Some(preview),
            }),
        }
    }

    /// Snapshot of the running flag
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Request shutdown. Idempotent, and safe to call from a signal
    /// handler: a single atomic store, no allocation, no I/O.
    pub fn request_shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Snapshot of the recording flag
    pub fn is_recording(&self) -> bool {
        self.sinks.lock().recording
    }

    /// Flip recording on or off, returning the new state.
    ///
    /// Toggle-on creates (truncates) the record file; on failure the state
    /// stays off and the error is returned for the caller to report.
    /// Toggle-off flushes and closes the file. Both transitions are atomic
    /// with respect to the frame write path.
    pub fn toggle_recording(&self) -> Result<bool, SinkError> {
        let mut sinks = self.sinks.lock();

        if sinks.recording {
            if let Some(mut record) = sinks.record.take() {
                if let Err(e) = record.finish() {
                    tracing::warn!("error closing record file: {}", e);
                }
            }
            sinks.recording = false;
            Ok(false)
        } else {
            match RecordSink::create(&self.record_path) {
                Ok(record) => {
                    sinks.record = Some(record);
                    sinks.recording = true;
                    Ok(true)
                }
                Err(e) => Err(SinkError::RecordOpen(
                    self.record_path.display().to_string(),
                    e.to_string(),
                )),
            }
        }
    }

    /// Write one frame payload to the preview sink and, while recording,
    /// to the record sink.
    ///
    /// Write failures are downgraded to warnings; they never propagate and
    /// never stop later frames. Holding the sink lock for the whole write
    /// is what makes a write-after-close impossible.
    pub fn forward_payload(&self, payload: &[u8]) {
        let mut sinks = self.sinks.lock();

        if let Some(preview) = sinks.preview.as_mut() {
            if let Err(e) = preview.write_frame(payload) {
                tracing::warn!("preview write failed: {}", e);
            }
        }

        if sinks.recording {
            if let Some(record) = sinks.record.as_mut() {
                if let Err(e) = record.write_frame(payload) {
                    tracing::warn!("record write failed: {}", e);
                }
            }
        }
    }

    /// Close the record sink if open. Idempotent.
    pub fn close_record(&self) {
        let mut sinks = self.sinks.lock();
        if let Some(mut record) = sinks.record.take() {
            if let Err(e) = record.finish() {
                tracing::warn!("error closing record file: {}", e);
            }
        }
        sinks.recording = false;
    }

    /// Close the preview sink if open. Idempotent.
    pub fn close_preview(&self) {
        let mut sinks = self.sinks.lock();
        if let Some(mut preview) = sinks.preview.take() {
            if let Err(e) = preview.finish() {
                tracing::warn!("error closing preview sink: {}", e);
            }
        }
    }

    /// Path of the record file used on toggle-on
    pub fn record_path(&self) -> &std::path::Path {
        &self.record_path
    }

    /// Count one delivered frame, returning the new total
    pub fn next_frame(&self) -> u64 {
        self.frames.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Total frames counted so far
    pub fn frame_count(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::test_support::MemorySink;
    use proptest::prelude::*;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static TEST_SEQ: AtomicUsize = AtomicUsize::new(0);

    fn temp_record_path() -> PathBuf {
        let n = TEST_SEQ.fetch_add(1, Ordering::SeqCst);
        std::env::temp_dir().join(format!(
            "uvc-capture-control-{}-{}.h264",
            std::process::id(),
            n
        ))
    }

    fn new_state() -> (ControlState, MemorySink, PathBuf) {
        let preview = MemorySink::new();
        let path = temp_record_path();
        let state = ControlState::new(Box::new(preview.clone()), path.clone());
        (state, preview, path)
    }

    #[test]
    fn test_shutdown_idempotent() {
        let (state, _, _) = new_state();
        assert!(state.is_running());
        state.request_shutdown();
        assert!(!state.is_running());
        state.request_shutdown();
        assert!(!state.is_running());
    }

    #[test]
    fn test_toggle_flips_state_and_sink_presence() {
        let (state, _, path) = new_state();

        assert!(!state.is_recording());
        assert!(!path.exists());

        assert!(state.toggle_recording().unwrap());
        assert!(state.is_recording());
        assert!(path.exists());

        assert!(!state.toggle_recording().unwrap());
        assert!(!state.is_recording());

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_toggle_on_failure_leaves_recording_off() {
        let preview = MemorySink::new();
        let bad_path = std::env::temp_dir()
            .join("uvc-capture-no-such-dir")
            .join("out.h264");
        let state = ControlState::new(Box::new(preview), bad_path);

        assert!(state.toggle_recording().is_err());
        assert!(!state.is_recording());

        // Pipeline keeps working: forwarding does not panic or record
        state.forward_payload(&[1, 2, 3]);
        assert!(!state.is_recording());
    }

    #[test]
    fn test_no_record_bytes_while_off() {
        let (state, preview, path) = new_state();

        state.forward_payload(&[1, 2, 3]);
        state.forward_payload(&[4, 5]);

        assert_eq!(preview.contents(), vec![1, 2, 3, 4, 5]);
        assert!(!path.exists(), "record file must not be created while off");
    }

    #[test]
    fn test_record_matches_arrival_order_between_toggles() {
        let (state, preview, path) = new_state();

        state.forward_payload(&[0xAA]);
        state.toggle_recording().unwrap();
        state.forward_payload(&[1, 2]);
        state.forward_payload(&[3]);
        state.toggle_recording().unwrap();
        state.forward_payload(&[0xBB]);

        assert_eq!(std::fs::read(&path).unwrap(), vec![1, 2, 3]);
        // Preview saw everything regardless of recording state
        assert_eq!(preview.contents(), vec![0xAA, 1, 2, 3, 0xBB]);

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_file_size_stable_after_toggle_off() {
        let (state, _, path) = new_state();

        state.toggle_recording().unwrap();
        state.forward_payload(&[7; 16]);
        state.toggle_recording().unwrap();

        let size = std::fs::metadata(&path).unwrap().len();
        state.forward_payload(&[8; 16]);
        state.forward_payload(&[9; 16]);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), size);

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_closed_sinks_receive_nothing() {
        let (state, preview, path) = new_state();

        state.toggle_recording().unwrap();
        state.forward_payload(&[1]);

        state.close_record();
        state.close_preview();
        state.close_record();
        state.close_preview();

        state.forward_payload(&[2, 3, 4]);

        assert_eq!(std::fs::read(&path).unwrap(), vec![1]);
        assert_eq!(preview.contents(), vec![1]);

        std::fs::remove_file(&path).unwrap();
    }

    #[derive(Debug, Clone)]
    enum Op {
        Toggle,
        Frame(Vec<u8>),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            Just(Op::Toggle),
            prop::collection::vec(any::<u8>(), 1..32).prop_map(Op::Frame),
        ]
    }

    proptest! {
        /// After any prefix of toggles, `recording` equals the parity of
        /// toggle-ons seen so far, and the record file holds exactly the
        /// payloads forwarded while recording was on (current session).
        #[test]
        fn prop_toggle_parity_and_record_content(ops in prop::collection::vec(op_strategy(), 0..24)) {
            let (state, _, path) = new_state();
            let mut model_recording = false;
            let mut session_bytes: Vec<u8> = Vec::new();

            for op in &ops {
                match op {
                    Op::Toggle => {
                        let now = state.toggle_recording().unwrap();
                        model_recording = !model_recording;
                        prop_assert_eq!(now, model_recording);
                        if model_recording {
                            session_bytes.clear();
                        }
                    }
                    Op::Frame(payload) => {
                        state.forward_payload(payload);
                        if model_recording {
                            session_bytes.extend_from_slice(payload);
                        }
                    }
                }
                prop_assert_eq!(state.is_recording(), model_recording);
            }

            if model_recording {
                prop_assert_eq!(std::fs::read(&path).unwrap(), session_bytes);
            }
            let _ = std::fs::remove_file(&path);
        }
    }
}
