//! Per-frame dispatch
//!
//! The body of the callback registered with the capture session. The
//! delivery side guarantees at most one invocation at a time, but the
//! write path still synchronizes with key-listener state changes through
//! [`ControlState`]'s lock.

use std::sync::Arc;

use crate::capture::frame::{h264, Frame, StreamConfig};
use crate::constants::STATUS_FRAME_INTERVAL;
use crate::control::ControlState;

/// Routes arriving frames into the preview and record sinks
pub struct FrameDispatcher {
    state: Arc<ControlState>,
    config: StreamConfig,
}

impl FrameDispatcher {
    pub fn new(state: Arc<ControlState>, config: StreamConfig) -> Self {
        Self { state, config }
    }

    /// Handle one delivered frame.
    ///
    /// Runs on the delivery thread, so it must stay short and
    /// non-blocking, and the frame view must not outlive the call. After
    /// shutdown has been requested this is a no-op; frames in a foreign
    /// format are discarded silently. Sink write failures are already
    /// downgraded inside the forward path and never stop later frames.
    pub fn dispatch(&self, frame: Frame<'_>) {
        if !self.state.is_running() {
            return;
        }
        if frame.format != h264() {
            return;
        }

        self.state.forward_payload(frame.data);

        let count = self.state.next_frame();
        if count % STATUS_FRAME_INTERVAL == 0 {
            tracing::info!(
                "{} frames | {}x{} | s: toggle recording, q: quit",
                count,
                self.config.width,
                self.config.height,
            );
        }
    }
}
