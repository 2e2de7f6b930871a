//! Process lifecycle: startup staging, shutdown signal, ordered teardown
//!
//! The lifecycle is monotonic: INIT -> DEVICE_OPEN -> STREAMING ->
//! STOPPING -> CLOSED, with no back-transitions. STOPPING is entered by
//! an interrupt signal or the q key; recording is an orthogonal sub-state
//! that only matters while streaming.

use std::sync::Arc;
use std::thread;

use crate::capture::frame::StreamConfig;
use crate::capture::session::DeviceSession;
use crate::constants::{RECORD_FILE, SHUTDOWN_POLL_INTERVAL};
use crate::control::ControlState;
use crate::dispatch::FrameDispatcher;
use crate::error::CaptureError;
use crate::keys::KeyListener;
use crate::sink::PreviewSink;
use crate::Result;

/// Run the capture pipeline to completion.
///
/// Errors before streaming begins are fatal and propagate to the caller;
/// once streaming is up, failures are downgraded and teardown always
/// attempts every remaining step.
pub fn run() -> Result<()> {
    let mut session = DeviceSession::open()?;
    let config = session.negotiate()?;

    let preview = PreviewSink::spawn()?;
    let state = Arc::new(ControlState::new(Box::new(preview), RECORD_FILE));

    {
        // Signal context: one atomic store and nothing else
        let state = Arc::clone(&state);
        ctrlc::set_handler(move || state.request_shutdown())
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
    }

    let keys = KeyListener::spawn(Arc::clone(&state))?;

    let result = stream_until_shutdown(&mut session, &state, &config);

    // Teardown, strictly ordered and best-effort: delivery stops before
    // any sink it writes to is closed, and the device is released last.
    state.request_shutdown();
    session.stop_streaming();
    while let Some(e) = session.take_error() {
        tracing::warn!("{}", e);
    }
    state.close_record();
    state.close_preview();
    keys.join();
    session.close();

    tracing::info!(frames = state.frame_count(), "exited cleanly");
    result
}

/// Start frame delivery and park the main thread in a bounded-interval
/// poll until shutdown is requested by signal or keystroke.
fn stream_until_shutdown(
    session: &mut DeviceSession,
    state: &Arc<ControlState>,
    config: &StreamConfig,
) -> Result<()> {
    let dispatcher = FrameDispatcher::new(Arc::clone(state), config.clone());
    session.start_streaming(config, move |frame| dispatcher.dispatch(frame))?;
    tracing::info!("streaming started; press s to toggle recording, q to quit");

    while state.is_running() {
        if let Some(e) = session.take_error() {
            match e {
                // The delivery thread never came up: fatal, as if
                // streaming had failed to start
                e @ CaptureError::StreamStart(_) => return Err(e.into()),
                e => tracing::warn!("{}", e),
            }
        }
        thread::sleep(SHUTDOWN_POLL_INTERVAL);
    }

    tracing::info!("stopping");
    Ok(())
}
