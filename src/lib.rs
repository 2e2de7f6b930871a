//! # UVC H.264 Capture
//!
//! Real-time capture of an already-encoded H.264 elementary stream from a
//! UVC camera, with live preview through an external player and toggled
//! raw-stream recording.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                            MAIN THREAD                               │
//! │   open device ─► negotiate H.264 ─► spawn preview ─► spawn keys      │
//! │        │                                                             │
//! │        ▼                                                             │
//! │   start streaming ─► wait loop (1s poll on running) ─► teardown      │
//! └────────┬─────────────────────────────────────────────────┬───────────┘
//!          │                                                 │
//!          ▼                                                 ▼
//! ┌───────────────────────┐                     ┌────────────────────────┐
//! │  FRAME DELIVERY       │                     │  KEY LISTENER          │
//! │  (capture::session)   │                     │  (keys)                │
//! │  ┌─────────────────┐  │                     │  raw terminal mode     │
//! │  │ V4L2 mmap       │  │                     │  100ms bounded poll    │
//! │  │ dequeue loop    │  │                     │  s/S: toggle record    │
//! │  └───────┬─────────┘  │                     │  q/Q: shutdown         │
//! │          ▼            │                     └───────────┬────────────┘
//! │  FrameDispatcher      │                                 │
//! │  (dispatch)           │                                 │
//! └──────────┬────────────┘                                 │
//!            │              ┌───────────────────┐           │
//!            └─────────────►│   ControlState    │◄──────────┘
//!                           │   (control)       │
//!                           │  running flag     │
//!                           │  frame counter    │
//!                           │  ┌─────────────┐  │
//!                           │  │ sink table  │  │ one mutex: recording
//!                           │  │ preview ────┼──┼─► ffplay stdin
//!                           │  │ record  ────┼──┼─► output.h264
//!                           │  └─────────────┘  │
//!                           └───────────────────┘
//! ```
//!
//! All three actors share exactly one piece of mutable state,
//! [`control::ControlState`]. Every write to a sink and every close of a
//! sink happens under the same lock, so a payload can never reach a sink
//! that has been torn down.

pub mod capture;
pub mod control;
pub mod dispatch;
pub mod error;
pub mod keys;
pub mod runtime;
pub mod sink;

pub use error::{Error, Result};

/// Application-wide constants
pub mod constants {
    use std::time::Duration;

    /// Fixed name of the record file, truncated on every toggle-on
    pub const RECORD_FILE: &str = "output.h264";

    /// Emit a status line every this many delivered H.264 frames
    pub const STATUS_FRAME_INTERVAL: u64 = 30;

    /// Bounded poll interval for the keyboard listener
    pub const KEY_POLL_INTERVAL: Duration = Duration::from_millis(100);

    /// Bounded poll interval for the main thread's shutdown wait loop
    pub const SHUTDOWN_POLL_INTERVAL: Duration = Duration::from_secs(1);

    /// Fallback resolution when the device advertises no discrete frame size
    pub const DEFAULT_WIDTH: u32 = 640;
    pub const DEFAULT_HEIGHT: u32 = 480;

    /// Fallback frame rate when the device advertises no discrete interval
    pub const DEFAULT_FPS: u32 = 30;

    /// Number of memory-mapped capture buffers to queue with the driver
    pub const STREAM_BUFFER_COUNT: u32 = 4;
}
