//! Capture session lifecycle and frame delivery
//!
//! Wraps one opened V4L2 device through its whole life: format
//! negotiation, the frame-delivery thread, and the final release. The
//! delivery model is inversion of control: a registered callback is
//! invoked once per dequeued buffer from a thread the application does
//! not own, until [`DeviceSession::stop_streaming`] is called.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver};
use v4l::buffer::Type;
use v4l::frameinterval::FrameIntervalEnum;
use v4l::framesize::FrameSizeEnum;
use v4l::io::traits::CaptureStream;
use v4l::prelude::MmapStream;
use v4l::video::capture::Parameters;
use v4l::video::Capture;
use v4l::{Device, Format, FourCC};

use crate::capture::device::open_first_capture_device;
use crate::capture::frame::{h264, Frame, StreamConfig};
use crate::constants::{DEFAULT_FPS, DEFAULT_HEIGHT, DEFAULT_WIDTH, STREAM_BUFFER_COUNT};
use crate::error::{CaptureError, DeviceError, Error, FormatError};

/// One capture device session: created once at startup, destroyed exactly
/// once at shutdown, never reopened within a run.
///
/// While streaming, the delivery thread owns the device handle and returns
/// it on join, so the final [`close`](Self::close) is the unique release
/// point.
pub struct DeviceSession {
    device: Option<Device>,
    device_path: PathBuf,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<Device>>,
    error_rx: Option<Receiver<CaptureError>>,
}

impl DeviceSession {
    /// Open the first available capture device
    pub fn open() -> Result<Self, DeviceError> {
        let picked = open_first_capture_device()?;

        Ok(Self {
            device: Some(picked.device),
            device_path: picked.path,
            running: Arc::new(AtomicBool::new(false)),
            worker: None,
            error_rx: None,
        })
    }

    /// Node path of the opened device
    pub fn device_path(&self) -> &std::path::Path {
        &self.device_path
    }

    /// Negotiate the H.264 frame-based stream configuration.
    ///
    /// Pixel formats such as MJPEG or YUYV are rejected outright, never
    /// downgraded to. Resolution and rate come from the device's first
    /// advertised discrete descriptor, falling back to 640x480@30.
    pub fn negotiate(&self) -> Result<StreamConfig, Error> {
        let device = self.device.as_ref().ok_or(CaptureError::AlreadyStreaming)?;

        let formats = device
            .enum_formats()
            .map_err(|e| FormatError::ControlRejected(e.to_string()))?;
        let offered: Vec<FourCC> = formats.iter().map(|f| f.fourcc).collect();
        let fourcc = select_encoding(&offered)?;

        let sizes = device
            .enum_framesizes(fourcc)
            .map(discrete_sizes)
            .unwrap_or_default();
        let (width, height) = pick_resolution(&sizes);

        let rates = device
            .enum_frameintervals(fourcc, width, height)
            .map(discrete_rates)
            .unwrap_or_default();
        let fps = pick_frame_rate(&rates);

        let applied = device
            .set_format(&Format::new(width, height, fourcc))
            .map_err(|e| FormatError::ControlRejected(e.to_string()))?;
        if applied.fourcc != fourcc {
            // The driver silently substituted another format
            return Err(FormatError::Unsupported(applied.fourcc.to_string()).into());
        }

        device
            .set_params(&Parameters::with_fps(fps))
            .map_err(|e| FormatError::ControlRejected(e.to_string()))?;

        tracing::info!(
            width = applied.width,
            height = applied.height,
            fps,
            format = %applied.fourcc,
            "stream control negotiated"
        );

        Ok(StreamConfig {
            fourcc,
            width: applied.width,
            height: applied.height,
            fps,
        })
    }

    /// Register `on_frame` and start asynchronous delivery.
    ///
    /// Returns immediately; the delivery thread invokes `on_frame` once
    /// per frame until [`stop_streaming`](Self::stop_streaming). The
    /// callback must not retain the frame view past the invocation.
    /// Failures inside the delivery thread surface through
    /// [`take_error`](Self::take_error).
    pub fn start_streaming<F>(&mut self, config: &StreamConfig, mut on_frame: F) -> Result<(), Error>
    where
        F: FnMut(Frame<'_>) + Send + 'static,
    {
        if self.worker.is_some() {
            return Err(CaptureError::AlreadyStreaming.into());
        }
        let mut device = self.device.take().ok_or(CaptureError::AlreadyStreaming)?;

        let (error_tx, error_rx) = bounded::<CaptureError>(16);
        self.error_rx = Some(error_rx);

        let running = Arc::clone(&self.running);
        running.store(true, Ordering::SeqCst);

        let config = config.clone();

        let handle = thread::Builder::new()
            .name("frame-delivery".to_string())
            .spawn(move || {
                let mut stream = match MmapStream::with_buffers(
                    &mut device,
                    Type::VideoCapture,
                    STREAM_BUFFER_COUNT,
                ) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = error_tx.try_send(CaptureError::StreamStart(e.to_string()));
                        return device;
                    }
                };

                while running.load(Ordering::Relaxed) {
                    match stream.next() {
                        Ok((buf, meta)) => {
                            let len = (meta.bytesused as usize).min(buf.len());
                            if len == 0 {
                                continue;
                            }
                            on_frame(Frame {
                                data: &buf[..len],
                                width: config.width,
                                height: config.height,
                                format: config.fourcc,
                            });
                        }
                        Err(e) => {
                            let _ = error_tx.try_send(CaptureError::StreamRead(e.to_string()));
                            break;
                        }
                    }
                }

                drop(stream);
                device
            })
            .map_err(|e| CaptureError::StreamStart(e.to_string()))?;

        self.worker = Some(handle);
        Ok(())
    }

    /// Whether the delivery thread is active
    pub fn is_streaming(&self) -> bool {
        self.worker.is_some()
    }

    /// Pop one pending delivery-thread error, if any
    pub fn take_error(&self) -> Option<CaptureError> {
        self.error_rx.as_ref().and_then(|rx| rx.try_recv().ok())
    }

    /// Halt delivery and block until any in-flight callback invocation has
    /// returned. No-op when not streaming; idempotent.
    pub fn stop_streaming(&mut self) {
        self.running.store(false, Ordering::SeqCst);

        if let Some(handle) = self.worker.take() {
            match handle.join() {
                Ok(device) => {
                    self.device = Some(device);
                    tracing::debug!("frame delivery stopped");
                }
                Err(_) => tracing::error!("frame delivery thread panicked"),
            }
        }
    }

    /// Release the device handle. Consumes the session so the release
    /// happens exactly once.
    pub fn close(mut self) {
        self.stop_streaming();
        if let Some(device) = self.device.take() {
            drop(device);
            tracing::info!(path = %self.device_path.display(), "capture device released");
        }
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        self.stop_streaming();
    }
}

/// Pick the H.264 frame-based encoding from the device's offer, rejecting
/// pixel formats outright
fn select_encoding(offered: &[FourCC]) -> Result<FourCC, FormatError> {
    let wanted = h264();
    if offered.contains(&wanted) {
        return Ok(wanted);
    }

    let listing = if offered.is_empty() {
        "none".to_string()
    } else {
        offered
            .iter()
            .map(|f| f.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    };
    Err(FormatError::Unsupported(listing))
}

fn discrete_sizes(sizes: Vec<v4l::framesize::FrameSize>) -> Vec<(u32, u32)> {
    sizes
        .into_iter()
        .filter_map(|fs| match fs.size {
            FrameSizeEnum::Discrete(d) => Some((d.width, d.height)),
            FrameSizeEnum::Stepwise(_) => None,
        })
        .collect()
}

fn pick_resolution(sizes: &[(u32, u32)]) -> (u32, u32) {
    sizes
        .first()
        .copied()
        .unwrap_or((DEFAULT_WIDTH, DEFAULT_HEIGHT))
}

fn discrete_rates(intervals: Vec<v4l::frameinterval::FrameInterval>) -> Vec<u32> {
    intervals
        .into_iter()
        .filter_map(|fi| match fi.interval {
            FrameIntervalEnum::Discrete(frac) if frac.numerator > 0 => {
                Some(frac.denominator / frac.numerator)
            }
            _ => None,
        })
        .collect()
}

fn pick_frame_rate(rates: &[u32]) -> u32 {
    rates
        .iter()
        .copied()
        .find(|rate| *rate > 0)
        .unwrap_or(DEFAULT_FPS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_encoding_accepts_h264() {
        let offered = [FourCC::new(b"MJPG"), FourCC::new(b"H264")];
        assert_eq!(select_encoding(&offered).unwrap(), h264());
    }

    #[test]
    fn test_select_encoding_rejects_pixel_formats() {
        let offered = [FourCC::new(b"MJPG"), FourCC::new(b"YUYV")];
        let err = select_encoding(&offered).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("MJPG"));
        assert!(msg.contains("YUYV"));
    }

    #[test]
    fn test_select_encoding_rejects_empty_offer() {
        assert!(select_encoding(&[]).is_err());
    }

    #[test]
    fn test_pick_resolution_prefers_first_discrete() {
        assert_eq!(pick_resolution(&[(1920, 1080), (640, 480)]), (1920, 1080));
    }

    #[test]
    fn test_pick_resolution_falls_back_to_default() {
        assert_eq!(pick_resolution(&[]), (DEFAULT_WIDTH, DEFAULT_HEIGHT));
    }

    #[test]
    fn test_pick_frame_rate_skips_zero_and_falls_back() {
        assert_eq!(pick_frame_rate(&[0, 25, 30]), 25);
        assert_eq!(pick_frame_rate(&[]), DEFAULT_FPS);
        assert_eq!(pick_frame_rate(&[0]), DEFAULT_FPS);
    }
}
