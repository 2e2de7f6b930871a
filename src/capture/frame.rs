//! Frame views and negotiated stream parameters

use v4l::FourCC;

/// FourCC of the H.264 frame-based format
pub fn h264() -> FourCC {
    FourCC::new(b"H264")
}

/// Stream parameters committed during negotiation, immutable afterwards
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Negotiated pixel/encoding format
    pub fourcc: FourCC,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Frames per second
    pub fps: u32,
}

/// One frame as handed over by the driver.
///
/// The payload is a borrowed view into a driver-owned buffer and is valid
/// only for the duration of one callback invocation; anything that outlives
/// the callback must copy it.
#[derive(Debug)]
pub struct Frame<'a> {
    /// Encoded payload, truncated to the driver-reported length
    pub data: &'a [u8],
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Format tag of this frame
    pub format: FourCC,
}

impl Frame<'_> {
    /// Payload length in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
