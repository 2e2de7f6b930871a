//! Video capture subsystem: device discovery, frame views, and the
//! streaming session

pub mod device;
pub mod frame;
pub mod session;

pub use frame::{Frame, StreamConfig};
pub use session::DeviceSession;
