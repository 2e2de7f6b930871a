//! UVC H.264 capture application
//!
//! Captures an encoded H.264 stream from the first UVC camera, previews
//! it through ffplay, and records to a file on demand.

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting UVC H.264 capture");

    uvc_h264_capture::runtime::run()?;
    Ok(())
}
