//! Reelway Web - loopback range server
//!
//! Serves the file of the active download session to a local player with
//! byte-range support, never sending bytes that have not been downloaded,
//! and coordinates resolution, download and readiness into one playable URL.

pub mod handlers;
pub mod playback;
pub mod server;
pub mod streaming;

// Re-export main types
pub use handlers::{RangeSpec, StreamError, parse_range_header};
pub use playback::{PlaybackCoordinator, PlaybackError, PlaybackTarget};
pub use server::{RangeServer, RunningServer};
