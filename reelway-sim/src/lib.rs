//! Reelway Simulation - a download engine without a swarm.
//!
//! [`LocalFileEngine`] "downloads" a media file that already exists on disk
//! by copying it into the session save directory at a configurable,
//! jittered rate. It emits the same events a real engine would, so the
//! session manager, range server and readiness policy can be exercised end
//! to end during development.

pub mod engine;
pub mod magnet;

pub use engine::LocalFileEngine;
pub use magnet::magnet_for_file;
