//! Integration tests for Reelway
//!
//! These tests drive the range server over a real loopback socket, together
//! with the session manager and the simulated engine, and check the HTTP
//! contract a player relies on.

#[path = "integration/common.rs"]
mod common;

#[path = "integration/range_serving.rs"]
mod range_serving;

#[path = "integration/session_streaming.rs"]
mod session_streaming;

#[path = "integration/playback_flow.rs"]
mod playback_flow;
