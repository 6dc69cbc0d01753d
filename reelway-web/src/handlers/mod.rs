//! HTTP request handlers for the range server

pub mod range;
pub mod stream;

pub use range::{RangeSpec, extract_range_header, parse_range_header};
pub use stream::{StreamError, stream_bound_file};
