//! Utility functions and supporting infrastructure.
//!
//! Provides bitstream I/O, byte order helpers, error handling, parameter
//! pools and playback time synthesis.

pub mod bitstream_io;
pub mod byteorder;
pub mod errors;
pub mod pool;
pub mod timing;
