#![doc = include_str!("../README.md")]
//!
//! ## Technical Overview
//!
//! Frame parsing core for a hardware-assisted media pipeline. Coded buffers
//! arrive one frame at a time; the parser validates their headers, keeps the
//! stream configuration current and hands out self-describing frames that a
//! codec proxy turns into commands for an asynchronous decode transform.
//!
//! ### Supported Codecs
//!
//! - MPEG-1/2/2.5 audio, layers I to III, with multichannel extension headers
//! - AAC in ADTS framing
//! - Theora video
//!
//! ### Timing
//!
//! Every frame gets a presentation time in microseconds. Buffers without a
//! timestamp receive one predicted from the previous frame's duration, with
//! the rounding remainder carried so long runs do not drift.
//!
//! ## Quick Start
//!
//! 1. Slice an elementary stream into coded buffers using [`process::extract::Extractor`]
//! 2. Parse each buffer using [`process::parse::Parser`]
//! 3. Build transform commands using [`process::decode::CodecProxy`]
//!
//! ```rust,no_run
//! use std::collections::HashMap;
//!
//! use frameparser::process::decode::{CodecConfig, CodecProxy};
//! use frameparser::process::extract::Extractor;
//! use frameparser::process::parse::{Parser, ParserConfig};
//! use frameparser::structs::parameters::Codec;
//!
//! let mut extractor = Extractor::default();
//! let mut parser = Parser::new(Codec::MpegAudio, ParserConfig::default());
//! let proxy = CodecProxy::new(Codec::MpegAudio, CodecConfig::default());
//! let addresses: HashMap<u32, u64> = HashMap::new();
//!
//! extractor.push_bytes(&std::fs::read("stream.mp2")?);
//! extractor.finish();
//!
//! for buffer in extractor.by_ref() {
//!     match buffer {
//!         Ok(buffer) => {
//!             let Some(frame) = parser.read_headers(&buffer)? else {
//!                 continue;
//!             };
//!
//!             if frame.new_stream_parameters {
//!                 let configure = proxy
//!                     .fill_out_stream_parameter_command(frame.stream_parameters.attach())
//!                     .map_err(|(_, e)| e)?;
//!                 let _ = configure.to_bytes();
//!             }
//!
//!             let command = proxy.fill_out_decode_command(&frame, &addresses)?;
//!             let _ = command.to_bytes();
//!         }
//!         Err(extract_error) => {
//!             // Handle extraction errors - stream continues automatically
//!             eprintln!("Frame extraction error: {}", extract_error);
//!         }
//!     }
//! }
//! # Ok::<(), anyhow::Error>(())
//! ```

/// Processing stages for coded streams.
///
/// 1. **Frame Extraction** ([`process::extract`]): Slices elementary streams
///    into coded buffers using sync word detection.
///
/// 2. **Parsing** ([`process::parse`]): Validates headers, maintains stream
///    parameters and reference lists, and times each frame.
///
/// 3. **Command Building** ([`process::decode`]): Produces transform commands
///    and checks completion status.
pub mod process;

/// Data structures representing stream components.
///
/// - **MPEG Audio** ([`structs::mpeg_audio`]): Frame and extension headers
/// - **AAC** ([`structs::aac`]): ADTS headers
/// - **Theora** ([`structs::theora`]): Sequence and picture headers
/// - **Parameters** ([`structs::parameters`]): Stream and frame parameter records
/// - **Reference Lists** ([`structs::reference_list`]): Reference and golden frames
/// - **Frames** ([`structs::frame`]): Coded buffers and parsed frames
/// - **Commands** ([`structs::command`]): Transform command layouts
pub mod structs;

/// Utility functions and supporting infrastructure.
///
/// - **Bitstream I/O** ([`utils::bitstream_io`]): Bit-level reading
/// - **Error Handling** ([`utils::errors`]): Error types
/// - **Parameter Pools** ([`utils::pool`]): Reference-counted slot arenas
/// - **Timing** ([`utils::timing`]): Playback time synthesis
pub mod utils;
