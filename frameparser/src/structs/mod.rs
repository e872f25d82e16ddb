//! Data structures representing bitstream and transform components.
//!
//! Contains header parsers for MPEG audio, ADTS and Theora, the stream and
//! frame parameter records built from them, reference frame bookkeeping and
//! the fixed-layout commands exchanged with the decode transform.

pub mod aac;
pub mod command;
pub mod frame;
pub mod mpeg_audio;
pub mod parameters;
pub mod reference_list;
pub mod theora;
