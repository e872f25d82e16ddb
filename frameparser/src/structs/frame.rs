//! Coded buffers entering the frame parser and the descriptors leaving it.

use std::sync::Arc;

use crate::structs::parameters::{FrameParameters, StreamParameters};
use crate::structs::reference_list::DecodeReferences;
use crate::utils::pool::Shared;
use crate::utils::timing::FrameTime;

/// Discontinuity markers set by the collator on the first buffer after a jump.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Discontinuity {
    pub first_after_jump: bool,
    pub surplus_data_injected: bool,
    pub continuous_reverse_jump: bool,
}

impl Discontinuity {
    pub fn jump() -> Self {
        Self {
            first_after_jump: true,
            ..Default::default()
        }
    }

    /// Whether playback time history must be discarded.
    pub fn invalidates_timing(&self) -> bool {
        self.first_after_jump && !self.continuous_reverse_jump
    }
}

/// One coded frame as sliced by the collator.
///
/// Times are in the stream's native time base.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodedBuffer {
    pub data: Arc<[u8]>,
    pub playback_time: Option<u64>,
    pub decode_time: Option<u64>,
    pub discontinuity: Discontinuity,
}

impl CodedBuffer {
    pub fn new(data: impl Into<Arc<[u8]>>) -> Self {
        Self {
            data: data.into(),
            playback_time: None,
            decode_time: None,
            discontinuity: Discontinuity::default(),
        }
    }

    pub fn with_playback_time(mut self, native: u64) -> Self {
        self.playback_time = Some(native);
        self
    }

    pub fn with_decode_time(mut self, native: u64) -> Self {
        self.decode_time = Some(native);
        self
    }

    pub fn with_discontinuity(mut self, discontinuity: Discontinuity) -> Self {
        self.discontinuity = discontinuity;
        self
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl AsRef<[u8]> for CodedBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

/// A frame that is ready to decode.
///
/// Holds its own claims on the stream and frame parameters, so it stays
/// self-describing even if it is discarded before reaching the decoder.
#[derive(Debug, Clone)]
pub struct ParsedFrame {
    /// Assigned in parse order, starting at 0, only to successfully parsed frames.
    pub display_frame_index: u64,
    /// Identifies the decoded picture in reference lists and buffer maps.
    pub decode_frame_index: u32,
    pub playback_time: FrameTime,
    /// Decode time in microseconds, when the buffer carried one.
    pub decode_time: Option<u64>,
    pub key_frame: bool,
    pub new_stream_parameters: bool,
    pub references: Option<DecodeReferences>,
    pub stream_parameters: Shared<StreamParameters>,
    pub frame_parameters: Shared<FrameParameters>,
    pub coded: CodedBuffer,
}

impl ParsedFrame {
    /// Normalized playback time in microseconds, `None` when unknown.
    pub fn normalized_playback_time(&self) -> Option<u64> {
        self.playback_time.time
    }

    pub fn reference_indices(&self) -> Option<[u32; 2]> {
        self.references
            .map(|references| references.resolve(self.decode_frame_index))
    }
}
