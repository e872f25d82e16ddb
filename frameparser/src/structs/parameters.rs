//! Stream and frame parameter records.
//!
//! Stream parameters live for a configuration epoch and are shared by every
//! frame of that epoch. Frame parameters are created fresh for each coded
//! frame. Both are allocated from [`ParameterPool`](crate::utils::pool::ParameterPool)s
//! and frozen before any frame descriptor refers to them.

use std::fmt::{Display, Formatter};

use crate::structs::aac::{AdtsHeader, AudioObjectType};
use crate::structs::mpeg_audio::{ChannelMode, MpegAudioFrameHeader, MpegStandard};
use crate::structs::reference_list::PictureType;
use crate::structs::theora::{PixelFormat, Rational, TheoraIdentification, TheoraSequenceHeader};

pub const DEFAULT_STREAM_PARAMETER_POOL_SIZE: usize = 32;
pub const DEFAULT_FRAME_PARAMETER_POOL_SIZE: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Codec {
    MpegAudio,
    Aac,
    Theora,
}

impl Codec {
    pub fn name(self) -> &'static str {
        match self {
            Codec::MpegAudio => "MPEG audio",
            Codec::Aac => "AAC",
            Codec::Theora => "Theora",
        }
    }

    pub fn is_video(self) -> bool {
        self == Codec::Theora
    }
}

impl Display for Codec {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MpegAudioStreamParameters {
    pub layer: u8,
    /// Standard of the epoch's first frame. A version change within one
    /// layer does not start a new epoch; per-frame headers carry the rest.
    pub standard: MpegStandard,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AacStreamParameters {
    pub object_type: AudioObjectType,
    pub sampling_frequency_index: u8,
    pub sampling_frequency: u32,
    pub channel_configuration: u8,
    pub audio_specific_config: [u8; 2],
}

impl AacStreamParameters {
    pub fn from_header(header: &AdtsHeader) -> Self {
        Self {
            object_type: header.object_type,
            sampling_frequency_index: header.sampling_frequency_index,
            sampling_frequency: header.sampling_frequency,
            channel_configuration: header.channel_configuration,
            audio_specific_config: header.audio_specific_config(),
        }
    }

    /// Whether `header` starts a new configuration epoch.
    pub fn differs_from(&self, header: &AdtsHeader) -> bool {
        self.object_type != header.object_type
            || self.sampling_frequency_index != header.sampling_frequency_index
            || self.channel_configuration != header.channel_configuration
    }
}

/// A complete Theora sequence: the decoded identification header and the
/// three header packets as received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TheoraStreamParameters {
    pub identification: TheoraIdentification,
    pub info_header: Vec<u8>,
    pub comment_header: Vec<u8>,
    pub setup_header: Vec<u8>,
}

impl TheoraStreamParameters {
    /// Freezes an assembled sequence; `None` until all three headers are present.
    pub fn from_sequence(sequence: &TheoraSequenceHeader) -> Option<Self> {
        if !sequence.sequence_header_present() {
            return None;
        }

        Some(Self {
            identification: sequence.identification.clone()?,
            info_header: sequence.info_header.clone(),
            comment_header: sequence.comment_header.clone(),
            setup_header: sequence.setup_header.clone(),
        })
    }

    pub fn frame_rate(&self) -> Rational {
        self.identification.frame_rate
    }

    pub fn pixel_format(&self) -> PixelFormat {
        self.identification.pixel_format
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamParameters {
    MpegAudio(MpegAudioStreamParameters),
    Aac(AacStreamParameters),
    Theora(TheoraStreamParameters),
}

impl StreamParameters {
    pub fn codec(&self) -> Codec {
        match self {
            StreamParameters::MpegAudio(_) => Codec::MpegAudio,
            StreamParameters::Aac(_) => Codec::Aac,
            StreamParameters::Theora(_) => Codec::Theora,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MpegAudioFrameParameters {
    pub header: MpegAudioFrameHeader,
    /// Bytes of the extension header that trails the frame, if any.
    pub extension_length: usize,
}

impl MpegAudioFrameParameters {
    pub fn frame_size(&self) -> usize {
        self.header.length + self.extension_length
    }

    pub fn channel_mode(&self) -> ChannelMode {
        self.header.channel_mode
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AacFrameParameters {
    pub header: AdtsHeader,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TheoraFrameParameters {
    pub picture_type: PictureType,
    pub coded_length: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameParameters {
    MpegAudio(MpegAudioFrameParameters),
    Aac(AacFrameParameters),
    Theora(TheoraFrameParameters),
}

impl FrameParameters {
    pub fn codec(&self) -> Codec {
        match self {
            FrameParameters::MpegAudio(_) => Codec::MpegAudio,
            FrameParameters::Aac(_) => Codec::Aac,
            FrameParameters::Theora(_) => Codec::Theora,
        }
    }

    /// Samples per channel carried by an audio frame.
    pub fn sample_count(&self) -> Option<u32> {
        match self {
            FrameParameters::MpegAudio(p) => Some(p.header.number_of_samples),
            FrameParameters::Aac(p) => Some(p.header.number_of_samples),
            FrameParameters::Theora(_) => None,
        }
    }

    pub fn sampling_frequency(&self) -> Option<u32> {
        match self {
            FrameParameters::MpegAudio(p) => Some(p.header.sampling_frequency),
            FrameParameters::Aac(p) => Some(p.header.sampling_frequency),
            FrameParameters::Theora(_) => None,
        }
    }

    pub fn bit_rate(&self) -> Option<u32> {
        match self {
            FrameParameters::MpegAudio(p) => Some(p.header.bit_rate),
            _ => None,
        }
    }

    pub fn picture_type(&self) -> Option<PictureType> {
        match self {
            FrameParameters::Theora(p) => Some(p.picture_type),
            _ => None,
        }
    }
}
