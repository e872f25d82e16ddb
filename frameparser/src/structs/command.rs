//! Fixed-layout structures exchanged with the decode transform.
//!
//! Commands are written little-endian in field order through
//! [`ToBytes`](frameparser_macros::ToBytes). Booleans occupy 32 bits.

use frameparser_macros::ToBytes;

use crate::impl_u32_enum;
use crate::utils::byteorder::{WriteBytesLe, to_le_bytes};

/// Transform selected for a stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(u32)]
pub enum DecoderId {
    #[default]
    None = 0,
    MpegLayer12 = 0x0100,
    Mp3 = 0x0101,
    Aac = 0x0200,
    Theora = 0x0400,
}

impl_u32_enum!(DecoderId);

impl DecoderId {
    pub fn for_mpeg_layer(layer: u8) -> Self {
        if layer == 3 {
            DecoderId::Mp3
        } else {
            DecoderId::MpegLayer12
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(u32)]
pub enum CommandKind {
    #[default]
    SetGlobalParams = 1,
    Transform = 2,
}

impl_u32_enum!(CommandKind);

/// Picture coding type as the transform expects it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(u32)]
pub enum PictureCoding {
    #[default]
    None = 0,
    Intra = 1,
    Inter = 2,
}

impl_u32_enum!(PictureCoding);

pub const SAMPLING_FREQUENCY_CODE_UNKNOWN: u32 = 0xFF;

/// Firmware sampling frequency codes.
const SAMPLING_FREQUENCY_CODES: [(u32, u32); 15] = [
    (48000, 0),
    (44100, 1),
    (32000, 2),
    (96000, 4),
    (88200, 5),
    (64000, 6),
    (192000, 8),
    (176400, 9),
    (128000, 10),
    (12000, 16),
    (11025, 17),
    (8000, 18),
    (24000, 20),
    (22050, 21),
    (16000, 22),
];

pub fn sampling_frequency_code(hz: u32) -> Option<u32> {
    SAMPLING_FREQUENCY_CODES
        .iter()
        .find(|(frequency, _)| *frequency == hz)
        .map(|(_, code)| *code)
}

pub fn sampling_frequency_from_code(code: u32) -> Option<u32> {
    SAMPLING_FREQUENCY_CODES
        .iter()
        .find(|(_, c)| *c == code)
        .map(|(frequency, _)| *frequency)
}

/// Decoder-wide configuration, derived from stream parameters alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, ToBytes)]
pub struct GlobalParams {
    pub struct_size: u32,
    pub decoder_id: DecoderId,
    pub crc_check: bool,
    pub multichannel: bool,
    pub free_format: bool,
    pub sampling_frequency_code: u32,
    pub channel_configuration: u32,
    pub audio_specific_config: [u8; 4],
    pub coded_width: u32,
    pub coded_height: u32,
    pub display_width: u32,
    pub display_height: u32,
    pub pixel_format: u32,
    pub frame_rate_numerator: u32,
    pub frame_rate_denominator: u32,
}

impl GlobalParams {
    pub const SIZE: u32 = 60;

    pub fn to_bytes(&self) -> Vec<u8> {
        to_le_bytes(self)
    }
}

/// A header blob padded to the capacity of its firmware buffer.
#[derive(Debug, Clone, Default, PartialEq, Eq, ToBytes)]
pub struct HeaderBlob {
    pub length: u32,
    pub data: Vec<u8>,
}

impl HeaderBlob {
    pub fn padded(bytes: &[u8], capacity: usize) -> Self {
        let mut data = bytes.to_vec();
        data.resize(capacity.max(bytes.len()), 0);
        Self {
            length: bytes.len() as u32,
            data,
        }
    }
}

/// Configures the transform for a new set of stream parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, ToBytes)]
pub struct StreamParameterCommand {
    pub kind: CommandKind,
    pub global: GlobalParams,
    pub info_header: HeaderBlob,
    pub comment_header: HeaderBlob,
    pub setup_header: HeaderBlob,
}

impl StreamParameterCommand {
    pub fn to_bytes(&self) -> Vec<u8> {
        to_le_bytes(self)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ToBytes)]
pub struct BufferDescriptor {
    pub address: u64,
    pub size: u32,
}

/// Decodes one frame.
#[derive(Debug, Clone, Default, PartialEq, Eq, ToBytes)]
pub struct DecodeCommand {
    pub kind: CommandKind,
    pub decode_frame_index: u32,
    pub coded_data_length: u32,
    pub playback_time: u64,
    pub picture_coding: PictureCoding,
    pub expected_sample_count: u32,
    pub output: BufferDescriptor,
    pub reference: BufferDescriptor,
    pub golden: BufferDescriptor,
}

impl DecodeCommand {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut vec = Vec::with_capacity(64);
        self.write_le(&mut vec);
        vec
    }
}

/// Status word reported by the transform on completion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeStatusCode(pub u32);

impl DecodeStatusCode {
    pub const OK: Self = Self(0);
    /// Output was muted or repeated to hide a bitstream error.
    pub const CONCEALED: Self = Self(1 << 0);
    pub const CRC_ERROR: Self = Self(1 << 1);
    pub const SYNTAX_ERROR: Self = Self(1 << 2);
    pub const UNSUPPORTED: Self = Self(1 << 3);

    const ERROR_MASK: u32 = Self::CRC_ERROR.0 | Self::SYNTAX_ERROR.0 | Self::UNSUPPORTED.0;

    pub fn is_ok(self) -> bool {
        self == Self::OK
    }

    pub fn is_concealed(self) -> bool {
        self.0 & Self::CONCEALED.0 != 0
    }

    pub fn is_error(self) -> bool {
        self.0 & Self::ERROR_MASK != 0
    }
}

/// Facts the transform writes back after decoding a frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeStatus {
    pub status: DecodeStatusCode,
    pub sample_count: u32,
    pub sampling_frequency_code: u32,
    pub channel_count: u32,
    pub bits_per_sample: u32,
    pub audio_mode: u32,
}

/// Audio properties known only after decode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AudioParameters {
    pub sample_rate: u32,
    pub channel_count: u32,
    pub bits_per_sample: u32,
    pub audio_mode: u32,
}
