//! MPEG-1/2/2.5 audio (Layer I, II, III) frame headers.
//!
//! ## Header Layout
//!
//! 32 bits, most significant first: sync (11), version (2), layer (2),
//! protection (1), bit rate index (4), sampling frequency index (2),
//! padding (1), private (1), mode (2), mode extension (2), copyright (1),
//! original (1), emphasis (2).
//!
//! ## Extension Header
//!
//! Multichannel extension data may trail the base frame inside the same coded
//! buffer. Its 40-bit header carries a 12-bit sync (0x7FF), a 16-bit CRC, an
//! 11-bit byte length and a reserved ID bit.

use std::fmt::{Display, Formatter};

use anyhow::{Result, bail};
use log::trace;

use crate::utils::bitstream_io::BsIoSliceReader;
use crate::utils::errors::MpegAudioError;

pub const MPEG_AUDIO_HEADER_SIZE: usize = 4;
pub const MPEG_AUDIO_EXTENSION_HEADER_SIZE: usize = 5;

const SYNC_MASK: u32 = 0xFFE0_0000;
const EXTENSION_SYNC: u16 = 0x7FF;

/// Bit rates in kbit/s for MPEG-1, indexed by `[layer - 1][index]`.
const MPEG1_BIT_RATES: [[u32; 16]; 3] = [
    [
        0, 32, 64, 96, 128, 160, 192, 224, 256, 288, 320, 352, 384, 416, 448, 0,
    ],
    [
        0, 32, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 384, 0,
    ],
    [
        0, 32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 0,
    ],
];

/// Bit rates in kbit/s for MPEG-2 and MPEG-2.5, indexed by `[layer - 1][index]`.
const MPEG2_BIT_RATES: [[u32; 16]; 3] = [
    [
        0, 32, 48, 56, 64, 80, 96, 112, 128, 144, 160, 176, 192, 224, 256, 0,
    ],
    [
        0, 8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160, 0,
    ],
    [
        0, 8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160, 0,
    ],
];

/// Sampling frequencies in Hz, indexed by `[standard][index]`.
const SAMPLING_FREQUENCIES: [[u32; 3]; 3] = [
    [44100, 48000, 32000],
    [22050, 24000, 16000],
    [11025, 12000, 8000],
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MpegStandard {
    Mpeg1,
    Mpeg2,
    Mpeg25,
}

impl MpegStandard {
    fn table_index(self) -> usize {
        match self {
            MpegStandard::Mpeg1 => 0,
            MpegStandard::Mpeg2 => 1,
            MpegStandard::Mpeg25 => 2,
        }
    }

    /// MPEG-2 and MPEG-2.5 are the low sampling frequency extensions.
    pub fn is_lsf(self) -> bool {
        self != MpegStandard::Mpeg1
    }
}

impl Display for MpegStandard {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            MpegStandard::Mpeg1 => f.write_str("MPEG-1"),
            MpegStandard::Mpeg2 => f.write_str("MPEG-2"),
            MpegStandard::Mpeg25 => f.write_str("MPEG-2.5"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelMode {
    Stereo,
    JointStereo,
    DualChannel,
    Mono,
}

impl From<u8> for ChannelMode {
    fn from(value: u8) -> Self {
        match value & 3 {
            0 => Self::Stereo,
            1 => Self::JointStereo,
            2 => Self::DualChannel,
            _ => Self::Mono,
        }
    }
}

impl ChannelMode {
    pub fn channel_count(self) -> u32 {
        match self {
            ChannelMode::Mono => 1,
            _ => 2,
        }
    }
}

/// A decoded MPEG audio frame header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MpegAudioFrameHeader {
    pub header: u32,
    /// 1, 2 or 3.
    pub layer: u8,
    pub standard: MpegStandard,
    pub crc_protected: bool,
    /// kbit/s.
    pub bit_rate: u32,
    /// Hz.
    pub sampling_frequency: u32,
    pub padding: bool,
    pub channel_mode: ChannelMode,
    pub number_of_samples: u32,
    /// Frame length in bytes, header included.
    pub length: usize,
}

impl MpegAudioFrameHeader {
    /// Parses the header at the start of `data`.
    ///
    /// Free-format streams (bit rate index 0) are rejected here.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let reader = &mut BsIoSliceReader::from_slice(data);
        let header: u32 = reader.get_n(32)?;

        if header & SYNC_MASK != SYNC_MASK {
            bail!(MpegAudioError::InvalidStartCode(header));
        }

        let standard = match (header >> 19) & 3 {
            0b11 => MpegStandard::Mpeg1,
            0b10 => MpegStandard::Mpeg2,
            0b00 => MpegStandard::Mpeg25,
            _ => bail!(MpegAudioError::ReservedVersion(header)),
        };

        let layer = match (header >> 17) & 3 {
            0b11 => 1,
            0b10 => 2,
            0b01 => 3,
            _ => bail!(MpegAudioError::ReservedLayer(header)),
        };

        let crc_protected = (header >> 16) & 1 == 0;
        let bit_rate_index = ((header >> 12) & 0xF) as u8;
        let frequency_index = ((header >> 10) & 3) as u8;
        let padding = (header >> 9) & 1 != 0;
        let channel_mode = ChannelMode::from(((header >> 6) & 3) as u8);

        let table = if standard == MpegStandard::Mpeg1 {
            &MPEG1_BIT_RATES
        } else {
            &MPEG2_BIT_RATES
        };

        let bit_rate = table[layer as usize - 1][bit_rate_index as usize];
        if bit_rate == 0 {
            bail!(MpegAudioError::InvalidBitRate {
                index: bit_rate_index
            });
        }

        if frequency_index == 3 {
            bail!(MpegAudioError::InvalidSamplingFrequency(frequency_index));
        }
        let sampling_frequency =
            SAMPLING_FREQUENCIES[standard.table_index()][frequency_index as usize];

        let pad = padding as u32;
        let (length, number_of_samples) = match layer {
            1 => (4 * ((12000 * bit_rate) / sampling_frequency + pad), 384),
            3 if standard.is_lsf() => ((72000 * bit_rate) / sampling_frequency + pad, 576),
            _ => ((144000 * bit_rate) / sampling_frequency + pad, 1152),
        };

        trace!(
            "{standard} layer {layer}: {bit_rate} kbit/s, {sampling_frequency} Hz, {length} bytes{}",
            if padding { " (padded)" } else { "" }
        );

        Ok(Self {
            header,
            layer,
            standard,
            crc_protected,
            bit_rate,
            sampling_frequency,
            padding,
            channel_mode,
            number_of_samples,
            length: length as usize,
        })
    }
}

/// Parses an extension header and returns the extension length in bytes.
pub fn parse_extension_header(data: &[u8]) -> Result<usize> {
    let reader = &mut BsIoSliceReader::from_slice(data);

    let sync: u16 = reader.get_n(12)?;
    if sync != EXTENSION_SYNC {
        bail!(MpegAudioError::InvalidExtensionSync(sync));
    }

    let _crc: u16 = reader.get_n(16)?;
    let length: u16 = reader.get_n(11)?;

    if reader.get()? {
        bail!(MpegAudioError::InvalidExtensionId);
    }

    Ok(length as usize)
}

/// Builds a header word; used by tests and fixtures.
pub fn compose_header(
    standard: MpegStandard,
    layer: u8,
    bit_rate_index: u8,
    frequency_index: u8,
    padding: bool,
) -> [u8; 4] {
    let version = match standard {
        MpegStandard::Mpeg1 => 0b11,
        MpegStandard::Mpeg2 => 0b10,
        MpegStandard::Mpeg25 => 0b00,
    };
    let layer_bits = (4 - layer as u32) & 3;

    let word = SYNC_MASK
        | (version << 19)
        | (layer_bits << 17)
        | (1 << 16)
        | ((bit_rate_index as u32 & 0xF) << 12)
        | ((frequency_index as u32 & 3) << 10)
        | ((padding as u32) << 9);

    word.to_be_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mpeg_error(result: Result<MpegAudioFrameHeader>) -> MpegAudioError {
        result
            .unwrap_err()
            .downcast::<MpegAudioError>()
            .expect("typed MPEG audio error")
    }

    #[test]
    fn layer2_128k_44100() -> Result<()> {
        let header = MpegAudioFrameHeader::parse(&compose_header(
            MpegStandard::Mpeg1,
            2,
            8,
            0,
            false,
        ))?;

        assert_eq!(header.layer, 2);
        assert_eq!(header.standard, MpegStandard::Mpeg1);
        assert_eq!(header.bit_rate, 128);
        assert_eq!(header.sampling_frequency, 44100);
        assert_eq!(header.number_of_samples, 1152);
        assert_eq!(header.length, 417);
        assert!(!header.crc_protected);

        let padded = MpegAudioFrameHeader::parse(&compose_header(
            MpegStandard::Mpeg1,
            2,
            8,
            0,
            true,
        ))?;
        assert!(padded.padding);
        assert_eq!(padded.length, 418);
        Ok(())
    }

    #[test]
    fn layer1_length_in_slots() -> Result<()> {
        // 32 kbit/s at 48 kHz: 12000 * 32 / 48000 = 8 slots.
        let header =
            MpegAudioFrameHeader::parse(&compose_header(MpegStandard::Mpeg1, 1, 1, 1, true))?;
        assert_eq!(header.length, 4 * (8 + 1));
        assert_eq!(header.number_of_samples, 384);
        Ok(())
    }

    #[test]
    fn lsf_layer3() -> Result<()> {
        // MPEG-2 layer III, 64 kbit/s at 24 kHz: 72000 * 64 / 24000 = 192.
        let header =
            MpegAudioFrameHeader::parse(&compose_header(MpegStandard::Mpeg2, 3, 8, 1, false))?;
        assert_eq!(header.bit_rate, 64);
        assert_eq!(header.sampling_frequency, 24000);
        assert_eq!(header.number_of_samples, 576);
        assert_eq!(header.length, 192);

        let header =
            MpegAudioFrameHeader::parse(&compose_header(MpegStandard::Mpeg25, 3, 1, 2, false))?;
        assert_eq!(header.sampling_frequency, 8000);
        assert_eq!(header.length, 72);
        Ok(())
    }

    #[test]
    fn mpeg1_layer3_uses_full_frame() -> Result<()> {
        let header =
            MpegAudioFrameHeader::parse(&compose_header(MpegStandard::Mpeg1, 3, 9, 1, false))?;
        assert_eq!(header.bit_rate, 128);
        assert_eq!(header.length, 144000 * 128 / 48000);
        assert_eq!(header.number_of_samples, 1152);
        Ok(())
    }

    #[test]
    fn sync_rejection() {
        for bytes in [
            [0x00, 0x00, 0x00, 0x00],
            [0xFF, 0xC0, 0x90, 0x00],
            [0x7F, 0xFD, 0x80, 0x00],
            [0xFE, 0xFB, 0x80, 0x00],
        ] {
            assert!(matches!(
                mpeg_error(MpegAudioFrameHeader::parse(&bytes)),
                MpegAudioError::InvalidStartCode(_)
            ));
        }
    }

    #[test]
    fn reserved_fields_rejected() {
        // version 01
        assert!(matches!(
            mpeg_error(MpegAudioFrameHeader::parse(&[0xFF, 0xEB, 0x80, 0x00])),
            MpegAudioError::ReservedVersion(_)
        ));
        // layer 00
        assert!(matches!(
            mpeg_error(MpegAudioFrameHeader::parse(&[0xFF, 0xF9, 0x80, 0x00])),
            MpegAudioError::ReservedLayer(_)
        ));
        assert!(matches!(
            mpeg_error(MpegAudioFrameHeader::parse(&compose_header(
                MpegStandard::Mpeg1,
                2,
                0,
                0,
                false
            ))),
            MpegAudioError::InvalidBitRate { index: 0 }
        ));
        assert!(matches!(
            mpeg_error(MpegAudioFrameHeader::parse(&compose_header(
                MpegStandard::Mpeg1,
                2,
                15,
                0,
                false
            ))),
            MpegAudioError::InvalidBitRate { index: 15 }
        ));
        assert!(matches!(
            mpeg_error(MpegAudioFrameHeader::parse(&compose_header(
                MpegStandard::Mpeg1,
                2,
                8,
                3,
                false
            ))),
            MpegAudioError::InvalidSamplingFrequency(3)
        ));
    }

    #[test]
    fn short_buffer_is_an_error() {
        assert!(MpegAudioFrameHeader::parse(&[0xFF, 0xFD]).is_err());
    }

    #[test]
    fn extension_header() -> Result<()> {
        // sync 0x7FF, crc 0xABCD, length 300, id 0
        let word: u64 = (0x7FF << 28) | (0xABCD << 12) | (300 << 1);
        let bytes = &word.to_be_bytes()[3..];
        assert_eq!(parse_extension_header(bytes)?, 300);

        let word = word | 1;
        let bytes = &word.to_be_bytes()[3..];
        let err = parse_extension_header(bytes).unwrap_err();
        assert_eq!(
            err.downcast_ref::<MpegAudioError>(),
            Some(&MpegAudioError::InvalidExtensionId)
        );

        let err = parse_extension_header(&[0xFF, 0xF0, 0, 0, 0]).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MpegAudioError>(),
            Some(MpegAudioError::InvalidExtensionSync(0xFFF))
        ));
        Ok(())
    }
}
