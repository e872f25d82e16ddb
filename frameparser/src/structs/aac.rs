//! AAC audio data transport stream (ADTS) headers.

use anyhow::{Result, bail};
use log::trace;

use crate::utils::bitstream_io::BsIoSliceReader;
use crate::utils::errors::AacError;

pub const ADTS_HEADER_SIZE: usize = 7;
pub const ADTS_CRC_SIZE: usize = 2;
pub const AAC_SAMPLES_PER_RAW_BLOCK: u32 = 1024;

const ADTS_SYNC_WORD: u16 = 0xFFF;

pub const AAC_SAMPLING_FREQUENCIES: [u32; 13] = [
    96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioObjectType {
    Main = 1,
    LowComplexity = 2,
    ScalableSampleRate = 3,
    LongTermPrediction = 4,
}

impl AudioObjectType {
    fn from_profile(profile: u8) -> Self {
        match profile & 3 {
            0 => Self::Main,
            1 => Self::LowComplexity,
            2 => Self::ScalableSampleRate,
            _ => Self::LongTermPrediction,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdtsHeader {
    /// `true` for MPEG-2 AAC, `false` for MPEG-4.
    pub mpeg2: bool,
    pub crc_protected: bool,
    pub object_type: AudioObjectType,
    pub sampling_frequency_index: u8,
    pub sampling_frequency: u32,
    pub channel_configuration: u8,
    /// Frame length in bytes, header included.
    pub length: usize,
    pub buffer_fullness: u16,
    pub raw_data_blocks: u8,
    pub number_of_samples: u32,
}

impl AdtsHeader {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let reader = &mut BsIoSliceReader::from_slice(data);

        let sync: u16 = reader.get_n(12)?;
        if sync != ADTS_SYNC_WORD {
            bail!(AacError::InvalidSyncWord(sync));
        }

        let mpeg2 = reader.get()?;
        let layer: u8 = reader.get_n(2)?;
        if layer != 0 {
            bail!(AacError::InvalidLayer(layer));
        }

        let crc_protected = !reader.get()?;
        let object_type = AudioObjectType::from_profile(reader.get_n(2)?);

        let sampling_frequency_index: u8 = reader.get_n(4)?;
        let Some(&sampling_frequency) =
            AAC_SAMPLING_FREQUENCIES.get(sampling_frequency_index as usize)
        else {
            bail!(AacError::InvalidSamplingFrequency(sampling_frequency_index));
        };

        // private bit
        reader.skip_n(1)?;
        let channel_configuration: u8 = reader.get_n(3)?;
        // original, home, copyright id bit, copyright id start
        reader.skip_n(4)?;

        let length = reader.get_n::<u16>(13)? as usize;
        let buffer_fullness: u16 = reader.get_n(11)?;
        let raw_data_blocks: u8 = reader.get_n(2)?;

        let header_size = ADTS_HEADER_SIZE + if crc_protected { ADTS_CRC_SIZE } else { 0 };
        if length < header_size {
            bail!(AacError::FrameTooShort {
                length,
                header: header_size,
            });
        }

        let number_of_samples = AAC_SAMPLES_PER_RAW_BLOCK * (raw_data_blocks as u32 + 1);

        trace!(
            "ADTS {:?}: {} Hz, channel configuration {}, {} bytes, {} samples",
            object_type, sampling_frequency, channel_configuration, length, number_of_samples
        );

        Ok(Self {
            mpeg2,
            crc_protected,
            object_type,
            sampling_frequency_index,
            sampling_frequency,
            channel_configuration,
            length,
            buffer_fullness,
            raw_data_blocks,
            number_of_samples,
        })
    }

    pub fn header_size(&self) -> usize {
        ADTS_HEADER_SIZE + if self.crc_protected { ADTS_CRC_SIZE } else { 0 }
    }

    /// The two-byte MPEG-4 AudioSpecificConfig equivalent of this header.
    pub fn audio_specific_config(&self) -> [u8; 2] {
        let word = ((self.object_type as u16) << 11)
            | ((self.sampling_frequency_index as u16) << 7)
            | ((self.channel_configuration as u16) << 3);
        word.to_be_bytes()
    }
}

/// Builds an ADTS header without CRC; used by tests and fixtures.
pub fn compose_adts_header(
    profile: u8,
    sampling_frequency_index: u8,
    channel_configuration: u8,
    length: u16,
    raw_data_blocks: u8,
) -> [u8; 7] {
    let word: u64 = ((ADTS_SYNC_WORD as u64) << 44)
        | (1 << 40)
        | (((profile & 3) as u64) << 38)
        | (((sampling_frequency_index & 0xF) as u64) << 34)
        | (((channel_configuration & 7) as u64) << 30)
        | (((length & 0x1FFF) as u64) << 13)
        | (0x7FF << 2)
        | (raw_data_blocks & 3) as u64;

    let bytes = word.to_be_bytes();
    [
        bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
    ]
}
