//! Theora stream and picture headers.
//!
//! ## Header Packets
//!
//! Every header packet starts with a type byte (0x80 identification, 0x81
//! comment, 0x82 setup) followed by the ASCII tag `theora`. The identification
//! header is decoded field by field. Comment and setup headers are carried
//! verbatim to the transform, which parses them itself.
//!
//! ## Picture Packets
//!
//! The first bit of a data packet is 0; the second selects intra (0) or
//! inter (1) coding.

use std::fmt::{Display, Formatter};

use anyhow::{Result, bail};
use log::trace;

use crate::structs::reference_list::PictureType;
use crate::utils::bitstream_io::BsIoSliceReader;
use crate::utils::errors::TheoraError;

pub const THEORA_TAG: &[u8; 6] = b"theora";
pub const THEORA_PREAMBLE_SIZE: usize = 7;

pub const THEORA_INFO_HEADER_CAPACITY: usize = 256;
pub const THEORA_COMMENT_HEADER_CAPACITY: usize = 16 * 1024;
pub const THEORA_SETUP_HEADER_CAPACITY: usize = 64 * 1024;

/// Streams older than 3.2.0 carry a 5-bit keyframe frequency field.
const LEGACY_KEYFRAME_FIELD_VERSION: u32 = 0x03_02_00;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TheoraHeaderType {
    Identification,
    Comment,
    Setup,
}

impl TheoraHeaderType {
    pub fn flag(self) -> HeadersRead {
        match self {
            TheoraHeaderType::Identification => HeadersRead::IDENTIFICATION,
            TheoraHeaderType::Comment => HeadersRead::COMMENT,
            TheoraHeaderType::Setup => HeadersRead::SETUP,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            TheoraHeaderType::Identification => "identification",
            TheoraHeaderType::Comment => "comment",
            TheoraHeaderType::Setup => "setup",
        }
    }

    fn capacity(self) -> usize {
        match self {
            TheoraHeaderType::Identification => THEORA_INFO_HEADER_CAPACITY,
            TheoraHeaderType::Comment => THEORA_COMMENT_HEADER_CAPACITY,
            TheoraHeaderType::Setup => THEORA_SETUP_HEADER_CAPACITY,
        }
    }
}

/// Which of the three sequence sub-headers have been received.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeadersRead(u8);

impl HeadersRead {
    pub const NONE: Self = Self(0);
    pub const IDENTIFICATION: Self = Self(1);
    pub const COMMENT: Self = Self(2);
    pub const SETUP: Self = Self(4);
    pub const ALL: Self = Self(7);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn bits(self) -> u8 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rational {
    pub numerator: u32,
    pub denominator: u32,
}

impl Display for Rational {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Yuv420,
    Yuv422,
    Yuv444,
}

impl PixelFormat {
    pub fn bits_per_pixel(self) -> u32 {
        match self {
            PixelFormat::Yuv420 => 12,
            PixelFormat::Yuv422 => 16,
            PixelFormat::Yuv444 => 24,
        }
    }

    /// The two-bit code carried by the identification header.
    pub fn code(self) -> u32 {
        match self {
            PixelFormat::Yuv420 => 0,
            PixelFormat::Yuv422 => 2,
            PixelFormat::Yuv444 => 3,
        }
    }
}

/// Reads and checks the type byte and tag of a header packet.
pub fn parse_header_preamble(data: &[u8]) -> Result<TheoraHeaderType> {
    let Some(&type_byte) = data.first() else {
        bail!(TheoraError::InvalidTag);
    };

    let header_type = match type_byte {
        0x80 => TheoraHeaderType::Identification,
        0x81 => TheoraHeaderType::Comment,
        0x82 => TheoraHeaderType::Setup,
        other => bail!(TheoraError::UnknownHeaderType(other)),
    };

    if data.get(1..THEORA_PREAMBLE_SIZE) != Some(&THEORA_TAG[..]) {
        bail!(TheoraError::InvalidTag);
    }

    Ok(header_type)
}

/// The decoded identification header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TheoraIdentification {
    pub version: u32,
    pub macroblock_width: u32,
    pub macroblock_height: u32,
    pub decoded_width: u32,
    pub decoded_height: u32,
    pub x_offset: u32,
    pub y_offset: u32,
    pub display_width: u32,
    pub display_height: u32,
    pub frame_rate: Rational,
    pub pixel_aspect: Rational,
    pub colour_space: u8,
    pub pixel_format: PixelFormat,
}

impl TheoraIdentification {
    pub fn parse(data: &[u8]) -> Result<Self> {
        if parse_header_preamble(data)? != TheoraHeaderType::Identification {
            bail!(TheoraError::UnknownHeaderType(data[0]));
        }

        let reader = &mut BsIoSliceReader::from_slice(&data[THEORA_PREAMBLE_SIZE..]);

        let version: u32 = reader.get_n(24)?;
        let macroblock_width: u32 = reader.get_n(16)?;
        let macroblock_height: u32 = reader.get_n(16)?;
        let decoded_width: u32 = reader.get_n(24)?;
        let decoded_height: u32 = reader.get_n(24)?;
        let x_offset: u32 = reader.get_n(8)?;
        let y_offset: u32 = reader.get_n(8)?;
        let frame_rate = Rational {
            numerator: reader.get_n(32)?,
            denominator: reader.get_n(32)?,
        };
        let mut pixel_aspect = Rational {
            numerator: reader.get_n(24)?,
            denominator: reader.get_n(24)?,
        };

        if version < LEGACY_KEYFRAME_FIELD_VERSION {
            reader.skip_n(5)?;
        }

        let colour_space: u8 = reader.get_n(8)?;

        // nominal bit rate, quality, keyframe granule shift
        reader.skip_n(24 + 6 + 5)?;

        let pixel_format = match reader.get_n::<u8>(2)? {
            0 => PixelFormat::Yuv420,
            2 => PixelFormat::Yuv422,
            3 => PixelFormat::Yuv444,
            _ => bail!(TheoraError::ReservedPixelFormat),
        };

        let grid_width = macroblock_width * 16;
        let grid_height = macroblock_height * 16;

        if decoded_width > grid_width || decoded_height > grid_height {
            bail!(TheoraError::DecodedSizeExceedsGrid {
                width: decoded_width,
                height: decoded_height,
                grid_width,
                grid_height,
            });
        }

        if x_offset > grid_width - decoded_width || y_offset > grid_height - decoded_height {
            bail!(TheoraError::PictureOffsetOutOfRange {
                x: x_offset,
                y: y_offset,
            });
        }

        if frame_rate.numerator == 0 || frame_rate.denominator == 0 {
            bail!(TheoraError::InvalidFrameRate {
                numerator: frame_rate.numerator,
                denominator: frame_rate.denominator,
            });
        }

        if pixel_aspect.numerator == 0 || pixel_aspect.denominator == 0 {
            pixel_aspect = Rational {
                numerator: 1,
                denominator: 1,
            };
        }

        let display_width = decoded_width.saturating_sub(x_offset);
        let display_height = decoded_height.saturating_sub(y_offset);

        trace!(
            "Theora {:06X}: grid {}x{}, decoded {}x{}, display {}x{}, {} fps, {:?}",
            version,
            grid_width,
            grid_height,
            decoded_width,
            decoded_height,
            display_width,
            display_height,
            frame_rate,
            pixel_format
        );

        Ok(Self {
            version,
            macroblock_width,
            macroblock_height,
            decoded_width,
            decoded_height,
            x_offset,
            y_offset,
            display_width,
            display_height,
            frame_rate,
            pixel_aspect,
            colour_space,
            pixel_format,
        })
    }

    pub fn grid_width(&self) -> u32 {
        self.macroblock_width * 16
    }

    pub fn grid_height(&self) -> u32 {
        self.macroblock_height * 16
    }
}

/// Sequence header assembled from the three header packets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TheoraSequenceHeader {
    pub identification: Option<TheoraIdentification>,
    pub info_header: Vec<u8>,
    pub comment_header: Vec<u8>,
    pub setup_header: Vec<u8>,
    pub headers_read: HeadersRead,
}

impl TheoraSequenceHeader {
    /// Stores one header packet, replacing any earlier packet of the same type.
    pub fn read(&mut self, data: &[u8]) -> Result<TheoraHeaderType> {
        let header_type = parse_header_preamble(data)?;

        if data.len() > header_type.capacity() {
            bail!(TheoraError::HeaderTooLarge {
                kind: header_type.name(),
                len: data.len(),
                capacity: header_type.capacity(),
            });
        }

        match header_type {
            TheoraHeaderType::Identification => {
                self.identification = Some(TheoraIdentification::parse(data)?);
                self.info_header = data.to_vec();
            }
            TheoraHeaderType::Comment => self.comment_header = data.to_vec(),
            TheoraHeaderType::Setup => self.setup_header = data.to_vec(),
        }

        self.headers_read.insert(header_type.flag());
        Ok(header_type)
    }

    pub fn sequence_header_present(&self) -> bool {
        self.headers_read == HeadersRead::ALL && self.identification.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TheoraPictureHeader {
    pub picture_type: PictureType,
}

impl TheoraPictureHeader {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let reader = &mut BsIoSliceReader::from_slice(data);

        if reader.get()? {
            bail!(TheoraError::NotFrameData);
        }

        let picture_type = if reader.get()? {
            PictureType::Inter
        } else {
            PictureType::Intra
        };

        Ok(Self { picture_type })
    }
}

/// Fields of an identification header, for building test packets.
#[derive(Debug, Clone)]
pub struct IdentificationFields {
    pub version: u32,
    pub macroblock_width: u16,
    pub macroblock_height: u16,
    pub decoded_width: u32,
    pub decoded_height: u32,
    pub x_offset: u8,
    pub y_offset: u8,
    pub frame_rate: Rational,
    pub pixel_aspect: Rational,
    pub colour_space: u8,
    pub pixel_format: u8,
}

impl Default for IdentificationFields {
    fn default() -> Self {
        Self {
            version: 0x03_02_01,
            macroblock_width: 20,
            macroblock_height: 15,
            decoded_width: 320,
            decoded_height: 240,
            x_offset: 0,
            y_offset: 0,
            frame_rate: Rational {
                numerator: 25,
                denominator: 1,
            },
            pixel_aspect: Rational {
                numerator: 1,
                denominator: 1,
            },
            colour_space: 0,
            pixel_format: 0,
        }
    }
}

impl IdentificationFields {
    /// Serializes the fields into a complete identification header packet.
    pub fn to_packet(&self) -> Vec<u8> {
        let mut fields: Vec<(u64, u32)> = vec![
            (self.version as u64, 24),
            (self.macroblock_width as u64, 16),
            (self.macroblock_height as u64, 16),
            (self.decoded_width as u64, 24),
            (self.decoded_height as u64, 24),
            (self.x_offset as u64, 8),
            (self.y_offset as u64, 8),
            (self.frame_rate.numerator as u64, 32),
            (self.frame_rate.denominator as u64, 32),
            (self.pixel_aspect.numerator as u64, 24),
            (self.pixel_aspect.denominator as u64, 24),
        ];
        if self.version < LEGACY_KEYFRAME_FIELD_VERSION {
            fields.push((0, 5));
        }
        fields.extend([
            (self.colour_space as u64, 8),
            (0, 24),
            (0, 6),
            (6, 5),
            (self.pixel_format as u64, 2),
            (0, 3),
        ]);

        let mut packet = vec![0x80];
        packet.extend_from_slice(THEORA_TAG);

        let mut acc: u64 = 0;
        let mut acc_bits = 0;
        for (value, bits) in fields {
            for i in (0..bits).rev() {
                acc = (acc << 1) | ((value >> i) & 1);
                acc_bits += 1;
                if acc_bits == 8 {
                    packet.push(acc as u8);
                    acc = 0;
                    acc_bits = 0;
                }
            }
        }
        if acc_bits > 0 {
            packet.push((acc << (8 - acc_bits)) as u8);
        }

        packet
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn theora_error(result: Result<TheoraIdentification>) -> TheoraError {
        result.unwrap_err().downcast::<TheoraError>().unwrap()
    }

    #[test]
    fn identification_header() -> Result<()> {
        let packet = IdentificationFields {
            decoded_width: 310,
            decoded_height: 236,
            x_offset: 4,
            y_offset: 2,
            frame_rate: Rational {
                numerator: 30000,
                denominator: 1001,
            },
            pixel_aspect: Rational {
                numerator: 0,
                denominator: 0,
            },
            ..Default::default()
        }
        .to_packet();
        assert_eq!(packet.len(), 42);

        let id = TheoraIdentification::parse(&packet)?;
        assert_eq!(id.version, 0x030201);
        assert_eq!(id.grid_width(), 320);
        assert_eq!(id.grid_height(), 240);
        assert_eq!(id.decoded_width, 310);
        assert_eq!(id.display_width, 306);
        assert_eq!(id.display_height, 234);
        assert_eq!(
            id.frame_rate,
            Rational {
                numerator: 30000,
                denominator: 1001
            }
        );
        assert_eq!(
            id.pixel_aspect,
            Rational {
                numerator: 1,
                denominator: 1
            }
        );
        assert_eq!(id.pixel_format, PixelFormat::Yuv420);
        Ok(())
    }

    #[test]
    fn legacy_version_skips_keyframe_field() -> Result<()> {
        let packet = IdentificationFields {
            version: 0x030100,
            colour_space: 2,
            pixel_format: 3,
            ..Default::default()
        }
        .to_packet();

        let id = TheoraIdentification::parse(&packet)?;
        assert_eq!(id.colour_space, 2);
        assert_eq!(id.pixel_format, PixelFormat::Yuv444);
        Ok(())
    }

    #[test]
    fn decoded_width_beyond_grid_rejected() {
        let packet = IdentificationFields {
            macroblock_width: 5,
            decoded_width: 100,
            ..Default::default()
        }
        .to_packet();

        assert_eq!(
            theora_error(TheoraIdentification::parse(&packet)),
            TheoraError::DecodedSizeExceedsGrid {
                width: 100,
                height: 240,
                grid_width: 80,
                grid_height: 240,
            }
        );
    }

    #[test]
    fn offset_beyond_slack_rejected() {
        let packet = IdentificationFields {
            decoded_width: 316,
            x_offset: 5,
            ..Default::default()
        }
        .to_packet();

        assert_eq!(
            theora_error(TheoraIdentification::parse(&packet)),
            TheoraError::PictureOffsetOutOfRange { x: 5, y: 0 }
        );
    }

    #[test]
    fn reserved_pixel_format_rejected() {
        let packet = IdentificationFields {
            pixel_format: 1,
            ..Default::default()
        }
        .to_packet();

        assert_eq!(
            theora_error(TheoraIdentification::parse(&packet)),
            TheoraError::ReservedPixelFormat
        );
    }

    #[test]
    fn bad_tag_rejected() {
        let mut packet = IdentificationFields::default().to_packet();
        packet[3] = b'X';
        assert_eq!(
            theora_error(TheoraIdentification::parse(&packet)),
            TheoraError::InvalidTag
        );

        assert!(parse_header_preamble(&[0x83, b't', b'h', b'e', b'o', b'r', b'a']).is_err());
    }

    #[test]
    fn sequence_complete_in_any_order() -> Result<()> {
        let mut comment = vec![0x81];
        comment.extend_from_slice(THEORA_TAG);
        comment.extend_from_slice(&[0, 0, 0, 0]);
        let mut setup = vec![0x82];
        setup.extend_from_slice(THEORA_TAG);
        setup.extend_from_slice(&[0xAA; 16]);
        let info = IdentificationFields::default().to_packet();

        let mut sequence = TheoraSequenceHeader::default();
        assert_eq!(sequence.read(&setup)?, TheoraHeaderType::Setup);
        assert!(!sequence.sequence_header_present());
        assert_eq!(sequence.read(&info)?, TheoraHeaderType::Identification);
        assert!(!sequence.sequence_header_present());
        assert_eq!(sequence.read(&comment)?, TheoraHeaderType::Comment);
        assert!(sequence.sequence_header_present());

        assert_eq!(sequence.setup_header, setup);
        assert_eq!(sequence.info_header, info);
        assert_eq!(sequence.headers_read, HeadersRead::ALL);
        Ok(())
    }

    #[test]
    fn picture_header() -> Result<()> {
        assert_eq!(
            TheoraPictureHeader::parse(&[0x00])?.picture_type,
            PictureType::Intra
        );
        assert_eq!(
            TheoraPictureHeader::parse(&[0x40])?.picture_type,
            PictureType::Inter
        );

        let err = TheoraPictureHeader::parse(&[0x80]).unwrap_err();
        assert_eq!(
            err.downcast_ref::<TheoraError>(),
            Some(&TheoraError::NotFrameData)
        );
        Ok(())
    }
}
