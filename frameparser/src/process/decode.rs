use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow, bail};
use log::{debug, error, trace, warn};

use crate::log_or_err;
use crate::structs::command::{
    AudioParameters, BufferDescriptor, CommandKind, DecodeCommand, DecodeStatus,
    DecodeStatusCode, DecoderId, GlobalParams, HeaderBlob, PictureCoding,
    SAMPLING_FREQUENCY_CODE_UNKNOWN, StreamParameterCommand, sampling_frequency_code,
    sampling_frequency_from_code,
};
use crate::structs::frame::ParsedFrame;
use crate::structs::parameters::{Codec, FrameParameters, StreamParameters};
use crate::structs::reference_list::PictureType;
use crate::structs::theora::{
    THEORA_COMMENT_HEADER_CAPACITY, THEORA_INFO_HEADER_CAPACITY, THEORA_SETUP_HEADER_CAPACITY,
    TheoraIdentification,
};
use crate::utils::errors::{CodecError, FrameParserError};
use crate::utils::pool::Shared;
use crate::utils::timing::UNSPECIFIED_TIME;

/// Bytes per decoded PCM sample.
const OUTPUT_SAMPLE_SIZE: u32 = 4;

/// Transform features enabled at stream open.
#[derive(Debug, Clone)]
pub struct CodecConfig {
    pub crc_check: bool,
    pub multichannel: bool,
    /// Lets the transform accept free-format MPEG audio. The frame parser
    /// still rejects bit rate index 0.
    pub free_format: bool,
    pub decoder_variant_override: Option<DecoderId>,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            crc_check: true,
            multichannel: false,
            free_format: true,
            decoder_variant_override: None,
        }
    }
}

/// Base addresses of decoded-frame buffers, by decode frame index.
pub trait BufferAddressMap {
    fn buffer_address(&self, decode_frame_index: u32) -> Option<u64>;
}

impl BufferAddressMap for HashMap<u32, u64> {
    fn buffer_address(&self, decode_frame_index: u32) -> Option<u64> {
        self.get(&decode_frame_index).copied()
    }
}

/// One in-flight decode: the command sent and the status written back on
/// completion.
#[derive(Debug, Clone)]
pub struct DecodeContext {
    pub codec: Codec,
    pub command: DecodeCommand,
    pub status: DecodeStatus,
    /// Shared with the pipeline; lock it for every access.
    pub audio_parameters: Arc<Mutex<AudioParameters>>,
}

impl DecodeContext {
    pub fn new(
        codec: Codec,
        command: DecodeCommand,
        audio_parameters: Arc<Mutex<AudioParameters>>,
    ) -> Self {
        Self {
            codec,
            command,
            status: DecodeStatus::default(),
            audio_parameters,
        }
    }

    /// Records the transform's completion status.
    pub fn complete(&mut self, status: DecodeStatus) {
        self.status = status;
    }
}

/// What validation saw in a completed decode. Never a pipeline failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeVerdict {
    Clean,
    Concealed,
    FirmwareError(DecodeStatusCode),
    SampleCountMismatch { expected: u32, actual: u32 },
}

/// Translates parsed parameters into transform commands for one codec.
///
/// The builder holds no per-stream state: every command is derived from the
/// parameters passed in.
#[derive(Debug, Clone)]
pub struct CodecProxy {
    codec: Codec,
    config: CodecConfig,
    fail_level: log::Level,
}

impl CodecProxy {
    pub fn new(codec: Codec, config: CodecConfig) -> Self {
        Self {
            codec,
            config,
            fail_level: log::Level::Error,
        }
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }

    /// Sets the failure level for validation warnings.
    ///
    /// - `log::Level::Error`: Only fail on Error level messages (default)
    /// - `log::Level::Warn`: Fail on Warning level and above (strict mode)
    pub fn set_fail_level(&mut self, level: log::Level) {
        self.fail_level = level;
    }

    fn check_codec(&self, codec: Codec) -> Result<()> {
        if codec != self.codec {
            bail!(CodecError::ParameterMismatch {
                expected: self.codec.name(),
                actual: codec.name(),
            });
        }
        Ok(())
    }

    /// Derives the decoder-wide configuration from stream parameters alone.
    pub fn fill_out_global_config(&self, parameters: &StreamParameters) -> Result<GlobalParams> {
        self.check_codec(parameters.codec())?;

        let mut global = GlobalParams {
            struct_size: GlobalParams::SIZE,
            crc_check: self.config.crc_check,
            sampling_frequency_code: SAMPLING_FREQUENCY_CODE_UNKNOWN,
            ..Default::default()
        };

        match parameters {
            StreamParameters::MpegAudio(mpeg) => {
                global.decoder_id = DecoderId::for_mpeg_layer(mpeg.layer);
                global.multichannel = self.config.multichannel;
                global.free_format = self.config.free_format;
            }
            StreamParameters::Aac(aac) => {
                global.decoder_id = DecoderId::Aac;
                global.multichannel = self.config.multichannel;
                global.channel_configuration = aac.channel_configuration as u32;
                global.audio_specific_config[..2].copy_from_slice(&aac.audio_specific_config);

                match sampling_frequency_code(aac.sampling_frequency) {
                    Some(code) => global.sampling_frequency_code = code,
                    None => log_or_err!(
                        self,
                        log::Level::Warn,
                        anyhow!(CodecError::UnsupportedSamplingFrequency(
                            aac.sampling_frequency
                        ))
                    ),
                }
            }
            StreamParameters::Theora(theora) => {
                let id = &theora.identification;
                global.decoder_id = DecoderId::Theora;
                global.crc_check = false;
                global.coded_width = id.grid_width();
                global.coded_height = id.grid_height();
                global.display_width = id.display_width;
                global.display_height = id.display_height;
                global.pixel_format = id.pixel_format.code();
                global.frame_rate_numerator = id.frame_rate.numerator;
                global.frame_rate_denominator = id.frame_rate.denominator;
            }
        }

        if let Some(decoder_id) = self.config.decoder_variant_override {
            global.decoder_id = decoder_id;
        }

        Ok(global)
    }

    /// Builds the configure command for a new set of stream parameters.
    ///
    /// Consumes the caller's claim only on success. On failure the claim is
    /// handed back with the error and remains the caller's to release.
    pub fn fill_out_stream_parameter_command(
        &self,
        parameters: Shared<StreamParameters>,
    ) -> Result<StreamParameterCommand, (Shared<StreamParameters>, anyhow::Error)> {
        let global = match self.fill_out_global_config(&parameters) {
            Ok(global) => global,
            Err(e) => return Err((parameters, e)),
        };

        let mut command = StreamParameterCommand {
            kind: CommandKind::SetGlobalParams,
            global,
            ..Default::default()
        };

        if let StreamParameters::Theora(theora) = &*parameters {
            command.info_header = HeaderBlob::padded(&theora.info_header, THEORA_INFO_HEADER_CAPACITY);
            command.comment_header =
                HeaderBlob::padded(&theora.comment_header, THEORA_COMMENT_HEADER_CAPACITY);
            command.setup_header =
                HeaderBlob::padded(&theora.setup_header, THEORA_SETUP_HEADER_CAPACITY);
        }

        debug!(
            "{} stream parameter command built for {:?}",
            self.codec, command.global.decoder_id
        );
        parameters.release();

        Ok(command)
    }

    /// Builds the transform command for one parsed frame.
    pub fn fill_out_decode_command(
        &self,
        frame: &ParsedFrame,
        addresses: &impl BufferAddressMap,
    ) -> Result<DecodeCommand> {
        self.check_codec(frame.frame_parameters.codec())?;
        if frame.stream_parameters.codec() != frame.frame_parameters.codec() {
            bail!(FrameParserError::PartialFrameParameters);
        }

        let address = |index: u32| {
            addresses
                .buffer_address(index)
                .ok_or(CodecError::MissingBufferAddress(index))
        };

        let mut command = DecodeCommand {
            kind: CommandKind::Transform,
            decode_frame_index: frame.decode_frame_index,
            coded_data_length: frame.coded.len() as u32,
            playback_time: frame.playback_time.time.unwrap_or(UNSPECIFIED_TIME),
            ..Default::default()
        };

        match (&*frame.stream_parameters, &*frame.frame_parameters) {
            (StreamParameters::Theora(theora), FrameParameters::Theora(picture)) => {
                let id = &theora.identification;
                let size = picture_buffer_size(id)?;

                let Some([reference, golden]) = frame.reference_indices() else {
                    bail!(CodecError::MissingReferenceList);
                };

                command.picture_coding = match picture.picture_type {
                    PictureType::Intra => PictureCoding::Intra,
                    PictureType::Inter => PictureCoding::Inter,
                };
                command.output = BufferDescriptor {
                    address: address(frame.decode_frame_index)?,
                    size,
                };
                command.reference = BufferDescriptor {
                    address: address(reference)?,
                    size,
                };
                command.golden = BufferDescriptor {
                    address: address(golden)?,
                    size,
                };
            }
            (_, parameters) => {
                let samples = parameters.sample_count().unwrap_or(0);
                let channels = match parameters {
                    FrameParameters::MpegAudio(p) => p.channel_mode().channel_count(),
                    FrameParameters::Aac(p) => aac_channel_count(p.header.channel_configuration),
                    FrameParameters::Theora(_) => 0,
                };

                command.expected_sample_count = samples;
                command.output = BufferDescriptor {
                    address: address(frame.decode_frame_index)?,
                    size: samples * channels * OUTPUT_SAMPLE_SIZE,
                };
            }
        }

        trace!(
            "{} decode command for frame {}: {} coded bytes",
            self.codec, command.decode_frame_index, command.coded_data_length
        );

        Ok(command)
    }

    /// Interprets a completed decode.
    ///
    /// Always lets the pipeline proceed; concealment already happened in the
    /// transform. Audio facts reported by the transform are written back into
    /// the shared audio parameters.
    pub fn validate_decode_context(&self, context: &DecodeContext) -> DecodeVerdict {
        let status = context.status;
        let index = context.command.decode_frame_index;

        let mut verdict = if status.status.is_error() {
            error!(
                "{} transform failed on frame {index}: status {:#X}",
                context.codec, status.status.0
            );
            DecodeVerdict::FirmwareError(status.status)
        } else if status.status.is_concealed() {
            debug!("{} frame {index} concealed by the transform", context.codec);
            DecodeVerdict::Concealed
        } else {
            DecodeVerdict::Clean
        };

        if context.codec.is_video() {
            return verdict;
        }

        let expected = context.command.expected_sample_count;
        let valid = match context.codec {
            Codec::MpegAudio => status.sample_count == expected || status.sample_count == 0,
            // Implicit SBR doubles the output rate.
            Codec::Aac => status.sample_count == expected || status.sample_count == expected * 2,
            Codec::Theora => true,
        };

        if !valid {
            warn!(
                "{} frame {index}: transform produced {} samples, expected {expected}",
                context.codec, status.sample_count
            );
            if verdict != DecodeVerdict::FirmwareError(status.status) {
                verdict = DecodeVerdict::SampleCountMismatch {
                    expected,
                    actual: status.sample_count,
                };
            }
        }

        let sample_rate = sampling_frequency_from_code(status.sampling_frequency_code);
        if sample_rate.is_none() {
            warn!(
                "{} frame {index}: unknown sampling frequency code {:#X}",
                context.codec, status.sampling_frequency_code
            );
        }

        let mut audio = context
            .audio_parameters
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(sample_rate) = sample_rate {
            audio.sample_rate = sample_rate;
        }
        audio.channel_count = status.channel_count;
        audio.bits_per_sample = status.bits_per_sample;
        audio.audio_mode = status.audio_mode;

        verdict
    }
}

fn picture_buffer_size(id: &TheoraIdentification) -> Result<u32> {
    let bits = (id.grid_width() as u64)
        .checked_mul(id.grid_height() as u64)
        .and_then(|pixels| pixels.checked_mul(id.pixel_format.bits_per_pixel() as u64));

    match bits.and_then(|bits| u32::try_from(bits / 8).ok()) {
        Some(size) => Ok(size),
        None => bail!(CodecError::BufferTooLarge {
            width: id.grid_width(),
            height: id.grid_height(),
        }),
    }
}

fn aac_channel_count(channel_configuration: u8) -> u32 {
    match channel_configuration {
        // Defined in-band by a program config element; assume stereo.
        0 => 2,
        7 => 8,
        n => n as u32,
    }
}
