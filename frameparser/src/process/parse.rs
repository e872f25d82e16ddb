use anyhow::{Result, anyhow, bail};
use log::{debug, error, info, trace};

use crate::log_or_err;
use crate::structs::aac::{ADTS_HEADER_SIZE, AdtsHeader};
use crate::structs::frame::{CodedBuffer, ParsedFrame};
use crate::structs::mpeg_audio::{
    MPEG_AUDIO_EXTENSION_HEADER_SIZE, MPEG_AUDIO_HEADER_SIZE, MpegAudioFrameHeader,
    parse_extension_header,
};
use crate::structs::parameters::{
    AacFrameParameters, AacStreamParameters, Codec, DEFAULT_FRAME_PARAMETER_POOL_SIZE,
    DEFAULT_STREAM_PARAMETER_POOL_SIZE, FrameParameters, MpegAudioFrameParameters,
    MpegAudioStreamParameters, StreamParameters, TheoraFrameParameters, TheoraStreamParameters,
};
use crate::structs::reference_list::{
    DecodeReferences, DiscardReleases, ReferenceFrameList, ReferenceReleaser,
};
use crate::structs::theora::{TheoraPictureHeader, TheoraSequenceHeader};
use crate::utils::errors::{
    AacError, FrameParserError, MpegAudioError, PoolError, ReferenceListError, TheoraError,
};
use crate::utils::pool::{ParameterPool, Shared, SlotLease};
use crate::utils::timing::{
    DEFAULT_JITTER_TOLERANCE_US, PlaybackTimeSynthesizer, SourceTimestamp, TimeSource,
    UNSPECIFIED_TIME,
};

pub const DEFAULT_NATIVE_TIME_BASE: u64 = 90_000;
pub const DEFAULT_ERROR_THRESHOLD: usize = 4;

/// Frame parser settings fixed at stream open.
#[derive(Debug, Clone)]
pub struct ParserConfig {
    pub jitter_tolerance_us: u64,
    /// Ticks per second of the timestamps carried by coded buffers.
    pub native_time_base: u64,
    pub stream_parameter_pool_size: usize,
    pub frame_parameter_pool_size: usize,
    /// Consecutive header errors after which the stream is marked unplayable.
    pub error_threshold: usize,
    pub fail_level: log::Level,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            jitter_tolerance_us: DEFAULT_JITTER_TOLERANCE_US,
            native_time_base: DEFAULT_NATIVE_TIME_BASE,
            stream_parameter_pool_size: DEFAULT_STREAM_PARAMETER_POOL_SIZE,
            frame_parameter_pool_size: DEFAULT_FRAME_PARAMETER_POOL_SIZE,
            error_threshold: DEFAULT_ERROR_THRESHOLD,
            fail_level: log::Level::Error,
        }
    }
}

/// Parses coded buffers of one stream into frames ready to decode.
///
/// One parser serves one codec, chosen at stream open. Per buffer it checks
/// the headers, keeps the stream parameters current, allocates frame
/// parameters, times the frame and, for Theora, maintains the reference
/// frame list. A buffer that fails to parse leaves the parser untouched
/// except for its error counters.
///
/// # Example
///
/// ```rust,no_run
/// use frameparser::process::extract::Extractor;
/// use frameparser::process::parse::{Parser, ParserConfig};
/// use frameparser::structs::parameters::Codec;
///
/// let mut extractor = Extractor::default();
/// let mut parser = Parser::new(Codec::MpegAudio, ParserConfig::default());
///
/// extractor.push_bytes(&std::fs::read("stream.mp2")?);
/// extractor.finish();
///
/// for buffer in extractor.by_ref().filter_map(Result::ok) {
///     if let Some(frame) = parser.read_headers(&buffer)? {
///         println!("{} at {:?}", frame.display_frame_index, frame.normalized_playback_time());
///     }
/// }
/// # Ok::<(), anyhow::Error>(())
/// ```
pub struct Parser {
    codec: Codec,
    config: ParserConfig,
    state: ParserState,
    stream_pool: ParameterPool<StreamParameters>,
    frame_pool: ParameterPool<FrameParameters>,
    releaser: Box<dyn ReferenceReleaser + Send>,
}

#[derive(Debug)]
pub struct ParserState {
    pub fail_level: log::Level,
    pub synthesizer: PlaybackTimeSynthesizer,
    pub stream_parameters: Option<Shared<StreamParameters>>,
    /// Set when new stream parameters were stored, cleared by the next frame.
    pub stream_parameters_updated: bool,
    pub theora_sequence: TheoraSequenceHeader,
    pub reference_list: ReferenceFrameList,
    pub next_display_frame_index: u64,
    pub next_decode_frame_index: u32,
    pub consecutive_errors: usize,
    pub unplayable: bool,
}

impl ParserState {
    fn new(config: &ParserConfig) -> Self {
        Self {
            fail_level: config.fail_level,
            synthesizer: PlaybackTimeSynthesizer::new(config.jitter_tolerance_us),
            stream_parameters: None,
            stream_parameters_updated: false,
            theora_sequence: TheoraSequenceHeader::default(),
            reference_list: ReferenceFrameList::new(),
            next_display_frame_index: 0,
            next_decode_frame_index: 0,
            consecutive_errors: 0,
            unplayable: false,
        }
    }
}

/// A frame whose headers parsed, before any parser state changes.
struct PendingFrame {
    new_stream: Option<StreamParameters>,
    frame: FrameParameters,
    /// Frame duration as `count / rate` seconds.
    duration: (u64, u64),
    key_frame: bool,
    references: Option<DecodeReferences>,
}

impl Parser {
    pub fn new(codec: Codec, config: ParserConfig) -> Self {
        let state = ParserState::new(&config);

        Self {
            codec,
            stream_pool: ParameterPool::new(
                "stream parameters",
                config.stream_parameter_pool_size,
            ),
            frame_pool: ParameterPool::new("frame parameters", config.frame_parameter_pool_size),
            config,
            state,
            releaser: Box::new(DiscardReleases),
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
        self.state.fail_level = level;
    }

    /// Routes reference frame release requests to the decoder's buffer manager.
    pub fn set_reference_releaser(&mut self, releaser: Box<dyn ReferenceReleaser + Send>) {
        self.releaser = releaser;
    }

    pub fn state(&self) -> &ParserState {
        &self.state
    }

    pub fn stream_parameters(&self) -> Option<&Shared<StreamParameters>> {
        self.state.stream_parameters.as_ref()
    }

    pub fn is_unplayable(&self) -> bool {
        self.state.unplayable
    }

    pub fn stream_parameters_in_use(&self) -> usize {
        self.stream_pool.in_use()
    }

    pub fn frame_parameters_in_use(&self) -> usize {
        self.frame_pool.in_use()
    }

    /// Forgets the current stream so that a new sequence can begin, releasing
    /// held reference frames.
    pub fn reset_stream(&mut self) {
        self.state
            .reference_list
            .reset(&mut *self.releaser);
        self.state.stream_parameters = None;
        self.state.stream_parameters_updated = false;
        self.state.theora_sequence = TheoraSequenceHeader::default();
        self.state.synthesizer.invalidate();
    }

    /// Parses one coded buffer.
    ///
    /// Returns `Ok(None)` for buffers that carry only stream headers.
    pub fn read_headers(&mut self, buffer: &CodedBuffer) -> Result<Option<ParsedFrame>> {
        if buffer.discontinuity.invalidates_timing() {
            debug!("Discontinuity, invalidating playback time history");
            self.state.synthesizer.invalidate();
        }

        let result = match self.codec {
            Codec::MpegAudio => self
                .read_mpeg_audio_headers(buffer.as_ref())
                .and_then(|pending| self.commit(buffer, pending).map(Some)),
            Codec::Aac => self
                .read_aac_headers(buffer.as_ref())
                .and_then(|pending| self.commit(buffer, pending).map(Some)),
            Codec::Theora => self.read_theora_headers(buffer.as_ref()).and_then(|pending| {
                pending
                    .map(|pending| self.commit(buffer, pending))
                    .transpose()
            }),
        };

        match &result {
            Ok(_) => self.state.consecutive_errors = 0,
            Err(e) if counts_towards_unplayable(e) => self.record_error(e),
            Err(e) => debug!("Frame skipped: {e}"),
        }

        result
    }

    fn record_error(&mut self, err: &anyhow::Error) {
        self.state.consecutive_errors += 1;

        let theora_header_error = err.downcast_ref::<TheoraError>().is_some_and(|e| {
            !matches!(e, TheoraError::NotFrameData)
        });

        if !self.state.unplayable
            && (theora_header_error || self.state.consecutive_errors >= self.config.error_threshold)
        {
            self.state.unplayable = true;
            error!(
                "{} stream marked unplayable after {} consecutive errors, last: {err}",
                self.codec, self.state.consecutive_errors
            );
        } else {
            debug!("{} header error: {err}", self.codec);
        }
    }

    /// Converts a native time to microseconds; `None` when the result does not
    /// fit below the unspecified-time sentinel.
    fn normalize(&self, native: u64) -> Option<u64> {
        let base = self.config.native_time_base.max(1) as u128;
        let normalized = u64::try_from(native as u128 * 1_000_000 / base)
            .ok()
            .filter(|&time| time != UNSPECIFIED_TIME);
        if normalized.is_none() {
            debug!("Native time {native} out of range, treated as unspecified");
        }
        normalized
    }

    fn read_mpeg_audio_headers(&self, data: &[u8]) -> Result<PendingFrame> {
        if data.len() < MPEG_AUDIO_HEADER_SIZE {
            bail!(FrameParserError::BufferTooShort(data.len()));
        }

        let header = MpegAudioFrameHeader::parse(data)?;

        let mut extension_length = 0;
        if data.len() != header.length {
            // Multichannel extension data may follow the base frame.
            let extension = data
                .get(header.length..)
                .filter(|rest| rest.len() >= MPEG_AUDIO_EXTENSION_HEADER_SIZE)
                .and_then(|rest| parse_extension_header(rest).ok());

            match extension {
                Some(len) if header.length + len == data.len() => extension_length = len,
                _ => bail!(FrameParserError::BadLengthConsistency {
                    expected: header.length,
                    actual: data.len(),
                }),
            }
        }

        let new_stream = match self.state.stream_parameters.as_deref() {
            Some(StreamParameters::MpegAudio(current)) if current.layer == header.layer => None,
            _ => Some(StreamParameters::MpegAudio(MpegAudioStreamParameters {
                layer: header.layer,
                standard: header.standard,
            })),
        };

        let duration = (
            header.number_of_samples as u64,
            header.sampling_frequency as u64,
        );

        Ok(PendingFrame {
            new_stream,
            frame: FrameParameters::MpegAudio(MpegAudioFrameParameters {
                header,
                extension_length,
            }),
            duration,
            key_frame: true,
            references: None,
        })
    }

    fn read_aac_headers(&self, data: &[u8]) -> Result<PendingFrame> {
        if data.len() < ADTS_HEADER_SIZE {
            bail!(FrameParserError::BufferTooShort(data.len()));
        }

        let header = AdtsHeader::parse(data)?;
        if header.length != data.len() {
            bail!(FrameParserError::BadLengthConsistency {
                expected: header.length,
                actual: data.len(),
            });
        }

        let new_stream = match self.state.stream_parameters.as_deref() {
            Some(StreamParameters::Aac(current)) if !current.differs_from(&header) => None,
            _ => Some(StreamParameters::Aac(AacStreamParameters::from_header(
                &header,
            ))),
        };

        let duration = (
            header.number_of_samples as u64,
            header.sampling_frequency as u64,
        );

        Ok(PendingFrame {
            new_stream,
            frame: FrameParameters::Aac(AacFrameParameters { header }),
            duration,
            key_frame: true,
            references: None,
        })
    }

    /// Header packets are committed here; picture packets become pending frames.
    fn read_theora_headers(&mut self, data: &[u8]) -> Result<Option<PendingFrame>> {
        let Some(&first) = data.first() else {
            bail!(FrameParserError::BufferTooShort(0));
        };

        if first & 0x80 != 0 {
            self.read_theora_stream_header(data)?;
            return Ok(None);
        }

        let Some(StreamParameters::Theora(stream)) = self.state.stream_parameters.as_deref()
        else {
            bail!(FrameParserError::NoStreamParameters);
        };

        let picture = TheoraPictureHeader::parse(data)?;
        let references = self
            .state
            .reference_list
            .prepare_for_decode(picture.picture_type)?;

        let frame_rate = stream.frame_rate();

        Ok(Some(PendingFrame {
            new_stream: None,
            frame: FrameParameters::Theora(TheoraFrameParameters {
                picture_type: picture.picture_type,
                coded_length: data.len(),
            }),
            duration: (
                frame_rate.denominator as u64,
                frame_rate.numerator as u64,
            ),
            key_frame: picture.picture_type.is_independent(),
            references: Some(references),
        }))
    }

    fn read_theora_stream_header(&mut self, data: &[u8]) -> Result<()> {
        if self.state.theora_sequence.sequence_header_present() {
            debug!("Theora sequence already complete, header packet ignored");
            return Ok(());
        }

        let mut sequence = self.state.theora_sequence.clone();
        let header_type = sequence.read(data)?;
        trace!("Theora {} header read", header_type.name());

        let lease = match TheoraStreamParameters::from_sequence(&sequence) {
            Some(parameters) => Some(
                self.stream_pool
                    .acquire(StreamParameters::Theora(parameters))?,
            ),
            None => None,
        };

        self.state.theora_sequence = sequence;

        if let Some(lease) = lease {
            let parameters = lease.into_shared();
            if let StreamParameters::Theora(theora) = &*parameters {
                let id = &theora.identification;
                info!(
                    "Theora sequence: {}x{} ({}x{} decoded), {} fps, {:?}",
                    id.display_width,
                    id.display_height,
                    id.decoded_width,
                    id.decoded_height,
                    id.frame_rate,
                    id.pixel_format
                );
            }
            self.state.stream_parameters = Some(parameters);
            self.state.stream_parameters_updated = true;
        }

        Ok(())
    }

    fn commit(&mut self, buffer: &CodedBuffer, pending: PendingFrame) -> Result<ParsedFrame> {
        let stream_lease = pending
            .new_stream
            .map(|parameters| self.stream_pool.acquire(parameters))
            .transpose()?;
        let frame_lease = self.frame_pool.acquire(pending.frame)?;

        let mut synthesizer = self.state.synthesizer.clone();
        let real = buffer.playback_time.and_then(|native| {
            self.normalize(native)
                .map(|normalized| SourceTimestamp { native, normalized })
        });
        let playback_time = synthesizer.handle_current_frame_time(real);
        let (count, rate) = pending.duration;
        synthesizer.predict_next(count, rate);

        if playback_time.jitter_exceeded && playback_time.source == TimeSource::Real {
            if let (Some(real), Some(deviation)) = (real, playback_time.deviation_us) {
                log_or_err!(
                    self.state,
                    log::Level::Warn,
                    anyhow!(FrameParserError::PlaybackTimeJitter {
                        real: real.normalized,
                        predicted: (real.normalized as i128 - deviation as i128).max(0) as u64,
                        deviation,
                        tolerance: synthesizer.jitter_tolerance_us(),
                    })
                );
            }
        }

        let new_parameters = stream_lease.map(SlotLease::into_shared);
        let Some(stream_parameters) = new_parameters
            .as_ref()
            .or(self.state.stream_parameters.as_ref())
            .map(Shared::attach)
        else {
            bail!(FrameParserError::NoStreamParameters);
        };

        // Nothing below can fail.
        self.state.synthesizer = synthesizer;

        if let Some(parameters) = new_parameters {
            debug!("New {} stream parameters: {:?}", self.codec, *parameters);
            self.state.stream_parameters = Some(parameters);
            self.state.stream_parameters_updated = true;
        }

        let frame_parameters = frame_lease.into_shared();

        let decode_frame_index = self.state.next_decode_frame_index;
        self.state.next_decode_frame_index = decode_frame_index.wrapping_add(1);

        if let Some(picture_type) = frame_parameters.picture_type() {
            self.state.reference_list.update_after_decode(
                picture_type,
                decode_frame_index,
                &mut *self.releaser,
            );
        }

        let display_frame_index = self.state.next_display_frame_index;
        self.state.next_display_frame_index += 1;

        let new_stream_parameters = std::mem::take(&mut self.state.stream_parameters_updated);

        trace!(
            "{} frame {display_frame_index}: {} bytes, time {:?} ({:?}){}",
            self.codec,
            buffer.len(),
            playback_time.time,
            playback_time.source,
            if new_stream_parameters {
                ", new stream parameters"
            } else {
                ""
            }
        );

        Ok(ParsedFrame {
            display_frame_index,
            decode_frame_index,
            playback_time,
            decode_time: buffer.decode_time.and_then(|native| self.normalize(native)),
            key_frame: pending.key_frame,
            new_stream_parameters,
            references: pending.references,
            stream_parameters,
            frame_parameters,
            coded: buffer.clone(),
        })
    }
}

/// Header errors count towards marking a stream unplayable; missing
/// prerequisites and exhausted resources only skip the frame.
fn counts_towards_unplayable(err: &anyhow::Error) -> bool {
    if err.downcast_ref::<ReferenceListError>().is_some()
        || err.downcast_ref::<PoolError>().is_some()
    {
        return false;
    }

    match err.downcast_ref::<FrameParserError>() {
        Some(FrameParserError::BufferTooShort(_))
        | Some(FrameParserError::BadLengthConsistency { .. }) => true,
        Some(_) => false,
        None => {
            err.downcast_ref::<MpegAudioError>().is_some()
                || err.downcast_ref::<AacError>().is_some()
                || err.downcast_ref::<TheoraError>().is_some()
                || err.downcast_ref::<std::io::Error>().is_some()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use super::*;
    use crate::structs::aac::compose_adts_header;
    use crate::structs::frame::Discontinuity;
    use crate::structs::mpeg_audio::{MpegStandard, compose_header};
    use crate::structs::reference_list::{PictureType, ReleaseRequest};
    use crate::structs::theora::{IdentificationFields, THEORA_TAG};

    fn mpeg_frame(layer: u8) -> CodedBuffer {
        // 128 kbit/s at 44.1 kHz in every layer
        let index = match layer {
            1 => 4,
            2 => 8,
            _ => 9,
        };
        let header = compose_header(MpegStandard::Mpeg1, layer, index, 0, false);
        let length = MpegAudioFrameHeader::parse(&header).unwrap().length;
        let mut data = header.to_vec();
        data.resize(length, 0);
        CodedBuffer::new(data)
    }

    fn adts_frame(channels: u8) -> CodedBuffer {
        let mut data = compose_adts_header(1, 3, channels, 200, 0).to_vec();
        data.resize(200, 0);
        CodedBuffer::new(data)
    }

    fn theora_header(type_byte: u8, payload: &[u8]) -> CodedBuffer {
        let mut data = vec![type_byte];
        data.extend_from_slice(THEORA_TAG);
        data.extend_from_slice(payload);
        CodedBuffer::new(data)
    }

    fn theora_parser() -> (Parser, mpsc::Receiver<ReleaseRequest>) {
        let (tx, rx) = mpsc::channel::<ReleaseRequest>();
        let mut parser = Parser::new(Codec::Theora, ParserConfig::default());
        parser.set_reference_releaser(Box::new(tx));

        let info = CodedBuffer::new(IdentificationFields::default().to_packet());
        assert!(parser.read_headers(&theora_header(0x81, &[0; 8])).unwrap().is_none());
        assert!(parser.read_headers(&info).unwrap().is_none());
        assert!(parser.stream_parameters().is_none());
        assert!(parser.read_headers(&theora_header(0x82, &[7; 32])).unwrap().is_none());
        assert!(parser.stream_parameters().is_some());

        (parser, rx)
    }

    fn picture(picture_type: PictureType) -> CodedBuffer {
        match picture_type {
            PictureType::Intra => CodedBuffer::new(vec![0x00, 0x12, 0x34]),
            PictureType::Inter => CodedBuffer::new(vec![0x40, 0x56]),
        }
    }

    #[test]
    fn stream_parameters_follow_layer() -> Result<()> {
        let mut parser = Parser::new(Codec::MpegAudio, ParserConfig::default());

        let first = parser.read_headers(&mpeg_frame(2))?.unwrap();
        let second = parser.read_headers(&mpeg_frame(2))?.unwrap();
        assert!(first.new_stream_parameters);
        assert!(!second.new_stream_parameters);
        assert!(first.stream_parameters.ptr_eq(&second.stream_parameters));
        assert_eq!(first.display_frame_index, 0);
        assert_eq!(second.display_frame_index, 1);

        let third = parser.read_headers(&mpeg_frame(3))?.unwrap();
        assert!(third.new_stream_parameters);
        assert!(!third.stream_parameters.ptr_eq(&second.stream_parameters));
        match &*third.stream_parameters {
            StreamParameters::MpegAudio(p) => assert_eq!(p.layer, 3),
            other => panic!("unexpected {other:?}"),
        }

        drop((first, second));
        // the parser keeps the current epoch, the third frame shares it
        assert_eq!(parser.stream_parameters_in_use(), 1);
        assert_eq!(third.stream_parameters.reference_count(), 2);
        Ok(())
    }

    #[test]
    fn version_change_keeps_epoch() -> Result<()> {
        let mut parser = Parser::new(Codec::MpegAudio, ParserConfig::default());
        let mpeg2 = {
            let header = compose_header(MpegStandard::Mpeg2, 2, 8, 0, false);
            let mut data = header.to_vec();
            data.resize(MpegAudioFrameHeader::parse(&header)?.length, 0);
            CodedBuffer::new(data)
        };

        let first = parser.read_headers(&mpeg_frame(2))?.unwrap();
        let second = parser.read_headers(&mpeg2)?.unwrap();
        assert!(!second.new_stream_parameters);
        assert!(second.stream_parameters.ptr_eq(&first.stream_parameters));
        match (&*second.stream_parameters, &*second.frame_parameters) {
            (StreamParameters::MpegAudio(stream), FrameParameters::MpegAudio(frame)) => {
                assert_eq!(stream.standard, MpegStandard::Mpeg1);
                assert_eq!(frame.header.standard, MpegStandard::Mpeg2);
            }
            other => panic!("unexpected {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn synthesizes_times_between_real_ones() -> Result<()> {
        let mut parser = Parser::new(Codec::MpegAudio, ParserConfig::default());

        let first = parser.read_headers(&mpeg_frame(2).with_playback_time(90_000))?;
        assert_eq!(first.unwrap().normalized_playback_time(), Some(1_000_000));

        let second = parser.read_headers(&mpeg_frame(2))?.unwrap();
        assert_eq!(second.playback_time.source, TimeSource::Synthetic);
        assert_eq!(second.normalized_playback_time(), Some(1_026_122));

        let jumped = mpeg_frame(2).with_discontinuity(Discontinuity::jump());
        let third = parser.read_headers(&jumped)?.unwrap();
        assert_eq!(third.normalized_playback_time(), None);
        Ok(())
    }

    #[test]
    fn null_timestamp_uses_prediction() -> Result<()> {
        let mut parser = Parser::new(Codec::MpegAudio, ParserConfig::default());
        parser.read_headers(&mpeg_frame(2).with_playback_time(900_000))?;

        let frame = parser
            .read_headers(&mpeg_frame(2).with_playback_time(0))?
            .unwrap();
        assert_eq!(frame.playback_time.source, TimeSource::NullTimestampFallback);
        assert_eq!(frame.normalized_playback_time(), Some(10_026_122));
        Ok(())
    }

    #[test]
    fn strict_mode_rejects_jitter() -> Result<()> {
        let mut parser = Parser::new(Codec::MpegAudio, ParserConfig::default());
        parser.set_fail_level(log::Level::Warn);
        parser.read_headers(&mpeg_frame(2).with_playback_time(90_000))?;

        let late = mpeg_frame(2).with_playback_time(90_000 + 9_000);
        let err = parser.read_headers(&late).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FrameParserError>(),
            Some(FrameParserError::PlaybackTimeJitter { .. })
        ));
        assert_eq!(parser.state().next_display_frame_index, 1);
        assert_eq!(parser.frame_parameters_in_use(), 0);
        Ok(())
    }

    #[test]
    fn failed_parse_leaves_state() -> Result<()> {
        let mut parser = Parser::new(Codec::MpegAudio, ParserConfig::default());
        let first = parser.read_headers(&mpeg_frame(2))?.unwrap();

        let err = parser
            .read_headers(&CodedBuffer::new(vec![0x12, 0x34, 0x56, 0x78]))
            .unwrap_err();
        assert!(err.downcast_ref::<MpegAudioError>().is_some());
        assert_eq!(parser.state().consecutive_errors, 1);
        assert!(
            parser
                .stream_parameters()
                .unwrap()
                .ptr_eq(&first.stream_parameters)
        );

        let next = parser.read_headers(&mpeg_frame(2))?.unwrap();
        assert_eq!(next.display_frame_index, 1);
        assert_eq!(parser.state().consecutive_errors, 0);
        Ok(())
    }

    #[test]
    fn length_must_match_buffer() -> Result<()> {
        let mut parser = Parser::new(Codec::MpegAudio, ParserConfig::default());

        let mut data = mpeg_frame(2).as_ref().to_vec();
        let base = data.len();
        data.extend([0u8; 20]);
        let err = parser.read_headers(&CodedBuffer::new(data.clone())).unwrap_err();
        assert_eq!(
            err.downcast_ref::<FrameParserError>(),
            Some(&FrameParserError::BadLengthConsistency {
                expected: base,
                actual: base + 20
            })
        );

        // extension header: sync 0x7FF, CRC, length 20, ID 0
        let word: u64 = (0x7FF << 28) | (20 << 1);
        data[base..base + 5].copy_from_slice(&word.to_be_bytes()[3..]);
        let frame = parser.read_headers(&CodedBuffer::new(data))?.unwrap();
        match &*frame.frame_parameters {
            FrameParameters::MpegAudio(p) => {
                assert_eq!(p.extension_length, 20);
                assert_eq!(p.frame_size(), base + 20);
            }
            other => panic!("unexpected {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn repeated_aac_errors_mark_unplayable() -> Result<()> {
        let mut parser = Parser::new(Codec::Aac, ParserConfig::default());
        let first = parser.read_headers(&adts_frame(2))?.unwrap();
        assert!(first.new_stream_parameters);

        let broken = CodedBuffer::new(vec![0xFF, 0xF1, 0x7C, 0x80, 0x19, 0x1F, 0xFC]);
        for i in 1..=4 {
            assert!(parser.read_headers(&broken).is_err());
            assert_eq!(parser.is_unplayable(), i >= 4);
        }

        let recovered = parser.read_headers(&adts_frame(2))?.unwrap();
        assert!(!recovered.new_stream_parameters);
        assert!(parser.is_unplayable());

        let remixed = parser.read_headers(&adts_frame(6))?.unwrap();
        assert!(remixed.new_stream_parameters);
        Ok(())
    }

    #[test]
    fn theora_headers_gate_pictures() -> Result<()> {
        let mut parser = Parser::new(Codec::Theora, ParserConfig::default());

        let err = parser.read_headers(&picture(PictureType::Intra)).unwrap_err();
        assert_eq!(
            err.downcast_ref::<FrameParserError>(),
            Some(&FrameParserError::NoStreamParameters)
        );
        assert!(!parser.is_unplayable());

        let bad_tag = CodedBuffer::new(b"\x80theorX".to_vec());
        assert!(parser.read_headers(&bad_tag).is_err());
        assert!(parser.is_unplayable());
        Ok(())
    }

    #[test]
    fn theora_reference_chain() -> Result<()> {
        let (mut parser, releases) = theora_parser();

        let err = parser.read_headers(&picture(PictureType::Inter)).unwrap_err();
        assert!(err.downcast_ref::<ReferenceListError>().is_some());
        assert_eq!(parser.state().next_display_frame_index, 0);

        let i1 = parser.read_headers(&picture(PictureType::Intra))?.unwrap();
        assert!(i1.key_frame);
        assert!(i1.new_stream_parameters);
        assert_eq!(i1.reference_indices(), Some([0, 0]));
        assert_eq!(parser.state().reference_list.entries(), &[0, 0]);

        let p2 = parser.read_headers(&picture(PictureType::Inter))?.unwrap();
        assert!(!p2.key_frame);
        assert!(!p2.new_stream_parameters);
        assert_eq!(p2.reference_indices(), Some([0, 0]));

        let p3 = parser.read_headers(&picture(PictureType::Inter))?.unwrap();
        assert_eq!(p3.reference_indices(), Some([1, 0]));

        let i4 = parser.read_headers(&picture(PictureType::Intra))?.unwrap();
        assert_eq!(i4.reference_indices(), Some([2, 0]));
        assert_eq!(parser.state().reference_list.entries(), &[3, 3]);

        let released: Vec<u32> = releases.try_iter().map(|r| r.decode_frame_index).collect();
        assert_eq!(released, vec![1, 2, 0]);
        assert_eq!(i4.normalized_playback_time(), None);
        Ok(())
    }

    #[test]
    fn theora_headers_after_sequence_ignored() -> Result<()> {
        let (mut parser, _releases) = theora_parser();
        let parameters = parser.stream_parameters().unwrap().clone();

        assert!(parser.read_headers(&theora_header(0x81, &[1; 4]))?.is_none());
        assert!(parser.stream_parameters().unwrap().ptr_eq(&parameters));
        Ok(())
    }

    #[test]
    fn reset_stream_releases_references_and_accepts_new_sequence() -> Result<()> {
        let (mut parser, releases) = theora_parser();

        let i0 = parser.read_headers(&picture(PictureType::Intra))?.unwrap();
        parser.read_headers(&picture(PictureType::Inter))?.unwrap();
        assert_eq!(parser.state().reference_list.entries(), &[1, 0]);
        assert_eq!(releases.try_iter().count(), 0);

        parser.reset_stream();
        let released: Vec<u32> = releases.try_iter().map(|r| r.decode_frame_index).collect();
        assert_eq!(released, vec![1, 0]);
        assert!(parser.stream_parameters().is_none());

        let err = parser.read_headers(&picture(PictureType::Intra)).unwrap_err();
        assert_eq!(
            err.downcast_ref::<FrameParserError>(),
            Some(&FrameParserError::NoStreamParameters)
        );

        let wide = IdentificationFields {
            macroblock_width: 40,
            macroblock_height: 30,
            decoded_width: 640,
            decoded_height: 480,
            ..Default::default()
        };
        assert!(parser.read_headers(&CodedBuffer::new(wide.to_packet()))?.is_none());
        assert!(parser.read_headers(&theora_header(0x81, &[0; 8]))?.is_none());
        assert!(parser.read_headers(&theora_header(0x82, &[7; 32]))?.is_none());

        let next = parser.read_headers(&picture(PictureType::Intra))?.unwrap();
        assert!(next.new_stream_parameters);
        assert!(!next.stream_parameters.ptr_eq(&i0.stream_parameters));
        match &*next.stream_parameters {
            StreamParameters::Theora(theora) => {
                assert_eq!(theora.identification.display_width, 640)
            }
            other => panic!("unexpected parameters {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn out_of_range_native_time_is_unspecified() -> Result<()> {
        let mut parser = Parser::new(Codec::MpegAudio, ParserConfig::default());

        let frame = parser.read_headers(&mpeg_frame(2).with_playback_time(u64::MAX))?.unwrap();
        assert_eq!(frame.playback_time.source, TimeSource::Unspecified);
        assert_eq!(frame.normalized_playback_time(), None);
        Ok(())
    }

    #[test]
    fn theora_timing_uses_frame_rate() -> Result<()> {
        let (mut parser, _releases) = theora_parser();

        parser.read_headers(&picture(PictureType::Intra).with_playback_time(0))?;
        let next = parser.read_headers(&picture(PictureType::Inter))?.unwrap();
        assert_eq!(next.normalized_playback_time(), Some(40_000));
        Ok(())
    }

    #[test]
    fn exhausted_pool_skips_frame() -> Result<()> {
        let config = ParserConfig {
            frame_parameter_pool_size: 1,
            ..Default::default()
        };
        let mut parser = Parser::new(Codec::MpegAudio, config);

        let held = parser.read_headers(&mpeg_frame(2))?.unwrap();
        let err = parser.read_headers(&mpeg_frame(2)).unwrap_err();
        assert!(err.downcast_ref::<PoolError>().is_some());
        assert_eq!(parser.state().consecutive_errors, 0);

        drop(held);
        let next = parser.read_headers(&mpeg_frame(2))?.unwrap();
        assert_eq!(next.display_frame_index, 1);
        Ok(())
    }
}
