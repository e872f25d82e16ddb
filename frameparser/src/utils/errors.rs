#[macro_export]
macro_rules! log_or_err {
    ($state:expr, $level:expr, $err:expr $(,)?) => {{
        if $level <= $state.fail_level {
            return Err($err);
        } else {
            match $level {
                ::log::Level::Error => ::log::error!("{}", $err),
                ::log::Level::Warn => ::log::warn!("{}", $err),
                ::log::Level::Info => ::log::info!("{}", $err),
                ::log::Level::Debug => ::log::debug!("{}", $err),
                ::log::Level::Trace => ::log::trace!("{}", $err),
            }
        }
    }};
}

/// Errors raised by the per-codec frame parser engines.
///
/// Every variant aborts only the current coded buffer.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameParserError {
    #[error("Coded buffer too short for a frame header: {0} bytes")]
    BufferTooShort(usize),

    #[error(
        "Header length does not match the coded buffer: header says {expected} bytes, buffer holds {actual}"
    )]
    BadLengthConsistency { expected: usize, actual: usize },

    #[error("No stream parameters available, sequence headers incomplete")]
    NoStreamParameters,

    #[error("Frame and stream parameters describe different codecs")]
    PartialFrameParameters,

    #[error(
        "Playback time jitter: real {real} us, predicted {predicted} us, deviation {deviation} us exceeds {tolerance} us"
    )]
    PlaybackTimeJitter {
        real: u64,
        predicted: u64,
        deviation: i64,
        tolerance: u64,
    },
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MpegAudioError {
    #[error("Invalid start code: {0:#010X}")]
    InvalidStartCode(u32),

    #[error("Reserved layer code in header {0:#010X}")]
    ReservedLayer(u32),

    #[error("Reserved MPEG version code in header {0:#010X}")]
    ReservedVersion(u32),

    #[error("Unsupported bit rate index {index} (free format or forbidden)")]
    InvalidBitRate { index: u8 },

    #[error("Reserved sampling frequency index {0}")]
    InvalidSamplingFrequency(u8),

    #[error("Invalid extension header sync: {0:#05X}")]
    InvalidExtensionSync(u16),

    #[error("Extension header ID bit must be 0")]
    InvalidExtensionId,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AacError {
    #[error("Invalid ADTS sync word: {0:#05X}")]
    InvalidSyncWord(u16),

    #[error("ADTS layer must be 0. Read {0}")]
    InvalidLayer(u8),

    #[error("Reserved sampling frequency index {0}")]
    InvalidSamplingFrequency(u8),

    #[error("ADTS frame length {length} is shorter than its header ({header} bytes)")]
    FrameTooShort { length: usize, header: usize },
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TheoraError {
    #[error("Packet is not a Theora header: type {0:#04X}")]
    UnknownHeaderType(u8),

    #[error("Header tag is not \"theora\"")]
    InvalidTag,

    #[error("Picture packet is not frame data")]
    NotFrameData,

    #[error("Decoded size {width}x{height} exceeds macroblock grid {grid_width}x{grid_height}")]
    DecodedSizeExceedsGrid {
        width: u32,
        height: u32,
        grid_width: u32,
        grid_height: u32,
    },

    #[error("Picture offset ({x},{y}) exceeds the slack of the macroblock grid")]
    PictureOffsetOutOfRange { x: u32, y: u32 },

    #[error("Reserved pixel format")]
    ReservedPixelFormat,

    #[error("Zero frame rate {numerator}/{denominator}")]
    InvalidFrameRate { numerator: u32, denominator: u32 },

    #[error("{kind} header of {len} bytes exceeds its {capacity} byte buffer")]
    HeaderTooLarge {
        kind: &'static str,
        len: usize,
        capacity: usize,
    },
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ReferenceListError {
    #[error("Insufficient reference frames: {available} held, {required} required")]
    InsufficientReferenceFrames { available: usize, required: usize },
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("All {capacity} {kind} slots are in use")]
    Exhausted { kind: &'static str, capacity: usize },
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Command builder for {expected} received {actual} parameters")]
    ParameterMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("No buffer address registered for decode frame index {0}")]
    MissingBufferAddress(u32),

    #[error("Reference list missing for a predicted video frame")]
    MissingReferenceList,

    #[error("Sampling frequency {0} Hz has no transform code")]
    UnsupportedSamplingFrequency(u32),

    #[error("Picture buffer for a {width}x{height} grid does not fit a transform command")]
    BufferTooLarge { width: u32, height: u32 },
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractError {
    #[error("Insufficient buffer data for frame extraction")]
    InsufficientData,

    #[error("Lost sync, skipped {0} bytes")]
    LostSync(usize),
}
