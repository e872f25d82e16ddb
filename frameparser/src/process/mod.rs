/// Frame extraction from elementary streams.
///
/// Provides the [`Extractor`](extract::Extractor) for slicing raw MPEG audio
/// and ADTS streams into [`CodedBuffer`](crate::structs::frame::CodedBuffer)s.
pub mod extract;

/// Frame parsing into frames ready to decode.
///
/// Provides the [`Parser`](parse::Parser), which validates headers, keeps
/// stream parameters current and times each
/// [`ParsedFrame`](crate::structs::frame::ParsedFrame).
pub mod parse;

/// Transform command building and completion checks.
///
/// Provides the [`CodecProxy`](decode::CodecProxy) for turning parsed frames
/// into fixed-layout commands and interpreting decode status.
pub mod decode;
