use std::collections::VecDeque;
use std::sync::Arc;

use log::{debug, warn};

use crate::structs::aac::{ADTS_HEADER_SIZE, AdtsHeader};
use crate::structs::frame::{CodedBuffer, Discontinuity};
use crate::structs::mpeg_audio::{MPEG_AUDIO_HEADER_SIZE, MpegAudioFrameHeader};
use crate::structs::parameters::Codec;
use crate::utils::errors::ExtractError;

const PROBE_SIZE: usize = if ADTS_HEADER_SIZE > MPEG_AUDIO_HEADER_SIZE {
    ADTS_HEADER_SIZE
} else {
    MPEG_AUDIO_HEADER_SIZE
};

/// Elementary stream syntaxes the extractor can slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamFormat {
    MpegAudio,
    Adts,
}

impl StreamFormat {
    pub fn codec(self) -> Codec {
        match self {
            StreamFormat::MpegAudio => Codec::MpegAudio,
            StreamFormat::Adts => Codec::Aac,
        }
    }

    fn frame_length(self, data: &[u8]) -> Option<usize> {
        match self {
            StreamFormat::MpegAudio => MpegAudioFrameHeader::parse(data).ok().map(|h| h.length),
            StreamFormat::Adts => AdtsHeader::parse(data).ok().map(|h| h.length),
        }
    }
}

/// Slices a raw MPEG audio or ADTS elementary stream into coded frames.
///
/// Sync is acquired only where a frame header is followed by a second valid
/// header exactly one frame later. After sync is lost the extractor searches
/// byte by byte and marks the next frame as the first after a jump.
///
/// # Example
///
/// ```rust,no_run
/// use frameparser::process::extract::Extractor;
///
/// let mut extractor = Extractor::default();
/// extractor.push_bytes(&std::fs::read("stream.mp2")?);
/// extractor.finish();
///
/// for frame in extractor.by_ref() {
///     match frame {
///         Ok(frame) => println!("Frame of {} bytes", frame.len()),
///         Err(e) => eprintln!("{e}"),
///     }
/// }
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug)]
pub struct Extractor {
    buffer: VecDeque<u8>,
    format: Option<StreamFormat>,
    locked: bool,
    finished: bool,
    io_counter: usize,
    pending_jump: bool,
    lost_sync: Option<usize>,
    frames_extracted: usize,
    bytes_skipped: usize,
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new(None)
    }
}

impl Extractor {
    /// Creates an extractor for `format`, or one that detects it when `None`.
    pub fn new(format: Option<StreamFormat>) -> Self {
        Self {
            buffer: VecDeque::with_capacity(64 * 1024),
            format,
            locked: false,
            finished: false,
            io_counter: 0,
            pending_jump: false,
            lost_sync: None,
            frames_extracted: 0,
            bytes_skipped: 0,
        }
    }

    pub fn push_bytes(&mut self, data: &[u8]) {
        self.buffer.extend(data);
        self.io_counter += 1;
    }

    /// Signals end of input so the final frame is released without a
    /// following header to confirm it.
    pub fn finish(&mut self) {
        self.finished = true;
        self.io_counter += 1;
    }

    /// The detected or configured format.
    pub fn format(&self) -> Option<StreamFormat> {
        self.format
    }

    pub fn frames_extracted(&self) -> usize {
        self.frames_extracted
    }

    pub fn bytes_skipped(&self) -> usize {
        self.bytes_skipped
    }

    fn probe(&self, data: &[u8]) -> Option<(StreamFormat, usize)> {
        let candidates: &[StreamFormat] = match &self.format {
            Some(format) => std::slice::from_ref(format),
            None => &[StreamFormat::MpegAudio, StreamFormat::Adts],
        };

        candidates
            .iter()
            .find_map(|format| format.frame_length(data).map(|len| (*format, len)))
    }

    fn resync(&mut self) -> Result<(), ExtractError> {
        self.locked = false;
        let mut skipped = 0;

        let result = loop {
            let data = self.buffer.make_contiguous();
            if data.len() < PROBE_SIZE {
                break Err(());
            }

            let Some((format, len)) = self.probe(self.buffer.as_slices().0) else {
                self.buffer.pop_front();
                skipped += 1;
                continue;
            };

            let data = self.buffer.as_slices().0;
            let confirmed = if data.len() >= len + PROBE_SIZE {
                self.probe(&data[len..])
                    .is_some_and(|(next_format, _)| next_format == format)
            } else if self.finished && data.len() >= len {
                true
            } else {
                break Err(());
            };

            if !confirmed {
                self.buffer.pop_front();
                skipped += 1;
                continue;
            }

            if self.format.is_none() {
                debug!("Detected {format:?} elementary stream");
            }
            self.format = Some(format);
            self.locked = true;
            break Ok(());
        };

        if skipped > 0 {
            self.bytes_skipped += skipped;
            self.lost_sync = Some(self.lost_sync.unwrap_or(0) + skipped);
            if self.frames_extracted > 0 {
                self.pending_jump = true;
            }
        }

        result.or_else(|_| self.insufficient())
    }

    fn insufficient(&mut self) -> Result<(), ExtractError> {
        self.io_counter = self.io_counter.saturating_sub(1);
        if self.finished && !self.buffer.is_empty() && !self.locked {
            debug!("Discarding {} trailing bytes", self.buffer.len());
            self.buffer.clear();
        }
        Err(ExtractError::InsufficientData)
    }

    fn iter_insufficient(&mut self) -> Option<Result<CodedBuffer, ExtractError>> {
        self.io_counter = self.io_counter.saturating_sub(1);
        Some(Err(ExtractError::InsufficientData))
    }
}

impl Iterator for Extractor {
    type Item = Result<CodedBuffer, ExtractError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(skipped) = self.lost_sync.take() {
                warn!("{}", ExtractError::LostSync(skipped));
                return Some(Err(ExtractError::LostSync(skipped)));
            }

            if self.io_counter == 0 {
                return None;
            }

            if !self.locked {
                if let Err(e) = self.resync() {
                    if let Some(skipped) = self.lost_sync.take() {
                        warn!("{}", ExtractError::LostSync(skipped));
                        return Some(Err(ExtractError::LostSync(skipped)));
                    }
                    return Some(Err(e));
                }
                continue;
            }

            let data = self.buffer.make_contiguous();
            if data.is_empty() || (data.len() < PROBE_SIZE && self.finished) {
                self.buffer.clear();
                self.io_counter = 0;
                return None;
            }

            if data.len() < PROBE_SIZE {
                return self.iter_insufficient();
            }

            let Some((_, len)) = self.probe(self.buffer.as_slices().0) else {
                self.locked = false;
                continue;
            };

            if self.buffer.len() < len {
                if self.finished {
                    debug!("Discarding truncated final frame of {} bytes", self.buffer.len());
                    self.buffer.clear();
                    self.io_counter = 0;
                    return None;
                }
                return self.iter_insufficient();
            }

            let data: Arc<[u8]> = self.buffer.drain(..len).collect();
            let discontinuity = if std::mem::take(&mut self.pending_jump) {
                Discontinuity::jump()
            } else {
                Discontinuity::default()
            };

            self.frames_extracted += 1;
            return Some(Ok(CodedBuffer::new(data).with_discontinuity(discontinuity)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structs::aac::compose_adts_header;
    use crate::structs::mpeg_audio::{MpegStandard, compose_header};

    fn mpeg_frame(padding: bool) -> Vec<u8> {
        let mut frame = compose_header(MpegStandard::Mpeg1, 2, 8, 0, padding).to_vec();
        frame.resize(if padding { 418 } else { 417 }, 0);
        frame
    }

    fn adts_frame(len: u16) -> Vec<u8> {
        let mut frame = compose_adts_header(1, 3, 2, len, 0).to_vec();
        frame.resize(len as usize, 0);
        frame
    }

    fn frames(extractor: &mut Extractor) -> Vec<CodedBuffer> {
        extractor.by_ref().filter_map(Result::ok).collect()
    }

    #[test]
    fn slices_mpeg_audio() {
        let mut stream = mpeg_frame(false);
        stream.extend(mpeg_frame(true));
        stream.extend(mpeg_frame(false));

        let mut extractor = Extractor::default();
        extractor.push_bytes(&stream);
        extractor.finish();

        let lengths: Vec<usize> = frames(&mut extractor).iter().map(|f| f.len()).collect();
        assert_eq!(lengths, vec![417, 418, 417]);
        assert_eq!(extractor.format(), Some(StreamFormat::MpegAudio));
    }

    #[test]
    fn detects_adts() {
        let mut stream = adts_frame(300);
        stream.extend(adts_frame(280));

        let mut extractor = Extractor::default();
        extractor.push_bytes(&stream);
        extractor.finish();

        let lengths: Vec<usize> = frames(&mut extractor).iter().map(|f| f.len()).collect();
        assert_eq!(lengths, vec![300, 280]);
        assert_eq!(extractor.format(), Some(StreamFormat::Adts));
    }

    #[test]
    fn skips_leading_garbage() {
        let mut stream = vec![0x00, 0xFF, 0x12];
        stream.extend(mpeg_frame(false));
        stream.extend(mpeg_frame(false));

        let mut extractor = Extractor::default();
        extractor.push_bytes(&stream);
        extractor.finish();

        assert_eq!(extractor.next(), Some(Err(ExtractError::LostSync(3))));
        let rest = frames(&mut extractor);
        assert_eq!(rest.len(), 2);
        assert!(!rest[0].discontinuity.first_after_jump);
        assert_eq!(extractor.bytes_skipped(), 3);
    }

    #[test]
    fn resync_marks_jump() {
        let mut stream = mpeg_frame(false);
        stream.extend(mpeg_frame(false));
        stream.extend([0xAB; 10]);
        stream.extend(mpeg_frame(false));
        stream.extend(mpeg_frame(false));

        let mut extractor = Extractor::default();
        extractor.push_bytes(&stream);
        extractor.finish();

        let items: Vec<_> = extractor.by_ref().collect();
        assert!(items.contains(&Err(ExtractError::LostSync(10))));

        let frames: Vec<_> = items.into_iter().filter_map(Result::ok).collect();
        assert_eq!(frames.len(), 4);
        assert!(frames[2].discontinuity.first_after_jump);
        assert!(!frames[3].discontinuity.first_after_jump);
    }

    #[test]
    fn waits_for_more_data() {
        let mut stream = mpeg_frame(false);
        stream.extend(mpeg_frame(false));

        let mut extractor = Extractor::new(Some(StreamFormat::MpegAudio));
        extractor.push_bytes(&stream[..500]);

        assert_eq!(extractor.next().map(|r| r.map(|f| f.len())), Some(Ok(417)));
        assert_eq!(extractor.next(), Some(Err(ExtractError::InsufficientData)));
        assert_eq!(extractor.next(), None);

        extractor.push_bytes(&stream[500..]);
        extractor.finish();
        let rest = frames(&mut extractor);
        assert_eq!(rest.len(), 1);
        assert_eq!(extractor.frames_extracted(), 2);
    }

    #[test]
    fn lone_sync_word_does_not_lock() {
        let mut stream = compose_header(MpegStandard::Mpeg1, 2, 8, 0, false).to_vec();
        stream.extend([0x55; 600]);

        let mut extractor = Extractor::default();
        extractor.push_bytes(&stream);

        assert!(frames(&mut extractor).is_empty());
        assert_eq!(extractor.format(), None);
    }
}
