use std::path::Path;

use anyhow::Result;
use frameparser::process::extract::Extractor;
use frameparser::process::parse::{Parser, ParserConfig};
use frameparser::structs::frame::{CodedBuffer, ParsedFrame};
use frameparser::structs::parameters::Codec;
use frameparser::utils::errors::ExtractError;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use log::Level;

use super::command::{Cli, CodecArg};
use crate::input::InputReader;

/// Elementary streams carry no timestamps; times are anchored here in
/// microseconds.
const TIME_BASE: u64 = 1_000_000;

#[derive(Debug, Default)]
pub struct StreamSummary {
    pub codec: Option<Codec>,
    pub frames: usize,
    pub parse_errors: usize,
    pub sync_losses: usize,
    pub bytes_skipped: usize,
    pub total_bytes: usize,
    /// End of the last frame, in microseconds.
    pub end_time: Option<u64>,
    pub unplayable: bool,
}

/// Runs extractor and frame parser over `input`, handing every parsed frame
/// to `on_frame`.
pub fn run_stream<F>(
    input: &Path,
    codec: CodecArg,
    cli: &Cli,
    multi: Option<&MultiProgress>,
    mut on_frame: F,
) -> Result<StreamSummary>
where
    F: FnMut(&ParsedFrame, &Parser, Option<&ProgressBar>) -> Result<()>,
{
    let mut input_reader = InputReader::new(input)?;
    let mut extractor = Extractor::new(codec.stream_format());

    let mut context = StreamContext {
        cli,
        parser: None,
        summary: StreamSummary::default(),
        pb: None,
    };

    if let Some(multi) = multi {
        let pb = multi.add(ProgressBar::new_spinner());
        pb.set_style(ProgressStyle::with_template("{spinner:.green} {msg}")?);
        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        pb.set_message("Parsing frames...");
        context.pb = Some(pb);
    }

    input_reader.process_chunks(64 * 1024, |chunk| {
        context.summary.total_bytes += chunk.len();
        extractor.push_bytes(chunk);
        context.drain(&mut extractor, &mut on_frame)?;
        Ok(true)
    })?;

    extractor.finish();
    context.drain(&mut extractor, &mut on_frame)?;

    if let Some(pb) = context.pb.take() {
        pb.finish_and_clear();
    }

    let mut summary = context.summary;
    summary.bytes_skipped = extractor.bytes_skipped();
    if let Some(parser) = &context.parser {
        summary.end_time = parser
            .state()
            .synthesizer
            .next_frame_normalized_playback_time();
        summary.unplayable = parser.is_unplayable();
    }

    Ok(summary)
}

struct StreamContext<'a> {
    cli: &'a Cli,
    parser: Option<Parser>,
    summary: StreamSummary,
    pb: Option<ProgressBar>,
}

impl StreamContext<'_> {
    fn new_parser(&self, codec: Codec) -> Parser {
        let config = ParserConfig {
            jitter_tolerance_us: self.cli.jitter_tolerance_us,
            native_time_base: TIME_BASE,
            ..Default::default()
        };

        let mut parser = Parser::new(codec, config);

        // Configure fail level based on strict mode
        parser.set_fail_level(if self.cli.strict {
            Level::Warn
        } else {
            Level::Error
        });

        parser
    }

    fn drain<F>(&mut self, extractor: &mut Extractor, on_frame: &mut F) -> Result<()>
    where
        F: FnMut(&ParsedFrame, &Parser, Option<&ProgressBar>) -> Result<()>,
    {
        while let Some(buffer) = extractor.next() {
            let buffer = match buffer {
                Ok(buffer) => buffer,
                Err(ExtractError::InsufficientData) => continue,
                Err(e @ ExtractError::LostSync(_)) => {
                    self.summary.sync_losses += 1;
                    if self.cli.strict {
                        return Err(e.into());
                    }
                    continue;
                }
            };

            if self.parser.is_none() {
                if let Some(format) = extractor.format() {
                    let parser = self.new_parser(format.codec());
                    log::info!("Detected {} stream", format.codec());
                    self.summary.codec = Some(format.codec());
                    self.parser = Some(parser);
                }
            }

            self.process_buffer(buffer, on_frame)?;
        }

        Ok(())
    }

    fn process_buffer<F>(&mut self, buffer: CodedBuffer, on_frame: &mut F) -> Result<()>
    where
        F: FnMut(&ParsedFrame, &Parser, Option<&ProgressBar>) -> Result<()>,
    {
        let Some(parser) = self.parser.as_mut() else {
            return Ok(());
        };

        // Anchor the first frame and every frame after a jump so that the
        // timeline stays continuous across resyncs.
        let buffer = if self.summary.frames == 0 || buffer.discontinuity.first_after_jump {
            let resume_at = parser
                .state()
                .synthesizer
                .next_frame_normalized_playback_time()
                .unwrap_or(0);
            buffer.with_playback_time(resume_at)
        } else {
            buffer
        };

        match parser.read_headers(&buffer) {
            Ok(Some(frame)) => {
                self.summary.frames += 1;
                on_frame(&frame, &*parser, self.pb.as_ref())?;
            }
            Ok(None) => {}
            Err(e) => {
                if self.cli.strict {
                    return Err(e);
                }
                self.summary.parse_errors += 1;
                log::warn!("Parse error after frame {}: {e}", self.summary.frames);
            }
        }

        if self.summary.frames.is_multiple_of(100) {
            if let Some(ref pb) = self.pb {
                pb.set_message(format!("Parsing frames...       {}", self.summary.frames));
                pb.tick();
            }
        }

        Ok(())
    }
}
