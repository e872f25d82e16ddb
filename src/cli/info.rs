use anyhow::Result;
use frameparser::structs::frame::ParsedFrame;
use frameparser::structs::parameters::{FrameParameters, StreamParameters};
use indicatif::MultiProgress;

use super::command::{Cli, InfoArgs};
use super::stream::{StreamSummary, run_stream};
use crate::timestamp::time_str;

pub fn cmd_info(args: &InfoArgs, cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    log::info!("Analyzing stream: {}", args.input.display());

    let mut epochs = 0usize;
    let summary = run_stream(&args.input, args.codec, cli, multi, |frame, _, pb| {
        if frame.new_stream_parameters {
            epochs += 1;
            let lines = describe_epoch(frame, epochs);
            match pb {
                Some(pb) => pb.suspend(|| print_lines(&lines)),
                None => print_lines(&lines),
            }
        }
        Ok(())
    })?;

    if summary.frames == 0 {
        println!("No frames found in the file.");
        println!("This doesn't appear to be an MPEG audio or ADTS stream.");
        return Ok(());
    }

    print_summary(&summary, epochs);

    Ok(())
}

fn print_lines(lines: &[String]) {
    for line in lines {
        println!("{line}");
    }
    println!();
}

fn describe_epoch(frame: &ParsedFrame, epoch: usize) -> Vec<String> {
    let start = frame
        .normalized_playback_time()
        .map(|us| time_str(us as f64 / 1_000_000.0))
        .unwrap_or_else(|| "unknown".to_string());

    let mut lines = vec![
        format!("Stream Parameters #{epoch}"),
        "====================".to_string(),
        format!("Starting at frame           {}", frame.display_frame_index),
        format!("Starting time               {start}"),
    ];

    match (&*frame.stream_parameters, &*frame.frame_parameters) {
        (StreamParameters::MpegAudio(stream), FrameParameters::MpegAudio(p)) => {
            lines.push(format!(
                "Format                      {} Layer {}",
                p.header.standard, stream.layer
            ));
            lines.push(format!(
                "Sampling frequency          {} Hz",
                p.header.sampling_frequency
            ));
            lines.push(format!(
                "Channel mode                {:?}",
                p.channel_mode()
            ));
            lines.push(format!("Bit rate                    {} kbps", p.header.bit_rate));
            lines.push(format!(
                "Samples per frame           {}",
                p.header.number_of_samples
            ));
        }
        (StreamParameters::Aac(stream), _) => {
            lines.push(format!("Format                      AAC {:?}", stream.object_type));
            lines.push(format!(
                "Sampling frequency          {} Hz",
                stream.sampling_frequency
            ));
            lines.push(format!(
                "Channel configuration       {}",
                stream.channel_configuration
            ));
            lines.push(format!(
                "AudioSpecificConfig         {:02X}{:02X}",
                stream.audio_specific_config[0], stream.audio_specific_config[1]
            ));
        }
        (StreamParameters::Theora(stream), _) => {
            let id = &stream.identification;
            lines.push(format!(
                "Format                      Theora {}x{}",
                id.display_width, id.display_height
            ));
            lines.push(format!("Frame rate                  {}", id.frame_rate));
        }
        (stream, _) => lines.push(format!("Format                      {}", stream.codec())),
    }

    lines
}

fn print_summary(summary: &StreamSummary, epochs: usize) {
    println!("Summary");
    println!("=======");
    println!();

    if let Some(codec) = summary.codec {
        println!("Codec                       {codec}");
    }
    println!("Frames                      {}", summary.frames);
    println!("Stream parameter changes    {epochs}");

    if let Some(end) = summary.end_time {
        println!(
            "Duration                    {}",
            time_str(end as f64 / 1_000_000.0)
        );
    }

    println!("Bytes read                  {}", summary.total_bytes);

    if summary.bytes_skipped > 0 || summary.sync_losses > 0 {
        println!(
            "Sync losses                 {} ({} bytes skipped)",
            summary.sync_losses, summary.bytes_skipped
        );
    }
    if summary.parse_errors > 0 {
        println!("Parse errors                {}", summary.parse_errors);
    }
    if summary.unplayable {
        println!("Status                      unplayable (repeated header errors)");
    }
}
