use std::fs::File;
use std::io::{self, BufWriter, Write};

use anyhow::Result;
use frameparser::process::decode::{BufferAddressMap, CodecConfig, CodecProxy};
use frameparser::structs::frame::ParsedFrame;
use indicatif::MultiProgress;
use log::Level;
use serde::Serialize;

use super::command::{Cli, FramesArgs};
use super::stream::run_stream;
use crate::timestamp::time_str;

/// Output buffers laid out back to back from a fixed base.
struct LinearAddresses {
    base: u64,
    stride: u64,
}

impl BufferAddressMap for LinearAddresses {
    fn buffer_address(&self, decode_frame_index: u32) -> Option<u64> {
        Some(self.base + decode_frame_index as u64 * self.stride)
    }
}

#[derive(Debug, Serialize)]
struct FrameRecord {
    index: u64,
    decode_index: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    time_us: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    time: Option<String>,
    time_source: String,
    length: usize,
    key_frame: bool,
    new_stream_parameters: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    samples: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    bit_rate_kbps: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    configure_command: Option<String>,
    decode_command: String,
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02X}")).collect()
}

pub fn cmd_frames(args: &FramesArgs, cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    let addresses = LinearAddresses {
        base: 0x4000_0000,
        stride: 0x10_0000,
    };

    let mut proxy: Option<CodecProxy> = None;
    let mut records = Vec::new();

    let summary = run_stream(&args.input, args.codec, cli, multi, |frame, parser, _| {
        let proxy = proxy.get_or_insert_with(|| {
            let mut proxy = CodecProxy::new(parser.codec(), CodecConfig::default());
            if cli.strict {
                proxy.set_fail_level(Level::Warn);
            }
            proxy
        });

        records.push(frame_record(frame, proxy, &addresses)?);
        Ok(())
    })?;

    log::info!(
        "{} frames parsed, {} parse errors",
        summary.frames,
        summary.parse_errors
    );

    let writer: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(File::create(path)?),
        None => Box::new(io::stdout().lock()),
    };
    let mut writer = BufWriter::new(writer);
    serde_yaml_ng::to_writer(&mut writer, &records)?;
    writer.flush()?;

    Ok(())
}

fn frame_record(
    frame: &ParsedFrame,
    proxy: &CodecProxy,
    addresses: &LinearAddresses,
) -> Result<FrameRecord> {
    let configure_command = if frame.new_stream_parameters {
        let command = proxy
            .fill_out_stream_parameter_command(frame.stream_parameters.attach())
            .map_err(|(_, e)| e)?;
        Some(hex(&command.global.to_bytes()))
    } else {
        None
    };

    let decode_command = proxy.fill_out_decode_command(frame, addresses)?;
    let time_us = frame.normalized_playback_time();

    Ok(FrameRecord {
        index: frame.display_frame_index,
        decode_index: frame.decode_frame_index,
        time_us,
        time: time_us.map(|us| time_str(us as f64 / 1_000_000.0)),
        time_source: format!("{:?}", frame.playback_time.source),
        length: frame.coded.len(),
        key_frame: frame.key_frame,
        new_stream_parameters: frame.new_stream_parameters,
        samples: frame.frame_parameters.sample_count(),
        bit_rate_kbps: frame.frame_parameters.bit_rate(),
        configure_command,
        decode_command: hex(&decode_command.to_bytes()),
    })
}
