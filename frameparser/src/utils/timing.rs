//! Playback time synthesis.
//!
//! Tracks the last and next expected presentation times of a stream and the
//! sub-microsecond remainder lost to integer division, so that frames without
//! a timestamp of their own still receive one and the average frame duration
//! stays exact over long runs.

use log::{trace, warn};

/// Sentinel used wherever a time crosses into a fixed-layout structure.
pub const UNSPECIFIED_TIME: u64 = u64::MAX;

pub const DEFAULT_JITTER_TOLERANCE_US: u64 = 1000;

const MICROSECONDS_PER_SECOND: u64 = 1_000_000;

/// A timestamp supplied with a coded buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceTimestamp {
    /// Value in the stream's own time base, before normalization.
    pub native: u64,
    /// Value in microseconds.
    pub normalized: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeSource {
    /// The frame's own timestamp.
    Real,
    /// Predicted from the previous frame's time and duration.
    Synthetic,
    /// A zero native timestamp deviated from the prediction and was discarded.
    NullTimestampFallback,
    /// Neither a real timestamp nor a prediction was available.
    Unspecified,
}

/// Outcome of timing one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameTime {
    pub time: Option<u64>,
    pub source: TimeSource,
    /// Real minus predicted time, when both existed.
    pub deviation_us: Option<i64>,
    pub jitter_exceeded: bool,
}

impl FrameTime {
    fn unchecked(time: Option<u64>, source: TimeSource) -> Self {
        Self {
            time,
            source,
            deviation_us: None,
            jitter_exceeded: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PlaybackTimeSynthesizer {
    last_normalized_playback_time: Option<u64>,
    next_frame_normalized_playback_time: Option<u64>,
    accumulated_error: u64,
    current_frame_time: Option<u64>,
    jitter_tolerance_us: u64,
}

impl Default for PlaybackTimeSynthesizer {
    fn default() -> Self {
        Self::new(DEFAULT_JITTER_TOLERANCE_US)
    }
}

impl PlaybackTimeSynthesizer {
    pub fn new(jitter_tolerance_us: u64) -> Self {
        Self {
            last_normalized_playback_time: None,
            next_frame_normalized_playback_time: None,
            accumulated_error: 0,
            current_frame_time: None,
            jitter_tolerance_us,
        }
    }

    /// Forgets all timing history, as after a discontinuity.
    pub fn invalidate(&mut self) {
        self.last_normalized_playback_time = None;
        self.next_frame_normalized_playback_time = None;
        self.accumulated_error = 0;
        self.current_frame_time = None;
    }

    pub fn last_normalized_playback_time(&self) -> Option<u64> {
        self.last_normalized_playback_time
    }

    pub fn next_frame_normalized_playback_time(&self) -> Option<u64> {
        self.next_frame_normalized_playback_time
    }

    /// Remainder in microsecond·hertz units carried into later frames.
    pub fn accumulated_error(&self) -> u64 {
        self.accumulated_error
    }

    pub fn current_frame_time(&self) -> Option<u64> {
        self.current_frame_time
    }

    pub fn jitter_tolerance_us(&self) -> u64 {
        self.jitter_tolerance_us
    }

    /// Chooses the presentation time of the frame being parsed.
    ///
    /// A real timestamp wins unless it is a native zero that disagrees with
    /// the prediction by more than the jitter tolerance; such timestamps come
    /// from encoders that write null PTS values and are replaced by the
    /// synthetic time.
    pub fn handle_current_frame_time(&mut self, real: Option<SourceTimestamp>) -> FrameTime {
        let Some(real) = real else {
            let time = self.next_frame_normalized_playback_time;
            self.current_frame_time = time;

            let source = if time.is_some() {
                TimeSource::Synthetic
            } else {
                TimeSource::Unspecified
            };

            return FrameTime::unchecked(time, source);
        };

        self.accumulated_error = 0;

        let (Some(last), Some(next)) = (
            self.last_normalized_playback_time,
            self.next_frame_normalized_playback_time,
        ) else {
            self.current_frame_time = Some(real.normalized);
            return FrameTime::unchecked(Some(real.normalized), TimeSource::Real);
        };

        let real_delta = real.normalized as i128 - last as i128;
        let synthetic_delta = next as i128 - last as i128;
        let delta_delta = real_delta - synthetic_delta;
        let deviation_us = delta_delta.clamp(i64::MIN as i128, i64::MAX as i128) as i64;

        if delta_delta.unsigned_abs() <= self.jitter_tolerance_us as u128 {
            self.current_frame_time = Some(real.normalized);
            return FrameTime {
                time: Some(real.normalized),
                source: TimeSource::Real,
                deviation_us: Some(deviation_us),
                jitter_exceeded: false,
            };
        }

        if real.native == 0 {
            trace!(
                "Null timestamp deviates by {deviation_us} us from prediction {next}, using synthetic time"
            );

            self.current_frame_time = Some(next);
            return FrameTime {
                time: Some(next),
                source: TimeSource::NullTimestampFallback,
                deviation_us: Some(deviation_us),
                jitter_exceeded: true,
            };
        }

        trace!(
            "Real time {} us deviates by {deviation_us} us from prediction {next}",
            real.normalized
        );

        self.current_frame_time = Some(real.normalized);
        FrameTime {
            time: Some(real.normalized),
            source: TimeSource::Real,
            deviation_us: Some(deviation_us),
            jitter_exceeded: true,
        }
    }

    /// Predicts the next frame's time from this frame's duration.
    ///
    /// The duration is `sample_count / sample_rate` seconds; for video pass the
    /// frame-rate denominator and numerator.
    pub fn predict_next(&mut self, sample_count: u64, sample_rate: u64) {
        let Some(current) = self.current_frame_time else {
            return;
        };

        if sample_rate == 0 {
            warn!("Cannot predict next playback time with a zero rate");
            return;
        }

        self.last_normalized_playback_time = Some(current);

        let Some(scaled) = sample_count.checked_mul(MICROSECONDS_PER_SECOND) else {
            warn!("Frame duration of {sample_count}/{sample_rate} s out of range");
            self.next_frame_normalized_playback_time = None;
            return;
        };
        let frame_duration = scaled / sample_rate;

        let mut accumulated_error =
            self.accumulated_error + (scaled - frame_duration * sample_rate);
        let mut carry = 0;
        if accumulated_error > sample_rate {
            carry = 1;
            accumulated_error -= sample_rate;
        }

        let next = current
            .checked_add(frame_duration)
            .and_then(|time| time.checked_add(carry))
            .filter(|&time| time != UNSPECIFIED_TIME);
        if next.is_none() {
            warn!("Predicted playback time past {current} us overflows");
        } else {
            self.accumulated_error = accumulated_error;
        }

        self.next_frame_normalized_playback_time = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn real(us: u64) -> Option<SourceTimestamp> {
        Some(SourceTimestamp {
            native: us,
            normalized: us,
        })
    }

    #[test]
    fn synthetic_run_stays_within_one_microsecond() {
        let mut synth = PlaybackTimeSynthesizer::default();

        let first = synth.handle_current_frame_time(real(0));
        assert_eq!(first.time, Some(0));
        assert_eq!(first.source, TimeSource::Real);
        synth.predict_next(1152, 44100);

        let mut time = 0;
        for _ in 0..99 {
            let ft = synth.handle_current_frame_time(None);
            assert_eq!(ft.source, TimeSource::Synthetic);
            time = ft.time.unwrap();
            synth.predict_next(1152, 44100);
        }
        assert_eq!(time, synth.last_normalized_playback_time().unwrap());

        let predicted = synth.next_frame_normalized_playback_time().unwrap();
        let exact = (100.0 * 1152.0 * 1_000_000.0 / 44100.0_f64).round() as u64;
        assert!(predicted.abs_diff(exact) <= 1, "{predicted} vs {exact}");
    }

    #[test]
    fn replaying_predictions_is_deterministic() {
        let run = || {
            let mut synth = PlaybackTimeSynthesizer::default();
            synth.handle_current_frame_time(real(5_000));
            synth.predict_next(576, 22050);
            (0..500)
                .map(|_| {
                    let t = synth.handle_current_frame_time(None).time.unwrap();
                    synth.predict_next(576, 22050);
                    t
                })
                .collect::<Vec<_>>()
        };

        assert_eq!(run(), run());
    }

    #[test]
    fn jitter_tolerance_boundary() {
        let start = || {
            let mut synth = PlaybackTimeSynthesizer::default();
            synth.handle_current_frame_time(real(1_000_000));
            synth.predict_next(1152, 48000);
            synth
        };

        let predicted = 1_000_000 + 24_000;

        let mut synth = start();
        let ft = synth.handle_current_frame_time(real(predicted + 1001));
        assert!(ft.jitter_exceeded);
        assert_eq!(ft.source, TimeSource::Real);
        assert_eq!(ft.time, Some(predicted + 1001));
        assert_eq!(ft.deviation_us, Some(1001));

        let mut synth = start();
        let ft = synth.handle_current_frame_time(real(predicted - 999));
        assert!(!ft.jitter_exceeded);
        assert_eq!(ft.deviation_us, Some(-999));
    }

    #[test]
    fn null_timestamp_falls_back_to_synthesis() {
        let mut synth = PlaybackTimeSynthesizer::default();
        synth.handle_current_frame_time(real(10_000_000));
        synth.predict_next(1152, 48000);

        let ft = synth.handle_current_frame_time(Some(SourceTimestamp {
            native: 0,
            normalized: 0,
        }));
        assert_eq!(ft.source, TimeSource::NullTimestampFallback);
        assert_eq!(ft.time, Some(10_024_000));
    }

    #[test]
    fn unknown_time_propagates() {
        let mut synth = PlaybackTimeSynthesizer::default();
        let ft = synth.handle_current_frame_time(None);
        assert_eq!(ft.time, None);
        assert_eq!(ft.source, TimeSource::Unspecified);

        synth.predict_next(1152, 48000);
        assert_eq!(synth.next_frame_normalized_playback_time(), None);
    }

    #[test]
    fn real_timestamp_clears_accumulated_error() {
        let mut synth = PlaybackTimeSynthesizer::default();
        synth.handle_current_frame_time(real(0));
        synth.predict_next(1152, 44100);
        assert_ne!(synth.accumulated_error(), 0);

        synth.handle_current_frame_time(real(26_122));
        assert_eq!(synth.accumulated_error(), 0);
    }

    #[test]
    fn invalidate_resets_history() {
        let mut synth = PlaybackTimeSynthesizer::default();
        synth.handle_current_frame_time(real(0));
        synth.predict_next(1152, 44100);

        synth.invalidate();
        assert_eq!(synth.last_normalized_playback_time(), None);
        assert_eq!(synth.next_frame_normalized_playback_time(), None);
        assert_eq!(synth.accumulated_error(), 0);
    }

    #[test]
    fn prediction_past_time_range_is_dropped() {
        let mut synth = PlaybackTimeSynthesizer::default();
        synth.handle_current_frame_time(real(UNSPECIFIED_TIME - 10_000));
        synth.predict_next(1152, 48000);
        assert_eq!(synth.next_frame_normalized_playback_time(), None);

        let ft = synth.handle_current_frame_time(None);
        assert_eq!(ft.time, None);
        assert_eq!(ft.source, TimeSource::Unspecified);
    }
}
