//! Output device and stream-config selection.
//!
//! Scored selection over the supported output configs of a device, preferring
//! the requested channel count, the nearest sample rate, and float output.

use cpal::traits::{DeviceTrait, HostTrait};
use log::warn;

use crate::error::MogboxError;

const COMMON_SAMPLE_RATES: [u32; 6] = [44_100, 48_000, 88_200, 96_000, 176_400, 192_000];

/// Returns `None` when the configured name means "use the default device".
pub fn canonicalize_requested_device_name(device_name: &str) -> Option<String> {
    let trimmed = device_name.trim();
    if trimmed.is_empty() {
        return None;
    }
    let normalized = trimmed.to_ascii_lowercase();
    if normalized == "default" || normalized == "sysdefault" || normalized.starts_with("sysdefault:")
    {
        return None;
    }
    Some(trimmed.to_string())
}

pub fn resolve_output_device(
    host: &cpal::Host,
    requested_device_name: &str,
) -> Result<cpal::Device, MogboxError> {
    if let Some(requested) = canonicalize_requested_device_name(requested_device_name) {
        match host.output_devices() {
            Ok(mut devices) => {
                if let Some(device) =
                    devices.find(|device| device.name().is_ok_and(|name| name == requested))
                {
                    return Ok(device);
                }
                warn!(
                    "Output device '{}' not found, falling back to default",
                    requested
                );
            }
            Err(err) => {
                warn!("Failed to enumerate output devices: {}", err);
            }
        }
    }
    host.default_output_device()
        .ok_or(MogboxError::NoOutputDevice)
}

/// Picks a sample rate inside `[min_rate, max_rate]`, preferring the request,
/// then the nearest common rate, then clamping.
pub fn choose_sample_rate_in_bounds(min_rate: u32, max_rate: u32, requested: u32) -> u32 {
    if requested >= min_rate && requested <= max_rate {
        return requested;
    }
    COMMON_SAMPLE_RATES
        .iter()
        .copied()
        .filter(|rate| *rate >= min_rate && *rate <= max_rate)
        .min_by_key(|rate| rate.abs_diff(requested))
        .unwrap_or_else(|| requested.clamp(min_rate, max_rate))
}

/// Lower is better. Float output beats integer regardless of bit depth.
pub fn score_sample_format(sample_format: cpal::SampleFormat, requested_bits: u16) -> u64 {
    let bits = (sample_format.sample_size() * 8) as u16;
    match sample_format {
        cpal::SampleFormat::F32 => 0,
        cpal::SampleFormat::I16 => 20,
        cpal::SampleFormat::U16 => 30,
        _ => 200 + u64::from(bits.abs_diff(requested_bits)),
    }
}

pub fn choose_best_stream_config(
    supported_configs: &[cpal::SupportedStreamConfigRange],
    requested_sample_rate: u32,
    requested_channels: u16,
    requested_bits: u16,
) -> Option<cpal::SupportedStreamConfig> {
    let requested_sample_rate = requested_sample_rate.max(8_000);
    let mut best: Option<(u64, cpal::SupportedStreamConfig)> = None;
    for range in supported_configs {
        let candidate_sample_rate = choose_sample_rate_in_bounds(
            range.min_sample_rate().0,
            range.max_sample_rate().0,
            requested_sample_rate,
        );
        let candidate = range.with_sample_rate(cpal::SampleRate(candidate_sample_rate));
        let channel_penalty = u64::from(candidate.channels().abs_diff(requested_channels)) * 1_000;
        let sample_rate_penalty =
            u64::from(candidate.sample_rate().0.abs_diff(requested_sample_rate));
        let sample_format_penalty = score_sample_format(candidate.sample_format(), requested_bits);
        let score = channel_penalty + sample_rate_penalty + sample_format_penalty;
        match &best {
            Some((best_score, _)) if *best_score <= score => {}
            _ => best = Some((score, candidate)),
        }
    }
    best.map(|(_, candidate)| candidate)
}

/// One-line description of a supported config range for `mogbox devices`.
pub fn describe_config_range(range: &cpal::SupportedStreamConfigRange) -> String {
    format!(
        "{} ch, {}-{} Hz, {:?}",
        range.channels(),
        range.min_sample_rate().0,
        range.max_sample_rate().0,
        range.sample_format()
    )
}
