//! Sample conditioning between decoded tracks and the output queue.
//!
//! Maps track channel layouts onto the output layout, resamples with rubato
//! when the track rate differs from the stream rate, and quantizes f32
//! samples for integer output formats with optional TPDF dither.

use log::debug;
use rubato::{FftFixedIn, Resampler, ResamplerConstructionError};

const RESAMPLER_CHUNK_FRAMES: usize = 1024;
const RESAMPLER_SUB_CHUNKS: usize = 2;

/// Converts one track's interleaved f32 samples to the output stream's
/// sample rate and channel count.
pub struct SamplePipeline {
    source_channels: usize,
    output_channels: usize,
    resampler: Option<FftFixedIn<f32>>,
    // Deinterleaved frames waiting for a full resampler chunk.
    pending: Vec<Vec<f32>>,
}

impl SamplePipeline {
    pub fn new(
        source_sample_rate: u32,
        source_channels: u16,
        output_sample_rate: u32,
        output_channels: u16,
    ) -> Result<Self, ResamplerConstructionError> {
        let output_channels = usize::from(output_channels.max(1));
        let resampler = if source_sample_rate != output_sample_rate {
            debug!(
                "SamplePipeline: resampling {} Hz -> {} Hz",
                source_sample_rate, output_sample_rate
            );
            Some(FftFixedIn::<f32>::new(
                source_sample_rate as usize,
                output_sample_rate as usize,
                RESAMPLER_CHUNK_FRAMES,
                RESAMPLER_SUB_CHUNKS,
                output_channels,
            )?)
        } else {
            None
        };

        Ok(Self {
            source_channels: usize::from(source_channels.max(1)),
            output_channels,
            resampler,
            pending: vec![Vec::new(); output_channels],
        })
    }

    /// Feeds interleaved source samples; returns interleaved output samples.
    pub fn push(&mut self, interleaved: &[f32]) -> Vec<f32> {
        let mapped = map_channels(interleaved, self.source_channels, self.output_channels);
        if self.resampler.is_none() {
            return mapped;
        }

        for (lane, sample) in mapped.into_iter().enumerate().map(|(index, sample)| {
            (index % self.output_channels, sample)
        }) {
            self.pending[lane].push(sample);
        }
        self.drain_full_chunks()
    }

    /// Flushes the pending remainder, zero-padded to a full resampler chunk,
    /// then drains the frames still held in the resampler's delay line.
    pub fn finish(&mut self) -> Vec<f32> {
        let mut output = Vec::new();
        if self.resampler.is_none() {
            return output;
        }

        if !self.pending[0].is_empty() {
            if let Some(resampler) = self.resampler.as_mut() {
                let needed = resampler.input_frames_next();
                for lane in self.pending.iter_mut() {
                    lane.resize(needed, 0.0);
                }
            }
            output = self.drain_full_chunks();
            for lane in self.pending.iter_mut() {
                lane.clear();
            }
        }

        if let Some(resampler) = self.resampler.as_mut() {
            match resampler.process_partial(None::<&[Vec<f32>]>, None) {
                Ok(resampled) => {
                    interleave_into(&mut output, &resampled, self.output_channels);
                }
                Err(err) => {
                    debug!("SamplePipeline: resampler flush error: {}", err);
                }
            }
        }
        output
    }

    fn drain_full_chunks(&mut self) -> Vec<f32> {
        let Some(resampler) = self.resampler.as_mut() else {
            return Vec::new();
        };

        let mut output = Vec::new();
        loop {
            let needed = resampler.input_frames_next();
            if self.pending[0].len() < needed {
                break;
            }

            let chunk: Vec<Vec<f32>> = self
                .pending
                .iter_mut()
                .map(|lane| lane.drain(..needed).collect())
                .collect();
            match resampler.process(&chunk, None) {
                Ok(resampled) => {
                    interleave_into(&mut output, &resampled, self.output_channels);
                }
                Err(err) => {
                    debug!("SamplePipeline: resample error, dropping chunk: {}", err);
                }
            }
        }
        output
    }
}

fn interleave_into(output: &mut Vec<f32>, lanes: &[Vec<f32>], output_channels: usize) {
    let frames = lanes.first().map(Vec::len).unwrap_or(0);
    output.reserve(frames * output_channels);
    for frame in 0..frames {
        for lane in lanes {
            output.push(lane[frame]);
        }
    }
}

/// Maps interleaved frames from `source_channels` to `output_channels`.
///
/// Mono is duplicated to every output channel. Higher source counts are
/// folded down by summing each source channel into `index % output_channels`
/// and averaging. Otherwise channels are copied and the rest zero-filled.
pub fn map_channels(interleaved: &[f32], source_channels: usize, output_channels: usize) -> Vec<f32> {
    if source_channels == output_channels {
        return interleaved.to_vec();
    }

    let frames = interleaved.len() / source_channels;
    let mut output = vec![0.0f32; frames * output_channels];

    for frame in 0..frames {
        let source = &interleaved[frame * source_channels..(frame + 1) * source_channels];
        let target = &mut output[frame * output_channels..(frame + 1) * output_channels];

        if source_channels == 1 {
            target.fill(source[0]);
        } else if source_channels > output_channels {
            let mut lane_counts = vec![0u32; output_channels];
            for (index, sample) in source.iter().enumerate() {
                let lane = index % output_channels;
                target[lane] += sample;
                lane_counts[lane] += 1;
            }
            for (sample, count) in target.iter_mut().zip(lane_counts) {
                if count > 1 {
                    *sample /= count as f32;
                }
            }
        } else {
            target[..source_channels].copy_from_slice(source);
        }
    }

    output
}

fn lcg_next(state: &mut u64) -> f32 {
    *state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
    ((*state >> 32) as u32) as f32 / u32::MAX as f32
}

/// Triangular dither noise in (-1.0, 1.0).
pub fn tpdf_noise(state: &mut u64) -> f32 {
    lcg_next(state) + lcg_next(state) - 1.0
}

pub fn quantize_i16(sample: f32, dither: bool, dither_state: &mut u64) -> i16 {
    let mut clamped = sample.clamp(-1.0, 1.0);
    if dither {
        clamped += tpdf_noise(dither_state) / i16::MAX as f32;
    }
    (clamped * i16::MAX as f32)
        .round()
        .clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

pub fn quantize_u16(sample: f32, dither: bool, dither_state: &mut u64) -> u16 {
    let mut clamped = sample.clamp(-1.0, 1.0);
    if dither {
        clamped += tpdf_noise(dither_state) / u16::MAX as f32;
    }
    ((clamped * 0.5 + 0.5) * u16::MAX as f32)
        .round()
        .clamp(0.0, u16::MAX as f32) as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_channels_passthrough() {
        let input = vec![0.1, 0.2, 0.3, 0.4];
        assert_eq!(map_channels(&input, 2, 2), input);
    }

    #[test]
    fn test_map_channels_duplicates_mono() {
        let output = map_channels(&[0.5, -0.5], 1, 2);
        assert_eq!(output, vec![0.5, 0.5, -0.5, -0.5]);
    }

    #[test]
    fn test_map_channels_downmixes_by_averaging_lanes() {
        // One 4-channel frame onto stereo: lanes (0,2) and (1,3) average.
        let output = map_channels(&[0.2, 0.4, 0.6, 0.8], 4, 2);
        assert_eq!(output.len(), 2);
        assert!((output[0] - 0.4).abs() < 1e-6);
        assert!((output[1] - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_map_channels_pads_when_upmixing_multichannel() {
        let output = map_channels(&[0.3, 0.7], 2, 4);
        assert_eq!(output, vec![0.3, 0.7, 0.0, 0.0]);
    }

    #[test]
    fn test_pipeline_passthrough_when_rates_match() {
        let mut pipeline = SamplePipeline::new(44_100, 2, 44_100, 2)
            .expect("passthrough pipeline should build");
        let input = vec![0.1, -0.1, 0.2, -0.2];
        assert_eq!(pipeline.push(&input), input);
        assert!(pipeline.finish().is_empty());
    }

    #[test]
    fn test_pipeline_resamples_to_roughly_double_length() {
        let mut pipeline =
            SamplePipeline::new(22_050, 1, 44_100, 1).expect("resampling pipeline should build");
        let input = vec![0.0f32; 1024];
        let mut output_samples = 0usize;
        let mut input_samples = 0usize;
        for _ in 0..8 {
            input_samples += input.len();
            output_samples += pipeline.push(&input).len();
        }
        output_samples += pipeline.finish().len();

        let expected = input_samples * 2;
        assert!(output_samples > expected / 2);
        assert!(output_samples < expected * 2);
    }

    #[test]
    fn test_finish_drains_resampler_delay_tail() {
        let mut pipeline =
            SamplePipeline::new(22_050, 1, 44_100, 1).expect("resampling pipeline should build");
        // Exactly one full input chunk, so nothing stays pending and any
        // frames from finish() must come out of the resampler itself.
        let produced = pipeline.push(&vec![0.25f32; 1024]);
        assert!(!produced.is_empty());
        assert!(!pipeline.finish().is_empty());
    }

    #[test]
    fn test_quantize_i16_saturates() {
        let mut state = 1u64;
        assert_eq!(quantize_i16(2.0, false, &mut state), i16::MAX);
        assert_eq!(quantize_i16(-2.0, false, &mut state), i16::MIN);
        assert_eq!(quantize_i16(0.0, false, &mut state), 0);
    }

    #[test]
    fn test_quantize_u16_maps_full_scale() {
        let mut state = 1u64;
        assert_eq!(quantize_u16(-1.0, false, &mut state), 0);
        assert_eq!(quantize_u16(1.0, false, &mut state), u16::MAX);
    }

    #[test]
    fn test_dither_stays_within_one_lsb() {
        let mut state = 0x1234_5678u64;
        for step in 0..1_000 {
            let sample = (step as f32 / 1_000.0) - 0.5;
            let plain = quantize_i16(sample, false, &mut state.clone());
            let dithered = quantize_i16(sample, true, &mut state);
            assert!((i32::from(plain) - i32::from(dithered)).abs() <= 1);
        }
    }

    #[test]
    fn test_tpdf_noise_range() {
        let mut state = 42u64;
        for _ in 0..10_000 {
            let noise = tpdf_noise(&mut state);
            assert!((-1.0..=1.0).contains(&noise));
        }
    }
}
