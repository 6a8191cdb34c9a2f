//! Track probing and decoder setup.
//!
//! Opens a media file with symphonia, selects the default audio track, and
//! captures the technical properties carried on the track header.

use std::fs::File;
use std::path::Path;

use symphonia::core::codecs::{Decoder, DecoderOptions};
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::MogboxError;
use crate::protocol::TechnicalMetadata;

/// An opened audio file ready for packet-by-packet decoding.
pub struct OpenedTrack {
    pub format: Box<dyn FormatReader>,
    pub decoder: Box<dyn Decoder>,
    pub track_id: u32,
    pub technical_metadata: TechnicalMetadata,
}

impl OpenedTrack {
    /// Probes `path` and builds a decoder for its default audio track.
    pub fn open(path: &Path) -> Result<Self, MogboxError> {
        let file = File::open(path).map_err(|source| MogboxError::OpenMedia {
            path: path.to_path_buf(),
            source,
        })?;
        let file_size_bytes = file.metadata().map(|metadata| metadata.len()).unwrap_or(0);
        let media_source = MediaSourceStream::new(Box::new(file), Default::default());

        // Hint the probe with the file extension, e.g. "mp3" or "flac".
        let mut hint = Hint::new();
        if let Some(extension) = path.extension().and_then(|ext| ext.to_str()) {
            hint.with_extension(extension);
        }

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                media_source,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|source| MogboxError::ProbeMedia {
                path: path.to_path_buf(),
                source,
            })?;
        let format = probed.format;

        let track = format
            .default_track()
            .ok_or_else(|| MogboxError::NoDefaultTrack(path.to_path_buf()))?;
        let track_id = track.id;
        let codec_params = track.codec_params.clone();

        let sample_rate_hz =
            codec_params
                .sample_rate
                .ok_or_else(|| MogboxError::MissingCodecParameter {
                    path: path.to_path_buf(),
                    name: "sample_rate",
                })?;
        let channel_count = codec_params
            .channels
            .ok_or_else(|| MogboxError::MissingCodecParameter {
                path: path.to_path_buf(),
                name: "channels",
            })?
            .count() as u16;

        let duration_ms = match (codec_params.time_base, codec_params.n_frames) {
            (Some(time_base), Some(n_frames)) => {
                let time = time_base.calc_time(n_frames);
                time.seconds * 1_000 + (time.frac * 1_000.0) as u64
            }
            _ => 0,
        };

        let decoder = symphonia::default::get_codecs()
            .make(&codec_params, &DecoderOptions::default())
            .map_err(|source| MogboxError::UnsupportedCodec {
                path: path.to_path_buf(),
                source,
            })?;

        let technical_metadata = TechnicalMetadata {
            format: format_shorthand(path),
            bitrate_kbps: estimate_bitrate_kbps(file_size_bytes, duration_ms),
            sample_rate_hz,
            channel_count,
            duration_ms,
        };

        Ok(Self {
            format,
            decoder,
            track_id,
            technical_metadata,
        })
    }
}

/// Codec/container shorthand shown in track info, derived from the extension.
fn format_shorthand(path: &Path) -> String {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_uppercase())
        .unwrap_or_else(|| "UNKNOWN".to_string())
}

fn estimate_bitrate_kbps(file_size_bytes: u64, duration_ms: u64) -> u32 {
    if duration_ms == 0 {
        return 0;
    }
    (file_size_bytes.saturating_mul(8) / duration_ms) as u32
}
