//! Error type for fallible setup and command paths.
//!
//! Worker threads log and continue like the rest of the runtime; this enum
//! covers the places where the binary has to stop and report instead.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum MogboxError {
    #[error("failed to open media {path}: {source}")]
    OpenMedia {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to probe media {path}: {source}")]
    ProbeMedia {
        path: PathBuf,
        source: symphonia::core::errors::Error,
    },

    #[error("no audio tracks found in {0}")]
    NoDefaultTrack(PathBuf),

    #[error("missing codec parameter `{name}` in {path}")]
    MissingCodecParameter { path: PathBuf, name: &'static str },

    #[error("no decoder available for {path}: {source}")]
    UnsupportedCodec {
        path: PathBuf,
        source: symphonia::core::errors::Error,
    },

    #[error("no output device available")]
    NoOutputDevice,

    #[error("no usable output stream config for device '{0}'")]
    NoUsableStreamConfig(String),

    #[error("failed to build output stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to enumerate output devices: {0}")]
    EnumerateDevices(#[from] cpal::DevicesError),

    #[error("no supported audio files found under {0}")]
    NoPlayableFiles(PathBuf),
}
