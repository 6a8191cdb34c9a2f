//! Event-bus protocol shared by the runtime components.
//!
//! Defines the message payloads exchanged between the decode worker, the
//! audio output engine, and the command loop in `main`.

use std::path::PathBuf;

/// Top-level envelope for all bus traffic.
#[derive(Debug, Clone)]
pub enum Message {
    Audio(AudioMessage),
    Playback(PlaybackMessage),
}

/// Technical metadata emitted for a decoded track.
#[derive(Debug, Clone)]
pub struct TechnicalMetadata {
    /// Codec/container shorthand.
    pub format: String,
    /// Estimated average bitrate in kbps. Zero when unknown.
    pub bitrate_kbps: u32,
    /// Source sample rate in Hz.
    pub sample_rate_hz: u32,
    /// Source channel count.
    pub channel_count: u16,
    /// Estimated duration in milliseconds. Zero when unknown.
    pub duration_ms: u64,
}

/// Track identity and startup options used for decode requests.
#[derive(Debug, Clone)]
pub struct TrackIdentifier {
    /// Stable track id.
    pub id: String,
    /// File path on disk.
    pub path: PathBuf,
    /// Whether playback should start immediately after the header arrives.
    pub play_immediately: bool,
}

/// Audio payload delivered from decoder to player.
#[derive(Debug, Clone)]
pub enum AudioPacket {
    TrackHeader {
        id: String,
        play_immediately: bool,
        technical_metadata: TechnicalMetadata,
    },
    Samples {
        samples: Vec<f32>,
    },
    TrackFooter {
        id: String,
    },
}

/// Audio-domain commands and notifications.
#[derive(Debug, Clone)]
pub enum AudioMessage {
    DecodeTracks(Vec<TrackIdentifier>),
    /// Decoder could not produce any samples for this track id.
    DecodeFailed(String),
    AudioPacket(AudioPacket),
}

/// Playback-domain commands and notifications.
#[derive(Debug, Clone)]
pub enum PlaybackMessage {
    Stop,
    SetVolume(f32),
    TrackStarted(String),
    /// Output stream refused to start for this track id.
    PlaybackFailed(String),
    TrackFinished(String),
    PlaybackProgress { elapsed_ms: u64, total_ms: u64 },
}
