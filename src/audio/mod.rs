//! Audio output: device selection, sample conditioning, and the CPAL engine.

pub mod audio_player;
pub mod output_selection;
pub mod sample_pipeline;
