//! Audio output engine.
//!
//! Consumes decoded packets, conditions them through the sample pipeline,
//! drives the CPAL output stream, and emits track lifecycle and progress
//! notifications on the bus.

use crate::audio::output_selection::{choose_best_stream_config, resolve_output_device};
use crate::audio::sample_pipeline::{quantize_i16, quantize_u16, SamplePipeline};
use crate::config::Config;
use crate::error::MogboxError;
use crate::protocol::{AudioMessage, AudioPacket, Message, PlaybackMessage, TechnicalMetadata};
use cpal::traits::{DeviceTrait, StreamTrait};
use log::{debug, error, warn};
use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    thread,
    time::Duration,
};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::broadcast::{Receiver, Sender};

const PROGRESS_INTERVAL: Duration = Duration::from_millis(500);

/// Queue item variants consumed by the audio callback.
enum QueueEntry {
    Samples(VecDeque<f32>),
    TrackHeader {
        id: String,
        duration_ms: u64,
    },
    TrackFooter(String),
}

/// Duration of the track currently under the playback cursor, for the
/// progress thread.
struct ActiveTrack {
    duration_ms: u64,
}

/// Runtime audio output controller and sample queue owner.
pub struct AudioPlayer {
    bus_receiver: Receiver<Message>,
    bus_sender: Sender<Message>,

    sample_queue: Arc<Mutex<VecDeque<QueueEntry>>>,
    is_playing: Arc<AtomicBool>,
    volume: Arc<AtomicU32>,

    output_sample_rate: u32,
    output_channels: u16,
    pipeline: Option<SamplePipeline>,
    stream: cpal::Stream,
}

impl AudioPlayer {
    /// Opens the configured output device, builds the stream, and spawns the
    /// progress thread. The stream stays silent until playback starts.
    pub fn new(
        bus_receiver: Receiver<Message>,
        bus_sender: Sender<Message>,
        config: &Config,
    ) -> Result<Self, MogboxError> {
        let host = cpal::default_host();
        let device = resolve_output_device(&host, &config.output.output_device_name)?;
        let device_name = device.name().unwrap_or_else(|_| "Unknown Device".to_string());

        let supported_configs: Vec<cpal::SupportedStreamConfigRange> = device
            .supported_output_configs()
            .map(|configs| configs.collect())
            .unwrap_or_default();
        let selected = choose_best_stream_config(
            &supported_configs,
            config.output.sample_rate_hz,
            config.output.channel_count,
            config.output.bits_per_sample,
        )
        .ok_or_else(|| MogboxError::NoUsableStreamConfig(device_name.clone()))?;

        let sample_format = selected.sample_format();
        let stream_config: cpal::StreamConfig = selected.config();
        debug!(
            "AudioPlayer: opening '{}' at {} Hz, {} ch, {:?}",
            device_name, stream_config.sample_rate.0, stream_config.channels, sample_format
        );

        let sample_queue: Arc<Mutex<VecDeque<QueueEntry>>> =
            Arc::new(Mutex::new(VecDeque::new()));
        let is_playing = Arc::new(AtomicBool::new(false));
        let volume = Arc::new(AtomicU32::new(config.playback.volume.to_bits()));
        let active_track: Arc<Mutex<Option<ActiveTrack>>> = Arc::new(Mutex::new(None));
        let frames_played = Arc::new(AtomicUsize::new(0));

        let stream = build_output_stream(
            &device,
            &stream_config,
            sample_format,
            config.output.dither_on_bitdepth_reduce,
            CallbackState {
                sample_queue: sample_queue.clone(),
                is_playing: is_playing.clone(),
                volume: volume.clone(),
                active_track: active_track.clone(),
                frames_played: frames_played.clone(),
                bus_sender: bus_sender.clone(),
                output_channels: stream_config.channels,
            },
        )?;

        spawn_progress_thread(
            bus_sender.clone(),
            is_playing.clone(),
            active_track.clone(),
            frames_played.clone(),
            stream_config.sample_rate.0,
        );

        Ok(Self {
            bus_receiver,
            bus_sender,
            sample_queue,
            is_playing,
            volume,
            output_sample_rate: stream_config.sample_rate.0,
            output_channels: stream_config.channels,
            pipeline: None,
            stream,
        })
    }

    pub fn run(&mut self) {
        loop {
            match self.bus_receiver.blocking_recv() {
                Ok(Message::Audio(AudioMessage::AudioPacket(packet))) => self.load_packet(packet),
                Ok(Message::Playback(PlaybackMessage::Stop)) => {
                    if let Err(err) = self.stream.pause() {
                        warn!("AudioPlayer: Failed to pause stream: {}", err);
                    }
                    self.is_playing.store(false, Ordering::Relaxed);
                }
                Ok(Message::Playback(PlaybackMessage::SetVolume(volume))) => {
                    let clamped = volume.clamp(0.0, 2.0);
                    self.volume.store(clamped.to_bits(), Ordering::Relaxed);
                    debug!("AudioPlayer: Volume set to {:.2}", clamped);
                }
                Ok(_) => {} // Ignore other messages
                Err(RecvError::Lagged(skipped)) => {
                    warn!("AudioPlayer: receiver lagged, skipped {} messages", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
        debug!("AudioPlayer: bus closed, exiting");
    }

    fn load_packet(&mut self, packet: AudioPacket) {
        match packet {
            AudioPacket::TrackHeader {
                id,
                play_immediately,
                technical_metadata,
            } => {
                debug!("AudioPlayer: Received track header: {}", id);
                self.pipeline = self.build_pipeline(&technical_metadata);
                self.sample_queue
                    .lock()
                    .unwrap()
                    .push_back(QueueEntry::TrackHeader {
                        id: id.clone(),
                        duration_ms: technical_metadata.duration_ms,
                    });
                if play_immediately {
                    self.start_playback(&id);
                }
            }
            AudioPacket::Samples { samples } => {
                let conditioned = match self.pipeline.as_mut() {
                    Some(pipeline) => pipeline.push(&samples),
                    // No header seen yet, pass samples through untouched.
                    None => samples,
                };
                if !conditioned.is_empty() {
                    self.sample_queue
                        .lock()
                        .unwrap()
                        .push_back(QueueEntry::Samples(conditioned.into()));
                }
            }
            AudioPacket::TrackFooter { id } => {
                debug!("AudioPlayer: Received track footer: {}", id);
                let mut queue = self.sample_queue.lock().unwrap();
                if let Some(pipeline) = self.pipeline.as_mut() {
                    let tail = pipeline.finish();
                    if !tail.is_empty() {
                        queue.push_back(QueueEntry::Samples(tail.into()));
                    }
                }
                queue.push_back(QueueEntry::TrackFooter(id));
            }
        }
    }

    fn build_pipeline(&self, metadata: &TechnicalMetadata) -> Option<SamplePipeline> {
        match SamplePipeline::new(
            metadata.sample_rate_hz,
            metadata.channel_count,
            self.output_sample_rate,
            self.output_channels,
        ) {
            Ok(pipeline) => Some(pipeline),
            Err(err) => {
                error!("AudioPlayer: Failed to build sample pipeline: {}", err);
                None
            }
        }
    }

    fn start_playback(&self, id: &str) {
        match self.stream.play() {
            Ok(()) => {
                self.is_playing.store(true, Ordering::Relaxed);
                debug!("AudioPlayer: Playback started");
            }
            Err(err) => {
                error!("AudioPlayer: Failed to start playback: {}", err);
                // The command loop counts this track done on failure.
                let _ = self
                    .bus_sender
                    .send(Message::Playback(PlaybackMessage::PlaybackFailed(
                        id.to_string(),
                    )));
            }
        }
    }
}

/// Shared handles moved into the output callback.
struct CallbackState {
    sample_queue: Arc<Mutex<VecDeque<QueueEntry>>>,
    is_playing: Arc<AtomicBool>,
    volume: Arc<AtomicU32>,
    active_track: Arc<Mutex<Option<ActiveTrack>>>,
    frames_played: Arc<AtomicUsize>,
    bus_sender: Sender<Message>,
    output_channels: u16,
}

impl CallbackState {
    /// Fills `output` with the next conditioned samples, handling track
    /// markers and underruns. Runs on the real-time audio thread.
    fn render(&self, output: &mut [f32]) {
        if !self.is_playing.load(Ordering::Relaxed) {
            output.fill(0.0);
            return;
        }

        let volume = f32::from_bits(self.volume.load(Ordering::Relaxed));
        let mut queue = self.sample_queue.lock().unwrap();
        let mut written = 0usize;

        while written < output.len() {
            let pop_front = match queue.front_mut() {
                None => break,
                Some(QueueEntry::Samples(samples)) => match samples.pop_front() {
                    Some(sample) => {
                        output[written] = sample * volume;
                        written += 1;
                        false
                    }
                    None => true,
                },
                Some(QueueEntry::TrackHeader { id, duration_ms }) => {
                    let _ = self
                        .bus_sender
                        .send(Message::Playback(PlaybackMessage::TrackStarted(id.clone())));
                    *self.active_track.lock().unwrap() = Some(ActiveTrack {
                        duration_ms: *duration_ms,
                    });
                    self.frames_played.store(0, Ordering::Relaxed);
                    true
                }
                Some(QueueEntry::TrackFooter(id)) => {
                    let _ = self
                        .bus_sender
                        .send(Message::Playback(PlaybackMessage::TrackFinished(id.clone())));
                    self.active_track.lock().unwrap().take();
                    true
                }
            };
            if pop_front {
                queue.pop_front();
            }
        }

        // Underrun or end of queue, pad with silence.
        output[written..].fill(0.0);

        let channels = usize::from(self.output_channels.max(1));
        self.frames_played
            .fetch_add(written / channels, Ordering::Relaxed);
    }
}

fn build_output_stream(
    device: &cpal::Device,
    stream_config: &cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    dither: bool,
    state: CallbackState,
) -> Result<cpal::Stream, MogboxError> {
    let stream = match sample_format {
        cpal::SampleFormat::F32 => device.build_output_stream(
            stream_config,
            move |output: &mut [f32], _: &cpal::OutputCallbackInfo| {
                state.render(output);
            },
            |err| error!("Audio stream error: {}", err),
            None,
        )?,
        cpal::SampleFormat::I16 => {
            let mut scratch: Vec<f32> = Vec::new();
            let mut dither_state = 0x9e37_79b9_7f4a_7c15u64;
            device.build_output_stream(
                stream_config,
                move |output: &mut [i16], _: &cpal::OutputCallbackInfo| {
                    scratch.resize(output.len(), 0.0);
                    state.render(&mut scratch);
                    for (target, sample) in output.iter_mut().zip(&scratch) {
                        *target = quantize_i16(*sample, dither, &mut dither_state);
                    }
                },
                |err| error!("Audio stream error: {}", err),
                None,
            )?
        }
        cpal::SampleFormat::U16 => {
            let mut scratch: Vec<f32> = Vec::new();
            let mut dither_state = 0x9e37_79b9_7f4a_7c15u64;
            device.build_output_stream(
                stream_config,
                move |output: &mut [u16], _: &cpal::OutputCallbackInfo| {
                    scratch.resize(output.len(), 0.0);
                    state.render(&mut scratch);
                    for (target, sample) in output.iter_mut().zip(&scratch) {
                        *target = quantize_u16(*sample, dither, &mut dither_state);
                    }
                },
                |err| error!("Audio stream error: {}", err),
                None,
            )?
        }
        other => {
            warn!("AudioPlayer: Unsupported output sample format {:?}", other);
            return Err(MogboxError::NoUsableStreamConfig(format!("{:?}", other)));
        }
    };
    Ok(stream)
}

fn spawn_progress_thread(
    bus_sender: Sender<Message>,
    is_playing: Arc<AtomicBool>,
    active_track: Arc<Mutex<Option<ActiveTrack>>>,
    frames_played: Arc<AtomicUsize>,
    output_sample_rate: u32,
) {
    thread::spawn(move || loop {
        thread::sleep(PROGRESS_INTERVAL);
        if !is_playing.load(Ordering::Relaxed) {
            continue;
        }
        let total_ms = match active_track.lock().unwrap().as_ref() {
            Some(track) => track.duration_ms,
            None => continue,
        };
        let frames = frames_played.load(Ordering::Relaxed) as u64;
        let elapsed_ms = frames * 1_000 / u64::from(output_sample_rate.max(1));
        let _ = bus_sender.send(Message::Playback(PlaybackMessage::PlaybackProgress {
            elapsed_ms,
            total_ms,
        }));
    });
}
