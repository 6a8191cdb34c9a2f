mod audio;
mod audio_decoder;
mod config;
mod config_persistence;
mod error;
mod media;
mod media_file_discovery;
mod metadata_tags;
mod protocol;

use std::collections::HashMap;
use std::collections::HashSet;
use std::io::Write;
use std::path::PathBuf;
use std::thread;

use audio::audio_player::AudioPlayer;
use audio::output_selection::describe_config_range;
use audio_decoder::AudioDecoder;
use clap::{Parser, Subcommand};
use config::Config;
use cpal::traits::{DeviceTrait, HostTrait};
use error::MogboxError;
use log::{debug, error};
use media::OpenedTrack;
use media_file_discovery::collect_audio_files_from_folder;
use metadata_tags::read_common_track_metadata;
use protocol::{AudioMessage, Message, PlaybackMessage, TrackIdentifier};
use tokio::sync::broadcast;

#[derive(Parser)]
#[command(name = "mogbox", version, about = "Command-line audio player and inspector")]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Play an audio file, or every supported file under a directory
    Play {
        /// Audio file or directory to play
        path: PathBuf,
        /// Playback volume, 0.0 to 2.0 (overrides the configured value)
        #[arg(long)]
        volume: Option<f32>,
    },
    /// Print tags and technical stream properties without playing
    Info {
        /// Audio file to inspect
        path: PathBuf,
    },
    /// List output devices of the default audio host
    Devices,
}

fn main() {
    let cli = Cli::parse();

    let mut clog = colog::default_builder();
    let level = if cli.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    clog.filter(None, level);
    clog.init();

    std::panic::set_hook(Box::new(|panic_info| {
        let current_thread = std::thread::current();
        let thread_name = current_thread.name().unwrap_or("unnamed");
        log::error!("panic in thread '{}': {}", thread_name, panic_info);
    }));

    let config = config_persistence::load_or_create_config(&config_persistence::config_file_path());

    let result = match cli.command {
        Command::Play { path, volume } => run_play(&config, path, volume),
        Command::Info { path } => run_info(&path),
        Command::Devices => run_devices(),
    };

    if let Err(err) = result {
        error!("{}", err);
        std::process::exit(1);
    }
}

fn run_play(config: &Config, path: PathBuf, volume: Option<f32>) -> Result<(), MogboxError> {
    let track_paths = if path.is_dir() {
        let tracks = collect_audio_files_from_folder(&path);
        if tracks.is_empty() {
            return Err(MogboxError::NoPlayableFiles(path));
        }
        tracks
    } else {
        vec![path]
    };

    let tracks: Vec<TrackIdentifier> = track_paths
        .iter()
        .enumerate()
        .map(|(index, track_path)| TrackIdentifier {
            id: format!("track-{:04}", index),
            path: track_path.clone(),
            // Every header may start playback; earlier failures then cannot
            // leave the stream stopped.
            play_immediately: true,
        })
        .collect();
    let paths_by_id: HashMap<String, PathBuf> = tracks
        .iter()
        .map(|track| (track.id.clone(), track.path.clone()))
        .collect();

    // Bus for communication between components
    let (bus_sender, _) = broadcast::channel(1024);
    let mut main_receiver = bus_sender.subscribe();

    // The cpal stream is not Send, so the player is built on its own thread
    // and reports setup failures back over a one-shot channel.
    let player_receiver = bus_sender.subscribe();
    let player_bus_sender = bus_sender.clone();
    let player_config = config.clone();
    let (setup_sender, setup_receiver) = std::sync::mpsc::channel();
    thread::Builder::new()
        .name("audio-player".to_string())
        .spawn(move || {
            match AudioPlayer::new(player_receiver, player_bus_sender, &player_config) {
                Ok(mut player) => {
                    let _ = setup_sender.send(Ok(()));
                    player.run();
                }
                Err(err) => {
                    let _ = setup_sender.send(Err(err));
                }
            }
        })
        .expect("thread spawn should not fail");
    setup_receiver
        .recv()
        .expect("player thread should report setup result")?;

    let decoder_receiver = bus_sender.subscribe();
    let decoder_bus_sender = bus_sender.clone();
    thread::Builder::new()
        .name("audio-decoder".to_string())
        .spawn(move || {
            let mut decoder = AudioDecoder::new(decoder_receiver, decoder_bus_sender);
            decoder.run();
        })
        .expect("thread spawn should not fail");

    if let Some(volume) = volume {
        let _ = bus_sender.send(Message::Playback(PlaybackMessage::SetVolume(volume)));
    }
    let _ = bus_sender.send(Message::Audio(AudioMessage::DecodeTracks(tracks)));

    let mut done_tracks: HashSet<String> = HashSet::new();
    let mut progress_line_active = false;
    loop {
        let message = match main_receiver.blocking_recv() {
            Ok(message) => message,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                debug!("Main receiver lagged, skipped {} messages", skipped);
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };
        if let Some(id) = finished_track_id(&message) {
            done_tracks.insert(id.to_string());
        }
        match message {
            Message::Playback(PlaybackMessage::TrackStarted(id)) => {
                if let Some(track_path) = paths_by_id.get(&id) {
                    println!("Playing {}", track_path.display());
                }
            }
            Message::Playback(PlaybackMessage::PlaybackProgress {
                elapsed_ms,
                total_ms,
            }) => {
                print!(
                    "\r  {} / {} ",
                    format_timestamp(elapsed_ms),
                    format_timestamp(total_ms)
                );
                let _ = std::io::stdout().flush();
                progress_line_active = true;
            }
            Message::Playback(PlaybackMessage::TrackFinished(id)) => {
                if progress_line_active {
                    println!();
                    progress_line_active = false;
                }
                debug!("Track finished: {}", id);
            }
            Message::Playback(PlaybackMessage::PlaybackFailed(id)) => {
                if let Some(track_path) = paths_by_id.get(&id) {
                    error!("Playback failed for {}", track_path.display());
                }
            }
            Message::Audio(AudioMessage::DecodeFailed(id)) => {
                if let Some(track_path) = paths_by_id.get(&id) {
                    error!("Skipping {}", track_path.display());
                }
            }
            _ => {}
        }

        if done_tracks.len() == paths_by_id.len() {
            break;
        }
    }

    let _ = bus_sender.send(Message::Playback(PlaybackMessage::Stop));
    Ok(())
}

/// Track id carried by a message that ends the wait for that track: finished,
/// failed to decode, or the output stream refused to start.
fn finished_track_id(message: &Message) -> Option<&str> {
    match message {
        Message::Playback(PlaybackMessage::TrackFinished(id))
        | Message::Playback(PlaybackMessage::PlaybackFailed(id))
        | Message::Audio(AudioMessage::DecodeFailed(id)) => Some(id),
        _ => None,
    }
}

fn run_info(path: &PathBuf) -> Result<(), MogboxError> {
    let opened = OpenedTrack::open(path)?;
    let technical = &opened.technical_metadata;

    println!("{}", path.display());

    if let Some(tags) = read_common_track_metadata(path) {
        print_tag("Title", &tags.title);
        print_tag("Artist", &tags.artist);
        print_tag("Album", &tags.album);
        print_tag("Album artist", &tags.album_artist);
        print_tag("Date", &tags.date);
        print_tag("Year", &tags.year);
        print_tag("Genre", &tags.genre);
        print_tag("Track", &tags.track_number);
    }

    println!("  Format:       {}", technical.format);
    println!("  Sample rate:  {} Hz", technical.sample_rate_hz);
    println!("  Channels:     {}", technical.channel_count);
    if technical.duration_ms > 0 {
        println!(
            "  Duration:     {}",
            format_timestamp(technical.duration_ms)
        );
    }
    if technical.bitrate_kbps > 0 {
        println!("  Bitrate:      {} kbps", technical.bitrate_kbps);
    }
    Ok(())
}

fn print_tag(label: &str, value: &str) {
    if !value.is_empty() {
        println!("  {:<13} {}", format!("{}:", label), value);
    }
}

fn run_devices() -> Result<(), MogboxError> {
    let host = cpal::default_host();
    let default_device_name = host
        .default_output_device()
        .and_then(|device| device.name().ok());

    let mut found_any = false;
    for device in host.output_devices()? {
        found_any = true;
        let name = device.name().unwrap_or_else(|_| "Unknown Device".to_string());
        let marker = if Some(&name) == default_device_name.as_ref() {
            " (default)"
        } else {
            ""
        };
        println!("{}{}", name, marker);
        match device.supported_output_configs() {
            Ok(configs) => {
                for range in configs {
                    println!("  {}", describe_config_range(&range));
                }
            }
            Err(err) => {
                debug!("Failed to query configs for '{}': {}", name, err);
            }
        }
    }

    if !found_any {
        return Err(MogboxError::NoOutputDevice);
    }
    Ok(())
}

fn format_timestamp(ms: u64) -> String {
    let total_seconds = ms / 1_000;
    let minutes = total_seconds / 60;
    let seconds = total_seconds % 60;
    format!("{}:{:02}", minutes, seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0), "0:00");
        assert_eq!(format_timestamp(59_999), "0:59");
        assert_eq!(format_timestamp(60_000), "1:00");
        assert_eq!(format_timestamp(754_321), "12:34");
    }

    #[test]
    fn test_finished_track_id_covers_every_terminal_message() {
        let terminal = [
            Message::Playback(PlaybackMessage::TrackFinished("track-0001".to_string())),
            Message::Playback(PlaybackMessage::PlaybackFailed("track-0002".to_string())),
            Message::Audio(AudioMessage::DecodeFailed("track-0003".to_string())),
        ];
        for (index, message) in terminal.iter().enumerate() {
            assert_eq!(
                finished_track_id(message),
                Some(format!("track-{:04}", index + 1).as_str())
            );
        }

        // Progress and start notifications must not count a track done.
        assert_eq!(
            finished_track_id(&Message::Playback(PlaybackMessage::TrackStarted(
                "track-0001".to_string()
            ))),
            None
        );
        assert_eq!(
            finished_track_id(&Message::Playback(PlaybackMessage::PlaybackProgress {
                elapsed_ms: 1_000,
                total_ms: 2_000,
            })),
            None
        );
    }

    #[test]
    fn test_cli_parses_play_with_volume() {
        let cli = Cli::try_parse_from(["mogbox", "play", "/tmp/a.flac", "--volume", "0.5"])
            .expect("play command should parse");
        match cli.command {
            Command::Play { path, volume } => {
                assert_eq!(path, PathBuf::from("/tmp/a.flac"));
                assert_eq!(volume, Some(0.5));
            }
            _ => panic!("expected play command"),
        }
    }

    #[test]
    fn test_cli_rejects_missing_path() {
        assert!(Cli::try_parse_from(["mogbox", "info"]).is_err());
    }
}
