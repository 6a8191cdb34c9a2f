use crate::media::OpenedTrack;
use crate::protocol::{AudioMessage, AudioPacket, Message, TrackIdentifier};
use log::{debug, error, warn};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::errors::Error as SymphoniaError;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::broadcast::{Receiver, Sender};

/// Decoded samples are batched into messages of roughly this size to keep
/// bus traffic well below the broadcast channel capacity.
const SAMPLES_PER_MESSAGE: usize = 65_536;

/// Bus-driven decode worker. Streams decoded f32 samples to the player.
pub struct AudioDecoder {
    bus_receiver: Receiver<Message>,
    bus_sender: Sender<Message>,
}

impl AudioDecoder {
    pub fn new(bus_receiver: Receiver<Message>, bus_sender: Sender<Message>) -> Self {
        Self {
            bus_receiver,
            bus_sender,
        }
    }

    pub fn run(&mut self) {
        loop {
            match self.bus_receiver.blocking_recv() {
                Ok(Message::Audio(AudioMessage::DecodeTracks(tracks))) => {
                    for track in tracks {
                        debug!("AudioDecoder: Decoding track {:?}", track.path);
                        self.decode_track(&track);
                    }
                }
                Ok(_) => {} // Ignore other messages
                Err(RecvError::Lagged(skipped)) => {
                    warn!("AudioDecoder: receiver lagged, skipped {} messages", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
        debug!("AudioDecoder: bus closed, exiting");
    }

    fn decode_track(&mut self, track: &TrackIdentifier) {
        let mut opened = match OpenedTrack::open(&track.path) {
            Ok(opened) => opened,
            Err(err) => {
                error!("AudioDecoder: Failed to open {:?}: {}", track.path, err);
                let _ = self
                    .bus_sender
                    .send(Message::Audio(AudioMessage::DecodeFailed(track.id.clone())));
                return;
            }
        };

        let _ = self
            .bus_sender
            .send(Message::Audio(AudioMessage::AudioPacket(
                AudioPacket::TrackHeader {
                    id: track.id.clone(),
                    play_immediately: track.play_immediately,
                    technical_metadata: opened.technical_metadata.clone(),
                },
            )));

        let mut batch: Vec<f32> = Vec::with_capacity(SAMPLES_PER_MESSAGE);
        let mut decoded_samples: u64 = 0;

        loop {
            let packet = match opened.format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(_)) | Err(SymphoniaError::ResetRequired) => {
                    // End of stream.
                    break;
                }
                Err(err) => {
                    error!("AudioDecoder: Failed to read packet: {}", err);
                    break;
                }
            };

            if packet.track_id() != opened.track_id {
                continue;
            }

            match opened.decoder.decode(&packet) {
                Ok(decoded) => {
                    let spec = *decoded.spec();
                    let duration = decoded.capacity() as u64;

                    let mut buffer = SampleBuffer::<f32>::new(duration, spec);
                    buffer.copy_interleaved_ref(decoded);
                    decoded_samples += buffer.samples().len() as u64;

                    batch.extend_from_slice(buffer.samples());
                    if batch.len() >= SAMPLES_PER_MESSAGE {
                        self.send_samples(std::mem::take(&mut batch));
                    }
                }
                Err(SymphoniaError::IoError(_)) => break,
                Err(SymphoniaError::DecodeError(err)) => {
                    // Tolerate damaged frames and keep going.
                    warn!("AudioDecoder: Skipping undecodable packet: {}", err);
                    continue;
                }
                Err(err) => {
                    error!("AudioDecoder: Failed to decode packet: {}", err);
                    break;
                }
            }
        }

        if !batch.is_empty() {
            self.send_samples(batch);
        }

        debug!(
            "AudioDecoder: Finished {:?} after {} samples",
            track.path, decoded_samples
        );
        let _ = self
            .bus_sender
            .send(Message::Audio(AudioMessage::AudioPacket(
                AudioPacket::TrackFooter {
                    id: track.id.clone(),
                },
            )));
    }

    fn send_samples(&self, samples: Vec<f32>) {
        let _ = self
            .bus_sender
            .send(Message::Audio(AudioMessage::AudioPacket(
                AudioPacket::Samples { samples },
            )));
    }
}
