//! Tag readers backed by `lofty`, used by the `info` command.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use lofty::config::{ParseOptions, ParsingMode};
use lofty::file::TaggedFile;
use lofty::file::TaggedFileExt;
use lofty::prelude::Accessor;
use lofty::probe::Probe;
use lofty::tag::{ItemKey, Tag};
use log::debug;

/// Normalized common metadata values extracted from file tags.
#[derive(Debug, Clone, Default)]
pub struct CommonTrackMetadata {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub album_artist: String,
    pub date: String,
    pub year: String,
    pub genre: String,
    pub track_number: String,
}

fn first_non_empty_value<F>(primary_tag: Option<&Tag>, tags: &[Tag], mut extractor: F) -> String
where
    F: FnMut(&Tag) -> Option<String>,
{
    if let Some(tag) = primary_tag {
        if let Some(value) = extractor(tag) {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                return trimmed.to_string();
            }
        }
    }

    for tag in tags {
        if let Some(value) = extractor(tag) {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                return trimmed.to_string();
            }
        }
    }

    String::new()
}

fn derive_year_from_date(date: &str) -> String {
    let mut consecutive_digits = String::with_capacity(4);
    for ch in date.chars() {
        if ch.is_ascii_digit() {
            consecutive_digits.push(ch);
            if consecutive_digits.len() == 4 {
                return consecutive_digits;
            }
        } else {
            consecutive_digits.clear();
        }
    }
    String::new()
}

fn metadata_parse_options(parsing_mode: ParsingMode, max_junk_bytes: usize) -> ParseOptions {
    ParseOptions::new()
        .read_properties(false)
        .read_cover_art(false)
        .parsing_mode(parsing_mode)
        .max_junk_bytes(max_junk_bytes)
}

fn read_tagged_file_for_metadata(path: &Path) -> Option<TaggedFile> {
    let primary_options = metadata_parse_options(ParsingMode::BestAttempt, 1024);
    let relaxed_options = metadata_parse_options(ParsingMode::Relaxed, 64 * 1024);

    match Probe::open(path) {
        Ok(probe) => match probe.options(primary_options).read() {
            Ok(tagged_file) => return Some(tagged_file),
            Err(primary_error) => {
                debug!(
                    "Metadata read primary parse failed for {}: {}",
                    path.display(),
                    primary_error
                );
            }
        },
        Err(open_error) => {
            debug!(
                "Metadata read could not open {} with extension-based probe: {}",
                path.display(),
                open_error
            );
        }
    }

    // Retry with relaxed parsing and content-based type detection.
    let file = File::open(path).ok()?;
    let guessed_probe = Probe::new(BufReader::new(file))
        .options(relaxed_options)
        .guess_file_type()
        .ok()?;
    match guessed_probe.read() {
        Ok(tagged_file) => Some(tagged_file),
        Err(error) => {
            debug!(
                "Metadata read failed for {} after relaxed fallback: {}",
                path.display(),
                error
            );
            None
        }
    }
}

/// Reads common tags from `path`, merging across all tag blocks present.
pub fn read_common_track_metadata(path: &Path) -> Option<CommonTrackMetadata> {
    let tagged_file = read_tagged_file_for_metadata(path)?;
    let primary_tag = tagged_file.primary_tag();
    let tags = tagged_file.tags();

    let title = first_non_empty_value(primary_tag, tags, |tag| {
        tag.title().map(|value| value.into_owned())
    });
    let artist = first_non_empty_value(primary_tag, tags, |tag| {
        tag.artist().map(|value| value.into_owned())
    });
    let album = first_non_empty_value(primary_tag, tags, |tag| {
        tag.album().map(|value| value.into_owned())
    });
    let album_artist = first_non_empty_value(primary_tag, tags, |tag| {
        tag.get_string(ItemKey::AlbumArtist)
            .or_else(|| tag.get_string(ItemKey::TrackArtist))
            .map(str::to_string)
    });
    let date = first_non_empty_value(primary_tag, tags, |tag| {
        tag.get_string(ItemKey::RecordingDate)
            .or_else(|| tag.get_string(ItemKey::ReleaseDate))
            .or_else(|| tag.get_string(ItemKey::OriginalReleaseDate))
            .or_else(|| tag.get_string(ItemKey::Year))
            .map(str::to_string)
    });
    let year = {
        let direct_year = first_non_empty_value(primary_tag, tags, |tag| {
            tag.get_string(ItemKey::Year).map(str::to_string)
        });
        if direct_year.is_empty() {
            derive_year_from_date(&date)
        } else {
            direct_year
        }
    };
    let genre = first_non_empty_value(primary_tag, tags, |tag| {
        tag.genre().map(|value| value.into_owned())
    });
    let track_number = first_non_empty_value(primary_tag, tags, |tag| {
        tag.get_string(ItemKey::TrackNumber)
            .map(str::to_string)
            .or_else(|| tag.track().map(|value| value.to_string()))
    });

    Some(CommonTrackMetadata {
        title,
        artist,
        album,
        album_artist,
        date,
        year,
        genre,
        track_number,
    })
}
