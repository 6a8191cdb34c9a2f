use std::path::{Path, PathBuf};

use log::debug;

pub const SUPPORTED_AUDIO_EXTENSIONS: [&str; 7] =
    ["mp3", "wav", "ogg", "flac", "aac", "m4a", "mp4"];

pub fn is_supported_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            SUPPORTED_AUDIO_EXTENSIONS
                .iter()
                .any(|supported| ext.eq_ignore_ascii_case(supported))
        })
        .unwrap_or(false)
}

pub fn collect_audio_files_from_folder(folder_path: &Path) -> Vec<PathBuf> {
    let mut pending_directories = vec![folder_path.to_path_buf()];
    let mut tracks = Vec::new();

    while let Some(directory) = pending_directories.pop() {
        let entries = match std::fs::read_dir(&directory) {
            Ok(entries) => entries,
            Err(err) => {
                debug!("Failed to read directory {}: {}", directory.display(), err);
                continue;
            }
        };

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    debug!(
                        "Failed to read a directory entry in {}: {}",
                        directory.display(),
                        err
                    );
                    continue;
                }
            };

            let path = entry.path();
            let file_type = match entry.file_type() {
                Ok(file_type) => file_type,
                Err(err) => {
                    debug!("Failed to inspect {}: {}", path.display(), err);
                    continue;
                }
            };

            if file_type.is_dir() {
                pending_directories.push(path);
                continue;
            }

            if file_type.is_file() && is_supported_audio_file(&path) {
                tracks.push(path);
            }
        }
    }

    tracks.sort_unstable();
    tracks
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn unique_temp_dir(test_name: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock should be after UNIX_EPOCH")
            .as_nanos();
        let dir = std::env::temp_dir().join(format!(
            "mogbox_discovery_{}_{}_{}",
            test_name,
            std::process::id(),
            nanos
        ));
        std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
        dir
    }

    #[test]
    fn test_is_supported_audio_file() {
        assert!(is_supported_audio_file(Path::new("/music/track.mp3")));
        assert!(is_supported_audio_file(Path::new("/music/track.FLAC")));
        assert!(!is_supported_audio_file(Path::new("/music/cover.jpg")));
        assert!(!is_supported_audio_file(Path::new("/music/noext")));
    }

    #[test]
    fn test_collect_finds_nested_supported_files_sorted() {
        let dir = unique_temp_dir("nested");
        std::fs::create_dir_all(dir.join("album")).expect("subdir should be creatable");
        std::fs::write(dir.join("b.mp3"), b"").expect("file should be writable");
        std::fs::write(dir.join("album/a.flac"), b"").expect("file should be writable");
        std::fs::write(dir.join("notes.txt"), b"").expect("file should be writable");

        let tracks = collect_audio_files_from_folder(&dir);
        assert_eq!(tracks, vec![dir.join("album/a.flac"), dir.join("b.mp3")]);

        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn test_collect_on_missing_directory_is_empty() {
        let dir = unique_temp_dir("missing").join("does_not_exist");
        assert!(collect_audio_files_from_folder(&dir).is_empty());
    }
}
