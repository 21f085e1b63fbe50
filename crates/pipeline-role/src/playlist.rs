//! Rolling HLS playlist bookkeeping for `segmented-http` outputs.
//!
//! Mirrors the windowed rolling-list discipline of a GStreamer `hlssink2`
//! wrapper: keep the last `max_files` segments on disk, drop the oldest as
//! new ones land, and rewrite `playlist.m3u8` on every rollover so it never
//! names more segments than are still present. Defaults match that
//! wrapper's: a 5-entry sliding window, a nominal 10s target duration, and
//! 6 segment files retained on disk before the oldest is deleted.

use std::collections::VecDeque;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy)]
pub struct PlaylistOptions {
    pub playlist_length: usize,
    pub target_duration_secs: u32,
    pub max_files: usize,
}

impl Default for PlaylistOptions {
    fn default() -> Self {
        Self {
            playlist_length: 5,
            target_duration_secs: 10,
            max_files: 6,
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("failed to write {path}: {source}")]
pub struct PlaylistError {
    path: String,
    #[source]
    source: std::io::Error,
}

/// Tracks the sliding window of segments for one output directory and
/// rewrites `playlist.m3u8` on every rollover.
pub struct RollingPlaylist {
    dir: PathBuf,
    options: PlaylistOptions,
    segments: VecDeque<u64>,
    media_sequence: u64,
    next_index: u64,
}

impl RollingPlaylist {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, options: PlaylistOptions) -> Self {
        Self {
            dir: dir.into(),
            options,
            segments: VecDeque::new(),
            media_sequence: 0,
            next_index: 0,
        }
    }

    fn segment_path(&self, index: u64) -> PathBuf {
        self.dir.join(format!("segment{index:05}.ts"))
    }

    fn playlist_path(&self) -> PathBuf {
        self.dir.join("playlist.m3u8")
    }

    /// Records that a new segment file has been written at
    /// `segment_path(index)`, evicting the oldest file once more than
    /// `max_files` are on disk, then rewrites the playlist.
    pub fn roll(&mut self) -> Result<PathBuf, PlaylistError> {
        std::fs::create_dir_all(&self.dir).map_err(|source| PlaylistError {
            path: self.dir.display().to_string(),
            source,
        })?;

        let index = self.next_index;
        self.next_index += 1;
        self.segments.push_back(index);

        while self.segments.len() > self.options.max_files {
            if let Some(evicted) = self.segments.pop_front() {
                let _ = std::fs::remove_file(self.segment_path(evicted));
                self.media_sequence += 1;
            }
        }

        self.write_playlist()?;
        Ok(self.segment_path(index))
    }

    fn write_playlist(&self) -> Result<(), PlaylistError> {
        let window_start = self.segments.len().saturating_sub(self.options.playlist_length);
        let mut body = String::new();
        body.push_str("#EXTM3U\n");
        body.push_str("#EXT-X-VERSION:3\n");
        body.push_str(&format!("#EXT-X-TARGETDURATION:{}\n", self.options.target_duration_secs));
        body.push_str(&format!("#EXT-X-MEDIA-SEQUENCE:{}\n", self.media_sequence + window_start as u64));

        for &index in self.segments.iter().skip(window_start) {
            body.push_str(&format!("#EXTINF:{:.3},\n", self.options.target_duration_secs as f64));
            body.push_str(&format!("segment{index:05}.ts\n"));
        }

        let tmp_path = self.dir.join("playlist.m3u8.tmp");
        std::fs::write(&tmp_path, &body).map_err(|source| PlaylistError {
            path: tmp_path.display().to_string(),
            source,
        })?;
        std::fs::rename(&tmp_path, self.playlist_path()).map_err(|source| PlaylistError {
            path: self.playlist_path().display().to_string(),
            source,
        })
    }
}

#[must_use]
pub fn options_from_spec(options: &std::collections::BTreeMap<String, serde_json::Value>) -> PlaylistOptions {
    let mut opts = PlaylistOptions::default();
    if let Some(v) = options.get("playlist-length").and_then(serde_json::Value::as_u64) {
        opts.playlist_length = v as usize;
    }
    if let Some(v) = options.get("target-duration").and_then(serde_json::Value::as_u64) {
        opts.target_duration_secs = v as u32;
    }
    if let Some(v) = options.get("max-files").and_then(serde_json::Value::as_u64) {
        opts.max_files = v as usize;
    }
    opts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_oldest_segment_once_over_max_files() {
        let dir = tempfile::tempdir().unwrap();
        let opts = PlaylistOptions {
            playlist_length: 2,
            target_duration_secs: 4,
            max_files: 3,
        };
        let mut playlist = RollingPlaylist::new(dir.path(), opts);

        for _ in 0..3 {
            let path = playlist.roll().unwrap();
            std::fs::write(path, b"ts-data").unwrap();
        }
        assert!(dir.path().join("segment00000.ts").exists());

        let path = playlist.roll().unwrap();
        std::fs::write(path, b"ts-data").unwrap();
        assert!(!dir.path().join("segment00000.ts").exists());
        assert!(dir.path().join("segment00003.ts").exists());
    }

    #[test]
    fn playlist_window_never_exceeds_playlist_length() {
        let dir = tempfile::tempdir().unwrap();
        let opts = PlaylistOptions {
            playlist_length: 2,
            target_duration_secs: 4,
            max_files: 6,
        };
        let mut playlist = RollingPlaylist::new(dir.path(), opts);
        for _ in 0..5 {
            let path = playlist.roll().unwrap();
            std::fs::write(path, b"ts-data").unwrap();
        }

        let body = std::fs::read_to_string(dir.path().join("playlist.m3u8")).unwrap();
        assert_eq!(body.matches("#EXTINF").count(), 2);
    }

    #[test]
    fn options_from_spec_overrides_defaults() {
        let mut map = std::collections::BTreeMap::new();
        map.insert("playlist-length".to_string(), serde_json::json!(3));
        map.insert("max-files".to_string(), serde_json::json!(4));
        let opts = options_from_spec(&map);
        assert_eq!(opts.playlist_length, 3);
        assert_eq!(opts.max_files, 4);
        assert_eq!(opts.target_duration_secs, 10);
    }
}
