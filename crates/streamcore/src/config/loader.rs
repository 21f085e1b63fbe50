//! YAML channel catalog loader.
//!
//! Reads a single document shaped like:
//!
//! ```yaml
//! settings:
//!   state_dir: /var/lib/streamcore/state
//!   ...
//! channels:
//!   news:
//!     inputs: [...]
//!     transcoding: {...}
//!     mux: {...}
//!     outputs: [...]
//! ```
//!
//! and normalizes two units on the way in: kbps -> bps for bitrate fields,
//! and stream/PID identifiers -> canonical `0x####` hex.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use super::types::ChannelSpec;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("unknown channel '{0}'")]
    UnknownChannel(String),
    #[error("channel '{channel}' is missing required field '{field}'")]
    MissingField { channel: String, field: String },
    #[error("channel '{channel}' field '{field}' is invalid: {reason}")]
    InvalidValue {
        channel: String,
        field: String,
        reason: String,
    },
}

/// Daemon-wide tunables that live alongside the channel catalog in the same
/// YAML document (`settings:` block).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DaemonSettings {
    pub state_dir: String,
    pub handoff_dir: String,
    pub debug_dump_dir: String,
    pub bind_addr: String,
    pub health_check_interval_secs: u64,
    pub reachability_sweep_interval_secs: u64,
    pub reachability_sweep_enabled: bool,
    pub backoff_min_secs: u64,
    pub backoff_max_secs: u64,
    pub metrics_live_window_secs: u64,
    pub metrics_retention_secs: u64,
    pub metrics_retention_system_secs: u64,
}

impl Default for DaemonSettings {
    fn default() -> Self {
        Self {
            state_dir: "/var/lib/streamcore/state".into(),
            handoff_dir: "/var/lib/streamcore/handoff".into(),
            debug_dump_dir: "/var/lib/streamcore/dumps".into(),
            bind_addr: "0.0.0.0:8080".into(),
            health_check_interval_secs: 5,
            reachability_sweep_interval_secs: 30,
            reachability_sweep_enabled: true,
            backoff_min_secs: 5,
            backoff_max_secs: 30,
            metrics_live_window_secs: 300,
            metrics_retention_secs: 3 * 3600,
            metrics_retention_system_secs: 24 * 3600,
        }
    }
}

/// Raw on-disk document shape before channel-level normalization.
#[derive(Debug, Deserialize)]
struct RawDocument {
    #[serde(default)]
    settings: DaemonSettings,
    #[serde(default)]
    channels: BTreeMap<String, serde_yaml::Value>,
}

/// Loaded and normalized channel catalog plus daemon settings.
#[derive(Debug, Clone)]
pub struct ConfigCatalog {
    settings: DaemonSettings,
    channels: BTreeMap<String, ChannelSpec>,
}

impl ConfigCatalog {
    /// Loads and normalizes a catalog from a YAML file on disk.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&text, path)
    }

    fn parse(text: &str, path: &Path) -> Result<Self, ConfigError> {
        let raw: RawDocument = serde_yaml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;

        let mut channels = BTreeMap::new();
        for (name, value) in raw.channels {
            let spec = normalize_channel(&name, value)?;
            channels.insert(name, spec);
        }

        Ok(Self {
            settings: raw.settings,
            channels,
        })
    }

    #[must_use]
    pub fn settings(&self) -> &DaemonSettings {
        &self.settings
    }

    pub fn channel(&self, name: &str) -> Result<&ChannelSpec, ConfigError> {
        self.channels
            .get(name)
            .ok_or_else(|| ConfigError::UnknownChannel(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.channels.keys().map(String::as_str)
    }

    #[must_use]
    pub fn channels(&self) -> &BTreeMap<String, ChannelSpec> {
        &self.channels
    }
}

/// Parses a bitrate field that may arrive as kbps (bare integer, matching the
/// original catalog's convention) and returns bits/second.
fn coerce_bitrate_bps(channel: &str, field: &str, value: &serde_yaml::Value) -> Result<Option<u64>, ConfigError> {
    match value {
        serde_yaml::Value::Null => Ok(None),
        serde_yaml::Value::Number(n) => {
            let kbps = n.as_u64().ok_or_else(|| ConfigError::InvalidValue {
                channel: channel.to_string(),
                field: field.to_string(),
                reason: "bitrate must be a non-negative integer (kbps)".into(),
            })?;
            Ok(Some(kbps * 1000))
        }
        other => Err(ConfigError::InvalidValue {
            channel: channel.to_string(),
            field: field.to_string(),
            reason: format!("expected a number, got {other:?}"),
        }),
    }
}

/// Parses a stream identifier from decimal or `0x`-prefixed hex and
/// re-renders it as canonical `0x####` (uppercase, zero-padded to 4 digits).
fn coerce_hex_id(channel: &str, field: &str, value: &serde_yaml::Value) -> Result<String, ConfigError> {
    let raw = match value {
        serde_yaml::Value::String(s) => s.clone(),
        serde_yaml::Value::Number(n) => n.to_string(),
        other => {
            return Err(ConfigError::InvalidValue {
                channel: channel.to_string(),
                field: field.to_string(),
                reason: format!("expected a string or number, got {other:?}"),
            })
        }
    };

    let parsed = if let Some(hex) = raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16)
    } else if raw.chars().all(|c| c.is_ascii_digit()) {
        raw.parse::<u32>()
    } else {
        u32::from_str_radix(&raw, 16)
    }
    .map_err(|e| ConfigError::InvalidValue {
        channel: channel.to_string(),
        field: field.to_string(),
        reason: format!("'{raw}' is not a valid decimal or hex stream id: {e}"),
    })?;

    Ok(format!("0x{parsed:04X}"))
}

/// Walks the raw YAML value for one channel, coercing bitrate and hex fields
/// in place, then deserializes the result into `ChannelSpec`.
fn normalize_channel(channel: &str, mut value: serde_yaml::Value) -> Result<ChannelSpec, ConfigError> {
    for field in ["inputs", "mux", "outputs"] {
        if value.get(field).is_none() {
            return Err(ConfigError::MissingField {
                channel: channel.to_string(),
                field: field.to_string(),
            });
        }
    }

    normalize_video_streams(channel, &mut value)?;
    normalize_audio_bitrate(channel, &mut value)?;
    normalize_mux_pids(channel, &mut value)?;
    normalize_demux_selectors(channel, &mut value)?;

    if let Some(map) = value.as_mapping_mut() {
        map.insert(
            serde_yaml::Value::String("name".to_string()),
            serde_yaml::Value::String(channel.to_string()),
        );
    }

    serde_yaml::from_value(value).map_err(|e| ConfigError::InvalidValue {
        channel: channel.to_string(),
        field: "<root>".into(),
        reason: e.to_string(),
    })
}

fn normalize_video_streams(channel: &str, value: &mut serde_yaml::Value) -> Result<(), ConfigError> {
    let Some(streams) = value
        .get_mut("transcoding")
        .and_then(|t| t.get_mut("video"))
        .and_then(|v| v.get_mut("streams"))
        .and_then(|s| s.as_sequence_mut())
    else {
        return Ok(());
    };

    for stream in streams {
        let Some(map) = stream.as_mapping_mut() else {
            continue;
        };
        let key = serde_yaml::Value::String("bitrate".to_string());
        if let Some(raw) = map.remove(key) {
            let bps = coerce_bitrate_bps(channel, "transcoding.video.streams[].bitrate", &raw)?;
            if let Some(bps) = bps {
                map.insert(
                    serde_yaml::Value::String("bitrate_bps".to_string()),
                    serde_yaml::Value::Number(bps.into()),
                );
            }
        }
    }
    Ok(())
}

fn normalize_audio_bitrate(channel: &str, value: &mut serde_yaml::Value) -> Result<(), ConfigError> {
    let Some(map) = value
        .get_mut("transcoding")
        .and_then(|t| t.get_mut("audio"))
        .and_then(|a| a.as_mapping_mut())
    else {
        return Ok(());
    };

    let key = serde_yaml::Value::String("bitrate".to_string());
    if let Some(raw) = map.remove(key) {
        let bps = coerce_bitrate_bps(channel, "transcoding.audio.bitrate", &raw)?;
        if let Some(bps) = bps {
            map.insert(
                serde_yaml::Value::String("bitrate_bps".to_string()),
                serde_yaml::Value::Number(bps.into()),
            );
        }
    }
    Ok(())
}

fn normalize_mux_pids(channel: &str, value: &mut serde_yaml::Value) -> Result<(), ConfigError> {
    let Some(mux) = value.get_mut("mux").and_then(|m| m.as_mapping_mut()) else {
        return Ok(());
    };

    if let Some(pids) = mux
        .get_mut(serde_yaml::Value::String("video_pids".to_string()))
        .and_then(|v| v.as_sequence_mut())
    {
        for pid in pids {
            *pid = serde_yaml::Value::String(coerce_hex_id(channel, "mux.video_pids[]", pid)?);
        }
    }

    if let Some(pid) = mux.get(serde_yaml::Value::String("audio_pid".to_string())).cloned() {
        let canonical = coerce_hex_id(channel, "mux.audio_pid", &pid)?;
        mux.insert(
            serde_yaml::Value::String("audio_pid".to_string()),
            serde_yaml::Value::String(canonical),
        );
    }

    Ok(())
}

fn normalize_demux_selectors(channel: &str, value: &mut serde_yaml::Value) -> Result<(), ConfigError> {
    let Some(inputs) = value.get_mut("inputs").and_then(|i| i.as_sequence_mut()) else {
        return Ok(());
    };

    for input in inputs {
        let Some(selector) = input
            .as_mapping_mut()
            .and_then(|m| m.get_mut(serde_yaml::Value::String("demux_selector".to_string())))
            .and_then(|s| s.as_mapping_mut())
        else {
            continue;
        };

        for field in ["video_stream_id", "audio_stream_id"] {
            let key = serde_yaml::Value::String(field.to_string());
            if let Some(raw) = selector.get(key.clone()).cloned() {
                let canonical = coerce_hex_id(channel, field, &raw)?;
                selector.insert(key, serde_yaml::Value::String(canonical));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"
settings:
  state_dir: /tmp/state
  bind_addr: "127.0.0.1:9000"
channels:
  news:
    inputs:
      - kind: reliable-stream
        uri: "srt://1.2.3.4:9000"
        priority: 50
        demux_selector:
          program: 1
          video_stream_id: "256"
          audio_stream_id: "0x0101"
    transcoding:
      video:
        deinterlace: false
        streams:
          - codec: x264
            bitrate: 2000
      audio:
        codec: passthrough
    mux:
      program_number: 1
      video_pids: ["0x100", "257"]
      audio_pid: "0x101"
    outputs:
      - kind: datagram
        host: "239.0.0.1"
        port: 5000
"#;

    #[test]
    fn parses_and_normalizes_units() {
        let catalog = ConfigCatalog::parse(DOC, Path::new("<test>")).expect("parses");
        assert_eq!(catalog.settings().state_dir, "/tmp/state");
        let news = catalog.channel("news").expect("channel exists");
        assert_eq!(news.transcoding.video.streams[0].bitrate_bps, Some(2_000_000));
        assert_eq!(news.mux.video_pids, vec!["0x0100", "0x0101"]);
        assert_eq!(news.mux.audio_pid, "0x0101");
        assert_eq!(news.inputs[0].demux_selector.video_stream_id.as_deref(), Some("0x0100"));
        assert_eq!(news.inputs[0].demux_selector.audio_stream_id.as_deref(), Some("0x0101"));
    }

    #[test]
    fn unknown_channel_is_reported() {
        let catalog = ConfigCatalog::parse(DOC, Path::new("<test>")).expect("parses");
        match catalog.channel("missing") {
            Err(ConfigError::UnknownChannel(name)) => assert_eq!(name, "missing"),
            other => panic!("expected UnknownChannel, got {other:?}"),
        }
    }

    #[test]
    fn missing_required_field_is_reported() {
        const BROKEN: &str = r#"
channels:
  news:
    inputs: []
    mux:
      program_number: 1
      video_pids: []
      audio_pid: "0x101"
"#;
        match ConfigCatalog::parse(BROKEN, Path::new("<test>")) {
            Err(ConfigError::MissingField { channel, field }) => {
                assert_eq!(channel, "news");
                assert_eq!(field, "outputs");
            }
            other => panic!("expected MissingField, got {other:?}"),
        }
    }

    #[test]
    fn names_lists_all_channels() {
        let catalog = ConfigCatalog::parse(DOC, Path::new("<test>")).expect("parses");
        let names: Vec<&str> = catalog.names().collect();
        assert_eq!(names, vec!["news"]);
    }
}
