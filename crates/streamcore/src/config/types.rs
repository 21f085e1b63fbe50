//! Typed channel configuration.
//!
//! Mirrors the shape of the declarative channel catalog (`ChannelSpec` in the
//! design doc): one entry per channel, immutable for the lifetime of a run.

use serde::{Deserialize, Serialize};

/// A single declared channel: input priority list, optional transcoding,
/// mux settings, and output list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelSpec {
    /// Unique channel identifier (also the map key in the catalog, duplicated
    /// here so a `ChannelSpec` is self-describing once looked up).
    pub name: String,
    /// Ordered input sources. Index 0 is the default; `priority` drives
    /// failover selection (higher wins, ties broken by lowest index).
    pub inputs: Vec<InputSpec>,
    /// Transcoding configuration. `passthrough` on both video and audio
    /// suppresses the transcoder process entirely.
    pub transcoding: TranscodingSpec,
    /// Mux program/PID assignment.
    pub mux: MuxSpec,
    /// Ordered output sinks.
    pub outputs: Vec<OutputSpec>,
}

impl ChannelSpec {
    /// Classifies the transcoder requirement for this channel.
    ///
    /// `None` when both video and audio are passthrough (no transcoder
    /// process is launched); otherwise reflects whether any video stream
    /// requests GPU encoding, matching the hybrid decode/encode splits the
    /// original classifies from `{gpu, deinterlace, passthrough}`.
    #[must_use]
    pub fn transcoder_kind(&self) -> TranscoderKind {
        let video_passthrough = self.transcoding.video.streams.iter().all(|s| s.is_passthrough());
        let audio_passthrough = self.transcoding.audio.is_passthrough();
        if video_passthrough && audio_passthrough {
            return TranscoderKind::None;
        }

        let any_gpu = self
            .transcoding
            .video
            .streams
            .iter()
            .any(|s| matches!(s.codec.as_deref(), Some(c) if c.ends_with("_gpu") || c.starts_with("nv") || c.starts_with("qsv")));

        match (any_gpu, video_passthrough) {
            (true, false) => TranscoderKind::HybridGpuDecode,
            (false, false) if self.transcoding.video.deinterlace => TranscoderKind::HybridCpuDecode,
            (false, false) => TranscoderKind::Cpu,
            // Video itself is passthrough but audio needs transcoding, or no
            // GPU codec requested: a plain CPU transcoder still has to run
            // to handle the audio branch / repack passthrough video.
            (_, true) => TranscoderKind::Cpu,
        }
    }

    /// Whether this channel needs a transcoder process at all.
    #[must_use]
    pub fn needs_transcoder(&self) -> bool {
        !matches!(self.transcoder_kind(), TranscoderKind::None)
    }
}

/// Transcoder classification surfaced by `GET /list`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TranscoderKind {
    None,
    Cpu,
    Gpu,
    HybridCpuDecode,
    HybridGpuDecode,
}

/// One input source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputSpec {
    pub kind: InputKind,
    pub uri: String,
    /// Numeric priority; higher wins during failover source selection.
    pub priority: i64,
    #[serde(default)]
    pub options: std::collections::BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub demux_selector: DemuxSelector,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InputKind {
    ReliableStream,
    Datagram,
    SegmentedHttp,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DemuxSelector {
    #[serde(default)]
    pub program: Option<u32>,
    /// Canonicalized as `0x####` on load; see `crate::config::loader`.
    #[serde(default)]
    pub video_stream_id: Option<String>,
    #[serde(default)]
    pub audio_stream_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TranscodingSpec {
    #[serde(default)]
    pub video: VideoTranscodingSpec,
    #[serde(default)]
    pub audio: AudioTranscodingSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct VideoTranscodingSpec {
    #[serde(default)]
    pub deinterlace: bool,
    #[serde(default)]
    pub streams: Vec<VideoStreamSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoStreamSpec {
    /// `None` (or the literal string `"passthrough"` on the wire) means the
    /// elementary stream is forwarded unmodified.
    pub codec: Option<String>,
    /// Already normalized to bits/second by the Config Loader.
    #[serde(default)]
    pub bitrate_bps: Option<u64>,
    #[serde(default)]
    pub resolution: Option<Resolution>,
    #[serde(default)]
    pub options: std::collections::BTreeMap<String, serde_json::Value>,
}

impl VideoStreamSpec {
    #[must_use]
    pub fn is_passthrough(&self) -> bool {
        self.codec.as_deref().is_none_or(|c| c.eq_ignore_ascii_case("passthrough"))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Resolution {
    pub w: u32,
    pub h: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AudioTranscodingSpec {
    pub codec: Option<String>,
    #[serde(default)]
    pub bitrate_bps: Option<u64>,
    #[serde(default)]
    pub options: std::collections::BTreeMap<String, serde_json::Value>,
}

impl AudioTranscodingSpec {
    #[must_use]
    pub fn is_passthrough(&self) -> bool {
        self.codec.as_deref().is_none_or(|c| c.eq_ignore_ascii_case("passthrough"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MuxSpec {
    pub program_number: u32,
    /// Canonicalized as `0x####` on load.
    pub video_pids: Vec<String>,
    pub audio_pid: String,
    #[serde(default)]
    pub other_options: std::collections::BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputSpec {
    pub kind: OutputKind,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default)]
    pub options: std::collections::BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputKind {
    Datagram,
    ReliableStream,
    Rist,
    Rtmp,
    Tcp,
    SegmentedHttp,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn passthrough_spec() -> ChannelSpec {
        ChannelSpec {
            name: "news".into(),
            inputs: vec![InputSpec {
                kind: InputKind::ReliableStream,
                uri: "srt://1.2.3.4:9000".into(),
                priority: 50,
                options: Default::default(),
                demux_selector: DemuxSelector::default(),
            }],
            transcoding: TranscodingSpec {
                video: VideoTranscodingSpec {
                    deinterlace: false,
                    streams: vec![VideoStreamSpec {
                        codec: Some("passthrough".into()),
                        bitrate_bps: None,
                        resolution: None,
                        options: Default::default(),
                    }],
                },
                audio: AudioTranscodingSpec {
                    codec: Some("passthrough".into()),
                    bitrate_bps: None,
                    options: Default::default(),
                },
            },
            mux: MuxSpec {
                program_number: 1,
                video_pids: vec!["0x0100".into()],
                audio_pid: "0x0101".into(),
                other_options: Default::default(),
            },
            outputs: vec![OutputSpec {
                kind: OutputKind::Datagram,
                host: Some("239.0.0.1".into()),
                port: Some(5000),
                uri: None,
                options: Default::default(),
            }],
        }
    }

    #[test]
    fn passthrough_video_and_audio_suppresses_transcoder() {
        let spec = passthrough_spec();
        assert_eq!(spec.transcoder_kind(), TranscoderKind::None);
        assert!(!spec.needs_transcoder());
    }

    #[test]
    fn non_passthrough_video_needs_cpu_transcoder() {
        let mut spec = passthrough_spec();
        spec.transcoding.video.streams[0].codec = Some("x264".into());
        spec.transcoding.video.streams[0].bitrate_bps = Some(2_000_000);
        assert_eq!(spec.transcoder_kind(), TranscoderKind::Cpu);
        assert!(spec.needs_transcoder());
    }

    #[test]
    fn gpu_codec_selects_hybrid_gpu_decode() {
        let mut spec = passthrough_spec();
        spec.transcoding.video.streams[0].codec = Some("h264_nvenc".into());
        assert_eq!(spec.transcoder_kind(), TranscoderKind::HybridGpuDecode);
    }
}
