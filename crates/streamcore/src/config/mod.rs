//! Channel catalog: typed configuration loaded from the daemon's YAML file.

mod loader;
mod types;

pub use loader::{ConfigCatalog, ConfigError, DaemonSettings};
pub use types::{
    AudioTranscodingSpec, ChannelSpec, DemuxSelector, InputKind, InputSpec, MuxSpec, OutputKind, OutputSpec,
    Resolution, TranscoderKind, TranscodingSpec, VideoStreamSpec, VideoTranscodingSpec,
};
