//! Appends this role's `MetricSample`s to the per-channel NDJSON file the
//! manager's `MetricsTail` polls. There is no IPC beyond the filesystem, so
//! every append is a single `write` of one JSON line plus a trailing `\n`.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use streamcore::model::MetricSample;

#[derive(Debug, thiserror::Error)]
#[error("failed to append metric sample to {path}: {source}")]
pub struct MetricsAppendError {
    path: String,
    #[source]
    source: std::io::Error,
}

pub struct MetricsAppender {
    path: PathBuf,
}

impl MetricsAppender {
    #[must_use]
    pub fn new(state_dir: &Path, channel: &str) -> Self {
        Self {
            path: state_dir.join("metrics").join(format!("{channel}.ndjson")),
        }
    }

    pub fn append(&self, sample: &MetricSample) -> Result<(), MetricsAppendError> {
        let line = serde_json::to_string(sample).expect("MetricSample always serializes");
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path).map_err(|source| MetricsAppendError {
            path: self.path.display().to_string(),
            source,
        })?;
        writeln!(file, "{line}").map_err(|source| MetricsAppendError {
            path: self.path.display().to_string(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use streamcore::model::MetricValue;

    #[test]
    fn append_writes_one_ndjson_line_per_sample() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("metrics")).unwrap();
        let appender = MetricsAppender::new(dir.path(), "news");

        let sample = MetricSample {
            timestamp: 10,
            stat_type: "input".into(),
            channel: "news".into(),
            payload: BTreeMap::from([("bitrate".to_string(), MetricValue::Number(5_000_000.0))]),
        };
        appender.append(&sample).unwrap();
        appender.append(&sample).unwrap();

        let body = std::fs::read_to_string(dir.path().join("metrics/news.ndjson")).unwrap();
        assert_eq!(body.lines().count(), 2);
        let parsed: MetricSample = serde_json::from_str(body.lines().next().unwrap()).unwrap();
        assert_eq!(parsed, sample);
    }
}
