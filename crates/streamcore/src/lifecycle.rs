//! Channel Lifecycle Manager: translates a declared channel into a set of
//! running pipeline-role processes, in the correct start/stop order, and
//! exposes the typed start/stop/restart/status/list surface spec.md §4.3
//! names.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::{ChannelSpec, ConfigCatalog, ConfigError, TranscoderKind};
use crate::context::ControlPlaneContext;
use crate::model::ChannelRunState;
use crate::process::{RoleProcess, StopSignal};
use crate::protocol_constants::{
    GRACEFUL_STOP_TIMEOUT_SECS, HANDOFF_POLL_INTERVAL_SECS, HANDOFF_WAIT_BOUND_MINUTES, TERMINATE_TIMEOUT_SECS,
};
use crate::store::{RunStateStore, StoreError};
use crate::utils::now_secs;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("unknown channel '{0}'")]
    UnknownChannel(String),
    #[error("channel '{0}' is already running")]
    AlreadyRunning(String),
    #[error("channel '{0}' is not running")]
    NotRunning(String),
    #[error("channel '{channel}' has no input at index {index}")]
    InvalidSourceIndex { channel: String, index: usize },
    #[error("channel '{0}' declares no outputs and cannot be started")]
    NoOutputs(String),
    #[error("channel '{channel}' role '{role}' did not become ready in time")]
    HandoffTimeout { channel: String, role: String },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("failed to spawn role process: {0}")]
    Process(#[source] std::io::Error),
}

impl LifecycleError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownChannel(_) => "unknown_channel",
            Self::AlreadyRunning(_) => "already_running",
            Self::NotRunning(_) => "not_running",
            Self::InvalidSourceIndex { .. } => "invalid_source_index",
            Self::NoOutputs(_) => "no_outputs",
            Self::HandoffTimeout { .. } => "handoff_timeout",
            Self::Config(_) => "configuration_error",
            Self::Store(_) => "state_store_error",
            Self::Process(_) => "process_spawn_failed",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::UnknownChannel(_) | Self::NotRunning(_) => StatusCode::NOT_FOUND,
            Self::AlreadyRunning(_) => StatusCode::CONFLICT,
            Self::InvalidSourceIndex { .. } | Self::NoOutputs(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Role identifiers used for per-process bookkeeping, arg conventions, and
/// log messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Input,
    Transcoder,
    Output(usize),
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Input => write!(f, "input"),
            Self::Transcoder => write!(f, "transcoder"),
            Self::Output(i) => write!(f, "output[{i}]"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessStatus {
    pub pid: u32,
    pub running: bool,
    pub index: Option<usize>,
    pub uptime: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChannelStatus {
    pub running: bool,
    pub processes: BTreeMap<String, ProcessStatus>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChannelListing {
    pub input_type: String,
    pub transcoder_type: TranscoderKind,
    pub output_types: Vec<String>,
    pub running: bool,
}

/// Live handle for one channel's spawned processes, held only while the
/// manager's own process is up — on restart of the daemon itself, handles
/// are not recovered; the run-state file remains authoritative and the
/// health supervisor reconciles it against real PIDs.
struct ChannelHandle {
    input: RoleProcess,
    transcoder: Option<RoleProcess>,
    outputs: Vec<RoleProcess>,
}

/// Composes pipeline-role processes per channel and exposes the
/// start/stop/restart/status/list control surface.
pub struct LifecycleManager {
    catalog: Arc<ConfigCatalog>,
    run_state: Arc<RunStateStore>,
    ctx: Arc<ControlPlaneContext>,
    role_binary: PathBuf,
    locks: DashMap<String, Arc<Mutex<()>>>,
    handles: DashMap<String, ChannelHandle>,
}

impl LifecycleManager {
    #[must_use]
    pub fn new(catalog: Arc<ConfigCatalog>, run_state: Arc<RunStateStore>, ctx: Arc<ControlPlaneContext>, role_binary: PathBuf) -> Self {
        Self {
            catalog,
            run_state,
            ctx,
            role_binary,
            locks: DashMap::new(),
            handles: DashMap::new(),
        }
    }

    fn lock_for(&self, channel: &str) -> Arc<Mutex<()>> {
        self.locks.entry(channel.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    /// Starts `channel` using `source_index` (default 0), launching
    /// `input -> [transcoder] -> outputs[*]` in order, waiting for each
    /// stage's handoff before launching the next.
    pub async fn start(&self, channel: &str, source_index: usize) -> Result<(), LifecycleError> {
        let lock = self.lock_for(channel);
        let _guard = lock.lock();

        let spec = self.catalog.channel(channel)?;
        if source_index >= spec.inputs.len() {
            return Err(LifecycleError::InvalidSourceIndex {
                channel: channel.to_string(),
                index: source_index,
            });
        }
        if spec.outputs.is_empty() {
            return Err(LifecycleError::NoOutputs(channel.to_string()));
        }
        if self.run_state.load(channel)?.is_some() {
            return Err(LifecycleError::AlreadyRunning(channel.to_string()));
        }

        self.launch(channel, spec, source_index).await
    }

    async fn launch(&self, channel: &str, spec: &ChannelSpec, source_index: usize) -> Result<(), LifecycleError> {
        let log_dir = self.ctx.debug_dump_dir().join(channel);
        std::fs::create_dir_all(&log_dir).map_err(LifecycleError::Process)?;

        info!(channel, role = %Role::Input, "launching role process");
        let input = self.spawn_role(channel, Role::Input, source_index, &log_dir)?;
        self.wait_for_handoff(channel, Role::Input).await?;

        let transcoder = if spec.needs_transcoder() {
            info!(channel, role = %Role::Transcoder, "launching role process");
            let proc = self.spawn_role(channel, Role::Transcoder, source_index, &log_dir)?;
            self.wait_for_handoff(channel, Role::Transcoder).await?;
            Some(proc)
        } else {
            None
        };

        let mut outputs = Vec::with_capacity(spec.outputs.len());
        let mut output_pids = BTreeMap::new();
        for (index, output) in spec.outputs.iter().enumerate() {
            info!(channel, role = %Role::Output(index), "launching role process");
            let proc = self.spawn_role_with_options(channel, Role::Output(index), source_index, &log_dir, Some(&output.options))?;
            output_pids.insert(index, proc.pid());
            outputs.push(proc);
        }

        let now = now_secs();
        let run_state = ChannelRunState {
            source_index,
            input_pid: input.pid(),
            transcoder_pid: transcoder.as_ref().map(RoleProcess::pid),
            output_pids,
            started_at: now,
            last_restart: now,
            failure_count: 0,
        };
        self.run_state.save(channel, &run_state)?;

        self.handles.insert(channel.to_string(), ChannelHandle { input, transcoder, outputs });
        Ok(())
    }

    fn spawn_role(&self, channel: &str, role: Role, source_index: usize, log_dir: &std::path::Path) -> Result<RoleProcess, LifecycleError> {
        self.spawn_role_with_options(channel, role, source_index, log_dir, None)
    }

    fn spawn_role_with_options(
        &self,
        channel: &str,
        role: Role,
        source_index: usize,
        log_dir: &std::path::Path,
        output_options: Option<&BTreeMap<String, serde_json::Value>>,
    ) -> Result<RoleProcess, LifecycleError> {
        let mut args = vec![channel.to_string(), "--source-index".to_string(), source_index.to_string()];
        if let Role::Output(index) = role {
            args.push("--output-index".to_string());
            args.push(index.to_string());
            if let Some(options) = output_options {
                if !options.is_empty() {
                    args.push("--output-options".to_string());
                    args.push(serde_json::to_string(options).map_err(|e| LifecycleError::Process(std::io::Error::other(e.to_string())))?);
                }
            }
        }
        args.push("--log-dir".to_string());
        args.push(log_dir.display().to_string());
        args.push("--role".to_string());
        args.push(role.to_string());

        let mut env = HashMap::new();
        env.insert("STREAMCORE_STATE_DIR".to_string(), self.ctx.state_dir().display().to_string());
        env.insert("STREAMCORE_HANDOFF_DIR".to_string(), self.ctx.channel_handoff_dir(channel).display().to_string());
        env.insert("STREAMCORE_DEBUG_DUMP_DIR".to_string(), self.ctx.debug_dump_dir().display().to_string());

        RoleProcess::spawn(self.role_binary.to_str().unwrap_or("pipeline-role"), &args, &env, log_dir)
            .map_err(|e| LifecycleError::Process(std::io::Error::other(e.to_string())))
    }

    /// Polls for the upstream handoff descriptor + rendezvous marker,
    /// bounded by `HANDOFF_WAIT_BOUND_MINUTES`.
    async fn wait_for_handoff(&self, channel: &str, role: Role) -> Result<(), LifecycleError> {
        let hop_dir = self.ctx.channel_handoff_dir(channel).join(role.to_string());
        let rendezvous = hop_dir.join(crate::protocol_constants::HANDOFF_RENDEZVOUS_FILE);
        let deadline = tokio::time::Instant::now() + Duration::from_secs(HANDOFF_WAIT_BOUND_MINUTES * 60);

        loop {
            if rendezvous.exists() {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(LifecycleError::HandoffTimeout {
                    channel: channel.to_string(),
                    role: role.to_string(),
                });
            }
            tokio::time::sleep(Duration::from_secs(HANDOFF_POLL_INTERVAL_SECS)).await;
        }
    }

    /// Stops `channel`: outputs first, transcoder, input last, each with the
    /// graceful→terminate→kill escalation, then removes the run-state file.
    pub async fn stop(&self, channel: &str) -> Result<(), LifecycleError> {
        let lock = self.lock_for(channel);
        let _guard = lock.lock();

        if self.run_state.load(channel)?.is_none() {
            return Err(LifecycleError::NotRunning(channel.to_string()));
        }

        let escalated = self.teardown(channel).await;
        self.run_state.remove(channel)?;
        if escalated {
            self.cleanup_handoff(channel);
        }
        Ok(())
    }

    /// Runs the stop escalation against whatever processes this manager
    /// instance still holds a handle for. Returns `true` if any process had
    /// to be force-killed.
    async fn teardown(&self, channel: &str) -> bool {
        let Some((_, mut handle)) = self.handles.remove(channel) else {
            warn!(channel, "no in-process handle for channel being stopped; run-state will still be removed");
            return false;
        };

        let graceful = Duration::from_secs(GRACEFUL_STOP_TIMEOUT_SECS);
        let terminate = Duration::from_secs(TERMINATE_TIMEOUT_SECS);
        let mut escalated = false;

        for output in handle.outputs.iter_mut().rev() {
            escalated |= Self::stop_one(output, graceful, terminate).await;
        }
        if let Some(transcoder) = handle.transcoder.as_mut() {
            escalated |= Self::stop_one(transcoder, graceful, terminate).await;
        }
        escalated |= Self::stop_one(&mut handle.input, graceful, terminate).await;

        escalated
    }

    async fn stop_one(proc: &mut RoleProcess, graceful: Duration, terminate: Duration) -> bool {
        if proc.signal_group(StopSignal::Graceful).is_err() {
            return true;
        }
        if let Ok(true) = proc.wait_timeout(graceful).await {
            return false;
        }
        let _ = proc.stop_with_escalation(Duration::ZERO, terminate).await;
        true
    }

    fn cleanup_handoff(&self, channel: &str) {
        let dir = self.ctx.channel_handoff_dir(channel);
        if let Err(e) = std::fs::remove_dir_all(&dir) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(channel, error = %e, "best-effort handoff cleanup failed");
            }
        }
    }

    /// Stops then starts a channel at `source_index`.
    pub async fn restart(&self, channel: &str, source_index: usize) -> Result<(), LifecycleError> {
        if self.run_state.load(channel)?.is_some() {
            self.stop(channel).await?;
        }
        self.start(channel, source_index).await
    }

    /// `None` returns every channel; `Some(name)` an unknown-channel error if
    /// absent from the catalog.
    pub fn status(&self, channel: Option<&str>) -> Result<BTreeMap<String, ChannelStatus>, LifecycleError> {
        let names: Vec<String> = match channel {
            Some(name) => {
                self.catalog.channel(name)?;
                vec![name.to_string()]
            }
            None => self.catalog.names().map(str::to_string).collect(),
        };

        let mut out = BTreeMap::new();
        for name in names {
            out.insert(name.clone(), self.one_status(&name)?);
        }
        Ok(out)
    }

    fn one_status(&self, channel: &str) -> Result<ChannelStatus, LifecycleError> {
        let Some(state) = self.run_state.load(channel)? else {
            return Ok(ChannelStatus {
                running: false,
                processes: BTreeMap::new(),
            });
        };

        let now = now_secs();
        let uptime = state.uptime_secs(now);
        let mut processes = BTreeMap::new();
        processes.insert(
            "input".to_string(),
            ProcessStatus {
                pid: state.input_pid,
                running: pid_alive(state.input_pid),
                index: Some(state.source_index),
                uptime,
            },
        );
        if let Some(pid) = state.transcoder_pid {
            processes.insert(
                "transcoder".to_string(),
                ProcessStatus {
                    pid,
                    running: pid_alive(pid),
                    index: None,
                    uptime,
                },
            );
        }
        for (index, pid) in &state.output_pids {
            processes.insert(
                format!("output[{index}]"),
                ProcessStatus {
                    pid: *pid,
                    running: pid_alive(*pid),
                    index: Some(*index),
                    uptime,
                },
            );
        }

        Ok(ChannelStatus { running: true, processes })
    }

    /// Every catalog channel with its classification + running flag.
    pub fn list(&self) -> Result<BTreeMap<String, ChannelListing>, LifecycleError> {
        let mut out = BTreeMap::new();
        for name in self.catalog.names() {
            let spec = self.catalog.channel(name)?;
            let running = self.run_state.load(name)?.is_some();
            out.insert(
                name.to_string(),
                ChannelListing {
                    input_type: spec.inputs.first().map(|i| format!("{:?}", i.kind).to_lowercase()).unwrap_or_default(),
                    transcoder_type: spec.transcoder_kind(),
                    output_types: spec.outputs.iter().map(|o| format!("{:?}", o.kind).to_lowercase()).collect(),
                    running,
                },
            );
        }
        Ok(out)
    }
}

#[cfg(unix)]
fn pid_alive(pid: u32) -> bool {
    // `kill` treats negative/zero pids as group/broadcast targets, not a
    // single-process probe, so anything that doesn't fit a real pid_t is
    // reported dead rather than handed to libc.
    let Ok(pid) = i32::try_from(pid) else {
        return false;
    };
    if pid <= 0 {
        return false;
    }
    // SAFETY: signal 0 performs no action beyond existence/permission check.
    unsafe { libc::kill(pid, 0) == 0 }
}

#[cfg(not(unix))]
fn pid_alive(_pid: u32) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_display_matches_arg_convention() {
        assert_eq!(Role::Input.to_string(), "input");
        assert_eq!(Role::Transcoder.to_string(), "transcoder");
        assert_eq!(Role::Output(2).to_string(), "output[2]");
    }

    #[test]
    fn pid_alive_is_false_for_a_pid_that_cannot_exist() {
        // i32::MAX as u32 stays in pid_t's positive range (unlike u32::MAX,
        // which casts to -1 and makes `kill` broadcast instead of probing),
        // while still sitting far above any real pid_max.
        assert!(!pid_alive(i32::MAX as u32));
    }
}
