//! The per-process state machine every role drives from launch to exit.
//!
//! `Idle -> Constructing -> Running -> (Stalled -> Constructing)* -> Terminating -> Exit`,
//! with a `Fatal` branch taken once a role's reconstruction-attempt bound
//! (`Role::max_reconstruct_attempts`) is exceeded. Every transition is
//! logged; `Stalled -> Constructing` additionally increments the attempt
//! counter that bounds the cycle.

use std::time::Duration;

use tracing::{error, info, warn};

use crate::graph::{GraphBuilder, Progress, RoleContext};
use crate::handoff;
use crate::role::Role;
use crate::watchdog::Watchdog;

const PROGRESS_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Constructing,
    Running,
    Stalled,
    Terminating,
    Exit,
    Fatal,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Phase::Idle => "idle",
            Phase::Constructing => "constructing",
            Phase::Running => "running",
            Phase::Stalled => "stalled",
            Phase::Terminating => "terminating",
            Phase::Exit => "exit",
            Phase::Fatal => "fatal",
        };
        f.write_str(s)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("{role} exceeded its reconstruction bound ({attempts} attempts)")]
    ReconstructBoundExceeded { role: Role, attempts: u32 },
    #[error("handoff error: {0}")]
    Handoff(#[from] crate::handoff::HandoffError),
    #[error("graph error: {0}")]
    Graph(#[from] crate::graph::GraphError),
}

pub struct StateMachine<B: GraphBuilder> {
    ctx: RoleContext,
    handoff_dir: std::path::PathBuf,
    builder: B,
    phase: Phase,
    attempts: u32,
}

impl<B: GraphBuilder> StateMachine<B> {
    #[must_use]
    pub fn new(ctx: RoleContext, handoff_dir: std::path::PathBuf, builder: B) -> Self {
        Self {
            ctx,
            handoff_dir,
            builder,
            phase: Phase::Idle,
            attempts: 0,
        }
    }

    fn transition(&mut self, to: Phase) {
        info!(channel = %self.ctx.channel, role = %self.ctx.role, from = %self.phase, to = %to, "phase transition");
        self.phase = to;
    }

    /// Drives the machine to completion, listening for `shutdown` to move
    /// straight from `Running` to `Terminating`.
    pub async fn run(mut self, mut shutdown: tokio::sync::watch::Receiver<bool>) -> Result<(), RunError> {
        self.transition(Phase::Constructing);

        loop {
            match self.phase {
                Phase::Constructing => self.do_construct().await?,
                Phase::Running => self.do_run(&mut shutdown).await?,
                Phase::Stalled => self.do_stalled().await?,
                Phase::Terminating => self.do_terminate().await,
                Phase::Exit => return Ok(()),
                Phase::Fatal => {
                    return Err(RunError::ReconstructBoundExceeded {
                        role: self.ctx.role,
                        attempts: self.attempts,
                    })
                }
                Phase::Idle => unreachable!("run() always starts by transitioning out of Idle"),
            }
        }
    }

    async fn do_construct(&mut self) -> Result<(), RunError> {
        if let Role::Transcoder | Role::Output(_) = self.ctx.role {
            let upstream_role = if self.ctx.role == Role::Transcoder { Role::Input } else { handoff::output_upstream(&self.handoff_dir) };
            let descriptor = handoff::await_upstream(&self.handoff_dir, upstream_role).await?;
            self.ctx.upstream = Some(descriptor);
        }

        let published = self.builder.construct(&self.ctx).await?;
        if let Some(descriptor) = published {
            handoff::publish(&self.handoff_dir, self.ctx.role, &descriptor)?;
        }

        self.transition(Phase::Running);
        Ok(())
    }

    async fn do_run(&mut self, shutdown: &mut tokio::sync::watch::Receiver<bool>) -> Result<(), RunError> {
        let mut watchdog = Watchdog::start();

        loop {
            tokio::select! {
                _ = tokio::time::sleep(PROGRESS_POLL_INTERVAL) => {
                    match self.builder.poll_progress().await {
                        Progress::Advanced => watchdog.record_progress(),
                        Progress::Stalled => {}
                    }
                    if watchdog.has_stalled() {
                        warn!(channel = %self.ctx.channel, role = %self.ctx.role, "no progress within watchdog window");
                        self.transition(Phase::Stalled);
                        return Ok(());
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_ok() && *shutdown.borrow() {
                        self.transition(Phase::Terminating);
                        return Ok(());
                    }
                }
            }
        }
    }

    async fn do_stalled(&mut self) -> Result<(), RunError> {
        self.builder.teardown().await;
        handoff::retract(&self.handoff_dir, self.ctx.role);

        self.attempts += 1;
        let bound = self.ctx.role.max_reconstruct_attempts();
        if self.attempts > bound {
            error!(channel = %self.ctx.channel, role = %self.ctx.role, attempts = self.attempts, bound, "reconstruction bound exceeded");
            self.transition(Phase::Fatal);
            return Ok(());
        }

        self.transition(Phase::Constructing);
        Ok(())
    }

    async fn do_terminate(&mut self) {
        self.builder.teardown().await;
        handoff::retract(&self.handoff_dir, self.ctx.role);
        self.transition(Phase::Exit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphError;
    use streamcore::model::{HandoffDescriptor, HandoffExtended};

    #[derive(Default)]
    struct NoopGraphBuilder;

    #[async_trait::async_trait]
    impl GraphBuilder for NoopGraphBuilder {
        async fn construct(&mut self, ctx: &RoleContext) -> Result<Option<HandoffDescriptor>, GraphError> {
            match ctx.role {
                Role::Output(_) => Ok(None),
                _ => Ok(Some(HandoffDescriptor {
                    codec: "passthrough".to_string(),
                    program_number: 1,
                    video_stream_id: None,
                    audio_stream_id: None,
                    extended: HandoffExtended::default(),
                })),
            }
        }

        async fn poll_progress(&mut self) -> Progress {
            Progress::Advanced
        }

        async fn teardown(&mut self) {}
    }

    fn ctx(role: Role) -> RoleContext {
        RoleContext {
            channel: "news".to_string(),
            role,
            source_index: 0,
            log_dir: std::env::temp_dir(),
            upstream: None,
            output_options: std::collections::BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn construct_publishes_input_descriptor_and_moves_to_running() {
        let dir = tempfile::tempdir().unwrap();
        let mut machine = StateMachine::new(ctx(Role::Input), dir.path().to_path_buf(), NoopGraphBuilder);

        machine.do_construct().await.unwrap();

        assert_eq!(machine.phase, Phase::Running);
        assert!(handoff::is_ready(dir.path(), Role::Input));
    }

    #[tokio::test]
    async fn stalled_retries_until_bound_then_goes_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut machine = StateMachine::new(ctx(Role::Output(0)), dir.path().to_path_buf(), NoopGraphBuilder);
        let bound = Role::Output(0).max_reconstruct_attempts();

        for _ in 0..bound {
            machine.do_stalled().await.unwrap();
            assert_eq!(machine.phase, Phase::Constructing);
        }

        machine.do_stalled().await.unwrap();
        assert_eq!(machine.phase, Phase::Fatal);
        assert_eq!(machine.attempts, bound + 1);
    }

    #[tokio::test]
    async fn terminate_retracts_handoff_and_exits() {
        let dir = tempfile::tempdir().unwrap();
        let mut machine = StateMachine::new(ctx(Role::Input), dir.path().to_path_buf(), NoopGraphBuilder);
        machine.do_construct().await.unwrap();
        assert!(handoff::is_ready(dir.path(), Role::Input));

        machine.do_terminate().await;

        assert_eq!(machine.phase, Phase::Exit);
        assert!(!handoff::is_ready(dir.path(), Role::Input));
    }
}
