//! Frame loop that drives one router.
//!
//! The host owns the I/O the router refuses to do. Each frame it drains the
//! transport into the router, ticks it, and executes the actions that come
//! back: sends go to the transport, session logs to the [`LogWriter`], and
//! everything a UI would render is forwarded on the actions channel.
//!
//! Local commands (opening apps, pointer input, app input) arrive on the
//! command channel returned by [`Host::new`]. Dropping that sender stops the
//! host after pending logs are flushed.

use std::time::Duration;

use tandem_core::{AppRegistry, Environment, Router, SessionAction, SessionEvent};
use tokio::{
    sync::mpsc,
    time::{self, MissedTickBehavior},
};
use tracing::{debug, info, warn};

use crate::{
    config::NodeConfig,
    error::{NodeError, Result},
    log_writer::LogWriter,
    transport::Transport,
};

/// Sender half for local commands.
pub type CommandSender<E> = mpsc::UnboundedSender<SessionEvent<<E as Environment>::Instant>>;

/// Receiver half for actions the host does not execute itself.
pub type ActionReceiver = mpsc::UnboundedReceiver<SessionAction>;

/// Runs a [`Router`] against a [`Transport`] at a fixed frame rate.
pub struct Host<T, E>
where
    T: Transport,
    E: Environment,
{
    router: Router<E>,
    transport: T,
    env: E,
    logs: LogWriter,
    commands: mpsc::UnboundedReceiver<SessionEvent<E::Instant>>,
    actions: mpsc::UnboundedSender<SessionAction>,
    frame: Duration,
}

impl<T, E> Host<T, E>
where
    T: Transport,
    E: Environment,
{
    /// Build a host and the channels to talk to it.
    ///
    /// # Errors
    ///
    /// - `NodeError::Session` if the router rejects the configuration
    pub fn new(
        env: E,
        transport: T,
        config: NodeConfig,
        registry: AppRegistry,
    ) -> Result<(Self, CommandSender<E>, ActionReceiver)> {
        let role = config.session.role;
        let frame = config.frame_interval();
        let router = Router::new(env.clone(), config.session, registry)?;
        let (command_tx, commands) = mpsc::unbounded_channel();
        let (actions, action_rx) = mpsc::unbounded_channel();

        let host = Self {
            router,
            transport,
            env,
            logs: LogWriter::new(config.log_dir, role),
            commands,
            actions,
            frame,
        };
        Ok((host, command_tx, action_rx))
    }

    /// Router being driven.
    pub fn router(&self) -> &Router<E> {
        &self.router
    }

    /// Run until the command sender is dropped.
    ///
    /// # Errors
    ///
    /// - `NodeError::Session` when the session halts on a protocol violation
    /// - Transport errors from the initial connect
    pub async fn run(mut self) -> Result<()> {
        info!(role = ?self.router.role(), frame = ?self.frame, "host started");
        self.transport.connect().await?;

        let mut frames = time::interval(self.frame);
        frames.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let outcome = loop {
            tokio::select! {
                _ = frames.tick() => {
                    if let Err(error) = self.process_cycle().await {
                        break Err(error);
                    }
                },
                command = self.commands.recv() => {
                    let Some(event) = command else {
                        break Ok(());
                    };
                    if let Err(error) = self.dispatch(event).await {
                        break Err(error);
                    }
                },
            }
        };

        let written = self.logs.flush().await;
        info!(role = ?self.router.role(), logs = written.len(), "host stopped");
        outcome
    }

    /// One frame: everything the transport has, then a tick.
    async fn process_cycle(&mut self) -> Result<()> {
        while let Some(event) = self.transport.poll_event() {
            self.dispatch(event.into_session_event()).await?;
        }
        let now = self.env.now();
        self.dispatch(SessionEvent::Tick { now }).await
    }

    async fn dispatch(&mut self, event: SessionEvent<E::Instant>) -> Result<()> {
        match self.router.handle(event) {
            Ok(actions) => {
                for action in actions {
                    self.execute(action).await?;
                }
                Ok(())
            },
            Err(error) if error.is_fatal() => Err(NodeError::Session(error)),
            Err(error) => {
                debug!(%error, "command not applied");
                Ok(())
            },
        }
    }

    async fn execute(&mut self, action: SessionAction) -> Result<()> {
        match action {
            SessionAction::Send(bytes) => {
                if let Err(error) = self.transport.send(bytes).await {
                    warn!(%error, "message not sent");
                }
            },
            SessionAction::Connect => self.transport.connect().await?,
            SessionAction::PersistLog { app_name, contents, .. } => {
                self.logs.persist(&app_name, contents);
            },
            other => {
                // UI side may be gone; the session keeps running regardless.
                let _ = self.actions.send(other);
            },
        }
        Ok(())
    }
}

impl<T, E> std::fmt::Debug for Host<T, E>
where
    T: Transport,
    E: Environment,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Host")
            .field("role", &self.router.role())
            .field("frame", &self.frame)
            .field("pending_logs", &self.logs.pending())
            .finish_non_exhaustive()
    }
}
