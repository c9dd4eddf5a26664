//! Session router.
//!
//! Owns everything one peer knows about the session: role, registry, active
//! app, lockstep RNG, timers and overlays. The host feeds it
//! [`SessionEvent`]s and executes the returned [`SessionAction`]s.
//!
//! # Message flow
//!
//! Every broadcast is sent to the peer and, with local echo on, queued back
//! into our own inbound queue. Both peers therefore apply the same message
//! through the same code path: an `Open` issued by the therapist shows the app
//! on the therapist because it was echoed, and on the patient because it
//! arrived. Each `handle` drains the inbound queue in arrival order before it
//! returns.
//!
//! # Failure
//!
//! Protocol-invariant violations are fatal. The router logs the diagnostic,
//! drops pending output and refuses every later event with
//! [`SessionError::Halted`]. A local command the role may not issue
//! ([`SessionError::NotPermitted`]) is reported but does not halt.

use std::{collections::VecDeque, time::Duration};

use bytes::Bytes;
use tandem_proto::{
    AppId, Message, MessageHeader, PointerMessage, ProtocolKind, Role, SketchMessage, SystemAction,
    SystemMessage,
};
use tracing::{debug, error, info, warn};

use crate::{
    app::{AppContext, AppInput, AppRegistry, AppRequest, AppTimer, Lifecycle, MiniApp},
    config::SessionConfig,
    env::Environment,
    error::{AppError, SessionError},
    event::{ConnectionStatus, SessionAction, SessionEvent},
    pointer::{CursorShare, IndicatorFade},
    rng::LockstepRng,
    scheduler::{Debounced, Debouncer, Fired, Owner, Scheduler},
    sketch::SketchBoard,
};

/// Payload of the router's delayed actions.
#[derive(Debug, Clone, PartialEq)]
enum SessionTimer {
    /// Timer requested by an app.
    App { app_id: AppId, timer: AppTimer },
    /// Local echo held back by `echo_delay`.
    Echo(Bytes),
    /// Patient reconnect attempt.
    Reconnect,
    /// Next step of a click-indicator animation.
    Indicator(IndicatorFade),
}

/// One peer's side of a session.
pub struct Router<E: Environment> {
    env: E,
    config: SessionConfig,
    registry: AppRegistry,
    active_app: Option<AppId>,
    random_seed: u32,
    rng: LockstepRng,
    connected: bool,
    scheduler: Scheduler<E::Instant, SessionTimer>,
    debouncer: Debouncer<String>,
    inbound: VecDeque<Bytes>,
    actions: Vec<SessionAction>,
    sketch: SketchBoard,
    cursor: CursorShare,
    next_indicator: u64,
    local_flipped: bool,
    remote_flipped: bool,
    next_instance: u64,
    halted: Option<String>,
}

impl<E: Environment> std::fmt::Debug for Router<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("role", &self.config.role)
            .field("active_app", &self.active_app)
            .field("random_seed", &self.random_seed)
            .field("draws", &self.rng.draw_count())
            .field("connected", &self.connected)
            .field("halted", &self.halted)
            .finish_non_exhaustive()
    }
}

impl<E: Environment> Router<E> {
    /// Create a router for `config.role`.
    ///
    /// The therapist is authoritative for randomness: it picks the session
    /// seed from the environment and builds its apps right away. The patient
    /// waits for `Login` to do both.
    ///
    /// # Errors
    ///
    /// - `SessionError::UnassignedRole` if the role is `Unassigned`
    pub fn new(
        env: E,
        config: SessionConfig,
        mut registry: AppRegistry,
    ) -> Result<Self, SessionError> {
        let random_seed = match config.role {
            Role::Therapist => {
                registry.build();
                env.random_u32()
            },
            Role::Patient => 0,
            Role::Unassigned => return Err(SessionError::UnassignedRole),
        };
        let cursor = CursorShare::new(config.cursor_frame_threshold);

        Ok(Self {
            env,
            config,
            registry,
            active_app: None,
            random_seed,
            rng: LockstepRng::new(random_seed),
            connected: false,
            scheduler: Scheduler::new(),
            debouncer: Debouncer::new(),
            inbound: VecDeque::new(),
            actions: Vec::new(),
            sketch: SketchBoard::new(),
            cursor,
            next_indicator: 0,
            local_flipped: false,
            remote_flipped: false,
            next_instance: 0,
            halted: None,
        })
    }

    /// Process one event and return the actions it produced.
    ///
    /// # Errors
    ///
    /// - Any fatal [`SessionError`]; the router is halted afterwards
    /// - `SessionError::NotPermitted` for a local command this role cannot
    ///   issue (not fatal)
    /// - `SessionError::Halted` once halted
    pub fn handle(
        &mut self,
        event: SessionEvent<E::Instant>,
    ) -> Result<Vec<SessionAction>, SessionError> {
        if let Some(cause) = &self.halted {
            return Err(SessionError::Halted { cause: cause.clone() });
        }

        let result = self.dispatch(event).and_then(|()| self.drain_inbound());
        match result {
            Ok(()) => Ok(std::mem::take(&mut self.actions)),
            Err(err) if err.is_fatal() => {
                error!(role = ?self.config.role, error = %err, "session halted");
                self.halted = Some(err.to_string());
                self.actions.clear();
                self.inbound.clear();
                Err(err)
            },
            Err(err) => {
                warn!(role = ?self.config.role, error = %err, "command rejected");
                Err(err)
            },
        }
    }

    fn dispatch(&mut self, event: SessionEvent<E::Instant>) -> Result<(), SessionError> {
        match event {
            SessionEvent::Tick { now } => self.tick(now),
            SessionEvent::MessageReceived(bytes) => {
                self.inbound.push_back(bytes);
                Ok(())
            },
            SessionEvent::Connected => self.on_connected(),
            SessionEvent::Disconnected { reason } => self.on_disconnected(reason),
            SessionEvent::ConnectFailed { reason } => self.on_connect_failed(reason),
            SessionEvent::OpenApp { app_id, seed } => self.open_app(app_id, seed),
            SessionEvent::CloseApp => self.close_app(),
            SessionEvent::FlipLocalVideo => self.flip_video(SystemAction::FlipTherapistVideo),
            SessionEvent::FlipRemoteVideo => self.flip_video(SystemAction::FlipPatientVideo),
            SessionEvent::ToggleCursorSharing => self.toggle_cursor(),
            SessionEvent::PointerMoved { x, y } => {
                if self.cursor.moved(x, y) {
                    self.send_body(ProtocolKind::Cursor, 0, &PointerMessage::at(x, y), true)?;
                }
                Ok(())
            },
            SessionEvent::PointerClicked { x, y } => {
                let sketching = self.sketch.is_enabled();
                if self.connected && self.config.role == Role::Patient && !sketching {
                    let pointer = PointerMessage::at(x, y);
                    self.send_body(ProtocolKind::MouseIndicator, 0, &pointer, true)?;
                }
                Ok(())
            },
            SessionEvent::SendSketch(sketch) => {
                let app_id = self.active_app.unwrap_or_default();
                self.send_body(ProtocolKind::Sketch, app_id, &sketch, true)
            },
            SessionEvent::AppInput(input) => self.app_input(input),
        }
    }

    fn tick(&mut self, now: E::Instant) -> Result<(), SessionError> {
        for fired in self.scheduler.tick(now) {
            self.fire(fired)?;
        }
        self.drain_inbound()?;
        if let Some(app_id) = self.active_app {
            self.call_app(app_id, |app, ctx| app.on_tick(ctx))?;
        }
        self.cursor.tick();
        Ok(())
    }

    fn drain_inbound(&mut self) -> Result<(), SessionError> {
        while let Some(bytes) = self.inbound.pop_front() {
            self.process(&bytes)?;
        }
        Ok(())
    }

    fn process(&mut self, bytes: &[u8]) -> Result<(), SessionError> {
        let message = Message::decode(bytes)?;
        let header = message.header;
        debug!(
            role = ?self.config.role,
            protocol = ?header.protocol,
            sender = ?header.sender,
            app_id = header.app_id,
            "processing message"
        );

        match header.protocol {
            ProtocolKind::System => {
                let system: SystemMessage = message.decode_body()?;
                self.on_system(header, system)
            },
            ProtocolKind::Restore => self.on_restore(&message),
            ProtocolKind::App => match self.active_app {
                Some(active) if active == header.app_id => {
                    self.call_app(active, |app, ctx| app.on_message(ctx, &message))
                },
                _ => {
                    let active = self.active_app;
                    debug!(app_id = header.app_id, ?active, "dropping app message");
                    Ok(())
                },
            },
            ProtocolKind::AppParams => match self.active_app {
                Some(active) if active == header.app_id => {
                    self.call_app(active, |app, ctx| app.on_params(ctx, &message))
                },
                _ => {
                    let active = self.active_app;
                    debug!(app_id = header.app_id, ?active, "dropping app params");
                    Ok(())
                },
            },
            ProtocolKind::Sketch => {
                let sketch: SketchMessage = message.decode_body()?;
                self.sketch.apply(header.sender, self.config.role, &sketch)?;
                self.actions.push(SessionAction::SketchChanged { sender: header.sender });
                Ok(())
            },
            ProtocolKind::MouseIndicator => {
                let pointer: PointerMessage = message.decode_body()?;
                if header.sender == Role::Patient {
                    self.actions.push(SessionAction::PlayClickSound);
                }
                let fade = IndicatorFade::new(self.next_indicator, pointer.x, pointer.y);
                self.next_indicator += 1;
                self.step_indicator(fade);
                Ok(())
            },
            ProtocolKind::Cursor => {
                let pointer: PointerMessage = message.decode_body()?;
                let shown = (!pointer.is_hidden()).then_some(pointer);
                self.actions.push(SessionAction::Cursor(shown));
                Ok(())
            },
            ProtocolKind::Audio => Err(SessionError::UnsupportedProtocol(ProtocolKind::Audio)),
        }
    }

    fn on_system(
        &mut self,
        header: MessageHeader,
        system: SystemMessage,
    ) -> Result<(), SessionError> {
        match system.action {
            SystemAction::Open => {
                self.close_active()?;
                self.rng.set_seed(system.random_seed);
                self.random_seed = system.random_seed;
                self.show_app(system.app_id)
            },
            SystemAction::Close => self.close_active(),
            SystemAction::HandShake => {
                let Some(active) = self.active_app else {
                    return Err(SessionError::HandshakeWithoutApp { app_id: system.app_id });
                };
                if active != system.app_id {
                    let actual = system.app_id;
                    return Err(SessionError::HandshakeMismatch { expected: active, actual });
                }
                self.call_app(active, |app, ctx| app.on_client_ready(ctx))
            },
            SystemAction::Login => {
                if header.sender != Role::Therapist {
                    let sender = header.sender;
                    return Err(SessionError::RoleViolation { action: SystemAction::Login, sender });
                }
                self.random_seed = system.random_seed;
                if !self.registry.is_built() {
                    self.registry.build();
                    self.rng.set_seed(system.random_seed);
                    info!(seed = system.random_seed, apps = self.registry.len(), "logged in");
                }
                Ok(())
            },
            SystemAction::FlipTherapistVideo | SystemAction::FlipPatientVideo => {
                let named = if system.action == SystemAction::FlipTherapistVideo {
                    Role::Therapist
                } else {
                    Role::Patient
                };
                if named == self.config.role {
                    self.local_flipped = !self.local_flipped;
                } else {
                    self.remote_flipped = !self.remote_flipped;
                }
                self.push_orientation();
                Ok(())
            },
        }
    }

    fn on_restore(&mut self, message: &Message) -> Result<(), SessionError> {
        let header = message.header;
        if header.sender != Role::Therapist || self.config.role != Role::Patient {
            debug!(sender = ?header.sender, "ignoring restore");
            return Ok(());
        }

        let target = header.app_id;
        if self.active_app != Some(target) {
            self.close_active()?;
            self.show_app(target)?;
        }
        info!(app_id = target, "restoring app state");
        self.call_app(target, |app, ctx| app.on_restore_state(ctx, message))
    }

    fn show_app(&mut self, app_id: AppId) -> Result<(), SessionError> {
        if !self.registry.is_built() {
            return Err(SessionError::RegistryNotLoaded { app_id });
        }
        match self.active_app {
            Some(active) if active == app_id => return Ok(()),
            Some(active) => {
                return Err(SessionError::AppAlreadyActive { active, requested: app_id });
            },
            None => {},
        }

        self.next_instance += 1;
        let instance_id = self.next_instance;
        let wall_secs = self.env.wall_clock_secs();
        let slot = self.slot_mut(app_id)?;
        slot.begin_show(instance_id, wall_secs)?;
        let first_show = slot.state() == Lifecycle::Unloaded;

        self.active_app = Some(app_id);
        if first_show {
            self.call_app(app_id, |app, ctx| app.on_load(ctx))?;
            self.slot_mut(app_id)?.mark_loaded()?;
        }
        self.slot_mut(app_id)?.mark_shown()?;
        self.call_app(app_id, |app, ctx| app.on_show(ctx))?;

        info!(role = ?self.config.role, app_id, instance_id, "app shown");
        self.actions.push(SessionAction::AppShown { app_id, instance_id });

        if self.config.role == Role::Patient {
            let handshake = SystemMessage::handshake(app_id).into_message(self.config.role)?;
            self.send(&handshake, false);
        }
        Ok(())
    }

    fn close_active(&mut self) -> Result<(), SessionError> {
        let Some(app_id) = self.active_app else {
            return Ok(());
        };

        self.slot_mut(app_id)?.mark_hidden()?;
        self.call_app(app_id, |app, ctx| app.on_hide(ctx))?;
        let dropped = self.scheduler.cancel_all(Owner::App(app_id));
        self.active_app = None;

        let slot = self.slot_mut(app_id)?;
        let app_name = slot.name().to_owned();
        let contents = slot.log().render();
        info!(role = ?self.config.role, app_id, dropped_timers = dropped, "app hidden");

        self.actions.push(SessionAction::PersistLog { app_id, app_name, contents });
        self.actions.push(SessionAction::AppHidden { app_id });
        Ok(())
    }

    /// Run one app callback with a fresh context, then execute whatever the
    /// app requested.
    fn call_app<F>(&mut self, app_id: AppId, callback: F) -> Result<(), SessionError>
    where
        F: FnOnce(&mut dyn MiniApp, &mut AppContext<'_>) -> Result<(), AppError>,
    {
        let role = self.config.role;
        let wall_secs = self.env.wall_clock_secs();
        let registered = self.registry.len();
        let mut requests = Vec::new();

        let Some(slot) = self.registry.slot_mut(app_id) else {
            return Err(SessionError::UnknownApp { app_id, registered });
        };
        let instance_id = slot.instance_id();
        let (app, log) = slot.parts_mut();
        let mut ctx = AppContext::new(
            role,
            app_id,
            instance_id,
            wall_secs,
            &mut self.rng,
            log,
            &mut requests,
        );
        callback(app, &mut ctx).map_err(|source| SessionError::App { app_id, source })?;

        self.apply_requests(app_id, requests)
    }

    fn apply_requests(
        &mut self,
        app_id: AppId,
        requests: Vec<AppRequest>,
    ) -> Result<(), SessionError> {
        for request in requests {
            match request {
                AppRequest::Send(body) => {
                    let header = MessageHeader::new(ProtocolKind::App, self.config.role, app_id);
                    self.send(&Message::new(header, body), true);
                },
                AppRequest::Open { name, params } => self.open_by_name(&name, params)?,
                AppRequest::Schedule { delay, token } => {
                    let timer = SessionTimer::App { app_id, timer: AppTimer::Token(token) };
                    self.scheduler.schedule(self.env.now(), delay, Owner::App(app_id), timer);
                },
                AppRequest::Debounce { key, delay } => self.debounce(app_id, key, delay)?,
                AppRequest::CancelTimers => {
                    self.scheduler.cancel_all(Owner::App(app_id));
                },
            }
        }
        Ok(())
    }

    /// Debounce a commit for `key`, running a flushed commit of another key
    /// before the new one is scheduled.
    fn debounce(
        &mut self,
        app_id: AppId,
        key: String,
        delay: Duration,
    ) -> Result<(), SessionError> {
        let commit = AppTimer::Commit { key: key.clone() };
        let mut timer = SessionTimer::App { app_id, timer: commit };
        loop {
            let now = self.env.now();
            let owner = Owner::App(app_id);
            let outcome =
                self.debouncer.debounce(&mut self.scheduler, now, key.clone(), delay, owner, timer);
            match outcome {
                Debounced::Flushed { flushed, context } => {
                    self.fire(flushed)?;
                    timer = context;
                },
                Debounced::Scheduled(_) | Debounced::Reset(_) => return Ok(()),
            }
        }
    }

    fn open_by_name(&mut self, name: &str, params: Option<Bytes>) -> Result<(), SessionError> {
        if self.config.role != Role::Therapist {
            debug!(app = name, "open request ignored on patient");
            return Ok(());
        }
        let app_id =
            self.registry.find(name).ok_or_else(|| SessionError::UnknownAppName(name.to_owned()))?;

        let seed = self.env.random_u32();
        let open = SystemMessage::open(app_id, seed).into_message(self.config.role)?;
        self.send(&open, true);

        if let Some(params) = params {
            let header = MessageHeader::new(ProtocolKind::AppParams, self.config.role, app_id);
            self.send(&Message::new(header, params), true);
        }
        Ok(())
    }

    fn fire(&mut self, fired: Fired<SessionTimer>) -> Result<(), SessionError> {
        match fired.context {
            SessionTimer::App { app_id, timer } => {
                if self.active_app == Some(app_id) {
                    self.call_app(app_id, |app, ctx| app.on_timer(ctx, timer))?;
                } else {
                    debug!(app_id, ?timer, "timer for inactive app dropped");
                }
            },
            SessionTimer::Echo(bytes) => self.inbound.push_back(bytes),
            SessionTimer::Reconnect => self.actions.push(SessionAction::Connect),
            SessionTimer::Indicator(fade) => self.step_indicator(fade),
        }
        Ok(())
    }

    fn step_indicator(&mut self, mut fade: IndicatorFade) {
        match fade.advance() {
            Some(frame) => {
                self.actions.push(SessionAction::Indicator(frame));
                self.scheduler.schedule(
                    self.env.now(),
                    IndicatorFade::STEP_INTERVAL,
                    Owner::Session,
                    SessionTimer::Indicator(fade),
                );
            },
            None => self.actions.push(SessionAction::IndicatorDone { id: fade.id() }),
        }
    }

    fn on_connected(&mut self) -> Result<(), SessionError> {
        self.connected = true;
        info!(role = ?self.config.role, "peer connected");
        self.actions.push(SessionAction::Status(ConnectionStatus::Connected));

        if self.config.role == Role::Therapist {
            let login = SystemMessage::login(self.random_seed).into_message(self.config.role)?;
            self.send(&login, false);
            self.send_restore()?;
        }
        Ok(())
    }

    fn send_restore(&mut self) -> Result<(), SessionError> {
        let Some(app_id) = self.active_app else {
            return Ok(());
        };
        let registered = self.registry.len();
        let slot =
            self.registry.slot(app_id).ok_or(SessionError::UnknownApp { app_id, registered })?;
        let state =
            slot.app().restore_state().map_err(|source| SessionError::App { app_id, source })?;

        if let Some(body) = state {
            debug!(app_id, bytes = body.len(), "sending restore state");
            let header = MessageHeader::new(ProtocolKind::Restore, self.config.role, app_id);
            self.send(&Message::new(header, body), false);
        }
        Ok(())
    }

    fn on_disconnected(&mut self, reason: String) -> Result<(), SessionError> {
        info!(role = ?self.config.role, %reason, "peer disconnected");
        self.connected = false;

        if let Some(app_id) = self.active_app {
            self.call_app(app_id, |app, ctx| app.on_disconnect(ctx))?;
            if self.config.role == Role::Patient {
                self.close_active()?;
            }
        }

        let dropped = self.scheduler.cancel_all(Owner::Session);
        debug!(dropped, "session timers cancelled");
        self.actions.push(SessionAction::Status(ConnectionStatus::Disconnected { reason }));
        self.actions.push(SessionAction::Connect);
        Ok(())
    }

    fn on_connect_failed(&mut self, reason: String) -> Result<(), SessionError> {
        match self.config.role {
            Role::Patient => {
                let after = self.config.retry_delay;
                warn!(%reason, ?after, "connection failed, retrying");
                let now = self.env.now();
                self.scheduler.schedule(now, after, Owner::Session, SessionTimer::Reconnect);
                let status = ConnectionStatus::Retrying { reason, after };
                self.actions.push(SessionAction::Status(status));
                Ok(())
            },
            Role::Therapist | Role::Unassigned => Err(SessionError::ListenFailed { reason }),
        }
    }

    fn open_app(&mut self, app_id: AppId, seed: Option<u32>) -> Result<(), SessionError> {
        self.require_therapist("open app")?;
        let registered = self.registry.len();
        if usize::from(app_id) >= registered {
            return Err(SessionError::UnknownApp { app_id, registered });
        }

        let seed = seed.unwrap_or_else(|| self.env.random_u32());
        let open = SystemMessage::open(app_id, seed).into_message(self.config.role)?;
        self.send(&open, true);
        Ok(())
    }

    fn close_app(&mut self) -> Result<(), SessionError> {
        match self.active_app {
            Some(app_id) => {
                let close = SystemMessage::close(app_id).into_message(self.config.role)?;
                self.send(&close, true);
            },
            None => debug!("close requested with no active app"),
        }
        Ok(())
    }

    fn flip_video(&mut self, action: SystemAction) -> Result<(), SessionError> {
        self.require_therapist("flip video")?;
        if action == SystemAction::FlipTherapistVideo {
            self.local_flipped = !self.local_flipped;
        } else {
            self.remote_flipped = !self.remote_flipped;
        }
        let flip = SystemMessage::flip(action).into_message(self.config.role)?;
        self.send(&flip, false);
        self.push_orientation();
        Ok(())
    }

    fn toggle_cursor(&mut self) -> Result<(), SessionError> {
        self.require_therapist("share cursor")?;
        if !self.cursor.toggle() {
            self.send_body(ProtocolKind::Cursor, 0, &PointerMessage::HIDDEN, true)?;
        }
        Ok(())
    }

    fn app_input(&mut self, input: AppInput) -> Result<(), SessionError> {
        match self.active_app {
            Some(app_id) => self.call_app(app_id, |app, ctx| app.on_input(ctx, input)),
            None => {
                debug!(?input, "input with no active app");
                Ok(())
            },
        }
    }

    fn require_therapist(&self, operation: &'static str) -> Result<(), SessionError> {
        if self.config.role == Role::Therapist {
            Ok(())
        } else {
            Err(SessionError::NotPermitted { operation, role: self.config.role })
        }
    }

    fn push_orientation(&mut self) {
        self.actions.push(SessionAction::VideoOrientation {
            local_flipped: self.local_flipped,
            remote_flipped: self.remote_flipped,
        });
    }

    fn send_body<T: serde::Serialize>(
        &mut self,
        protocol: ProtocolKind,
        app_id: AppId,
        body: &T,
        echo: bool,
    ) -> Result<(), SessionError> {
        let header = MessageHeader::new(protocol, self.config.role, app_id);
        let message = Message::with_body(header, body)?;
        self.send(&message, echo);
        Ok(())
    }

    /// Emit `message` for the peer and, if `echo`, loop it back locally.
    fn send(&mut self, message: &Message, echo: bool) {
        let bytes = message.to_bytes();
        self.actions.push(SessionAction::Send(bytes.clone()));

        if !echo || !self.config.local_echo {
            return;
        }
        if self.config.echo_delay.is_zero() {
            self.inbound.push_back(bytes);
        } else {
            self.scheduler.schedule(
                self.env.now(),
                self.config.echo_delay,
                Owner::Loopback,
                SessionTimer::Echo(bytes),
            );
        }
    }

    fn slot_mut(&mut self, app_id: AppId) -> Result<&mut crate::app::AppSlot, SessionError> {
        let registered = self.registry.len();
        self.registry.slot_mut(app_id).ok_or(SessionError::UnknownApp { app_id, registered })
    }

    /// Local role.
    pub fn role(&self) -> Role {
        self.config.role
    }

    /// Session configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Currently shown app.
    pub fn active_app(&self) -> Option<AppId> {
        self.active_app
    }

    /// Seed of the current app (or the login seed before any app opened).
    pub fn random_seed(&self) -> u32 {
        self.random_seed
    }

    /// Lockstep draws made since the last reseed.
    pub fn draw_count(&self) -> u64 {
        self.rng.draw_count()
    }

    /// Whether the transport is connected.
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Cause of the fatal error that halted the router.
    pub fn halted(&self) -> Option<&str> {
        self.halted.as_deref()
    }

    /// App registry.
    pub fn registry(&self) -> &AppRegistry {
        &self.registry
    }

    /// Lifecycle state of `app_id`, once the registry is built.
    pub fn lifecycle(&self, app_id: AppId) -> Option<Lifecycle> {
        self.registry.slot(app_id).map(crate::app::AppSlot::state)
    }

    /// Sketch board.
    pub fn sketch(&self) -> &SketchBoard {
        &self.sketch
    }

    /// `(local, remote)` video mirroring flags.
    pub fn video_flipped(&self) -> (bool, bool) {
        (self.local_flipped, self.remote_flipped)
    }

    /// Whether the local cursor is being shared.
    pub fn is_sharing_cursor(&self) -> bool {
        self.cursor.is_enabled()
    }

    /// Restore snapshot the active app would send right now.
    ///
    /// # Errors
    ///
    /// - `SessionError::App` if the app fails to produce it
    pub fn restore_state(&self) -> Result<Option<Bytes>, SessionError> {
        let Some(app_id) = self.active_app else {
            return Ok(None);
        };
        match self.registry.slot(app_id) {
            Some(slot) => {
                slot.app().restore_state().map_err(|source| SessionError::App { app_id, source })
            },
            None => Ok(None),
        }
    }

    /// Number of pending delayed actions.
    pub fn pending_timers(&self) -> usize {
        self.scheduler.len()
    }

    /// Earliest pending timer deadline, for hosts that sleep between frames.
    pub fn next_deadline(&self) -> Option<E::Instant> {
        self.scheduler.next_deadline()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        future::Future,
        sync::{
            Arc, Mutex,
            atomic::{AtomicU64, Ordering},
        },
        time::Duration,
    };

    use super::*;

    /// Manual clock; `Duration` since start doubles as the instant type.
    #[derive(Clone, Default)]
    struct TestEnv {
        millis: Arc<AtomicU64>,
    }

    impl TestEnv {
        fn advance(&self, ms: u64) -> Duration {
            Duration::from_millis(self.millis.fetch_add(ms, Ordering::SeqCst) + ms)
        }
    }

    impl Environment for TestEnv {
        type Instant = Duration;

        fn now(&self) -> Duration {
            Duration::from_millis(self.millis.load(Ordering::SeqCst))
        }

        fn sleep(&self, _duration: Duration) -> impl Future<Output = ()> + Send {
            std::future::ready(())
        }

        fn random_bytes(&self, buffer: &mut [u8]) {
            buffer.fill(7);
        }

        fn wall_clock_secs(&self) -> u64 {
            45_296
        }
    }

    type Calls = Arc<Mutex<Vec<String>>>;

    /// Records every callback.
    struct Recorder {
        name: &'static str,
        calls: Calls,
    }

    impl Recorder {
        fn record(&self, what: &str) {
            self.calls.lock().unwrap().push(format!("{}:{what}", self.name));
        }
    }

    impl MiniApp for Recorder {
        fn on_load(&mut self, _ctx: &mut AppContext<'_>) -> Result<(), AppError> {
            self.record("load");
            Ok(())
        }

        fn on_show(&mut self, ctx: &mut AppContext<'_>) -> Result<(), AppError> {
            self.record("show");
            ctx.log("shown");
            Ok(())
        }

        fn on_hide(&mut self, _ctx: &mut AppContext<'_>) -> Result<(), AppError> {
            self.record("hide");
            Ok(())
        }

        fn on_client_ready(&mut self, _ctx: &mut AppContext<'_>) -> Result<(), AppError> {
            self.record("ready");
            Ok(())
        }

        fn on_restore_state(
            &mut self,
            _ctx: &mut AppContext<'_>,
            _message: &Message,
        ) -> Result<(), AppError> {
            self.record("restore");
            Ok(())
        }

        fn on_timer(&mut self, ctx: &mut AppContext<'_>, timer: AppTimer) -> Result<(), AppError> {
            self.record(&format!("timer {timer:?}"));
            // Committing field "reset" clears the app's timers.
            if matches!(&timer, AppTimer::Commit { key } if key == "reset") {
                ctx.cancel_timers();
            }
            Ok(())
        }

        fn on_input(&mut self, ctx: &mut AppContext<'_>, input: AppInput) -> Result<(), AppError> {
            match input {
                AppInput::Button(name) if name == "later" => {
                    ctx.schedule(Duration::from_millis(100), 1);
                },
                AppInput::Text { field, .. } => ctx.debounce(field, Duration::from_millis(300)),
                _ => {},
            }
            Ok(())
        }

        fn on_disconnect(&mut self, _ctx: &mut AppContext<'_>) -> Result<(), AppError> {
            self.record("disconnect");
            Ok(())
        }
    }

    fn registry(calls: &Calls) -> AppRegistry {
        let (a, b) = (calls.clone(), calls.clone());
        AppRegistry::new()
            .register("first", move || Recorder { name: "first", calls: a.clone() })
            .register("second", move || Recorder { name: "second", calls: b.clone() })
    }

    fn router(role: Role) -> (Router<TestEnv>, TestEnv, Calls) {
        let env = TestEnv::default();
        let calls = Calls::default();
        let router = Router::new(env.clone(), SessionConfig::new(role), registry(&calls)).unwrap();
        (router, env, calls)
    }

    fn sent(actions: &[SessionAction]) -> Vec<Message> {
        actions
            .iter()
            .filter_map(|action| match action {
                SessionAction::Send(bytes) => Some(Message::decode(bytes).unwrap()),
                _ => None,
            })
            .collect()
    }

    fn system(sender: Role, message: SystemMessage) -> SessionEvent<Duration> {
        SessionEvent::MessageReceived(message.into_message(sender).unwrap().to_bytes())
    }

    fn calls(calls: &Calls) -> Vec<String> {
        calls.lock().unwrap().clone()
    }

    #[test]
    fn unassigned_role_is_rejected() {
        let config = SessionConfig::new(Role::Unassigned);
        let result = Router::new(TestEnv::default(), config, AppRegistry::new());
        assert!(matches!(result, Err(SessionError::UnassignedRole)));
    }

    #[test]
    fn therapist_open_applies_through_echo() {
        let (mut router, _env, log) = router(Role::Therapist);

        let actions = router.handle(SessionEvent::OpenApp { app_id: 1, seed: Some(42) }).unwrap();

        let out = sent(&actions);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].decode_body::<SystemMessage>().unwrap(), SystemMessage::open(1, 42));
        assert!(actions.contains(&SessionAction::AppShown { app_id: 1, instance_id: 1 }));
        assert_eq!(router.active_app(), Some(1));
        assert_eq!(router.random_seed(), 42);
        assert_eq!(calls(&log), vec!["second:load", "second:show"]);
    }

    #[test]
    fn patient_cannot_issue_therapist_commands() {
        let (mut router, _env, _log) = router(Role::Patient);

        let result = router.handle(SessionEvent::OpenApp { app_id: 0, seed: None });
        assert!(matches!(result, Err(SessionError::NotPermitted { role: Role::Patient, .. })));
        assert!(router.halted().is_none());
        let flip = router.handle(SessionEvent::FlipLocalVideo);
        assert!(matches!(flip, Err(SessionError::NotPermitted { .. })));
    }

    #[test]
    fn patient_shows_after_login_and_sends_handshake() {
        let (mut router, _env, log) = router(Role::Patient);

        router.handle(system(Role::Therapist, SystemMessage::login(9))).unwrap();
        assert!(router.registry().is_built());

        let actions = router.handle(system(Role::Therapist, SystemMessage::open(0, 42))).unwrap();
        let out = sent(&actions);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].header.sender, Role::Patient);
        assert_eq!(out[0].decode_body::<SystemMessage>().unwrap(), SystemMessage::handshake(0));
        assert_eq!(router.random_seed(), 42);
        assert_eq!(calls(&log), vec!["first:load", "first:show"]);
    }

    #[test]
    fn open_before_login_is_fatal() {
        let (mut router, _env, _log) = router(Role::Patient);

        let result = router.handle(system(Role::Therapist, SystemMessage::open(0, 1)));
        assert_eq!(result, Err(SessionError::RegistryNotLoaded { app_id: 0 }));
        assert!(matches!(router.handle(SessionEvent::CloseApp), Err(SessionError::Halted { .. })));
    }

    #[test]
    fn login_from_patient_is_fatal() {
        let (mut router, _env, _log) = router(Role::Therapist);

        let result = router.handle(system(Role::Patient, SystemMessage::login(3)));
        assert_eq!(
            result,
            Err(SessionError::RoleViolation { action: SystemAction::Login, sender: Role::Patient })
        );
    }

    #[test]
    fn handshake_checks_active_app() {
        let (mut router, _env, log) = router(Role::Therapist);

        router.handle(SessionEvent::OpenApp { app_id: 0, seed: Some(1) }).unwrap();
        router.handle(system(Role::Patient, SystemMessage::handshake(0))).unwrap();
        assert_eq!(calls(&log).last().map(String::as_str), Some("first:ready"));

        let result = router.handle(system(Role::Patient, SystemMessage::handshake(1)));
        assert_eq!(result, Err(SessionError::HandshakeMismatch { expected: 0, actual: 1 }));
    }

    #[test]
    fn handshake_without_app_is_fatal() {
        let (mut router, _env, _log) = router(Role::Therapist);
        let result = router.handle(system(Role::Patient, SystemMessage::handshake(2)));
        assert_eq!(result, Err(SessionError::HandshakeWithoutApp { app_id: 2 }));
    }

    #[test]
    fn unknown_protocol_halts() {
        let (mut router, _env, _log) = router(Role::Patient);

        let result = router.handle(SessionEvent::MessageReceived(Bytes::from_static(&[99, 0, 0])));
        assert!(matches!(
            result,
            Err(SessionError::Protocol(tandem_proto::ProtocolError::UnknownProtocol(99)))
        ));
        assert!(router.halted().is_some());
    }

    #[test]
    fn audio_is_unsupported() {
        let (mut router, _env, _log) = router(Role::Patient);
        let result = router.handle(SessionEvent::MessageReceived(Bytes::from_static(&[3, 0, 0])));
        assert_eq!(result, Err(SessionError::UnsupportedProtocol(ProtocolKind::Audio)));
    }

    #[test]
    fn reopening_hides_previous_and_persists_log() {
        let (mut router, _env, log) = router(Role::Therapist);

        router.handle(SessionEvent::OpenApp { app_id: 0, seed: Some(1) }).unwrap();
        let actions = router.handle(SessionEvent::OpenApp { app_id: 1, seed: Some(2) }).unwrap();

        let persisted = actions.iter().find_map(|action| match action {
            SessionAction::PersistLog { app_id, app_name, contents } => {
                Some((*app_id, app_name.clone(), contents.clone()))
            },
            _ => None,
        });
        assert_eq!(
            persisted,
            Some((0, "first".to_owned(), "app started - 12:34:56\nshown\n".to_owned()))
        );
        assert_eq!(router.lifecycle(0), Some(Lifecycle::Hidden));
        assert_eq!(router.lifecycle(1), Some(Lifecycle::Shown));
        assert_eq!(
            calls(&log),
            vec!["first:load", "first:show", "first:hide", "second:load", "second:show"]
        );
    }

    #[test]
    fn app_timers_fire_on_tick_and_die_on_hide() {
        let (mut router, env, log) = router(Role::Therapist);
        router.handle(SessionEvent::OpenApp { app_id: 0, seed: Some(1) }).unwrap();

        router.handle(SessionEvent::AppInput(AppInput::Button("later".into()))).unwrap();
        router.handle(SessionEvent::Tick { now: env.advance(50) }).unwrap();
        assert!(!calls(&log).iter().any(|c| c.contains("timer")));
        router.handle(SessionEvent::Tick { now: env.advance(50) }).unwrap();
        assert_eq!(calls(&log).last().map(String::as_str), Some("first:timer Token(1)"));

        router.handle(SessionEvent::AppInput(AppInput::Button("later".into()))).unwrap();
        router.handle(SessionEvent::CloseApp).unwrap();
        assert_eq!(router.pending_timers(), 0);
    }

    #[test]
    fn debounce_flushes_on_field_change() {
        let (mut router, env, log) = router(Role::Therapist);
        router.handle(SessionEvent::OpenApp { app_id: 0, seed: Some(1) }).unwrap();

        let edit = |field: &str| {
            SessionEvent::AppInput(AppInput::Text { field: field.into(), text: "x".into() })
        };
        router.handle(edit("a")).unwrap();
        router.handle(edit("a")).unwrap();
        router.handle(edit("b")).unwrap();
        assert_eq!(
            calls(&log).last().map(String::as_str),
            Some("first:timer Commit { key: \"a\" }")
        );

        router.handle(SessionEvent::Tick { now: env.advance(300) }).unwrap();
        let commits = calls(&log).iter().filter(|c| c.contains("Commit")).count();
        assert_eq!(commits, 2);
    }

    #[test]
    fn flushed_commit_cannot_cancel_the_next_edit() {
        let (mut router, env, log) = router(Role::Therapist);
        router.handle(SessionEvent::OpenApp { app_id: 0, seed: Some(1) }).unwrap();

        let edit = |field: &str| {
            SessionEvent::AppInput(AppInput::Text { field: field.into(), text: "x".into() })
        };
        router.handle(SessionEvent::AppInput(AppInput::Button("later".into()))).unwrap();
        router.handle(edit("reset")).unwrap();
        router.handle(edit("b")).unwrap();
        assert_eq!(
            calls(&log).last().map(String::as_str),
            Some("first:timer Commit { key: \"reset\" }")
        );
        // The flushed commit cleared the token timer but not the edit to "b".
        assert_eq!(router.pending_timers(), 1);

        router.handle(SessionEvent::Tick { now: env.advance(300) }).unwrap();
        let fired: Vec<String> =
            calls(&log).into_iter().filter(|c| c.contains("timer")).collect();
        assert_eq!(
            fired,
            vec!["first:timer Commit { key: \"reset\" }", "first:timer Commit { key: \"b\" }"]
        );
        assert_eq!(router.pending_timers(), 0);
    }

    #[test]
    fn restore_only_flows_from_therapist_to_patient() {
        let restore = |sender: Role, app_id: AppId| {
            let header = MessageHeader::new(ProtocolKind::Restore, sender, app_id);
            SessionEvent::MessageReceived(Message::new(header, Bytes::new()).to_bytes())
        };

        let (mut patient, _env, patient_log) = router(Role::Patient);
        patient.handle(system(Role::Therapist, SystemMessage::login(9))).unwrap();
        patient.handle(system(Role::Therapist, SystemMessage::open(0, 42))).unwrap();
        let before = calls(&patient_log);

        let actions = patient.handle(restore(Role::Patient, 1)).unwrap();
        assert!(actions.is_empty());
        assert_eq!(patient.active_app(), Some(0));
        assert_eq!(calls(&patient_log), before);

        let (mut therapist, _env, therapist_log) = router(Role::Therapist);
        therapist.handle(SessionEvent::OpenApp { app_id: 0, seed: Some(1) }).unwrap();
        let before = calls(&therapist_log);

        for sender in [Role::Therapist, Role::Patient] {
            let actions = therapist.handle(restore(sender, 1)).unwrap();
            assert!(actions.is_empty());
        }
        assert_eq!(therapist.active_app(), Some(0));
        assert_eq!(calls(&therapist_log), before);

        patient.handle(restore(Role::Therapist, 0)).unwrap();
        assert_eq!(calls(&patient_log).last().map(String::as_str), Some("first:restore"));
        assert_eq!(patient.active_app(), Some(0));
    }

    #[test]
    fn malformed_body_halts() {
        let (mut router, _env, _log) = router(Role::Patient);

        let bytes = Bytes::from_static(&[1, 0, 0, 0xff, 0xff]);
        let result = router.handle(SessionEvent::MessageReceived(bytes));
        assert!(matches!(
            result,
            Err(SessionError::Protocol(tandem_proto::ProtocolError::MalformedMessage {
                protocol: ProtocolKind::System,
                ..
            }))
        ));
        assert!(router.halted().is_some());
        assert!(matches!(router.handle(SessionEvent::CloseApp), Err(SessionError::Halted { .. })));
    }

    #[test]
    fn patient_retries_and_therapist_halts_on_connect_failure() {
        let (mut patient, env, _log) = router(Role::Patient);
        let actions =
            patient.handle(SessionEvent::ConnectFailed { reason: "refused".into() }).unwrap();
        assert!(matches!(
            actions.as_slice(),
            [SessionAction::Status(ConnectionStatus::Retrying { after, .. })]
                if *after == Duration::from_secs(1)
        ));

        assert!(patient.handle(SessionEvent::Tick { now: env.advance(999) }).unwrap().is_empty());
        let actions = patient.handle(SessionEvent::Tick { now: env.advance(1) }).unwrap();
        assert_eq!(actions, vec![SessionAction::Connect]);

        let (mut therapist, _env, _log) = router(Role::Therapist);
        let result = therapist.handle(SessionEvent::ConnectFailed { reason: "port busy".into() });
        assert_eq!(result, Err(SessionError::ListenFailed { reason: "port busy".into() }));
    }

    #[test]
    fn therapist_logs_in_on_connect() {
        let (mut router, _env, _log) = router(Role::Therapist);
        let seed = router.random_seed();

        let actions = router.handle(SessionEvent::Connected).unwrap();
        assert_eq!(actions[0], SessionAction::Status(ConnectionStatus::Connected));
        let out = sent(&actions);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].decode_body::<SystemMessage>().unwrap(), SystemMessage::login(seed));
    }

    #[test]
    fn patient_disconnect_closes_app() {
        let (mut router, _env, log) = router(Role::Patient);
        router.handle(system(Role::Therapist, SystemMessage::login(1))).unwrap();
        router.handle(SessionEvent::Connected).unwrap();
        router.handle(system(Role::Therapist, SystemMessage::open(1, 5))).unwrap();

        let actions = router.handle(SessionEvent::Disconnected { reason: "gone".into() }).unwrap();
        assert!(actions.contains(&SessionAction::AppHidden { app_id: 1 }));
        assert_eq!(actions.last(), Some(&SessionAction::Connect));
        assert_eq!(router.active_app(), None);
        assert!(!router.is_connected());
        assert!(calls(&log).contains(&"second:disconnect".to_owned()));
    }

    #[test]
    fn video_flip_toggles_named_side() {
        let (mut therapist, _env, _log) = router(Role::Therapist);
        let actions = therapist.handle(SessionEvent::FlipLocalVideo).unwrap();
        let orientation =
            SessionAction::VideoOrientation { local_flipped: true, remote_flipped: false };
        assert!(actions.contains(&orientation));

        let flip = sent(&actions).remove(0).to_bytes();
        let (mut patient, _env, _log) = router(Role::Patient);
        patient.handle(SessionEvent::MessageReceived(flip)).unwrap();
        assert_eq!(patient.video_flipped(), (false, true));

        let flip = SystemMessage::flip(SystemAction::FlipPatientVideo);
        patient.handle(system(Role::Therapist, flip)).unwrap();
        assert_eq!(patient.video_flipped(), (true, true));
    }

    #[test]
    fn click_indicator_animates_and_sounds_for_patient() {
        let (mut therapist, env, _log) = router(Role::Therapist);
        let click = Message::with_body(
            MessageHeader::new(ProtocolKind::MouseIndicator, Role::Patient, 0),
            &PointerMessage::at(4.0, 2.0),
        )
        .unwrap();

        let actions = therapist.handle(SessionEvent::MessageReceived(click.to_bytes())).unwrap();
        assert_eq!(actions[0], SessionAction::PlayClickSound);
        assert!(matches!(actions[1], SessionAction::Indicator(frame) if frame.id == 0));

        let mut frames = 1;
        loop {
            let actions = therapist.handle(SessionEvent::Tick { now: env.advance(10) }).unwrap();
            match actions.as_slice() {
                [SessionAction::Indicator(_)] => frames += 1,
                [SessionAction::IndicatorDone { id: 0 }] => break,
                other => panic!("unexpected actions {other:?}"),
            }
        }
        assert_eq!(frames, IndicatorFade::STEPS);
    }

    #[test]
    fn cursor_sharing_throttles_and_hides() {
        let (mut router, env, _log) = router(Role::Therapist);

        router.handle(SessionEvent::ToggleCursorSharing).unwrap();
        assert!(router.is_sharing_cursor());
        assert!(router.handle(SessionEvent::PointerMoved { x: 1.0, y: 1.0 }).unwrap().is_empty());

        for _ in 0..6 {
            router.handle(SessionEvent::Tick { now: env.advance(16) }).unwrap();
        }
        let actions = router.handle(SessionEvent::PointerMoved { x: 1.0, y: 1.0 }).unwrap();
        assert_eq!(sent(&actions).len(), 1);
        assert!(actions.contains(&SessionAction::Cursor(Some(PointerMessage::at(1.0, 1.0)))));

        let actions = router.handle(SessionEvent::ToggleCursorSharing).unwrap();
        assert!(actions.contains(&SessionAction::Cursor(None)));
    }

    #[test]
    fn sketch_end_of_line_without_line_halts() {
        let (mut router, _env, _log) = router(Role::Therapist);
        let stray = SketchMessage::action(tandem_proto::SketchAction::EndOfLine, Role::Therapist);

        let result = router.handle(SessionEvent::SendSketch(stray));
        assert!(matches!(result, Err(SessionError::SketchViolation(_))));
    }

    #[test]
    fn app_messages_for_other_apps_are_dropped() {
        let (mut router, _env, _log) = router(Role::Therapist);
        router.handle(SessionEvent::OpenApp { app_id: 0, seed: Some(1) }).unwrap();

        let stray = Message::signal(MessageHeader::new(ProtocolKind::App, Role::Patient, 1));
        let actions = router.handle(SessionEvent::MessageReceived(stray.to_bytes())).unwrap();
        assert!(actions.is_empty());
    }

    #[test]
    fn delayed_echo_survives_disconnect() {
        let env = TestEnv::default();
        let calls = Calls::default();
        let config =
            SessionConfig { echo_delay: Duration::from_millis(40), ..SessionConfig::therapist() };
        let mut router = Router::new(env.clone(), config, registry(&calls)).unwrap();

        router.handle(SessionEvent::OpenApp { app_id: 0, seed: Some(1) }).unwrap();
        assert_eq!(router.active_app(), None);

        router.handle(SessionEvent::Disconnected { reason: "blip".into() }).unwrap();
        router.handle(SessionEvent::Tick { now: env.advance(40) }).unwrap();
        assert_eq!(router.active_app(), Some(0));
    }
}
