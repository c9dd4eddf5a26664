use std::time::Duration;

use bytes::Bytes;
use serde::Serialize;
use tandem_proto::{AppId, MessageHeader, Role, encode_body};

use super::AppTimer;
use crate::{error::AppError, rng::LockstepRng, stats::SessionLog};

/// Work an app asked for during a callback, executed by the router once the
/// callback returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum AppRequest {
    /// Broadcast an App-protocol body.
    Send(Bytes),
    /// Open another app by name, optionally passing it parameters.
    Open { name: String, params: Option<Bytes> },
    /// Schedule a timer.
    Schedule { delay: Duration, token: u32 },
    /// Debounce a commit under `key`.
    Debounce { key: String, delay: Duration },
    /// Drop every pending timer of this app.
    CancelTimers,
}

/// What a mini-app sees of the session during one callback.
pub struct AppContext<'a> {
    role: Role,
    app_id: AppId,
    instance_id: u64,
    wall_secs: u64,
    rng: &'a mut LockstepRng,
    log: &'a mut SessionLog,
    requests: &'a mut Vec<AppRequest>,
}

impl<'a> AppContext<'a> {
    pub(crate) fn new(
        role: Role,
        app_id: AppId,
        instance_id: u64,
        wall_secs: u64,
        rng: &'a mut LockstepRng,
        log: &'a mut SessionLog,
        requests: &'a mut Vec<AppRequest>,
    ) -> Self {
        Self { role, app_id, instance_id, wall_secs, rng, log, requests }
    }

    /// Local role.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Id of the app receiving the callback.
    pub fn app_id(&self) -> AppId {
        self.app_id
    }

    /// Changes every time the app is shown. Lets an app tell a fresh showing
    /// from a re-show of the same one.
    pub fn instance_id(&self) -> u64 {
        self.instance_id
    }

    /// True if `header` was sent by the peer rather than echoed back from us.
    pub fn is_remote(&self, header: &MessageHeader) -> bool {
        header.is_remote(self.role)
    }

    /// Lockstep draw in `[min, max)`.
    pub fn draw(&mut self, min: i32, max: i32) -> i32 {
        self.rng.draw(min, max)
    }

    /// Lockstep shuffle.
    pub fn randomize<T>(&mut self, items: Vec<T>) -> Vec<T> {
        self.rng.randomize(items)
    }

    /// Broadcast `body` as an App-protocol message addressed to this app.
    pub fn send<T: Serialize>(&mut self, body: &T) -> Result<(), AppError> {
        let body = encode_body(body)?;
        self.requests.push(AppRequest::Send(body));
        Ok(())
    }

    /// Ask the session to open the app registered as `name`.
    ///
    /// Only honored on the therapist. App code runs on both peers, so the
    /// patient side makes the same request and it is ignored there; the
    /// therapist's `Open` reaches the patient over the wire.
    pub fn open_app(&mut self, name: impl Into<String>) {
        self.requests.push(AppRequest::Open { name: name.into(), params: None });
    }

    /// Open `name` and hand it `params` through its `on_params`.
    pub fn open_app_with_params<T: Serialize>(
        &mut self,
        name: impl Into<String>,
        params: &T,
    ) -> Result<(), AppError> {
        let params = encode_body(params)?;
        self.requests.push(AppRequest::Open { name: name.into(), params: Some(params) });
        Ok(())
    }

    /// Call `on_timer(AppTimer::Token(token))` after `delay`.
    pub fn schedule(&mut self, delay: Duration, token: u32) {
        self.requests.push(AppRequest::Schedule { delay, token });
    }

    /// Call `on_timer(AppTimer::Commit { key })` once `delay` passes without
    /// another debounce of the same key. A debounce for a different key
    /// commits the pending one immediately.
    pub fn debounce(&mut self, key: impl Into<String>, delay: Duration) {
        self.requests.push(AppRequest::Debounce { key: key.into(), delay });
    }

    /// Drop this app's pending timers.
    pub fn cancel_timers(&mut self) {
        self.requests.push(AppRequest::CancelTimers);
    }

    /// Append a line to the session log.
    pub fn log(&mut self, text: impl AsRef<str>) {
        self.log.line(text);
    }

    /// Open a log section stamped with the current time.
    pub fn push_section(&mut self, section: &str, options: &[&str]) {
        self.log.push(section, options, self.wall_secs);
    }

    /// Close the innermost log section.
    pub fn pop_section(&mut self) {
        self.log.pop();
    }
}
