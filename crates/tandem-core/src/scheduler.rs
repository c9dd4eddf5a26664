//! Cooperative delayed-action scheduler.
//!
//! A pool of pending actions keyed by handle. Nothing fires on its own: the
//! host loop calls [`Scheduler::tick`] once per frame and executes whatever it
//! returns. This keeps the scheduler pure (no callbacks, no threads) and lets
//! the caller decide how an action's payload is dispatched.
//!
//! # Invariants
//!
//! - An action is returned at most once: by `tick`, or by `cancel` with
//!   `fire_now`, never both.
//! - `schedule` never returns a fired action, even for a zero delay. The
//!   earliest an action can fire is the next `tick`.
//! - Actions due on the same tick fire in deadline order; ties fire in the
//!   order they were scheduled.

use std::{collections::BTreeMap, ops::Add, time::Duration};

use tandem_proto::AppId;

/// Identifies one scheduled action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActionHandle(u64);

/// Who an action belongs to, for bulk cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Owner {
    /// The session itself (reconnect retries, overlays). Cancelled on
    /// disconnect.
    Session,
    /// Delayed local echo. Survives disconnects so our own broadcasts are
    /// still applied locally.
    Loopback,
    /// A mini-app; cancelled when that app is hidden.
    App(AppId),
}

/// An action handed back to the caller for execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fired<C> {
    /// Handle the action was scheduled under.
    pub handle: ActionHandle,
    /// Owner it was scheduled for.
    pub owner: Owner,
    /// Payload supplied at scheduling time.
    pub context: C,
}

#[derive(Debug)]
struct Entry<I, C> {
    deadline: I,
    owner: Owner,
    context: C,
}

/// Pool of delayed actions.
///
/// Generic over the instant type (real or virtual time) and the payload `C`
/// the caller interprets when an action fires.
#[derive(Debug)]
pub struct Scheduler<I, C> {
    next_handle: u64,
    pending: BTreeMap<ActionHandle, Entry<I, C>>,
}

impl<I, C> Default for Scheduler<I, C> {
    fn default() -> Self {
        Self { next_handle: 0, pending: BTreeMap::new() }
    }
}

impl<I, C> Scheduler<I, C>
where
    I: Copy + Ord + Add<Duration, Output = I>,
{
    /// Create an empty scheduler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `context` to fire once `delay` has elapsed after `now`.
    pub fn schedule(&mut self, now: I, delay: Duration, owner: Owner, context: C) -> ActionHandle {
        let handle = ActionHandle(self.next_handle);
        self.next_handle += 1;
        self.pending.insert(handle, Entry { deadline: now + delay, owner, context });
        handle
    }

    /// Remove a pending action.
    ///
    /// With `fire_now` the action is returned so the caller can execute it
    /// immediately (flush-then-replace). Without it the action is dropped and
    /// `None` is returned. Unknown or already-fired handles are a no-op.
    pub fn cancel(&mut self, handle: ActionHandle, fire_now: bool) -> Option<Fired<C>> {
        let entry = self.pending.remove(&handle)?;
        fire_now.then_some(Fired { handle, owner: entry.owner, context: entry.context })
    }

    /// Drop every pending action of `owner` without firing. Returns how many
    /// were dropped.
    pub fn cancel_all(&mut self, owner: Owner) -> usize {
        let before = self.pending.len();
        self.pending.retain(|_, entry| entry.owner != owner);
        before - self.pending.len()
    }

    /// Restart a pending action's timer from `now`. Returns false if the
    /// action is no longer pending.
    pub fn reset(&mut self, handle: ActionHandle, now: I, delay: Duration) -> bool {
        match self.pending.get_mut(&handle) {
            Some(entry) => {
                entry.deadline = now + delay;
                true
            },
            None => false,
        }
    }

    /// Mutable access to a pending action's payload.
    pub fn context_mut(&mut self, handle: ActionHandle) -> Option<&mut C> {
        self.pending.get_mut(&handle).map(|entry| &mut entry.context)
    }

    /// Remove and return every action whose deadline is at or before `now`.
    pub fn tick(&mut self, now: I) -> Vec<Fired<C>> {
        let mut due: Vec<(I, ActionHandle)> = self
            .pending
            .iter()
            .filter(|(_, entry)| entry.deadline <= now)
            .map(|(handle, entry)| (entry.deadline, *handle))
            .collect();
        due.sort();

        due.into_iter()
            .filter_map(|(_, handle)| {
                self.pending
                    .remove(&handle)
                    .map(|entry| Fired { handle, owner: entry.owner, context: entry.context })
            })
            .collect()
    }

    /// True if the action has neither fired nor been cancelled.
    pub fn is_pending(&self, handle: ActionHandle) -> bool {
        self.pending.contains_key(&handle)
    }

    /// Earliest pending deadline.
    pub fn next_deadline(&self) -> Option<I> {
        self.pending.values().map(|entry| entry.deadline).min()
    }

    /// Number of pending actions.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// True if nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Outcome of [`Debouncer::debounce`].
#[derive(Debug, PartialEq, Eq)]
pub enum Debounced<C> {
    /// Nothing was pending; a new action was scheduled.
    Scheduled(ActionHandle),
    /// The pending action had the same key; its deadline was restarted.
    Reset(ActionHandle),
    /// A different key was pending. It was cancelled and handed back without
    /// scheduling anything: the caller executes `flushed`, then debounces
    /// `context` again.
    Flushed {
        /// The previous key's action, to execute immediately.
        flushed: Fired<C>,
        /// The new payload, not yet scheduled.
        context: C,
    },
}

/// Single-slot debounce for committed-after-idle input.
///
/// Holds at most one pending action at a time. An edit to the same key pushes
/// the deadline back. An edit to a different key hands the pending action
/// back as [`Debounced::Flushed`] before anything new is scheduled, so the
/// flushed commit runs with the new edit not yet in the scheduler.
#[derive(Debug)]
pub struct Debouncer<K> {
    pending: Option<(K, ActionHandle)>,
}

impl<K> Default for Debouncer<K> {
    fn default() -> Self {
        Self { pending: None }
    }
}

impl<K: PartialEq> Debouncer<K> {
    /// Create an idle debouncer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Debounce `context` under `key`.
    ///
    /// On a same-key reset the pending payload is replaced with `context`, so
    /// the action that eventually fires carries the latest edit.
    pub fn debounce<I, C>(
        &mut self,
        scheduler: &mut Scheduler<I, C>,
        now: I,
        key: K,
        delay: Duration,
        owner: Owner,
        context: C,
    ) -> Debounced<C>
    where
        I: Copy + Ord + Add<Duration, Output = I>,
    {
        match self.pending.take() {
            Some((pending_key, handle)) if scheduler.is_pending(handle) => {
                if pending_key == key {
                    scheduler.reset(handle, now, delay);
                    if let Some(slot) = scheduler.context_mut(handle) {
                        *slot = context;
                    }
                    self.pending = Some((pending_key, handle));
                    Debounced::Reset(handle)
                } else if let Some(flushed) = scheduler.cancel(handle, true) {
                    Debounced::Flushed { flushed, context }
                } else {
                    let handle = scheduler.schedule(now, delay, owner, context);
                    self.pending = Some((key, handle));
                    Debounced::Scheduled(handle)
                }
            },
            _ => {
                let handle = scheduler.schedule(now, delay, owner, context);
                self.pending = Some((key, handle));
                Debounced::Scheduled(handle)
            },
        }
    }

    /// Key of the pending action, if it has not fired or been cancelled.
    pub fn pending_key<I, C>(&self, scheduler: &Scheduler<I, C>) -> Option<&K>
    where
        I: Copy + Ord + Add<Duration, Output = I>,
    {
        self.pending
            .as_ref()
            .filter(|(_, handle)| scheduler.is_pending(*handle))
            .map(|(key, _)| key)
    }
}
