use tandem_proto::AppId;

use super::MiniApp;
use crate::{error::SessionError, stats::SessionLog};

/// Lifecycle state of one app instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lifecycle {
    /// Never shown; `on_load` not yet run.
    Unloaded,
    /// Loaded, about to be shown for the first time.
    Loaded,
    /// Active screen.
    Shown,
    /// Shown before, not active now.
    Hidden,
}

/// Router-owned wrapper around one registered app.
pub struct AppSlot {
    app_id: AppId,
    name: String,
    app: Box<dyn MiniApp>,
    state: Lifecycle,
    instance_id: u64,
    log: SessionLog,
}

impl std::fmt::Debug for AppSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppSlot")
            .field("app_id", &self.app_id)
            .field("name", &self.name)
            .field("state", &self.state)
            .field("instance_id", &self.instance_id)
            .finish_non_exhaustive()
    }
}

impl AppSlot {
    pub(crate) fn new(app_id: AppId, name: String, app: Box<dyn MiniApp>) -> Self {
        let log = SessionLog::new(name.clone(), 0);
        Self { app_id, name, app, state: Lifecycle::Unloaded, instance_id: 0, log }
    }

    /// Registry index.
    pub fn app_id(&self) -> AppId {
        self.app_id
    }

    /// Registered name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current lifecycle state.
    pub fn state(&self) -> Lifecycle {
        self.state
    }

    /// Instance id of the current (or last) showing.
    pub fn instance_id(&self) -> u64 {
        self.instance_id
    }

    /// Log of the current (or last) showing.
    pub fn log(&self) -> &SessionLog {
        &self.log
    }

    /// The app itself.
    pub fn app(&self) -> &dyn MiniApp {
        self.app.as_ref()
    }

    /// Start a new showing: fresh instance id and log. Valid from any state
    /// except `Shown`.
    pub(crate) fn begin_show(
        &mut self,
        instance_id: u64,
        wall_secs: u64,
    ) -> Result<(), SessionError> {
        if self.state == Lifecycle::Shown {
            return Err(self.violation("show"));
        }
        self.instance_id = instance_id;
        self.log = SessionLog::new(self.name.clone(), wall_secs);
        Ok(())
    }

    /// `Unloaded -> Loaded`.
    pub(crate) fn mark_loaded(&mut self) -> Result<(), SessionError> {
        if self.state != Lifecycle::Unloaded {
            return Err(self.violation("load"));
        }
        self.state = Lifecycle::Loaded;
        Ok(())
    }

    /// `Loaded | Hidden -> Shown`.
    pub(crate) fn mark_shown(&mut self) -> Result<(), SessionError> {
        match self.state {
            Lifecycle::Loaded | Lifecycle::Hidden => {
                self.state = Lifecycle::Shown;
                Ok(())
            },
            Lifecycle::Unloaded | Lifecycle::Shown => Err(self.violation("show")),
        }
    }

    /// `Shown -> Hidden`.
    pub(crate) fn mark_hidden(&mut self) -> Result<(), SessionError> {
        if self.state != Lifecycle::Shown {
            return Err(self.violation("hide"));
        }
        self.state = Lifecycle::Hidden;
        Ok(())
    }

    /// Split borrow of the app and its log for building a context.
    pub(crate) fn parts_mut(&mut self) -> (&mut dyn MiniApp, &mut SessionLog) {
        (self.app.as_mut(), &mut self.log)
    }

    fn violation(&self, operation: &'static str) -> SessionError {
        SessionError::LifecycleViolation { app_id: self.app_id, state: self.state, operation }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AppContext, error::AppError};

    struct Blank;

    impl MiniApp for Blank {
        fn on_show(&mut self, _ctx: &mut AppContext<'_>) -> Result<(), AppError> {
            Ok(())
        }
    }

    #[test]
    fn walks_the_state_machine() {
        let mut slot = AppSlot::new(0, "blank".into(), Box::new(Blank));
        assert_eq!(slot.state(), Lifecycle::Unloaded);

        slot.begin_show(1, 0).unwrap();
        slot.mark_loaded().unwrap();
        slot.mark_shown().unwrap();
        slot.mark_hidden().unwrap();
        slot.begin_show(2, 0).unwrap();
        slot.mark_shown().unwrap();

        assert_eq!(slot.state(), Lifecycle::Shown);
        assert_eq!(slot.instance_id(), 2);
    }

    #[test]
    fn rejects_invalid_transitions() {
        let mut slot = AppSlot::new(3, "blank".into(), Box::new(Blank));
        assert!(matches!(
            slot.mark_hidden(),
            Err(SessionError::LifecycleViolation {
                app_id: 3,
                state: Lifecycle::Unloaded,
                operation: "hide",
            })
        ));
        assert!(slot.mark_shown().is_err());

        slot.mark_loaded().unwrap();
        assert!(slot.mark_loaded().is_err());
        slot.mark_shown().unwrap();
        assert!(slot.begin_show(4, 0).is_err());
        assert!(slot.mark_shown().is_err());
    }
}
