use tandem_proto::AppId;
use tracing::warn;

use super::{AppSlot, MiniApp};

/// Builds a fresh app instance.
pub type AppFactory = Box<dyn Fn() -> Box<dyn MiniApp> + Send>;

/// Ordered app registry.
///
/// Apps are registered by name up front; instances are only built when the
/// session logs in, so an unused registry costs nothing. The position in
/// registration order is the app's [`AppId`] on the wire, which is why both
/// peers must register the same apps in the same order.
#[derive(Default)]
pub struct AppRegistry {
    factories: Vec<(String, AppFactory)>,
    slots: Option<Vec<AppSlot>>,
}

impl std::fmt::Debug for AppRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<_> = self.factories.iter().map(|(name, _)| name.as_str()).collect();
        f.debug_struct("AppRegistry")
            .field("apps", &names)
            .field("built", &self.is_built())
            .finish()
    }
}

impl AppRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `name`, built by `factory`. Ids follow call order.
    #[must_use]
    pub fn register<F, A>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> A + Send + 'static,
        A: MiniApp + 'static,
    {
        let factory: AppFactory = Box::new(move || -> Box<dyn MiniApp> { Box::new(factory()) });
        self.factories.push((name.into(), factory));
        self
    }

    /// Number of registered apps.
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// True if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Whether instances have been built.
    pub fn is_built(&self) -> bool {
        self.slots.is_some()
    }

    /// Build one instance per registered app. No-op if already built.
    ///
    /// Apps beyond the id space are skipped with a warning.
    pub fn build(&mut self) {
        if self.slots.is_some() {
            return;
        }
        let mut slots = Vec::with_capacity(self.factories.len());
        for (index, (name, factory)) in self.factories.iter().enumerate() {
            let Ok(app_id) = AppId::try_from(index) else {
                warn!(app = %name, index, "app id space exhausted, app not loaded");
                continue;
            };
            slots.push(AppSlot::new(app_id, name.clone(), factory()));
        }
        self.slots = Some(slots);
    }

    /// Id of the app registered as `name`.
    pub fn find(&self, name: &str) -> Option<AppId> {
        self.factories
            .iter()
            .position(|(registered, _)| registered == name)
            .and_then(|index| AppId::try_from(index).ok())
    }

    /// Registered name of `app_id`.
    pub fn name(&self, app_id: AppId) -> Option<&str> {
        self.factories.get(usize::from(app_id)).map(|(name, _)| name.as_str())
    }

    /// Built slot for `app_id`.
    pub fn slot(&self, app_id: AppId) -> Option<&AppSlot> {
        self.slots.as_ref()?.get(usize::from(app_id))
    }

    pub(crate) fn slot_mut(&mut self, app_id: AppId) -> Option<&mut AppSlot> {
        self.slots.as_mut()?.get_mut(usize::from(app_id))
    }

    /// All built slots, in id order.
    pub fn slots(&self) -> &[AppSlot] {
        self.slots.as_deref().unwrap_or_default()
    }
}
