//! Invariant checking for deterministic simulation testing.
//!
//! Invariants are properties that must hold after every step of a
//! simulation, whatever the sequence of events. Tests take a
//! [`SessionSnapshot`] of both peers and run the registered checks on it.
//!
//! ```ignore
//! let registry = InvariantRegistry::converged();
//! registry.assert_all(&SessionSnapshot::of_pair(&pair), "after open");
//! ```

mod checks;
mod snapshot;

pub use checks::{ActiveAppsAgree, LockstepState, NotHalted, SingleShownApp};
pub use snapshot::{PeerSnapshot, SessionSnapshot};

/// Invariant check result.
pub type InvariantResult = Result<(), Violation>;

/// Invariant violation with context.
#[derive(Debug, Clone)]
pub struct Violation {
    /// Name of the violated invariant.
    pub invariant: &'static str,
    /// Description of what went wrong.
    pub message: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.invariant, self.message)
    }
}

impl std::error::Error for Violation {}

/// A property checked against a snapshot.
pub trait Invariant: Send + Sync {
    /// Name for error reporting.
    fn name(&self) -> &'static str;

    /// `Ok(())` if the invariant holds.
    fn check(&self, state: &SessionSnapshot) -> InvariantResult;
}

/// Registry of invariants to check.
pub struct InvariantRegistry {
    invariants: Vec<Box<dyn Invariant>>,
}

impl Default for InvariantRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InvariantRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self { invariants: Vec::new() }
    }

    /// Invariants that hold at every step:
    /// - [`SingleShownApp`]
    /// - [`NotHalted`]
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.add(SingleShownApp);
        registry.add(NotHalted);
        registry
    }

    /// Standard invariants plus those that hold once all messages are
    /// delivered on a live link: [`ActiveAppsAgree`] and [`LockstepState`].
    pub fn converged() -> Self {
        let mut registry = Self::standard();
        registry.add(ActiveAppsAgree);
        registry.add(LockstepState);
        registry
    }

    /// Add an invariant to the registry.
    pub fn add<I: Invariant + 'static>(&mut self, invariant: I) {
        self.invariants.push(Box::new(invariant));
    }

    /// Check all invariants. Returns every violation found.
    pub fn check_all(&self, state: &SessionSnapshot) -> Result<(), Vec<Violation>> {
        let violations: Vec<_> =
            self.invariants.iter().filter_map(|inv| inv.check(state).err()).collect();

        if violations.is_empty() { Ok(()) } else { Err(violations) }
    }

    /// Check all invariants, panicking with every violation.
    #[allow(clippy::panic)]
    pub fn assert_all(&self, state: &SessionSnapshot, context: &str) {
        if let Err(violations) = self.check_all(state) {
            let messages: Vec<_> = violations.iter().map(ToString::to_string).collect();
            panic!("invariant violation {context}:\n  {}", messages.join("\n  "));
        }
    }

    /// Number of registered invariants.
    pub fn len(&self) -> usize {
        self.invariants.len()
    }

    /// Check if registry is empty.
    pub fn is_empty(&self) -> bool {
        self.invariants.is_empty()
    }
}
