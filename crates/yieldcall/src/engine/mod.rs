//! Scheduling engines
//!
//! - [`stack`]: trampoline runner for one logical task with an explicit
//!   frame list
//! - [`rotator`]: round-robin scheduler for many cooperating tasks
//!
//! Both engines are [`Task`](crate::task::Task)s themselves: whatever an
//! in-flight action yields is passed outward to the engine's own driver.

pub mod record;
pub mod rotator;
pub mod stack;

use crate::error::Failure;
use std::fmt;
use std::rc::Rc;

/// Decides which failures abort a whole run
///
/// Ordinary failures stay with the task that raised them (its caller frame
/// or its waiters). Fatal ones end the run immediately.
#[derive(Clone, Default)]
pub enum FatalPolicy {
    /// [`Failure::Interrupted`] and [`Failure::Exit`] are fatal
    #[default]
    Default,
    /// Every failure stays local
    Never,
    /// Custom predicate
    Custom(Rc<dyn Fn(&Failure) -> bool>),
}

impl FatalPolicy {
    /// Policy from a predicate
    pub fn custom(f: impl Fn(&Failure) -> bool + 'static) -> Self {
        FatalPolicy::Custom(Rc::new(f))
    }

    /// Whether `failure` aborts the run
    pub fn is_fatal(&self, failure: &Failure) -> bool {
        match self {
            FatalPolicy::Default => failure.is_fatal(),
            FatalPolicy::Never => false,
            FatalPolicy::Custom(f) => f(failure),
        }
    }
}

impl fmt::Debug for FatalPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FatalPolicy::Default => f.write_str("Default"),
            FatalPolicy::Never => f.write_str("Never"),
            FatalPolicy::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, Default)]
pub struct EngineOptions {
    /// Maximum stack engine frames (None = unlimited)
    pub max_depth: Option<usize>,

    /// Maximum live rotator tasks, root included (None = unlimited)
    pub max_tasks: Option<usize>,

    /// Ordinary/fatal failure boundary
    pub fatal: FatalPolicy,
}

impl EngineOptions {
    /// No limits, default fatal policy
    pub fn unlimited() -> Self {
        Self::default()
    }

    /// Limit the stack engine's frame count
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = Some(max_depth);
        self
    }

    /// Limit the rotator's live task count
    pub fn with_max_tasks(mut self, max_tasks: usize) -> Self {
        self.max_tasks = Some(max_tasks);
        self
    }

    /// Replace the fatal policy
    pub fn with_fatal_policy(mut self, fatal: FatalPolicy) -> Self {
        self.fatal = fatal;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policies() {
        let failure = Failure::raised("KeyboardInterrupt", "");
        assert!(!FatalPolicy::Default.is_fatal(&failure));
        assert!(FatalPolicy::Default.is_fatal(&Failure::Interrupted));
        assert!(!FatalPolicy::Never.is_fatal(&Failure::Interrupted));

        let policy = FatalPolicy::custom(|f| matches!(f, Failure::Raised { kind, .. } if kind == "KeyboardInterrupt"));
        assert!(policy.is_fatal(&failure));
        assert!(!policy.is_fatal(&Failure::Interrupted));
    }

    #[test]
    fn test_options_builders() {
        let options = EngineOptions::unlimited()
            .with_max_depth(8)
            .with_max_tasks(4)
            .with_fatal_policy(FatalPolicy::Never);
        assert_eq!(options.max_depth, Some(8));
        assert_eq!(options.max_tasks, Some(4));
        assert!(matches!(options.fatal, FatalPolicy::Never));
    }
}
