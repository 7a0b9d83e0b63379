use crate::error::ADError;
use log::warn;
use std::cell::Cell;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Determines how an imperfect Jacobian is reported.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum ADErrorPolicy {
    /// Dropping derivatives is an error.
    #[default]
    Error,
    /// Dropping derivatives only emits a warning, and the Jacobian silently becomes inexact.
    Warn,
}

thread_local! {
    static POLICY: Cell<ADErrorPolicy> = Cell::new(ADErrorPolicy::default());
}

static IMPERFECT_JACOBIAN_COUNT: AtomicUsize = AtomicUsize::new(0);

/// The policy currently in effect on this thread.
pub fn ad_error_policy() -> ADErrorPolicy {
    POLICY.with(|policy| policy.get())
}

/// The number of imperfect Jacobians that have been downgraded to warnings, across all threads.
pub fn imperfect_jacobian_count() -> usize {
    IMPERFECT_JACOBIAN_COUNT.load(Ordering::Relaxed)
}

/// Scoped override of the [`ADErrorPolicy`] on the current thread.
///
/// The previous policy is restored when the guard is dropped, so guards may be nested.
///
/// ```
/// use fekern::ad::{ad_error_policy, ADErrorPolicy, ADErrorPolicyGuard};
///
/// {
///     let _guard = ADErrorPolicyGuard::new(ADErrorPolicy::Warn);
///     assert_eq!(ad_error_policy(), ADErrorPolicy::Warn);
/// }
/// assert_eq!(ad_error_policy(), ADErrorPolicy::Error);
/// ```
#[derive(Debug)]
#[must_use = "the previous policy is restored as soon as the guard is dropped"]
pub struct ADErrorPolicyGuard {
    previous: ADErrorPolicy,
}

impl ADErrorPolicyGuard {
    pub fn new(policy: ADErrorPolicy) -> Self {
        let previous = POLICY.with(|current| current.replace(policy));
        Self { previous }
    }

    pub fn previous_policy(&self) -> ADErrorPolicy {
        self.previous
    }
}

impl Drop for ADErrorPolicyGuard {
    fn drop(&mut self) {
        POLICY.with(|current| current.set(self.previous));
    }
}

pub(crate) fn report_imperfect_jacobian(context: &str) -> Result<(), ADError> {
    match ad_error_policy() {
        ADErrorPolicy::Error => Err(ADError::ImperfectJacobian {
            context: context.to_string(),
        }),
        ADErrorPolicy::Warn => {
            IMPERFECT_JACOBIAN_COUNT.fetch_add(1, Ordering::Relaxed);
            warn!("Imperfect Jacobian in {}: derivatives were dropped", context);
            Ok(())
        }
    }
}
