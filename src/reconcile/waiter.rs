//! Bounded fixed-interval convergence waiter.
//!
//! Writes to the registry are eventually consistent: a create, update or
//! delete that returned 2xx may not be visible to the next read. Lifecycle
//! operations hand a convergence check to [`wait`], which polls it until it
//! reports done, fails, or the deadline passes.

use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::error::{CloudsmithError, ReconcileError, Result};

use super::Operation;

/// Outcome of one convergence check.
#[derive(Debug)]
pub enum Check {
    /// Converged; stop waiting.
    Done,
    /// Not yet visible; sleep and check again.
    Retry,
    /// Permanent failure; stop waiting and surface the error.
    Fatal(CloudsmithError),
}

impl Check {
    /// Classifies a probe made while waiting for an object to appear.
    ///
    /// 404 means "not visible yet"; any other error is fatal.
    #[must_use]
    pub fn until_present<T>(probe: Result<T>) -> Self {
        match probe {
            Ok(_) => Self::Done,
            Err(e) if e.is_not_found() => Self::Retry,
            Err(e) => Self::Fatal(e),
        }
    }

    /// Classifies a probe made while waiting for an object to disappear.
    ///
    /// 404 means gone; a successful read means "still there".
    #[must_use]
    pub fn until_absent<T>(probe: Result<T>) -> Self {
        match probe {
            Ok(_) => Self::Retry,
            Err(e) if e.is_not_found() => Self::Done,
            Err(e) => Self::Fatal(e),
        }
    }
}

/// Total timeout and fixed poll interval for one wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    /// Upper bound on the time spent waiting.
    pub timeout: Duration,
    /// Sleep between checks.
    pub interval: Duration,
}

impl WaitPolicy {
    /// Creates a policy.
    #[must_use]
    pub const fn new(timeout: Duration, interval: Duration) -> Self {
        Self { timeout, interval }
    }
}

/// Per-operation wait policies used by lifecycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// After create, until visible.
    pub create: WaitPolicy,
    /// After update, until converged.
    pub update: WaitPolicy,
    /// After delete, until absent.
    pub delete: WaitPolicy,
    /// Sleep used by [`AlwaysConvergesAfterFixedDelay`].
    pub settle_delay: Duration,
}

impl Timeouts {
    /// Returns the policy for an operation class.
    ///
    /// Reads and imports never wait; they reuse the create window if asked.
    #[must_use]
    pub const fn for_operation(&self, operation: Operation) -> WaitPolicy {
        match operation {
            Operation::Update => self.update,
            Operation::Delete => self.delete,
            Operation::Create | Operation::Read | Operation::Import => self.create,
        }
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        crate::config::WaitConfig::default().timeouts()
    }
}

/// Polls `check` until it reports [`Check::Done`] or [`Check::Fatal`], or
/// until `policy.timeout` has elapsed.
///
/// The first check runs immediately, so an already-converged resource costs
/// one probe and no sleep. After each [`Check::Retry`] the waiter sleeps one
/// interval and then compares the elapsed time against the timeout; once the
/// deadline is reached no further check is made. An interval larger than the
/// timeout therefore yields exactly one check.
///
/// # Errors
///
/// Returns the error carried by [`Check::Fatal`], or
/// [`ReconcileError::Timeout`] naming `resource` and `operation`.
pub async fn wait<F, Fut>(
    mut check: F,
    policy: WaitPolicy,
    resource: &str,
    operation: Operation,
) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Check>,
{
    let start = Instant::now();
    let mut attempt: u32 = 1;

    loop {
        match check().await {
            Check::Done => {
                debug!("{operation} of {resource} converged after {attempt} check(s)");
                return Ok(());
            }
            Check::Fatal(err) => return Err(err),
            Check::Retry => {}
        }

        tokio::time::sleep(policy.interval).await;

        let elapsed = start.elapsed();
        if elapsed >= policy.timeout {
            return Err(ReconcileError::Timeout {
                resource: resource.to_string(),
                operation,
                waited_secs: elapsed.as_secs(),
            }
            .into());
        }

        attempt += 1;
        debug!(
            "Waiting for {operation} of {resource} (check {attempt}, {}ms elapsed)",
            elapsed.as_millis()
        );
    }
}

/// Degraded convergence check for endpoints with no usable signal.
///
/// It does not observe anything: it sleeps a fixed delay and reports done.
/// Lifecycles use it where the API offers neither a timestamp nor a stable
/// read-back to compare against, and follow it with an unconditional read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlwaysConvergesAfterFixedDelay {
    delay: Duration,
}

impl AlwaysConvergesAfterFixedDelay {
    /// Creates the check with the given delay.
    #[must_use]
    pub const fn new(delay: Duration) -> Self {
        Self { delay }
    }

    /// Sleeps for the configured delay, then reports [`Check::Done`].
    pub async fn check(self) -> Check {
        tokio::time::sleep(self.delay).await;
        Check::Done
    }
}
