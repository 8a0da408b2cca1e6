//! Waiting for a task to reach a terminal state.
//!
//! The poll loop is driven by a [`Clock`] so tests can step through status
//! sequences without real time passing. Each iteration checks cancellation
//! and the optional deadline before querying and before sleeping.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};

use crate::error::{Error, Result, describe_remote_error};
use crate::session::Session;
use crate::task::{StatusReply, TaskHandle, TaskStatus};
use crate::util::backoff;

/// Floor for the pause between status queries.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// Cooperative cancellation flag shared between the poller and its owner.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Pause after the first status query.
    pub interval: Duration,
    /// Upper bound for the growing pause.
    pub max_interval: Duration,
    /// Overall deadline measured from the first query.
    pub timeout: Option<Duration>,
    /// Consecutive failed status queries tolerated before giving up.
    pub max_transport_retries: usize,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            max_interval: Duration::from_secs(60),
            timeout: None,
            max_transport_retries: 5,
        }
    }
}

impl PollPolicy {
    /// Fixed pause, no backoff.
    pub fn fixed(interval: Duration) -> Self {
        Self {
            interval,
            max_interval: interval,
            ..Self::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_max_transport_retries(mut self, retries: usize) -> Self {
        self.max_transport_retries = retries;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalStatus {
    Done,
    Failed { status: String },
}

/// Receives status updates while a task is being awaited. Purely advisory.
pub trait ProgressObserver {
    fn on_status(&mut self, _handle: &TaskHandle, _status: &TaskStatus) {}

    /// Called with a percentage that never decreases for a given wait.
    fn on_progress(&mut self, _handle: &TaskHandle, _percent: u8) {}
}

impl<F: FnMut(u8)> ProgressObserver for F {
    fn on_progress(&mut self, _handle: &TaskHandle, percent: u8) {
        self(percent)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressObserver for NoProgress {}

/// Renders task progress on the terminal.
pub struct ProgressBarObserver {
    bar: ProgressBar,
}

impl ProgressBarObserver {
    pub fn new() -> Self {
        let bar = ProgressBar::new(100);
        if let Ok(style) = ProgressStyle::with_template("{spinner:.green} {msg} {wide_bar} {pos}%") {
            bar.set_style(style.progress_chars("=>-"));
        }
        Self { bar }
    }
}

impl Default for ProgressBarObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressObserver for ProgressBarObserver {
    fn on_status(&mut self, handle: &TaskHandle, status: &TaskStatus) {
        self.bar.set_message(format!("task {} {}", handle, status.label()));
        if status.is_terminal() {
            self.bar.finish_and_clear();
        } else {
            self.bar.tick();
        }
    }

    fn on_progress(&mut self, _handle: &TaskHandle, percent: u8) {
        self.bar.set_position(u64::from(percent));
    }
}

pub struct TaskStatusPoller {
    session: Session,
    policy: PollPolicy,
    clock: Arc<dyn Clock>,
    cancel: CancellationToken,
}

impl TaskStatusPoller {
    pub fn new(session: Session) -> Self {
        Self {
            session,
            policy: PollPolicy::default(),
            clock: Arc::new(SystemClock),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_policy(mut self, policy: PollPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// One status query.
    pub fn status(&self, handle: &TaskHandle) -> Result<TaskStatus> {
        let resp = self.session.get(&format!("task/{}", handle))?;
        if !resp.is_success() {
            let status = resp.status;
            let body = resp.text().unwrap_or_default();
            return Err(Error::RequestFailed {
                context: format!("querying status of task {}", handle),
                status,
                message: describe_remote_error(status, &body),
            });
        }
        let reply: StatusReply = resp.json("reading task status")?;
        Ok(reply.into())
    }

    /// Polls until the task is done or has failed.
    ///
    /// A remote `error` status is returned as [`TerminalStatus::Failed`]
    /// without retrying. Status queries failing with a retryable error (see
    /// [`Error::is_retryable`]) are retried up to `max_transport_retries`
    /// times in a row, then surface as [`Error::PollingTransport`]; any
    /// other error is returned at once. Expiry of the deadline yields
    /// [`Error::Timeout`], cancellation [`Error::Cancelled`].
    pub fn await_completion(
        &self,
        handle: &TaskHandle,
        observer: &mut dyn ProgressObserver,
    ) -> Result<TerminalStatus> {
        let started = self.clock.now();
        let mut delay = self.policy.interval.max(MIN_POLL_INTERVAL);
        let mut failures = 0usize;
        let mut last_label: Option<String> = None;
        let mut best_progress: Option<u8> = None;

        loop {
            self.checkpoint(handle, started)?;

            match self.status(handle) {
                Ok(status) => {
                    failures = 0;
                    if last_label.as_deref() != Some(status.label()) {
                        last_label = Some(status.label().to_string());
                        log::info!("task {} status: {}", handle, status);
                    } else {
                        log::debug!("task {} status: {}", handle, status);
                    }

                    observer.on_status(handle, &status);
                    if let Some(percent) = status.progress() {
                        if best_progress.is_none_or(|best| percent > best) {
                            best_progress = Some(percent);
                            observer.on_progress(handle, percent);
                        }
                    }

                    match status {
                        TaskStatus::Done => return Ok(TerminalStatus::Done),
                        TaskStatus::Error { status } => {
                            log::warn!("task {} failed with status {}", handle, status);
                            return Ok(TerminalStatus::Failed { status });
                        }
                        _ => {}
                    }
                }
                Err(err) if !err.is_retryable() => return Err(err),
                Err(err) => {
                    failures += 1;
                    if failures > self.policy.max_transport_retries {
                        return Err(Error::PollingTransport {
                            task_id: handle.to_string(),
                            attempts: failures,
                            source: Box::new(err),
                        });
                    }
                    log::warn!(
                        "status query for task {} failed ({}/{}): {}",
                        handle,
                        failures,
                        self.policy.max_transport_retries,
                        err
                    );
                }
            }

            self.checkpoint(handle, started)?;
            let pause = match self.remaining(started) {
                Some(left) => delay.min(left),
                None => delay,
            };
            self.clock.sleep(pause);
            delay = backoff(
                delay,
                self.policy.max_interval.max(self.policy.interval).max(MIN_POLL_INTERVAL),
            );
        }
    }

    fn remaining(&self, started: Instant) -> Option<Duration> {
        self.policy
            .timeout
            .map(|t| t.saturating_sub(self.clock.now().saturating_duration_since(started)))
    }

    fn checkpoint(&self, handle: &TaskHandle, started: Instant) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled {
                task_id: handle.to_string(),
            });
        }
        if let Some(timeout) = self.policy.timeout {
            let elapsed = self.clock.now().saturating_duration_since(started);
            if elapsed >= timeout {
                return Err(Error::Timeout {
                    task_id: handle.to_string(),
                    elapsed,
                });
            }
        }
        Ok(())
    }
}
