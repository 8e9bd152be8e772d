use std::future::Future;
use std::pin::pin;
use std::time::Duration;

use async_trait::async_trait;
use dremio_common::config::PollConfig;
use dremio_telemetry::common::{SpanAttribute, SpanKind};
use fastrace::future::FutureExt;
use fastrace::Span;
use log::{info, warn};
use serde_json::Value;
use tokio::time::Instant;

use crate::client::DremioClient;
use crate::error::{DremioError, DremioResult};
use crate::status::{JobState, ReflectionRefreshStatus, StateClass, TerminalState};

/// A state read from Dremio along with the response body it came from.
#[derive(Debug, Clone)]
pub struct Observation<S> {
    pub state: S,
    pub body: Value,
}

impl<S> Observation<S> {
    pub fn error_message(&self) -> Option<&str> {
        self.body
            .get("errorMessage")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }
}

/// Something the [`Poller`] can ask for the current state of a long-running operation.
#[async_trait]
pub trait StatusProbe: Send + Sync {
    type State: TerminalState;

    /// A short description of the polled subject, for logs and errors.
    fn describe(&self) -> String;

    async fn probe(&self) -> DremioResult<Observation<Self::State>>;
}

pub struct JobStatusProbe<'a> {
    client: &'a DremioClient,
    job_id: String,
}

impl<'a> JobStatusProbe<'a> {
    pub fn new(client: &'a DremioClient, job_id: impl Into<String>) -> Self {
        Self {
            client,
            job_id: job_id.into(),
        }
    }
}

#[async_trait]
impl StatusProbe for JobStatusProbe<'_> {
    type State = JobState;

    fn describe(&self) -> String {
        format!("job {}", self.job_id)
    }

    async fn probe(&self) -> DremioResult<Observation<JobState>> {
        let status = self.client.get_job_status(&self.job_id).await?;
        Ok(Observation {
            state: status.state,
            body: status.body,
        })
    }
}

pub struct ReflectionStatusProbe<'a> {
    client: &'a DremioClient,
    reflection_id: String,
}

impl<'a> ReflectionStatusProbe<'a> {
    pub fn new(client: &'a DremioClient, reflection_id: impl Into<String>) -> Self {
        Self {
            client,
            reflection_id: reflection_id.into(),
        }
    }
}

#[async_trait]
impl StatusProbe for ReflectionStatusProbe<'_> {
    type State = ReflectionRefreshStatus;

    fn describe(&self) -> String {
        format!("reflection {}", self.reflection_id)
    }

    async fn probe(&self) -> DremioResult<Observation<ReflectionRefreshStatus>> {
        let body = self.client.get_reflection(&self.reflection_id).await?;
        let state = ReflectionRefreshStatus::from_reflection(&body)?.ok_or_else(|| {
            DremioError::InvalidResponse(format!(
                "reflection {} has no combined status",
                self.reflection_id
            ))
        })?;
        Ok(Observation { state, body })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOptions {
    pub interval: Duration,
    pub timeout: Duration,
    /// The number of consecutive transient errors tolerated before giving up.
    pub max_transient_errors: usize,
}

impl PollOptions {
    pub fn from_config(config: &PollConfig) -> Self {
        Self {
            interval: config.interval(),
            timeout: config.timeout(),
            max_transient_errors: config.max_transient_errors,
        }
    }

    pub fn with_interval(self, interval: Duration) -> Self {
        Self { interval, ..self }
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        Self { timeout, ..self }
    }

    /// Rejects a zero interval or timeout.
    pub fn validate(&self) -> DremioResult<()> {
        if self.interval.is_zero() {
            return Err(DremioError::InvalidArgument(
                "the poll interval must be positive".to_string(),
            ));
        }
        if self.timeout.is_zero() {
            return Err(DremioError::InvalidArgument(
                "the poll timeout must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for PollOptions {
    fn default() -> Self {
        Self::from_config(&PollConfig::default())
    }
}

#[derive(Debug)]
pub enum PollOutcome<S> {
    Succeeded {
        observation: Observation<S>,
        probes: usize,
    },
    /// The subject reached a failure state, or polling hit an error it cannot recover from.
    Failed {
        observation: Option<Observation<S>>,
        reason: String,
        probes: usize,
    },
    TimedOut {
        timeout: Duration,
        last_state: Option<S>,
        probes: usize,
    },
    Interrupted {
        probes: usize,
    },
}

impl<S: TerminalState> PollOutcome<S> {
    pub fn probes(&self) -> usize {
        match self {
            PollOutcome::Succeeded { probes, .. }
            | PollOutcome::Failed { probes, .. }
            | PollOutcome::TimedOut { probes, .. }
            | PollOutcome::Interrupted { probes } => *probes,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, PollOutcome::Succeeded { .. })
    }

    pub fn into_result(self, subject: &str) -> DremioResult<Observation<S>> {
        match self {
            PollOutcome::Succeeded { observation, .. } => Ok(observation),
            PollOutcome::Failed {
                observation,
                reason,
                ..
            } => Err(DremioError::JobFailed {
                subject: subject.to_string(),
                state: observation
                    .map(|o| o.state.to_string())
                    .unwrap_or_else(|| "UNKNOWN".to_string()),
                message: reason,
            }),
            PollOutcome::TimedOut { timeout, .. } => Err(DremioError::TimedOut(timeout)),
            PollOutcome::Interrupted { .. } => Err(DremioError::Interrupted(format!(
                "polling {subject} was interrupted"
            ))),
        }
    }
}

/// Probes a subject at a fixed interval until it terminates or the timeout elapses.
#[derive(Debug, Clone, Default)]
pub struct Poller {
    options: PollOptions,
}

impl Poller {
    pub fn new(options: PollOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &PollOptions {
        &self.options
    }

    pub async fn poll<P>(&self, probe: &P) -> PollOutcome<P::State>
    where
        P: StatusProbe + ?Sized,
    {
        self.poll_until(probe, std::future::pending()).await
    }

    /// Polls until the subject terminates, the timeout elapses, or `cancel` resolves.
    ///
    /// The timeout also bounds a probe that does not return, and the last wait is
    /// shortened so that the subject is probed once more at the deadline.
    pub async fn poll_until<P, C>(&self, probe: &P, cancel: C) -> PollOutcome<P::State>
    where
        P: StatusProbe + ?Sized,
        C: Future<Output = ()>,
    {
        let subject = probe.describe();
        let span = Span::enter_with_local_parent(format!("poll {subject}")).with_properties(|| {
            [
                (SpanAttribute::SPAN_KIND, SpanKind::INTERNAL.to_string()),
                (SpanAttribute::DREMIO_POLL_SUBJECT, subject.clone()),
                (
                    SpanAttribute::DREMIO_POLL_INTERVAL_SECS,
                    self.options.interval.as_secs().to_string(),
                ),
                (
                    SpanAttribute::DREMIO_POLL_TIMEOUT_SECS,
                    self.options.timeout.as_secs().to_string(),
                ),
            ]
        });
        self.poll_loop(probe, subject, cancel).in_span(span).await
    }

    async fn poll_loop<P, C>(&self, probe: &P, subject: String, cancel: C) -> PollOutcome<P::State>
    where
        P: StatusProbe + ?Sized,
        C: Future<Output = ()>,
    {
        if let Err(e) = self.options.validate() {
            return PollOutcome::Failed {
                observation: None,
                reason: e.to_string(),
                probes: 0,
            };
        }

        let mut cancel = pin!(cancel);
        let start = Instant::now();
        let deadline = start.checked_add(self.options.timeout);
        let mut probes = 0;
        let mut transient_errors = 0;
        let mut last_state = None;

        loop {
            let result = tokio::select! {
                biased;
                () = &mut cancel => {
                    info!("polling {subject} was interrupted");
                    return PollOutcome::Interrupted { probes };
                }
                x = probe.probe() => x,
                () = sleep_until(deadline) => {
                    warn!(
                        "{subject} did not respond within {} seconds",
                        self.options.timeout.as_secs()
                    );
                    return PollOutcome::TimedOut {
                        timeout: self.options.timeout,
                        last_state,
                        probes: probes + 1,
                    };
                }
            };
            probes += 1;

            match result {
                Ok(observation) => {
                    transient_errors = 0;
                    let state = &observation.state;
                    match state.class() {
                        StateClass::Succeeded => {
                            info!("{subject} has succeeded with state {state}");
                            return PollOutcome::Succeeded {
                                observation,
                                probes,
                            };
                        }
                        StateClass::Failed => {
                            let reason = match observation.error_message() {
                                Some(message) => message.to_string(),
                                None => format!("{subject} has failed with state {state}"),
                            };
                            warn!("{subject} has failed with state {state}: {reason}");
                            return PollOutcome::Failed {
                                observation: Some(observation),
                                reason,
                                probes,
                            };
                        }
                        StateClass::Pending => {
                            info!("{subject} has not completed, current state is {state}");
                            last_state = Some(observation.state);
                        }
                    }
                }
                Err(DremioError::NotFound(body)) => {
                    return PollOutcome::Failed {
                        observation: None,
                        reason: format!("{subject} was not found: {body}"),
                        probes,
                    };
                }
                Err(e) if e.is_transient() => {
                    transient_errors += 1;
                    if transient_errors > self.options.max_transient_errors {
                        return PollOutcome::Failed {
                            observation: None,
                            reason: format!(
                                "giving up on {subject} after {transient_errors} consecutive errors: {e}"
                            ),
                            probes,
                        };
                    }
                    warn!("failed to probe {subject} ({transient_errors}): {e}");
                }
                Err(e) => {
                    return PollOutcome::Failed {
                        observation: None,
                        reason: e.to_string(),
                        probes,
                    };
                }
            }

            let now = Instant::now();
            if deadline.is_some_and(|deadline| now >= deadline) {
                warn!(
                    "{subject} has not completed after {} seconds",
                    self.options.timeout.as_secs()
                );
                return PollOutcome::TimedOut {
                    timeout: self.options.timeout,
                    last_state,
                    probes,
                };
            }

            let wake = match (now.checked_add(self.options.interval), deadline) {
                (Some(next), Some(deadline)) => Some(next.min(deadline)),
                (next, deadline) => next.or(deadline),
            };
            tokio::select! {
                biased;
                () = &mut cancel => {
                    info!("polling {subject} was interrupted");
                    return PollOutcome::Interrupted { probes };
                }
                () = sleep_until(wake) => {}
            }
        }
    }
}

/// Sleeps until the instant, or forever when there is none.
async fn sleep_until(instant: Option<Instant>) {
    match instant {
        Some(instant) => tokio::time::sleep_until(instant).await,
        None => std::future::pending().await,
    }
}

impl DremioClient {
    pub async fn poll_job(&self, job_id: &str, options: PollOptions) -> PollOutcome<JobState> {
        Poller::new(options)
            .poll(&JobStatusProbe::new(self, job_id))
            .await
    }

    /// Waits for a reflection refresh to reach a terminal status and returns that status.
    ///
    /// A failure status is returned as is; errors are reserved for timeouts and
    /// requests that could not be completed.
    pub async fn wait_for_reflection_completion(
        &self,
        reflection_id: &str,
        options: PollOptions,
    ) -> DremioResult<ReflectionRefreshStatus> {
        let probe = ReflectionStatusProbe::new(self, reflection_id);
        match Poller::new(options).poll(&probe).await {
            PollOutcome::Failed {
                observation: Some(observation),
                ..
            } => Ok(observation.state),
            outcome => outcome
                .into_result(&probe.describe())
                .map(|observation| observation.state),
        }
    }
}
