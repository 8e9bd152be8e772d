use async_trait::async_trait;
use dremio_client::error::DremioError;
use dremio_client::{JobStatusProbe, PollOptions, PollOutcome, Poller, StatusProbe};
use log::{error, info};
use serde_json::{json, Value};

use crate::context::{Operator, TaskContext};
use crate::error::{OperatorError, OperatorResult};
use crate::hook::DremioHook;

/// Waits for a Dremio job to finish.
///
/// The output holds the job id, its final state and the last job document.
pub struct JobSensor {
    hook: DremioHook,
    job_id: String,
    poll: PollOptions,
}

impl JobSensor {
    pub fn new(hook: DremioHook, job_id: impl Into<String>) -> Self {
        Self {
            hook,
            job_id: job_id.into(),
            poll: PollOptions::default(),
        }
    }

    pub fn with_poll_options(mut self, poll: PollOptions) -> Self {
        self.poll = poll;
        self
    }
}

#[async_trait]
impl Operator for JobSensor {
    fn name(&self) -> &'static str {
        "job_sensor"
    }

    async fn execute(&self, context: &TaskContext) -> OperatorResult<Value> {
        let client = self.hook.client().await?;
        let probe = JobStatusProbe::new(client, self.job_id.as_str());
        let outcome = Poller::new(self.poll)
            .poll_until(&probe, context.cancelled())
            .await;
        match outcome {
            PollOutcome::Succeeded { observation, probes } => {
                info!(
                    "job {} has succeeded with state {} after {probes} probes",
                    self.job_id, observation.state
                );
                context.xcom_push("job_state", json!(observation.state.to_string()))?;
                Ok(json!({
                    "job_id": self.job_id,
                    "state": observation.state.to_string(),
                    "job": observation.body,
                }))
            }
            PollOutcome::Failed { reason, .. } => {
                error!("job {} has failed: {reason}", self.job_id);
                Err(OperatorError::failed(reason))
            }
            PollOutcome::TimedOut { timeout, .. } => Err(DremioError::TimedOut(timeout).into()),
            PollOutcome::Interrupted { .. } => Err(DremioError::Interrupted(format!(
                "waiting for {} was interrupted",
                probe.describe()
            ))
            .into()),
        }
    }
}
