use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use dremio_client::error::DremioError;
use dremio_client::SourceSpec;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::{Operator, TaskContext};
use crate::error::{OperatorError, OperatorResult};
use crate::hook::DremioHook;

/// What to do when a source with the same name already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictPolicy {
    #[default]
    Fail,
    /// Succeed with the existing source.
    Ignore,
}

impl FromStr for ConflictPolicy {
    type Err = OperatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fail" => Ok(ConflictPolicy::Fail),
            "ignore" => Ok(ConflictPolicy::Ignore),
            _ => Err(OperatorError::invalid(format!(
                "invalid conflict policy '{s}', expected either 'fail' or 'ignore'"
            ))),
        }
    }
}

impl fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictPolicy::Fail => write!(f, "fail"),
            ConflictPolicy::Ignore => write!(f, "ignore"),
        }
    }
}

/// Creates a Dremio source and outputs the catalog entry returned by Dremio.
pub struct CreateSourceOperator {
    hook: DremioHook,
    source_spec: SourceSpec,
    conflict_policy: ConflictPolicy,
}

impl CreateSourceOperator {
    pub fn new(hook: DremioHook, source_spec: SourceSpec) -> Self {
        Self {
            hook,
            source_spec,
            conflict_policy: ConflictPolicy::default(),
        }
    }

    pub fn with_conflict_policy(mut self, policy: ConflictPolicy) -> Self {
        self.conflict_policy = policy;
        self
    }
}

#[async_trait]
impl Operator for CreateSourceOperator {
    fn name(&self) -> &'static str {
        "create_source"
    }

    async fn execute(&self, context: &TaskContext) -> OperatorResult<Value> {
        let name = self.source_spec.name().unwrap_or_default();
        info!(
            "creating source {name} of type {}",
            self.source_spec.get_str("type").unwrap_or_default()
        );
        let client = self.hook.client().await?;

        let response = match client.create_source(&self.source_spec).await {
            Ok(summary) => summary.body,
            Err(DremioError::Conflict(body)) if self.conflict_policy == ConflictPolicy::Ignore => {
                warn!("source {name} already exists: {body}");
                if name.is_empty() {
                    return Err(OperatorError::invalid(
                        "cannot look up an existing source without a name",
                    ));
                }
                client.get_catalog_by_name(name).await?
            }
            Err(e) => return Err(e.into()),
        };
        context.xcom_push("source_response", response.clone())?;
        Ok(response)
    }
}
