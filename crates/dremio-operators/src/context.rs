use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::watch;

use crate::error::{OperatorError, OperatorResult};

/// The state shared between the host and a running operator.
pub struct TaskContext {
    task_id: String,
    cancel: watch::Sender<bool>,
    values: Mutex<HashMap<String, Value>>,
}

impl TaskContext {
    pub fn new(task_id: impl Into<String>) -> Self {
        let (cancel, _) = watch::channel(false);
        Self {
            task_id: task_id.into(),
            cancel,
            values: Mutex::new(HashMap::new()),
        }
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Asks the operator to stop at its next suspension point.
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Resolves once [`TaskContext::cancel`] has been called.
    pub fn cancelled(&self) -> impl std::future::Future<Output = ()> + Send + 'static {
        let mut receiver = self.cancel.subscribe();
        async move {
            let result = receiver.wait_for(|cancelled| *cancelled).await.map(|_| ());
            if result.is_err() {
                // The context is gone, so there is nobody left to cancel.
                std::future::pending::<()>().await;
            }
        }
    }

    /// Publishes a value for downstream tasks.
    pub fn xcom_push(&self, key: impl Into<String>, value: Value) -> OperatorResult<()> {
        let mut values = self
            .values
            .lock()
            .map_err(|e| OperatorError::internal(e.to_string()))?;
        values.insert(key.into(), value);
        Ok(())
    }

    pub fn xcom_pull(&self, key: &str) -> OperatorResult<Option<Value>> {
        let values = self
            .values
            .lock()
            .map_err(|e| OperatorError::internal(e.to_string()))?;
        Ok(values.get(key).cloned())
    }
}

/// A unit of work run by the host against a Dremio connection.
#[async_trait]
pub trait Operator: Send + Sync {
    /// The name under which the operator is registered.
    fn name(&self) -> &'static str;

    async fn execute(&self, context: &TaskContext) -> OperatorResult<Value>;
}
