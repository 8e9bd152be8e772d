use async_trait::async_trait;
use dremio_client::{
    DremioClient, PollOptions, PollOutcome, Poller, ReflectionRefreshStatus, ReflectionSpec,
    ReflectionStatusProbe, StatusProbe,
};
use log::{info, warn};
use serde_json::{json, Map, Value};

use crate::context::{Operator, TaskContext};
use crate::error::{OperatorError, OperatorResult};
use crate::hook::DremioHook;

const PHYSICAL_DATASET: &str = "PHYSICAL_DATASET";
const VIRTUAL_DATASET: &str = "VIRTUAL_DATASET";

/// Keys of an existing reflection that never count as a change.
const COMPARISON_IGNORED_KEYS: &[&str] = &[
    "id",
    "status",
    "currentSizeBytes",
    "totalSizeBytes",
    "createdAt",
    "updatedAt",
    "entity_type",
    "datasetId",
    "tag",
];

/// Keys of an existing reflection that Dremio rejects in an update.
const UPDATE_IGNORED_KEYS: &[&str] = &[
    "status",
    "currentSizeBytes",
    "totalSizeBytes",
    "createdAt",
    "updatedAt",
];

/// The acceleration refresh policy applied when none is given.
pub fn default_refresh_settings() -> Value {
    json!({
        "activePolicyType": "NEVER",
        "refreshPeriodMs": 3600000,
        "refreshSchedule": "0 0 8 * * ?",
        "gracePeriodMs": 0,
        "method": "AUTO",
        "neverExpire": true,
        "neverRefresh": true,
    })
}

/// Creates a reflection on a dataset, or updates the reflection with the same name.
///
/// When the existing reflection already matches the spec, a refresh is
/// triggered instead. The output is the reflection id.
pub struct CreateReflectionOperator {
    hook: DremioHook,
    source: String,
    reflection_spec: ReflectionSpec,
    auto_inference: bool,
    wait_for_completion: bool,
    poll: PollOptions,
    sql_query: Option<String>,
    reflection_queue: Option<String>,
    refresh_settings: Option<Value>,
}

impl CreateReflectionOperator {
    pub fn new(hook: DremioHook, source: impl Into<String>, reflection_spec: ReflectionSpec) -> Self {
        Self {
            hook,
            source: source.into(),
            reflection_spec,
            auto_inference: false,
            wait_for_completion: false,
            poll: PollOptions::default(),
            sql_query: None,
            reflection_queue: None,
            refresh_settings: None,
        }
    }

    /// Uses every field of the dataset as a display field.
    pub fn with_auto_inference(mut self, auto_inference: bool) -> Self {
        self.auto_inference = auto_inference;
        self
    }

    pub fn with_wait_for_completion(mut self, wait_for_completion: bool) -> Self {
        self.wait_for_completion = wait_for_completion;
        self
    }

    pub fn with_poll_options(mut self, poll: PollOptions) -> Self {
        self.poll = poll;
        self
    }

    pub fn with_sql_query(mut self, sql_query: Option<String>) -> Self {
        self.sql_query = sql_query.filter(|s| !s.is_empty());
        self
    }

    pub fn with_reflection_queue(mut self, queue: Option<String>) -> Self {
        self.reflection_queue = queue.filter(|s| !s.is_empty());
        self
    }

    pub fn with_refresh_settings(mut self, settings: Option<Value>) -> Self {
        self.refresh_settings = settings.filter(is_truthy);
        self
    }

    fn validate_spec(&self) -> OperatorResult<()> {
        for key in ["name", "type"] {
            if self.reflection_spec.get(key).is_none() {
                return Err(OperatorError::invalid(format!(
                    "key {key} is mandatory but not present in the reflection spec"
                )));
            }
        }
        let is_raw = self
            .reflection_spec
            .get_str("type")
            .is_some_and(|t| t.eq_ignore_ascii_case("raw"));
        if is_raw && !self.has_display_fields() && !self.auto_inference {
            return Err(OperatorError::invalid(
                "auto_inference is false and no displayFields provided in the reflection spec, \
                 which is mandatory for creating raw reflections",
            ));
        }
        Ok(())
    }

    fn validate_dataset(&self, dataset_type: Option<&str>) -> OperatorResult<()> {
        if dataset_type == Some(VIRTUAL_DATASET) && self.sql_query.is_none() {
            return Err(OperatorError::invalid(format!(
                "virtual dataset {} requires a SQL query to be defined",
                self.source
            )));
        }
        Ok(())
    }

    fn has_display_fields(&self) -> bool {
        self.reflection_spec
            .get("displayFields")
            .is_some_and(is_truthy)
    }

    /// The spec sent to Dremio, bound to the dataset.
    fn desired_spec(&self, dataset: &Value, dataset_id: &str) -> ReflectionSpec {
        let mut spec = self.reflection_spec.clone();
        spec.insert("datasetId", json!(dataset_id));
        spec.insert("entityType", json!("reflection"));
        if self.auto_inference {
            if self.has_display_fields() {
                warn!("auto inferred fields override the displayFields of the reflection spec");
            }
            let fields: Vec<Value> = dataset
                .get("fields")
                .and_then(Value::as_array)
                .map(|fields| {
                    fields
                        .iter()
                        .filter_map(|field| field.get("name"))
                        .map(|name| json!({ "name": name }))
                        .collect()
                })
                .unwrap_or_default();
            info!("inferred display fields: {}", Value::Array(fields.clone()));
            spec.insert("displayFields", Value::Array(fields));
        }
        spec
    }

    async fn apply_refresh_settings(
        &self,
        client: &DremioClient,
        dataset: &Value,
        dataset_id: &str,
    ) -> OperatorResult<()> {
        let settings = self
            .refresh_settings
            .clone()
            .unwrap_or_else(default_refresh_settings);
        let body = json!({
            "entityType": "dataset",
            "id": dataset_id,
            "type": dataset.get("type"),
            "path": dataset.get("path"),
            "accelerationRefreshPolicy": settings,
        });
        client.update_catalog(dataset_id, &body).await?;
        Ok(())
    }

    async fn create_or_update(
        &self,
        client: &DremioClient,
        dataset_id: &str,
        desired: &ReflectionSpec,
    ) -> OperatorResult<String> {
        let name = self.reflection_spec.name();
        let current = client
            .get_dataset_reflections(dataset_id)
            .await?
            .into_iter()
            .find(|r| r.get("name").and_then(Value::as_str) == name);

        let Some(current) = current else {
            info!(
                "creating reflection {} for {}",
                name.unwrap_or_default(),
                self.source
            );
            return Ok(client.upsert_reflection(desired).await?.id);
        };

        info!(
            "reflection {} already exists for {}",
            name.unwrap_or_default(),
            self.source
        );
        let updates = reflection_updates(&current, desired);
        if updates.is_empty() {
            info!("no updates for the reflection, triggering a refresh");
            client.trigger_reflection_refresh(dataset_id).await?;
            return current
                .get("id")
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| OperatorError::failed("existing reflection has no id"));
        }

        info!("updates available: {}", Value::Object(updates.clone()));
        let spec = ReflectionSpec::new(updated_reflection_body(current, updates));
        Ok(client.upsert_reflection(&spec).await?.id)
    }

    async fn wait(
        &self,
        client: &DremioClient,
        reflection_id: &str,
        context: &TaskContext,
    ) -> OperatorResult<()> {
        let probe = ReflectionStatusProbe::new(client, reflection_id);
        let outcome = Poller::new(self.poll)
            .poll_until(&probe, context.cancelled())
            .await;
        match outcome {
            PollOutcome::Succeeded { .. } => {
                info!("reflection {reflection_id} has completed successfully");
                Ok(())
            }
            PollOutcome::Failed {
                observation: Some(observation),
                ..
            } if observation.state == ReflectionRefreshStatus::Disabled => Err(
                OperatorError::failed(format!("{reflection_id} reflection has been disabled")),
            ),
            PollOutcome::Failed {
                observation: Some(observation),
                ..
            } => Err(OperatorError::failed(format!(
                "reflection refresh for {reflection_id} has failed with status {}",
                observation.state
            ))),
            outcome => {
                outcome.into_result(&probe.describe())?;
                Ok(())
            }
        }
    }
}

#[async_trait]
impl Operator for CreateReflectionOperator {
    fn name(&self) -> &'static str {
        "create_reflection"
    }

    async fn execute(&self, context: &TaskContext) -> OperatorResult<Value> {
        self.validate_spec()?;
        let client = self.hook.client().await?;

        let dataset = client.get_catalog_by_path(&self.source).await?;
        let dataset_id = dataset
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| OperatorError::failed(format!("dataset {} has no id", self.source)))?
            .to_string();
        let dataset_type = dataset.get("type").and_then(Value::as_str);
        self.validate_dataset(dataset_type)?;

        if dataset_type == Some(PHYSICAL_DATASET) {
            client.refresh_table_metadata(&self.source, None).await?;
        }
        if let Some(queue) = &self.reflection_queue {
            let sql = format!("ALTER DATASET {dataset_id} QUEUE {queue}");
            client.execute_sql(&sql, None).await?;
        }
        self.apply_refresh_settings(client, &dataset, &dataset_id).await?;

        let desired = self.desired_spec(&dataset, &dataset_id);
        let reflection_id = self.create_or_update(client, &dataset_id, &desired).await?;
        context.xcom_push("reflection_id", json!(reflection_id))?;

        if self.wait_for_completion {
            self.wait(client, &reflection_id, context).await?;
        } else {
            warn!("not waiting for the refresh of reflection {reflection_id}");
        }
        Ok(json!(reflection_id))
    }
}

/// Whether a value is anything but null, false, zero or empty.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(fields) => !fields.is_empty(),
    }
}

fn sorted_by_name(mut items: Vec<Value>) -> Vec<Value> {
    items.sort_by(|a, b| {
        let a = a.get("name").and_then(Value::as_str);
        let b = b.get("name").and_then(Value::as_str);
        a.cmp(&b)
    });
    items
}

/// Returns the keys of `desired` whose value differs from a non-empty value in `current`.
///
/// Lists are compared as sets of named fields.
fn reflection_updates(current: &Value, desired: &ReflectionSpec) -> Map<String, Value> {
    let mut current = current.as_object().cloned().unwrap_or_default();
    for key in COMPARISON_IGNORED_KEYS {
        current.remove(*key);
    }

    let mut updates = Map::new();
    for (key, new_value) in desired.fields() {
        let (current_value, new_value) = match new_value {
            Value::Array(items) => {
                let current_items = current
                    .get(key)
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default();
                (
                    Value::Array(sorted_by_name(current_items)),
                    Value::Array(sorted_by_name(items.clone())),
                )
            }
            _ => (
                current.get(key).cloned().unwrap_or(Value::Null),
                new_value.clone(),
            ),
        };
        if is_truthy(&current_value) && current_value != new_value {
            updates.insert(key.clone(), new_value);
        }
    }
    updates
}

fn updated_reflection_body(current: Value, updates: Map<String, Value>) -> Map<String, Value> {
    let mut body = match current {
        Value::Object(fields) => fields,
        _ => Map::new(),
    };
    for key in UPDATE_IGNORED_KEYS {
        body.remove(*key);
    }
    body.extend(updates);
    body
}
