use std::fmt;
use std::str::FromStr;

use log::warn;
use serde_json::Value;

use crate::error::{DremioError, DremioResult};

/// How a polled state relates to the end of the polled operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateClass {
    Pending,
    Succeeded,
    Failed,
}

/// A state reported by Dremio for something that eventually terminates.
pub trait TerminalState: fmt::Display + fmt::Debug + Clone + Send + Sync + 'static {
    fn class(&self) -> StateClass;

    fn is_terminal(&self) -> bool {
        self.class() != StateClass::Pending
    }
}

macro_rules! string_enum {
    ($(#[$meta:meta])* $vis:vis enum $name:ident { $($variant:ident => $text:literal),* $(,)? }) => {
        $(#[$meta])*
        $vis enum $name {
            $($variant,)*
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant,)*];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)*
                }
            }

            fn parse(s: &str) -> Option<Self> {
                match s {
                    $($text => Some($name::$variant),)*
                    _ => None,
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

string_enum! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub enum KnownJobState {
        NotSubmitted => "NOT_SUBMITTED",
        Starting => "STARTING",
        Running => "RUNNING",
        Completed => "COMPLETED",
        Canceled => "CANCELED",
        Failed => "FAILED",
        CancellationRequested => "CANCELLATION_REQUESTED",
        Planning => "PLANNING",
        Pending => "PENDING",
        MetadataRetrieval => "METADATA_RETRIEVAL",
        Queued => "QUEUED",
        EngineStart => "ENGINE_START",
        ExecutionPlanning => "EXECUTION_PLANNING",
        InvalidState => "INVALID_STATE",
    }
}

/// The `jobState` of a Dremio job.
///
/// States this crate does not know about are kept verbatim and treated as
/// non-terminal, so that a newer server does not break polling.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum JobState {
    Known(KnownJobState),
    Other(String),
}

impl JobState {
    pub const fn known(state: KnownJobState) -> Self {
        JobState::Known(state)
    }
}

impl FromStr for JobState {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match KnownJobState::parse(s) {
            Some(state) => JobState::Known(state),
            None => JobState::Other(s.to_string()),
        })
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Known(state) => write!(f, "{state}"),
            JobState::Other(state) => f.write_str(state),
        }
    }
}

impl TerminalState for JobState {
    fn class(&self) -> StateClass {
        match self {
            JobState::Known(KnownJobState::Completed) => StateClass::Succeeded,
            JobState::Known(
                KnownJobState::Canceled | KnownJobState::Failed | KnownJobState::InvalidState,
            ) => StateClass::Failed,
            JobState::Known(_) => StateClass::Pending,
            JobState::Other(state) => {
                warn!("unrecognized job state {state}, treating it as non-terminal");
                StateClass::Pending
            }
        }
    }
}

/// The state of a job together with the response it was read from.
#[derive(Debug, Clone)]
pub struct JobStatus {
    pub state: JobState,
    pub body: Value,
}

impl JobStatus {
    pub fn from_body(body: Value) -> DremioResult<Self> {
        let state = body
            .get("jobState")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                DremioError::InvalidResponse("job response does not contain 'jobState'".to_string())
            })?;
        let state = match state.parse() {
            Ok(state) => state,
            Err(e) => match e {},
        };
        Ok(Self { state, body })
    }

    pub fn error_message(&self) -> Option<&str> {
        self.body.get("errorMessage").and_then(Value::as_str)
    }
}

string_enum! {
    /// The combined refresh status of a reflection.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub enum ReflectionRefreshStatus {
        CanAccelerate => "CAN_ACCELERATE",
        CanAccelerateWithFailures => "CAN_ACCELERATE_WITH_FAILURES",
        CannotAccelerateManual => "CANNOT_ACCELERATE_MANUAL",
        CannotAccelerateScheduled => "CANNOT_ACCELERATE_SCHEDULED",
        Disabled => "DISABLED",
        Expired => "EXPIRED",
        Failed => "FAILED",
        Invalid => "INVALID",
        Incomplete => "INCOMPLETE",
        Refreshing => "REFRESHING",
    }
}

impl FromStr for ReflectionRefreshStatus {
    type Err = DremioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| {
            DremioError::InvalidArgument(format!("unknown reflection refresh status: {s}"))
        })
    }
}

impl ReflectionRefreshStatus {
    /// Reads `status.combinedStatus` from a reflection document.
    pub fn from_reflection(body: &Value) -> DremioResult<Option<Self>> {
        body.pointer("/status/combinedStatus")
            .and_then(Value::as_str)
            .map(str::parse)
            .transpose()
    }
}

impl TerminalState for ReflectionRefreshStatus {
    fn class(&self) -> StateClass {
        match self {
            ReflectionRefreshStatus::CanAccelerate => StateClass::Succeeded,
            ReflectionRefreshStatus::Incomplete | ReflectionRefreshStatus::Refreshing => {
                StateClass::Pending
            }
            _ => StateClass::Failed,
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use serde_json::json;

    use super::*;

    #[test]
    fn test_job_state_classes() {
        let class = |s: &str| s.parse::<JobState>().unwrap().class();

        assert_eq!(class("COMPLETED"), StateClass::Succeeded);
        for state in ["CANCELED", "FAILED", "INVALID_STATE"] {
            assert_eq!(class(state), StateClass::Failed, "{state}");
        }
        for state in [
            "NOT_SUBMITTED",
            "STARTING",
            "RUNNING",
            "CANCELLATION_REQUESTED",
            "PLANNING",
            "PENDING",
            "METADATA_RETRIEVAL",
            "QUEUED",
            "ENGINE_START",
            "EXECUTION_PLANNING",
        ] {
            assert_eq!(class(state), StateClass::Pending, "{state}");
        }
        assert_eq!(KnownJobState::ALL.len(), 14);
    }

    #[test]
    fn test_unknown_job_state_is_pending() {
        let state: JobState = "WARMING_UP".parse().unwrap();
        assert_eq!(state, JobState::Other("WARMING_UP".to_string()));
        assert_eq!(state.class(), StateClass::Pending);
        assert_eq!(state.to_string(), "WARMING_UP");
    }

    #[test]
    fn test_job_status_from_body() {
        let status = JobStatus::from_body(json!({
            "jobState": "FAILED",
            "errorMessage": "Table not found",
        }))
        .unwrap();
        assert_eq!(status.state, JobState::known(KnownJobState::Failed));
        assert_eq!(status.error_message(), Some("Table not found"));

        assert!(matches!(
            JobStatus::from_body(json!({"rowCount": 0})),
            Err(DremioError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_reflection_status() {
        for status in ReflectionRefreshStatus::ALL {
            let parsed: ReflectionRefreshStatus = status.as_str().parse().unwrap();
            assert_eq!(&parsed, status);
        }
        assert_eq!(
            ReflectionRefreshStatus::CanAccelerate.class(),
            StateClass::Succeeded
        );
        assert!(!ReflectionRefreshStatus::Refreshing.is_terminal());
        assert_eq!(ReflectionRefreshStatus::Disabled.class(), StateClass::Failed);
        assert!(matches!(
            "ACCELERATING".parse::<ReflectionRefreshStatus>(),
            Err(DremioError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_reflection_status_from_body() {
        let body = json!({"id": "r1", "status": {"combinedStatus": "REFRESHING"}});
        assert_eq!(
            ReflectionRefreshStatus::from_reflection(&body).unwrap(),
            Some(ReflectionRefreshStatus::Refreshing)
        );
        assert_eq!(
            ReflectionRefreshStatus::from_reflection(&json!({"id": "r1"})).unwrap(),
            None
        );
    }
}
