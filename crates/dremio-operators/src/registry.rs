use serde::Serialize;

use crate::hook::DremioHook;

#[derive(Debug, Serialize)]
pub struct ProviderInfo {
    pub package_name: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub version: &'static str,
    pub connection_types: &'static [ConnectionTypeInfo],
    pub operators: &'static [OperatorInfo],
}

#[derive(Debug, Serialize)]
pub struct ConnectionTypeInfo {
    pub connection_type: &'static str,
    pub hook_name: &'static str,
    pub default_conn_id: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OperatorKind {
    Operator,
    Sensor,
}

#[derive(Debug, Serialize)]
pub struct OperatorInfo {
    pub name: &'static str,
    pub kind: OperatorKind,
    pub description: &'static str,
}

/// What the host needs to know to offer this provider.
pub static PROVIDER_INFO: ProviderInfo = ProviderInfo {
    package_name: env!("CARGO_PKG_NAME"),
    name: "Dremio",
    description: "Manage Dremio sources, reflections and jobs.",
    version: env!("CARGO_PKG_VERSION"),
    connection_types: &[ConnectionTypeInfo {
        connection_type: "http",
        hook_name: "Dremio",
        default_conn_id: DremioHook::DEFAULT_CONN_ID,
    }],
    operators: &[
        OperatorInfo {
            name: "create_reflection",
            kind: OperatorKind::Operator,
            description: "Creates or updates a reflection on a dataset and optionally waits for its refresh.",
        },
        OperatorInfo {
            name: "create_source",
            kind: OperatorKind::Operator,
            description: "Creates a source in the Dremio catalog.",
        },
        OperatorInfo {
            name: "job_sensor",
            kind: OperatorKind::Sensor,
            description: "Waits for a Dremio job to complete.",
        },
    ],
};

impl ProviderInfo {
    pub fn operator(&self, name: &str) -> Option<&OperatorInfo> {
        self.operators.iter().find(|op| op.name == name)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use std::sync::Arc;

    use dremio_client::{ReflectionSpec, SourceSpec};

    use super::*;
    use crate::connection_store::MemoryConnectionStore;
    use crate::context::Operator;
    use crate::reflection::CreateReflectionOperator;
    use crate::sensor::JobSensor;
    use crate::source::CreateSourceOperator;

    fn hook() -> DremioHook {
        DremioHook::new(
            DremioHook::DEFAULT_CONN_ID,
            Arc::new(MemoryConnectionStore::new()),
        )
    }

    #[test]
    fn test_every_operator_is_registered() {
        let operators: Vec<Box<dyn Operator>> = vec![
            Box::new(CreateReflectionOperator::new(
                hook(),
                "s.t",
                ReflectionSpec::default(),
            )),
            Box::new(CreateSourceOperator::new(hook(), SourceSpec::default())),
            Box::new(JobSensor::new(hook(), "j1")),
        ];
        for op in &operators {
            assert!(PROVIDER_INFO.operator(op.name()).is_some(), "{}", op.name());
        }
        assert_eq!(PROVIDER_INFO.operators.len(), operators.len());
        assert_eq!(
            PROVIDER_INFO.operator("job_sensor").unwrap().kind,
            OperatorKind::Sensor
        );
    }

    #[test]
    fn test_serialize() {
        let value = serde_json::to_value(&PROVIDER_INFO).unwrap();
        assert_eq!(value["connection_types"][0]["default_conn_id"], "dremio_default");
        assert_eq!(value["operators"][2]["kind"], "sensor");
    }
}
