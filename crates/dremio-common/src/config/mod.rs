mod application;

pub use application::*;
use serde::Deserialize;

/// Deserialize a number where zero stands for "not set".
pub fn deserialize_non_zero<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = u64::deserialize(deserializer)?;
    if value == 0 {
        Ok(None)
    } else {
        Ok(Some(value))
    }
}
