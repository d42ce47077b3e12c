//! Persisted per-identity state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{error::StoreResult, observation::ObservationState};

/// What the key-value store holds for one identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum SnapshotEntry {
    Observing {
        state: ObservationState,
    },
    Compiled {
        artifact: String,
        compiled_at: DateTime<Utc>,
    },
    Invalid {
        reason: String,
        call_count: u32,
    },
}

impl SnapshotEntry {
    /// The entry describing `state`, invalid or not.
    pub fn from_state(state: &ObservationState) -> Self {
        if state.invalid {
            SnapshotEntry::Invalid {
                reason: state.invalid_reason.clone().unwrap_or_default(),
                call_count: state.call_count,
            }
        } else {
            SnapshotEntry::Observing {
                state: state.clone(),
            }
        }
    }

    pub fn compiled(artifact: impl Into<String>) -> Self {
        SnapshotEntry::Compiled {
            artifact: artifact.into(),
            compiled_at: Utc::now(),
        }
    }

    pub fn encode(&self) -> StoreResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(value: &str) -> StoreResult<Self> {
        Ok(serde_json::from_str(value)?)
    }

    pub fn status(&self) -> &'static str {
        match self {
            SnapshotEntry::Observing { .. } => "observing",
            SnapshotEntry::Compiled { .. } => "compiled",
            SnapshotEntry::Invalid { .. } => "invalid",
        }
    }
}
