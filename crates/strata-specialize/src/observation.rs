//! Per-identity observation state and the consistency check run on every
//! hooked call.

use serde::{Deserialize, Serialize};
use strata_db::{BindingKey, Value};

use crate::shape::{infer_mapping, ArgumentMapping, Inference, Shape};

pub const REASON_TEXT_CHANGED: &str = "query text changed";
pub const REASON_BINDINGS_CHANGED: &str = "binding mapping changed";
pub const REASON_METADATA_CHANGED: &str = "metadata mapping changed";
pub const REASON_EXTENSION_CHANGED: &str = "extension state changed";

/// Everything learned about a procedure's query across calls.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObservationState {
    pub call_count: u32,
    pub frozen_query_text: Option<String>,
    pub binding_map: Option<ArgumentMapping>,
    pub metadata_map: Option<ArgumentMapping>,
    pub extension_snapshot: Option<serde_json::Value>,
    #[serde(default)]
    pub invalid: bool,
    #[serde(default)]
    pub invalid_reason: Option<String>,
}

/// How one hooked call affected the observation state.
#[derive(Debug, Clone, PartialEq)]
pub enum Round {
    /// The call was consistent; `call_count` is the new count.
    Counted(u32),
    /// A binding matched several arguments; nothing was incorporated.
    Ambiguous(BindingKey),
    /// The call contradicted the frozen shape.
    Invalidated(String),
}

impl ObservationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// A state that was invalidated in an earlier process.
    pub fn invalidated(reason: impl Into<String>, call_count: u32) -> Self {
        Self {
            call_count,
            invalid: true,
            invalid_reason: Some(reason.into()),
            ..Self::default()
        }
    }

    pub fn invalidate(&mut self, reason: impl Into<String>) {
        self.invalid = true;
        self.invalid_reason = Some(reason.into());
    }

    pub fn is_ready(&self, threshold: u32) -> bool {
        !self.invalid && self.call_count >= threshold
    }

    /// True until the first consistent call has been incorporated.
    pub fn is_pristine(&self) -> bool {
        !self.invalid && self.call_count == 0 && self.frozen_query_text.is_none()
    }

    /// Folds one observed shape into the state.
    ///
    /// The query text is frozen on first sight even when the round later
    /// turns out ambiguous; mappings and the extension snapshot are frozen
    /// only by a consistent round.
    pub fn observe(&mut self, shape: &Shape, args: &[Value]) -> Round {
        if self.invalid {
            return Round::Invalidated(self.invalid_reason.clone().unwrap_or_default());
        }

        match &self.frozen_query_text {
            None => self.frozen_query_text = Some(shape.query_text.clone()),
            Some(frozen) if *frozen != shape.query_text => {
                return self.fail(REASON_TEXT_CHANGED);
            }
            Some(_) => {}
        }

        let bindings = match infer_mapping(&shape.bindings, args) {
            Inference::Mapped(mapping) => mapping,
            Inference::Ambiguous(key) => return Round::Ambiguous(key),
        };
        let metadata = match infer_mapping(&shape.metadata, args) {
            Inference::Mapped(mapping) => mapping,
            Inference::Ambiguous(key) => return Round::Ambiguous(key),
        };

        if !freeze_or_compare(&mut self.binding_map, bindings) {
            return self.fail(REASON_BINDINGS_CHANGED);
        }
        if !freeze_or_compare(&mut self.metadata_map, metadata) {
            return self.fail(REASON_METADATA_CHANGED);
        }
        if !freeze_or_compare(&mut self.extension_snapshot, shape.extension.clone()) {
            return self.fail(REASON_EXTENSION_CHANGED);
        }

        self.call_count += 1;
        Round::Counted(self.call_count)
    }

    fn fail(&mut self, reason: &str) -> Round {
        self.invalidate(reason);
        Round::Invalidated(reason.to_string())
    }
}

fn freeze_or_compare<T: PartialEq>(frozen: &mut Option<T>, observed: T) -> bool {
    match frozen {
        Some(existing) => *existing == observed,
        None => {
            *frozen = Some(observed);
            true
        }
    }
}
