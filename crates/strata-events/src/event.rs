/// Events emitted while a procedure moves through the specialization lifecycle.
///
/// `key` is always the procedure identity key (`owner::procedure[@checksum]`).
#[derive(Debug, Clone, PartialEq)]
pub enum SpecializationEvent {
    /// Persisted state for the identity was loaded from the snapshot store.
    StateRestored { key: String, state: String },
    /// An observation variant was synthesized and installed as the hook.
    HookInstalled { key: String },
    /// A consistent, unambiguous call was incorporated.
    Observed { key: String, call_count: u32 },
    /// A binding value matched several arguments; the round was discarded.
    RoundAmbiguous { key: String, binding: String },
    /// The identity became permanently invalid.
    Invalidated { key: String, reason: String },
    /// A compiled artifact was published and swapped in.
    Compiled { key: String, artifact: String },
    /// A call was served by the compiled artifact.
    CompiledHit { key: String },
    /// A call ran the unspecialized procedure.
    Fallback { key: String, reason: FallbackReason },
}

/// Why a call bypassed both the compiled artifact and the hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackReason {
    /// The identity is invalid.
    Invalid,
    /// The observation variant could not be synthesized.
    Unsupported,
    /// The compiled artifact cannot serve this argument list.
    ArityMismatch { expected: usize, actual: usize },
}

impl SpecializationEvent {
    pub fn key(&self) -> &str {
        match self {
            Self::StateRestored { key, .. }
            | Self::HookInstalled { key }
            | Self::Observed { key, .. }
            | Self::RoundAmbiguous { key, .. }
            | Self::Invalidated { key, .. }
            | Self::Compiled { key, .. }
            | Self::CompiledHit { key }
            | Self::Fallback { key, .. } => key,
        }
    }
}
