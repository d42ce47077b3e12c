//! Procedure identities.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable key naming one specializable procedure.
///
/// With a checksum attached, editing the owner's source yields a new
/// identity, which orphans every observation and artifact of the old one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProcedureIdentity {
    owner: String,
    procedure: String,
    checksum: Option<String>,
}

impl ProcedureIdentity {
    pub fn new(owner: impl Into<String>, procedure: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            procedure: procedure.into(),
            checksum: None,
        }
    }

    pub fn with_checksum(mut self, checksum: impl Into<String>) -> Self {
        self.checksum = Some(checksum.into());
        self
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn procedure(&self) -> &str {
        &self.procedure
    }

    pub fn checksum(&self) -> Option<&str> {
        self.checksum.as_deref()
    }

    /// `owner::procedure`, suffixed with `@checksum` when guarded.
    pub fn key(&self) -> String {
        match &self.checksum {
            Some(checksum) => format!("{}::{}@{}", self.owner, self.procedure, checksum),
            None => format!("{}::{}", self.owner, self.procedure),
        }
    }
}

impl fmt::Display for ProcedureIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}
