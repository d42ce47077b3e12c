//! Error types for strata-specialize.

use miette::Diagnostic;
use strata_config::error::ConfigError;
use strata_db::DbError;
use strata_utils::error::FileSystemError;
use thiserror::Error;

use crate::identity::ProcedureIdentity;

/// Why a procedure could not be (or stopped being) specialized.
///
/// Every variant names the owner type and procedure it concerns.
#[derive(Error, Diagnostic, Debug, Clone, PartialEq, Eq)]
pub enum SpecializationError {
    #[error("Cannot transform {owner}::{procedure}: {message}")]
    #[diagnostic(
        code(strata_specialize::transformation),
        help("Declare the owner's source and keep procedure parameters by value without defaults")
    )]
    Transformation {
        owner: String,
        procedure: String,
        message: String,
    },

    #[error("Query shape of {owner}::{procedure} changed: {message}")]
    #[diagnostic(
        code(strata_specialize::shape_inconsistency),
        help("The procedure builds different queries for different calls and cannot be specialized")
    )]
    ShapeInconsistency {
        owner: String,
        procedure: String,
        message: String,
    },

    #[error("Binding {binding} of {owner}::{procedure} matches several arguments")]
    #[diagnostic(code(strata_specialize::ambiguous_binding))]
    AmbiguousBinding {
        owner: String,
        procedure: String,
        binding: String,
    },

    #[error("Failed to generate compiled variant of {owner}::{procedure}: {message}")]
    #[diagnostic(code(strata_specialize::generation))]
    Generation {
        owner: String,
        procedure: String,
        message: String,
    },

    #[error("{owner}::{procedure} executed an unsupported query: {message}")]
    #[diagnostic(
        code(strata_specialize::unsupported_query_kind),
        help("Only procedures running exactly one select query through the builder can be specialized")
    )]
    UnsupportedQueryKind {
        owner: String,
        procedure: String,
        message: String,
    },
}

impl SpecializationError {
    pub fn transformation(identity: &ProcedureIdentity, message: impl Into<String>) -> Self {
        Self::Transformation {
            owner: identity.owner().to_string(),
            procedure: identity.procedure().to_string(),
            message: message.into(),
        }
    }

    pub fn shape_inconsistency(identity: &ProcedureIdentity, message: impl Into<String>) -> Self {
        Self::ShapeInconsistency {
            owner: identity.owner().to_string(),
            procedure: identity.procedure().to_string(),
            message: message.into(),
        }
    }

    pub fn ambiguous_binding(identity: &ProcedureIdentity, binding: impl Into<String>) -> Self {
        Self::AmbiguousBinding {
            owner: identity.owner().to_string(),
            procedure: identity.procedure().to_string(),
            binding: binding.into(),
        }
    }

    pub fn generation(identity: &ProcedureIdentity, message: impl Into<String>) -> Self {
        Self::Generation {
            owner: identity.owner().to_string(),
            procedure: identity.procedure().to_string(),
            message: message.into(),
        }
    }

    pub fn unsupported_query_kind(identity: &ProcedureIdentity, message: impl Into<String>) -> Self {
        Self::UnsupportedQueryKind {
            owner: identity.owner().to_string(),
            procedure: identity.procedure().to_string(),
            message: message.into(),
        }
    }

    pub fn owner(&self) -> &str {
        match self {
            Self::Transformation { owner, .. }
            | Self::ShapeInconsistency { owner, .. }
            | Self::AmbiguousBinding { owner, .. }
            | Self::Generation { owner, .. }
            | Self::UnsupportedQueryKind { owner, .. } => owner,
        }
    }

    pub fn procedure(&self) -> &str {
        match self {
            Self::Transformation { procedure, .. }
            | Self::ShapeInconsistency { procedure, .. }
            | Self::AmbiguousBinding { procedure, .. }
            | Self::Generation { procedure, .. }
            | Self::UnsupportedQueryKind { procedure, .. } => procedure,
        }
    }

    /// The reason string recorded against the identity.
    pub fn reason(&self) -> String {
        match self {
            Self::Transformation { message, .. }
            | Self::ShapeInconsistency { message, .. }
            | Self::Generation { message, .. }
            | Self::UnsupportedQueryKind { message, .. } => message.clone(),
            Self::AmbiguousBinding { binding, .. } => {
                format!("binding {binding} matches several arguments")
            }
        }
    }
}

/// Failures of the snapshot and artifact stores.
#[derive(Error, Diagnostic, Debug)]
pub enum StoreError {
    #[error("State database error: {0}")]
    #[diagnostic(
        code(strata_specialize::store::sqlite),
        help("Check that the state database is writable, or remove it to start over")
    )]
    Sqlite(#[from] rusqlite::Error),

    #[error("Failed to encode or decode persisted state: {0}")]
    #[diagnostic(
        code(strata_specialize::store::serde),
        help("The entry may have been written by an incompatible version; reset it")
    )]
    Serde(#[from] serde_json::Error),

    #[error(transparent)]
    #[diagnostic(transparent)]
    FileSystem(#[from] FileSystemError),

    #[error("Artifact `{0}` not found")]
    #[diagnostic(code(strata_specialize::store::artifact_not_found))]
    ArtifactNotFound(String),

    #[error("Invalid artifact path `{0}`")]
    #[diagnostic(
        code(strata_specialize::store::artifact_path),
        help("Artifact paths are plain file names inside the artifact directory")
    )]
    InvalidArtifactPath(String),

    #[error("Unsupported artifact format version {0}")]
    #[diagnostic(code(strata_specialize::store::artifact_format))]
    UnsupportedFormat(u32),

    #[error("Store lock poisoned")]
    #[diagnostic(code(strata_specialize::store::poisoned))]
    Poisoned,
}

impl<T> From<std::sync::PoisonError<T>> for StoreError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        Self::Poisoned
    }
}

/// Umbrella error for repositories built on strata.
///
/// It satisfies the error bound of specializable procedures, so it can be
/// used directly as their error type.
#[derive(Error, Diagnostic, Debug)]
pub enum Error {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Specialization(#[from] SpecializationError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),
}

pub type Result<T> = std::result::Result<T, Error>;
pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_names_owner_and_procedure() {
        let identity = ProcedureIdentity::new("Users", "find");
        let err = SpecializationError::shape_inconsistency(&identity, "query text changed");

        assert_eq!(err.owner(), "Users");
        assert_eq!(err.procedure(), "find");
        assert_eq!(err.reason(), "query text changed");
        assert_eq!(
            err.to_string(),
            "Query shape of Users::find changed: query text changed"
        );
    }

    #[test]
    fn test_umbrella_error_wraps_specialization() {
        let identity = ProcedureIdentity::new("Users", "find");
        let err: Error = SpecializationError::transformation(&identity, "no source").into();
        assert!(matches!(
            err,
            Error::Specialization(SpecializationError::Transformation { .. })
        ));
    }
}
