//! Adaptive query specialization.
//!
//! A wrapped data-access procedure is first observed: every call runs the
//! real procedure while the session records the query it executes. Once the
//! query text, the mapping from call arguments to bindings, and the hydration
//! state have stayed identical for enough calls, the procedure is compiled
//! into a plan that replays the frozen query with fresh arguments and skips
//! query construction altogether. Any drift permanently disables the fast
//! path for that procedure; results never depend on specialization state.
//!
//! Progress is persisted, so short-lived processes sharing a state location
//! build on each other's observations.

pub mod artifact;
pub mod error;
pub mod hook;
pub mod identity;
pub mod interceptor;
pub mod manager;
pub mod observation;
pub mod shape;
pub mod snapshot;
pub mod source;
pub mod specializer;
pub mod store;

pub use error::{Error, Result, SpecializationError, StoreError};
pub use identity::ProcedureIdentity;
pub use interceptor::Specialized;
pub use manager::{Settings, SpecializationManager, SpecializationState};
