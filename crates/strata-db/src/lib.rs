pub mod compiled;
pub mod error;
pub mod expr;
pub mod macros;
pub mod query;
pub mod row;
pub mod session;
pub mod traits;
pub mod value;

pub use compiled::{BindingKey, CompiledQuery, FetchMode, QueryKind, META_FETCH, META_MAX_ROWS};
pub use error::{DbError, Result};
pub use query::*;
pub use row::Row;
pub use session::{Executed, Execution, Session};
pub use traits::{Expression, FromRow, Hydrate, Repository};
pub use value::{FromValue, Value};
