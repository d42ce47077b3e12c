//! The query builder.
//!
//! Each query type has its own builder with chainable methods. Builders lower
//! themselves into a [`crate::CompiledQuery`] and execute through a
//! [`crate::Session`]:
//!
//! - [`SelectQuery`]: columns, joins, filters, ordering, limits, row caps
//! - [`InsertQuery`]: column/value pairs with optional conflict handling
//! - [`UpdateQuery`]: `SET` and `WHERE`
//! - [`DeleteQuery`]: `WHERE`
//!
//! # Example
//!
//! ```ignore
//! let users = SelectQuery::<User>::from(session, users::TABLE)
//!     .filter(users::ID.gt(0))
//!     .order_by(users::ID, false)
//!     .limit(10)
//!     .fetch()?;
//! ```

pub(crate) mod clause;
pub mod delete;
pub mod insert;
pub mod select;
pub mod update;

pub use delete::DeleteQuery;
pub use insert::InsertQuery;
pub use select::SelectQuery;
pub use update::UpdateQuery;
