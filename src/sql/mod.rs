//! SQL construction layer: tokens, expressions, and the query builder.
//!
//! The layer is strongly typed end to end: expressions and queries are ASTs,
//! serialization happens once through the token stream, and DuckDB quoting
//! rules live in [`dialect`]. Nothing in this module knows about semantic
//! models; it only knows how to print valid SQL.

pub mod dialect;
pub mod expr;
pub mod query;
pub mod token;
