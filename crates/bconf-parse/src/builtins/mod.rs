//! Built-in tag and statement resolvers.
//!
//! These are registered beneath user-provided resolvers: a user resolver
//! with the same name wins.

mod statements;
mod tags;

pub use statements::builtin_statements;
pub use tags::builtin_tags;
