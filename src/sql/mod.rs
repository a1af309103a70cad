//! SQL builder: pure `QueryPlan -> (sql, params)` compilation (spec §4.4).

pub mod builder;
pub mod value_norm;

pub use builder::{build, BuiltQuery, SqlParam};
