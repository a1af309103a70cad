//! Canonical and normalized record types (spec §3.1, §3.2).
//!
//! Raw values extracted by the parser are never overwritten; normalization
//! attachments live alongside them on the same struct.

mod types;

pub use types::*;
