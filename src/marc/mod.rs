//! Parser: raw bibliographic records → canonical records (spec §4.1).

pub mod mnemonic;
pub mod parser;

pub use mnemonic::{read_records_str, RawField, RawRecord, RawRecordReader};
pub use parser::parse;
