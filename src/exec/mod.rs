//! Query execution and evidence attribution (spec §4.4, §4.5).

pub mod analyzer;
pub mod evidence;
pub mod executor;

pub use analyzer::{analyze_subgroup, SubgroupOverview};
pub use evidence::{Candidate, CandidateSet, FilterEvidence};
pub use executor::Executor;
