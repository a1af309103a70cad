//! `biblio_engine`: a conversational bibliographic discovery engine over a
//! closed rare-book catalog corpus.
//!
//! Pipeline, roughly: raw records flow through [`marc`] (parse) and
//! [`normalize`] (confidence-scored enrichment) into [`store`] (the
//! relational + full-text index). Conversation turns flow through
//! [`controller`], which compiles natural language into a [`plan::QueryPlan`]
//! via [`plan`], renders it to SQL via [`sql`], runs it through [`exec`],
//! and threads session state through [`session`].

pub mod config;
pub mod controller;
pub mod error;
pub mod exec;
pub mod marc;
pub mod normalize;
pub mod plan;
pub mod record;
pub mod session;
pub mod sql;
pub mod store;

pub use error::EngineError;
