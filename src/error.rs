//! Engine-wide error taxonomy.
//!
//! Each component gets its own error enum so call sites can match on the
//! specific failure mode; `EngineError` is the top-level union surfaced to
//! the turn interface (spec §6/§7), where every error carries a machine
//! `kind()` string alongside its human `Display` message.

use thiserror::Error;

/// Location of a parse failure within a raw record, when known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldLocation {
    pub tag: Option<String>,
    pub occurrence: Option<usize>,
}

impl std::fmt::Display for FieldLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.tag, self.occurrence) {
            (Some(tag), Some(occ)) => write!(f, "tag {tag} (occurrence {occ})"),
            (Some(tag), None) => write!(f, "tag {tag}"),
            _ => write!(f, "unknown location"),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("record is missing a record id (control field 001) at {location}")]
    MissingRecordId { location: FieldLocation },

    #[error("malformed record structure at {location}: {reason}")]
    MalformedStructure {
        location: FieldLocation,
        reason: String,
    },
}

impl ParseError {
    pub fn kind(&self) -> &'static str {
        match self {
            ParseError::MissingRecordId { .. } => "missing_record_id",
            ParseError::MalformedStructure { .. } => "malformed_structure",
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CompilationError {
    #[error("language-model oracle unavailable: {0}")]
    OracleUnavailable(String),

    #[error("oracle output failed plan-schema validation: {0}")]
    SchemaViolation(String),

    #[error("compiled plan has zero filters for a non-trivial query")]
    EmptyPlan,
}

impl CompilationError {
    pub fn kind(&self) -> &'static str {
        match self {
            CompilationError::OracleUnavailable(_) => "oracle_unavailable",
            CompilationError::SchemaViolation(_) => "schema_violation",
            CompilationError::EmptyPlan => "empty_plan",
        }
    }
}

#[derive(Debug, Error)]
pub enum SqlBuildError {
    #[error("filter {0:?} is not supported for field {1:?}")]
    UnsupportedOp(crate::plan::Op, crate::plan::Field),

    #[error("filter value could not be normalized: {0}")]
    InvalidValue(String),
}

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("relational store error: {0}")]
    StoreError(#[from] sqlx::Error),

    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("operation was cancelled")]
    Cancelled,

    #[error(transparent)]
    SqlBuild(#[from] SqlBuildError),
}

impl ExecutionError {
    pub fn kind(&self) -> &'static str {
        match self {
            ExecutionError::StoreError(_) => "store_error",
            ExecutionError::Timeout(_) => "timeout",
            ExecutionError::Cancelled => "cancelled",
            ExecutionError::SqlBuild(_) => "store_error",
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session {0} is unknown or expired")]
    InvalidSession(uuid::Uuid),

    #[error("session {0} is locked by a concurrent turn")]
    ConcurrentUpdate(uuid::Uuid),

    #[error("session store error: {0}")]
    StoreError(#[from] sqlx::Error),
}

impl SessionError {
    pub fn kind(&self) -> &'static str {
        match self {
            SessionError::InvalidSession(_) => "invalid_session",
            SessionError::ConcurrentUpdate(_) => "concurrent_update",
            SessionError::StoreError(_) => "store_error",
        }
    }
}

/// Top-level error surfaced from a controller turn (spec §6, "Errors returned as").
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Compilation(#[from] CompilationError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("rate limited: {0}")]
    RateLimited(String),
}

impl EngineError {
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Compilation(e) => e.kind(),
            EngineError::Execution(e) => e.kind(),
            EngineError::Session(e) => e.kind(),
            EngineError::RateLimited(_) => "rate_limited",
        }
    }

    pub fn human_message(&self) -> String {
        self.to_string()
    }
}
