use std::fmt;

/// Error taxonomy for the audit core.
///
/// `DataUnavailable` is not an error to the caller: the affected entity is
/// skipped and the scan continues. `QueryFailure` is transient and retried
/// once before the entity is omitted. `Configuration` is fatal at startup.
#[derive(Debug, Clone)]
pub enum AuditError {
    DataUnavailable { entity_id: String, detail: String },
    QueryFailure { detail: String },
    Configuration { detail: String },
}

impl AuditError {
    pub fn data_unavailable(entity_id: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::DataUnavailable {
            entity_id: entity_id.into(),
            detail: detail.into(),
        }
    }

    pub fn query_failure(detail: impl Into<String>) -> Self {
        Self::QueryFailure {
            detail: detail.into(),
        }
    }

    pub fn configuration(detail: impl Into<String>) -> Self {
        Self::Configuration {
            detail: detail.into(),
        }
    }

    /// Whether one retry is warranted before giving up on the entity.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::QueryFailure { .. })
    }
}

impl fmt::Display for AuditError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DataUnavailable { entity_id, detail } => {
                write!(f, "data unavailable for {entity_id}: {detail}")
            }
            Self::QueryFailure { detail } => write!(f, "store query failed: {detail}"),
            Self::Configuration { detail } => write!(f, "configuration error: {detail}"),
        }
    }
}

impl std::error::Error for AuditError {}
