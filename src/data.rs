use std::fmt;

/// Typed failures from a data service backend. `find` on a predicate that
/// matches nothing is an empty `Ok` vec, never `NotFound`; only `update` and
/// `delete` of a missing id report `NotFound`.
#[derive(Debug)]
pub enum ServiceError {
    /// Backend could not be reached or timed out. Callers doing optional
    /// revalidation downgrade this and keep their local decision.
    Unavailable(String),
    Query(String),
    UnknownCollection(String),
    UnknownField { collection: String, field: String },
    NotFound { collection: String, id: String },
}

impl ServiceError {
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::Unavailable(_) => "service_unavailable",
            ServiceError::Query(_) => "db_query_failed",
            ServiceError::UnknownCollection(_) => "unknown_collection",
            ServiceError::UnknownField { .. } => "unknown_field",
            ServiceError::NotFound { .. } => "not_found",
        }
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceError::Unavailable(m) => write!(f, "service unavailable: {}", m),
            ServiceError::Query(m) => write!(f, "query failed: {}", m),
            ServiceError::UnknownCollection(c) => write!(f, "unknown collection: {}", c),
            ServiceError::UnknownField { collection, field } => {
                write!(f, "unknown field {}.{}", collection, field)
            }
            ServiceError::NotFound { collection, id } => {
                write!(f, "no {} record with id {}", collection, id)
            }
        }
    }
}

impl std::error::Error for ServiceError {}

/// Record-level access to the portal collections (`users`, `homeworks`,
/// `assignments`, `test_results`). Records cross the boundary as JSON
/// objects; predicates are equality-only. Implementations must bound every
/// call (no indefinite blocking) so callers can fall back on error.
pub trait DataService {
    fn find(
        &self,
        collection: &str,
        filters: &[(&str, serde_json::Value)],
    ) -> Result<Vec<serde_json::Value>, ServiceError>;

    /// Inserts a record, filling `id` and `created_at` when absent, and
    /// returns the stored record.
    fn insert(
        &self,
        collection: &str,
        record: serde_json::Value,
    ) -> Result<serde_json::Value, ServiceError>;

    fn update(
        &self,
        collection: &str,
        id: &str,
        patch: serde_json::Value,
    ) -> Result<(), ServiceError>;

    fn delete(&self, collection: &str, id: &str) -> Result<(), ServiceError>;
}
