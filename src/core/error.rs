use std::error::Error;
use std::fmt::Display;

/// Error type for battery operations
#[derive(Debug, Clone, PartialEq)]
pub enum BatteryError {
    /// Operation requested in a state that does not allow it
    /// (answer without an issued problem, problem request before start)
    InvalidState(String),
    /// Configuration cannot be satisfied (e.g. region placement exhausted its retry budget)
    ConfigurationError(String),
    /// The persistence or session collaborator rejected a read or write
    PersistenceFailure(String),
    /// Client supplied data that does not fit the expected shape
    MalformedInput(String),
    /// Shared-secret check failed
    Unauthorized(String),
}

impl BatteryError {
    /// Stable machine-readable code for the error kind
    pub fn code(&self) -> &'static str {
        match self {
            BatteryError::InvalidState(_) => "INVALID_STATE",
            BatteryError::ConfigurationError(_) => "CONFIGURATION_ERROR",
            BatteryError::PersistenceFailure(_) => "PERSISTENCE_FAILURE",
            BatteryError::MalformedInput(_) => "MALFORMED_INPUT",
            BatteryError::Unauthorized(_) => "UNAUTHORIZED",
        }
    }

    /// Whether a collaborator failed, as opposed to the request or its data
    pub fn is_persistence_failure(&self) -> bool {
        matches!(self, BatteryError::PersistenceFailure(_))
    }
}

impl Display for BatteryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BatteryError::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
            BatteryError::ConfigurationError(msg) => write!(f, "Configuration error: {}", msg),
            BatteryError::PersistenceFailure(msg) => write!(f, "Persistence failure: {}", msg),
            BatteryError::MalformedInput(msg) => write!(f, "Malformed input: {}", msg),
            BatteryError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
        }
    }
}

impl Error for BatteryError {}

impl From<rusqlite::Error> for BatteryError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            // A count column that is not an integer means the store handed back garbage
            rusqlite::Error::InvalidColumnType(..)
            | rusqlite::Error::FromSqlConversionFailure(..)
            | rusqlite::Error::IntegralValueOutOfRange(..) => {
                BatteryError::MalformedInput(format!("unexpected value from store: {}", err))
            }
            other => BatteryError::PersistenceFailure(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_distinct() {
        let errors = [
            BatteryError::InvalidState(String::new()),
            BatteryError::ConfigurationError(String::new()),
            BatteryError::PersistenceFailure(String::new()),
            BatteryError::MalformedInput(String::new()),
            BatteryError::Unauthorized(String::new()),
        ];
        let mut codes: Vec<&str> = errors.iter().map(|e| e.code()).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn test_only_store_failures_are_persistence_failures() {
        assert!(BatteryError::PersistenceFailure("locked".to_string()).is_persistence_failure());
        assert!(!BatteryError::MalformedInput("count".to_string()).is_persistence_failure());
        assert!(!BatteryError::InvalidState("none".to_string()).is_persistence_failure());
    }

    #[test]
    fn test_sqlite_type_errors_are_malformed_input() {
        let err: BatteryError = rusqlite::Error::InvalidColumnType(
            0,
            "count".to_string(),
            rusqlite::types::Type::Text,
        )
        .into();
        assert!(matches!(err, BatteryError::MalformedInput(_)));

        let err: BatteryError = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(err, BatteryError::PersistenceFailure(_)));
    }
}
