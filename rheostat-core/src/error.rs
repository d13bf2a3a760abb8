//! Error types for rheostat operations

use crate::ValueType;
use thiserror::Error;

/// Storage layer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Insert failed for param '{name}' in category '{category}': {reason}")]
    InsertFailed {
        name: String,
        category: String,
        reason: String,
    },

    #[error("Update failed for param '{name}' in category '{category}': {reason}")]
    UpdateFailed {
        name: String,
        category: String,
        reason: String,
    },

    #[error("Delete failed for category '{category}': {reason}")]
    DeleteFailed { category: String, reason: String },

    #[error("Query failed for category '{category}': {reason}")]
    QueryFailed { category: String, reason: String },

    #[error("Transaction failed: {reason}")]
    TransactionFailed { reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Shared cache errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache backend failure: {reason}")]
    Backend { reason: String },

    #[error("Cache serialization failed: {reason}")]
    Serialization { reason: String },

    #[error("Cache deserialization failed: {reason}")]
    Deserialization { reason: String },

    #[error("Cache lock poisoned")]
    LockPoisoned,
}

/// Value validation errors raised before a value reaches storage.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Type mismatch: expected {expected}, got {got}")]
    TypeMismatch { expected: ValueType, got: String },

    #[error("Invalid {value_type} value '{value}': {reason}")]
    InvalidValue {
        value_type: ValueType,
        value: String,
        reason: String,
    },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Failed to parse {source_kind} document: {reason}")]
    Parse { source_kind: String, reason: String },
}

/// Master error type for parameter store operations.
#[derive(Debug, Clone, Error)]
pub enum ParamError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Param '{name}' of {owner} doesn't exist")]
    NotFound { name: String, owner: String },

    #[error("Param '{name}' of {owner} is not a valid param")]
    InvalidParam { name: String, owner: String },

    #[error("Active param '{name}' of {owner}: {reason}")]
    UnexpectedValue {
        name: String,
        owner: String,
        reason: String,
    },

    #[error("Param '{name}' is read-only")]
    ReadOnlyViolation { name: String },

    #[error("Can't save param '{name}' in category '{category}': {source}")]
    Persistence {
        name: String,
        category: String,
        #[source]
        source: StorageError,
    },

    #[error("Value rejected for param '{name}': {source}")]
    Validation {
        name: String,
        #[source]
        source: ValidationError,
    },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Operation not supported: {operation}")]
    Unsupported { operation: String },
}

/// Result type alias for parameter store operations.
pub type ParamResult<T> = Result<T, ParamError>;

/// Result type alias for repository operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type alias for shared cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

// =============================================================================
// TESTS
// =============================================================================
