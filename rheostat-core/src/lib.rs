//! Rheostat Core - Data Types
//!
//! Pure data structures shared by the repository, cache and store crates:
//! errors, value types and their formatter, param schemas, storage rows,
//! write watermarks and store configuration. No I/O lives here.

pub mod config;
pub mod error;
pub mod format;
pub mod row;
pub mod schema;
pub mod value;

pub use config::{ParamsConfig, DEFAULT_CACHE_KEY_PREFIX};
pub use error::{
    CacheError, CacheResult, ConfigError, ParamError, ParamResult, StorageError, StorageResult,
    ValidationError,
};
pub use format::{DefaultFormatter, ValueFormatter};
pub use row::{index_rows, CacheDependency, RawRow, RawRows, Watermark};
pub use schema::{
    ActiveDescriptor, ActiveKind, ParamFlags, Schema, SchemaEntry, DEFAULT_DESCRIPTION,
};
pub use value::{ParamValue, ValueType, DATE_FORMAT};

/// Current time as epoch seconds, the resolution of stored row timestamps.
pub fn now_epoch_seconds() -> i64 {
    chrono::Utc::now().timestamp()
}
