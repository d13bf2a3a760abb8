//! Rheostat Params - Active Parameter Store
//!
//! Overlays an owner's static configuration with params persisted in a
//! repository. An owner declares a [`Schema`]; static entries are constants,
//! active entries are read from storage on first access and written back on
//! `set`.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use rheostat_params::{ActiveParams, FixedOwner};
//! use rheostat_core::{ActiveDescriptor, Schema, ValueType};
//! use rheostat_storage::InMemoryRepository;
//!
//! let schema = Schema::new()
//!     .with_static("v1", "v1")
//!     .with_active("count", ActiveDescriptor::new(ValueType::Number));
//!
//! let mut params = ActiveParams::builder(Arc::new(FixedOwner::new("users")))
//!     .params(schema)
//!     .repository(Arc::new(InMemoryRepository::new()))
//!     .build()?;
//!
//! assert_eq!(params.get("count")?, 0.into());
//! params.set("count", 5)?;
//! ```
//!
//! [`Schema`]: rheostat_core::Schema

pub mod owner;
pub mod param;
pub mod registry;
pub mod store;

pub use owner::{FixedOwner, ParamsOwner};
pub use param::{ActiveParam, Param, StaticParam};
pub use registry::ParamRegistry;
pub use store::{ActiveParams, ActiveParamsBuilder, LoadedParams};
