//! The owner contract.

use rheostat_core::Schema;

/// A component that declares and consumes a parameter set.
///
/// The unique id is the owner's storage category. It should be stable for
/// the lifetime of a store; when it changes (e.g. the owning record was
/// reloaded under another id) the owner calls
/// [`ActiveParams::notify_reloaded`](crate::ActiveParams::notify_reloaded).
pub trait ParamsOwner: Send + Sync {
    /// Identity of the owner. Must not be blank.
    fn unique_id(&self) -> String;

    /// Params declared by the owner itself. These win over builder params.
    fn params(&self) -> Option<Schema> {
        None
    }

    /// Human readable kind of owner, used in errors and logs.
    fn owner_kind(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Owner with a fixed identity and an optional schema.
#[derive(Debug, Clone, PartialEq)]
pub struct FixedOwner {
    id: String,
    params: Option<Schema>,
}

impl FixedOwner {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            params: None,
        }
    }

    pub fn with_params(mut self, params: Schema) -> Self {
        self.params = Some(params);
        self
    }
}

impl ParamsOwner for FixedOwner {
    fn unique_id(&self) -> String {
        self.id.clone()
    }

    fn params(&self) -> Option<Schema> {
        self.params.clone()
    }

    fn owner_kind(&self) -> &str {
        "owner"
    }
}
