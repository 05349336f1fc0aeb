pub use crate::error::{CgResult, Error, FailureKind, ValidationErrors};
pub use crate::key::{OwnedParamKey, ParamKey};
pub use crate::value::{ConfigValue, ValueKind};

pub use tracing::{debug, error, info, warn};

// vim: ts=4
