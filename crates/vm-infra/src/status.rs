//! Mapping from Nova server statuses to [`VmStatus`].

use crate::types::VmStatus;
use crate::{Error, Result};

/// Map a raw backend status, rejecting values outside the known vocabulary.
///
/// `error` is known and maps to `Failed`; anything unrecognized yields
/// [`Error::UnknownStatus`].
pub fn try_normalize(raw: &str) -> Result<VmStatus> {
    match raw.to_ascii_lowercase().as_str() {
        "build" => Ok(VmStatus::Creating),
        "active" => Ok(VmStatus::Running),
        "shutoff" => Ok(VmStatus::Suspended),
        "reboot" => Ok(VmStatus::Rebooting),
        "error" => Ok(VmStatus::Failed),
        _ => Err(Error::UnknownStatus(raw.to_string())),
    }
}

/// Map a raw backend status. Unknown values become `Failed`.
pub fn normalize(raw: &str) -> VmStatus {
    try_normalize(raw).unwrap_or(VmStatus::Failed)
}
