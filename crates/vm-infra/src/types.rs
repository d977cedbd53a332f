use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque backend-side VM identifier (the Nova server UUID).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VmId(pub String);

impl fmt::Display for VmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Request for creating a VM.
#[derive(Debug, Clone)]
pub struct VmReqInfo {
    pub name: String,
    pub image_id: String,
    /// Flavor id.
    pub spec_id: String,
    pub security_group_ids: Vec<String>,
    pub key_pair_name: String,
    /// Allocated floating IP address to attach once the VM is active.
    pub public_ip: String,
}

/// Canonical VM snapshot. Built fresh from every backend read.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct VmInfo {
    pub name: String,
    pub id: VmId,
    pub key_pair_name: Option<String>,
    pub vm_user_id: String,
    /// Initial admin password. Only reported by the backend at creation.
    pub vm_user_passwd: Option<String>,
    pub network_interface_id: String,
    pub start_time: Option<DateTime<Utc>>,
    pub image_id: Option<String>,
    pub spec_id: Option<String>,
    pub security_group_ids: Vec<String>,
    pub virtual_network_id: Option<String>,
    pub public_ip: Option<String>,
    pub private_ip: Option<String>,
}

impl fmt::Debug for VmInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VmInfo")
            .field("name", &self.name)
            .field("id", &self.id)
            .field("key_pair_name", &self.key_pair_name)
            .field("vm_user_id", &self.vm_user_id)
            .field(
                "vm_user_passwd",
                &self.vm_user_passwd.as_ref().map(|_| "<redacted>"),
            )
            .field("network_interface_id", &self.network_interface_id)
            .field("start_time", &self.start_time)
            .field("image_id", &self.image_id)
            .field("spec_id", &self.spec_id)
            .field("security_group_ids", &self.security_group_ids)
            .field("virtual_network_id", &self.virtual_network_id)
            .field("public_ip", &self.public_ip)
            .field("private_ip", &self.private_ip)
            .finish()
    }
}

/// Caller-facing VM state.
///
/// `Suspending`, `Resuming`, `Rebooting` and `Terminating` are only ever
/// asserted right after issuing the matching command; the backend does not
/// report them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VmStatus {
    Creating,
    Running,
    Suspending,
    Suspended,
    Resuming,
    Rebooting,
    Terminating,
    Failed,
}

impl VmStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Creating => "Creating",
            Self::Running => "Running",
            Self::Suspending => "Suspending",
            Self::Suspended => "Suspended",
            Self::Resuming => "Resuming",
            Self::Rebooting => "Rebooting",
            Self::Terminating => "Terminating",
            Self::Failed => "Failed",
        }
    }
}

impl fmt::Display for VmStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VmStatusInfo {
    pub id: VmId,
    pub status: VmStatus,
}
