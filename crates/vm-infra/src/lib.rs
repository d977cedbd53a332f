pub mod backend;
pub mod config;
pub mod identity;
pub mod openstack;
pub mod projection;
pub mod status;
pub mod types;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use types::{VmId, VmInfo, VmReqInfo, VmStatus, VmStatusInfo};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("openstack backend error: {0}")]
    Backend(#[from] openstack_api::Error),

    #[error("{kind} not found: {name}")]
    NotFound { kind: ResourceKind, name: String },

    #[error("{kind} name {name:?} matches {count} resources")]
    AmbiguousIdentity {
        kind: ResourceKind,
        name: String,
        count: usize,
    },

    #[error("{action} of vm {name} failed: {source}")]
    CommandFailed {
        action: Action,
        name: String,
        #[source]
        source: openstack_api::Error,
    },

    #[error("vm {vm_id} ({name}) is running but public ip association failed: {source}")]
    PartialProvisioning {
        vm_id: VmId,
        name: String,
        #[source]
        source: openstack_api::Error,
    },

    #[error("unknown backend status: {0:?}")]
    UnknownStatus(String),

    #[error("vm {vm_id} not active after {waited:?} (last status {last_status:?})")]
    ProvisioningTimeout {
        vm_id: VmId,
        waited: Duration,
        last_status: String,
    },

    #[error("reading vm {vm_id} while provisioning failed: {source}")]
    ProvisioningRead {
        vm_id: VmId,
        #[source]
        source: openstack_api::Error,
    },

    #[error("provisioning of vm {vm_id} was cancelled")]
    ProvisioningCancelled { vm_id: VmId },

    #[error("vm {vm_id} entered status {status:?} while provisioning")]
    ProvisioningFailed { vm_id: VmId, status: String },

    #[error("vm name must not be empty")]
    InvalidName,

    #[error("missing env var: {0}")]
    MissingEnv(String),

    #[error("invalid value for {var}: {value:?}")]
    InvalidConfig { var: &'static str, value: String },
}

impl Error {
    /// Canonical status to report alongside this error, if it has one.
    pub fn status(&self) -> Option<VmStatus> {
        match self {
            Self::CommandFailed { .. } | Self::ProvisioningFailed { .. } => Some(VmStatus::Failed),
            _ => None,
        }
    }

    /// A VM that exists on the backend even though the create call failed.
    /// The caller owns cleaning it up.
    pub fn orphaned_vm(&self) -> Option<&VmId> {
        match self {
            Self::PartialProvisioning { vm_id, .. }
            | Self::ProvisioningTimeout { vm_id, .. }
            | Self::ProvisioningRead { vm_id, .. }
            | Self::ProvisioningCancelled { vm_id }
            | Self::ProvisioningFailed { vm_id, .. } => Some(vm_id),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Kind of backend resource looked up by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Vm,
    Network,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Vm => "vm",
            Self::Network => "network",
        })
    }
}

/// State transition commands on an existing VM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Start,
    Stop,
    Reboot,
    Terminate,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Reboot => "reboot",
            Self::Terminate => "terminate",
        }
    }

    /// Status asserted once the command is accepted. The backend has no
    /// intermediate status for these transitions.
    pub fn optimistic_status(&self) -> VmStatus {
        match self {
            Self::Start => VmStatus::Resuming,
            Self::Stop => VmStatus::Suspending,
            Self::Reboot => VmStatus::Rebooting,
            Self::Terminate => VmStatus::Terminating,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cloud-agnostic VM lifecycle interface.
///
/// VMs are addressed by their human-assigned name; implementations resolve
/// the backend id on every call and never cache backend state.
#[async_trait]
pub trait VmHandler: Send + Sync + 'static {
    /// Create a VM and wait until it is running with its public IP attached.
    ///
    /// The wait gives up after `timeout` or when `cancel` fires. On failure
    /// after the backend accepted the create, [`Error::orphaned_vm`] names
    /// the VM left behind.
    async fn create_vm(
        &self,
        req: &VmReqInfo,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<VmInfo>;

    /// Power on a stopped VM.
    async fn start_vm(&self, name: &str) -> Result<VmStatus>;

    /// Power off a running VM.
    async fn stop_vm(&self, name: &str) -> Result<VmStatus>;

    /// Soft-reboot a VM.
    async fn reboot_vm(&self, name: &str) -> Result<VmStatus>;

    /// Delete a VM permanently.
    async fn terminate_vm(&self, name: &str) -> Result<VmStatus>;

    async fn get_vm_status(&self, name: &str) -> Result<VmStatus>;

    /// Status of every VM visible to the caller.
    async fn list_vm_status(&self) -> Result<Vec<VmStatusInfo>>;

    async fn get_vm(&self, name: &str) -> Result<VmInfo>;

    async fn list_vms(&self) -> Result<Vec<VmInfo>>;
}
