use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use openstack_api::{
    ComputeClient, CreateServerRequest, NetworkClient, NetworkRef, RebootType, SecurityGroupRef,
    Server,
};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{Span, debug, error, info, warn};

use crate::backend::{ComputeApi, NetworkApi, list_all_servers};
use crate::config::HandlerConfig;
use crate::identity::{managed_network_id, resolve_vm_id};
use crate::types::{VmId, VmInfo, VmReqInfo, VmStatus, VmStatusInfo};
use crate::{Action, Error, Result, VmHandler, projection, status};

/// OpenStack VM lifecycle handler.
///
/// Holds shared handles to the compute and network services and keeps no
/// other state: every call re-reads the backend.
pub struct OpenStackVmHandler {
    compute: Arc<dyn ComputeApi>,
    network: Arc<dyn NetworkApi>,
    config: HandlerConfig,
    span: Span,
}

impl OpenStackVmHandler {
    /// All log events are emitted as children of `span`.
    pub fn new(
        compute: Arc<dyn ComputeApi>,
        network: Arc<dyn NetworkApi>,
        config: HandlerConfig,
        span: Span,
    ) -> Self {
        Self {
            compute,
            network,
            config,
            span,
        }
    }

    /// Create from env vars:
    ///
    /// - `OPENSTACK_COMPUTE_URL` (required)
    /// - `OPENSTACK_NETWORK_URL` (required)
    /// - `OPENSTACK_AUTH_TOKEN` (required)
    /// - tunables read by [`HandlerConfig::from_env`]
    pub fn from_env(span: Span) -> Result<Self> {
        dotenvy::dotenv().ok();

        let compute_url = std::env::var("OPENSTACK_COMPUTE_URL")
            .map_err(|_| Error::MissingEnv("OPENSTACK_COMPUTE_URL".into()))?;
        let network_url = std::env::var("OPENSTACK_NETWORK_URL")
            .map_err(|_| Error::MissingEnv("OPENSTACK_NETWORK_URL".into()))?;
        let token = std::env::var("OPENSTACK_AUTH_TOKEN")
            .map_err(|_| Error::MissingEnv("OPENSTACK_AUTH_TOKEN".into()))?;

        let config = HandlerConfig::from_env()?;

        Ok(Self::new(
            Arc::new(ComputeClient::new(compute_url, token.clone())),
            Arc::new(NetworkClient::new(network_url, token)),
            config,
            span,
        ))
    }

    pub fn config(&self) -> &HandlerConfig {
        &self.config
    }

    async fn resolve(&self, name: &str) -> Result<VmId> {
        resolve_vm_id(&*self.compute, name, self.config.page_size).await
    }

    fn normalize(&self, vm_id: &str, raw: &str) -> VmStatus {
        match status::try_normalize(raw) {
            Ok(status) => status,
            Err(e) => {
                warn!(parent: &self.span, vm_id, error = %e, "openstack: unrecognized server status");
                VmStatus::Failed
            }
        }
    }

    fn project(&self, server: &Server) -> VmInfo {
        for ty in projection::shadowed_address_types(server) {
            warn!(
                parent: &self.span,
                vm_id = %server.id,
                address_type = ?ty,
                "openstack: several addresses share a type, keeping the last"
            );
        }
        projection::project(server)
    }

    /// Attach a floating IP to a VM. Not retried.
    pub async fn associate_public_ip(
        &self,
        vm_id: &VmId,
        address: &str,
    ) -> openstack_api::Result<()> {
        self.compute.add_floating_ip(&vm_id.0, address).await?;
        info!(parent: &self.span, vm_id = %vm_id, address, "openstack: public ip associated");
        Ok(())
    }

    /// [`VmHandler::create_vm`] bounded by the configured
    /// `provision_timeout`.
    pub async fn create_vm_with_default_timeout(
        &self,
        req: &VmReqInfo,
        cancel: &CancellationToken,
    ) -> Result<VmInfo> {
        self.create_vm(req, self.config.provision_timeout, cancel).await
    }

    /// Poll the server until it reports `active`.
    ///
    /// A timeout too large to represent as an instant means no deadline.
    async fn wait_until_active(
        &self,
        vm_id: &VmId,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<Server> {
        let deadline = Instant::now().checked_add(timeout);
        let mut polls: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(Error::ProvisioningCancelled {
                    vm_id: vm_id.clone(),
                });
            }

            let server = self
                .compute
                .get_server(&vm_id.0)
                .await
                .map_err(|source| Error::ProvisioningRead {
                    vm_id: vm_id.clone(),
                    source,
                })?;
            polls += 1;

            let status = self.normalize(&server.id, &server.status);
            debug!(
                parent: &self.span,
                vm_id = %vm_id,
                polls,
                raw_status = %server.status,
                %status,
                "openstack: polled server status"
            );

            if status == VmStatus::Running {
                info!(parent: &self.span, vm_id = %vm_id, polls, "openstack: server active");
                return Ok(server);
            }

            // ERROR is terminal for a build
            if server.status.eq_ignore_ascii_case("error") {
                return Err(Error::ProvisioningFailed {
                    vm_id: vm_id.clone(),
                    status: server.status,
                });
            }

            // An unrepresentable next read is past any deadline.
            let next_read = Instant::now().checked_add(self.config.poll_interval);
            if let Some(deadline) = deadline
                && next_read.is_none_or(|at| at > deadline)
            {
                return Err(Error::ProvisioningTimeout {
                    vm_id: vm_id.clone(),
                    waited: timeout,
                    last_status: server.status,
                });
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(Error::ProvisioningCancelled { vm_id: vm_id.clone() });
                }
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }
    }

    async fn transition(&self, name: &str, action: Action) -> Result<VmStatus> {
        let vm_id = self.resolve(name).await?;

        let result = match action {
            Action::Start => self.compute.start_server(&vm_id.0).await,
            Action::Stop => self.compute.stop_server(&vm_id.0).await,
            Action::Reboot => self.compute.reboot_server(&vm_id.0, RebootType::Soft).await,
            Action::Terminate => self.compute.delete_server(&vm_id.0).await,
        };

        match result {
            Ok(()) => {
                let status = action.optimistic_status();
                info!(parent: &self.span, vm_id = %vm_id, name, %action, %status, "openstack: command accepted");
                Ok(status)
            }
            Err(source) => {
                error!(
                    parent: &self.span,
                    vm_id = %vm_id,
                    name,
                    %action,
                    status = %VmStatus::Failed,
                    error = %source,
                    "openstack: command failed"
                );
                Err(Error::CommandFailed {
                    action,
                    name: name.to_string(),
                    source,
                })
            }
        }
    }
}

#[async_trait]
impl VmHandler for OpenStackVmHandler {
    async fn create_vm(
        &self,
        req: &VmReqInfo,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<VmInfo> {
        let vnet_id = managed_network_id(&*self.network, &self.config.vnet_name).await?;

        let key_name = if req.key_pair_name.is_empty() {
            None
        } else {
            Some(req.key_pair_name.clone())
        };

        let created = self
            .compute
            .create_server(&CreateServerRequest {
                name: req.name.clone(),
                image_ref: req.image_id.clone(),
                flavor_ref: req.spec_id.clone(),
                networks: vec![NetworkRef { uuid: vnet_id }],
                security_groups: req
                    .security_group_ids
                    .iter()
                    .map(|name| SecurityGroupRef { name: name.clone() })
                    .collect(),
                key_name,
            })
            .await?;

        let vm_id = VmId(created.id);
        info!(parent: &self.span, vm_id = %vm_id, name = %req.name, "openstack: server created");

        let server = self.wait_until_active(&vm_id, timeout, cancel).await?;

        if let Err(source) = self.associate_public_ip(&vm_id, &req.public_ip).await {
            error!(
                parent: &self.span,
                vm_id = %vm_id,
                name = %req.name,
                error = %source,
                "openstack: public ip association failed, server left running"
            );
            return Err(Error::PartialProvisioning {
                vm_id,
                name: req.name.clone(),
                source,
            });
        }

        let mut info = self.project(&server);
        // Nova only reports the admin password in the create response.
        if info.vm_user_passwd.is_none() {
            info.vm_user_passwd = created.admin_pass;
        }
        // The active read predates the association.
        if info.public_ip.is_none() {
            info.public_ip = Some(req.public_ip.clone());
        }

        Ok(info)
    }

    async fn start_vm(&self, name: &str) -> Result<VmStatus> {
        self.transition(name, Action::Start).await
    }

    async fn stop_vm(&self, name: &str) -> Result<VmStatus> {
        self.transition(name, Action::Stop).await
    }

    async fn reboot_vm(&self, name: &str) -> Result<VmStatus> {
        self.transition(name, Action::Reboot).await
    }

    async fn terminate_vm(&self, name: &str) -> Result<VmStatus> {
        self.transition(name, Action::Terminate).await
    }

    async fn get_vm_status(&self, name: &str) -> Result<VmStatus> {
        let vm_id = self.resolve(name).await?;
        let server = self.compute.get_server(&vm_id.0).await?;
        Ok(self.normalize(&server.id, &server.status))
    }

    async fn list_vm_status(&self) -> Result<Vec<VmStatusInfo>> {
        let servers = list_all_servers(&*self.compute, None, self.config.page_size).await?;

        Ok(servers
            .into_iter()
            .map(|s| VmStatusInfo {
                status: self.normalize(&s.id, &s.status),
                id: VmId(s.id),
            })
            .collect())
    }

    async fn get_vm(&self, name: &str) -> Result<VmInfo> {
        let vm_id = self.resolve(name).await?;
        let server = self.compute.get_server(&vm_id.0).await?;
        Ok(self.project(&server))
    }

    async fn list_vms(&self) -> Result<Vec<VmInfo>> {
        let servers = list_all_servers(&*self.compute, None, self.config.page_size).await?;
        Ok(servers.iter().map(|s| self.project(s)).collect())
    }
}
