//! Outbound seams to the cloud backend.
//!
//! The orchestrator only talks to these traits, so it can be driven by the
//! real OpenStack clients or by an in-memory backend in tests.

use async_trait::async_trait;
use openstack_api::{
    ComputeClient, CreateServerRequest, CreatedServer, ListServersQuery, Network, NetworkClient,
    RebootType, Server, ServerPage,
};

/// Instance lifecycle calls on the compute service.
#[async_trait]
pub trait ComputeApi: Send + Sync + 'static {
    async fn create_server(&self, req: &CreateServerRequest) -> openstack_api::Result<CreatedServer>;

    async fn get_server(&self, server_id: &str) -> openstack_api::Result<Server>;

    /// Fetch a single page; see [`list_all_servers`] for draining.
    async fn list_servers(&self, query: &ListServersQuery) -> openstack_api::Result<ServerPage>;

    async fn delete_server(&self, server_id: &str) -> openstack_api::Result<()>;

    async fn reboot_server(&self, server_id: &str, kind: RebootType) -> openstack_api::Result<()>;

    async fn start_server(&self, server_id: &str) -> openstack_api::Result<()>;

    async fn stop_server(&self, server_id: &str) -> openstack_api::Result<()>;

    async fn add_floating_ip(&self, server_id: &str, address: &str) -> openstack_api::Result<()>;
}

/// Network lookups needed to place new instances.
#[async_trait]
pub trait NetworkApi: Send + Sync + 'static {
    async fn list_networks(&self, name: Option<&str>) -> openstack_api::Result<Vec<Network>>;
}

#[async_trait]
impl ComputeApi for ComputeClient {
    async fn create_server(&self, req: &CreateServerRequest) -> openstack_api::Result<CreatedServer> {
        ComputeClient::create_server(self, req).await
    }

    async fn get_server(&self, server_id: &str) -> openstack_api::Result<Server> {
        ComputeClient::get_server(self, server_id).await
    }

    async fn list_servers(&self, query: &ListServersQuery) -> openstack_api::Result<ServerPage> {
        ComputeClient::list_servers(self, query).await
    }

    async fn delete_server(&self, server_id: &str) -> openstack_api::Result<()> {
        ComputeClient::delete_server(self, server_id).await
    }

    async fn reboot_server(&self, server_id: &str, kind: RebootType) -> openstack_api::Result<()> {
        ComputeClient::reboot_server(self, server_id, kind).await
    }

    async fn start_server(&self, server_id: &str) -> openstack_api::Result<()> {
        ComputeClient::start_server(self, server_id).await
    }

    async fn stop_server(&self, server_id: &str) -> openstack_api::Result<()> {
        ComputeClient::stop_server(self, server_id).await
    }

    async fn add_floating_ip(&self, server_id: &str, address: &str) -> openstack_api::Result<()> {
        ComputeClient::add_floating_ip(self, server_id, address).await
    }
}

#[async_trait]
impl NetworkApi for NetworkClient {
    async fn list_networks(&self, name: Option<&str>) -> openstack_api::Result<Vec<Network>> {
        NetworkClient::list_networks(self, name).await
    }
}

/// Follow `next` markers until the backend reports the last page.
pub async fn list_all_servers(
    compute: &dyn ComputeApi,
    name: Option<&str>,
    page_size: Option<u32>,
) -> openstack_api::Result<Vec<Server>> {
    let mut query = ListServersQuery {
        name: name.map(str::to_string),
        limit: page_size,
        marker: None,
    };

    let mut servers = Vec::new();
    loop {
        let page = compute.list_servers(&query).await?;
        let fetched = page.servers.len();
        servers.extend(page.servers);

        match page.next_marker {
            // An empty page with a marker would loop forever.
            Some(marker) if fetched > 0 => query.marker = Some(marker),
            _ => break,
        }
    }

    Ok(servers)
}
