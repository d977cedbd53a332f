//! Typed Rust client for the OpenStack compute (Nova) and network (Neutron) APIs.
//!
//! Covers the subset needed for managing VM lifecycles:
//! servers (create, get, list, delete), server actions (reboot, start,
//! stop, floating IP association) and network lookup by name.
//!
//! Authentication is out of scope: callers pass an already-issued
//! Keystone token.

mod types;

pub use types::*;
use types::{CreateServerBody, CreatedServerEnvelope, NetworkList, ServerEnvelope, ServerList};

/// Nova microversion requested on every compute call.
const COMPUTE_API_VERSION: &str = "2.1";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("openstack api request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("openstack api {endpoint} returned {status}: {body}")]
    Api {
        endpoint: &'static str,
        status: reqwest::StatusCode,
        body: String,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Whether a response status counts as success for a call.
///
/// `tolerate_missing` accepts 404 as well, for idempotent deletes.
fn accepted(status: reqwest::StatusCode, tolerate_missing: bool) -> bool {
    status.is_success() || (tolerate_missing && status == reqwest::StatusCode::NOT_FOUND)
}

/// Send a request and turn a rejected status into `Error::Api`, keeping
/// the response body for diagnostics.
async fn send(
    req: reqwest::RequestBuilder,
    endpoint: &'static str,
    tolerate_missing: bool,
) -> Result<reqwest::Response> {
    let resp = req.send().await?;
    let status = resp.status();
    if accepted(status, tolerate_missing) {
        return Ok(resp);
    }
    Err(Error::Api {
        endpoint,
        status,
        body: resp.text().await.unwrap_or_default(),
    })
}

/// Client for the Nova compute REST API.
#[derive(Clone)]
pub struct ComputeClient {
    endpoint: String,
    token: String,
    http: reqwest::Client,
}

impl ComputeClient {
    /// `endpoint` is the project-scoped compute URL from the service
    /// catalog, e.g. `https://nova.example:8774/v2.1/<project>`.
    pub fn new(endpoint: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            token: token.into(),
            http: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.endpoint)
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.request(reqwest::Method::GET, path)
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.request(reqwest::Method::POST, path)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, self.url(path))
            .header("X-Auth-Token", &self.token)
            .header("X-OpenStack-Nova-API-Version", COMPUTE_API_VERSION)
    }

    // ── Servers ──────────────────────────────────────────────────────

    pub async fn create_server(&self, req: &CreateServerRequest) -> Result<CreatedServer> {
        let req = self.post("/servers").json(&CreateServerBody { server: req });
        let envelope: CreatedServerEnvelope = send(req, "create server", false).await?.json().await?;
        Ok(envelope.server)
    }

    pub async fn get_server(&self, server_id: &str) -> Result<Server> {
        let req = self.get(&format!("/servers/{server_id}"));
        let envelope: ServerEnvelope = send(req, "get server", false).await?.json().await?;
        Ok(envelope.server)
    }

    /// Fetch one page of `/servers/detail`.
    pub async fn list_servers(&self, query: &ListServersQuery) -> Result<ServerPage> {
        let mut params: Vec<(&str, String)> = Vec::new();
        if let Some(name) = &query.name {
            params.push(("name", name.clone()));
        }
        if let Some(limit) = query.limit {
            params.push(("limit", limit.to_string()));
        }
        if let Some(marker) = &query.marker {
            params.push(("marker", marker.clone()));
        }

        let req = self.get("/servers/detail").query(&params);
        let list: ServerList = send(req, "list servers", false).await?.json().await?;
        Ok(list.into_page())
    }

    pub async fn delete_server(&self, server_id: &str) -> Result<()> {
        let req = self.request(reqwest::Method::DELETE, &format!("/servers/{server_id}"));
        send(req, "delete server", true).await?;
        Ok(())
    }

    // ── Server actions ───────────────────────────────────────────────

    async fn action(
        &self,
        server_id: &str,
        body: serde_json::Value,
        endpoint: &'static str,
    ) -> Result<()> {
        let req = self.post(&format!("/servers/{server_id}/action")).json(&body);
        send(req, endpoint, false).await?;
        Ok(())
    }

    pub async fn reboot_server(&self, server_id: &str, kind: RebootType) -> Result<()> {
        self.action(
            server_id,
            serde_json::json!({ "reboot": { "type": kind } }),
            "reboot server",
        )
        .await
    }

    pub async fn start_server(&self, server_id: &str) -> Result<()> {
        self.action(server_id, serde_json::json!({ "os-start": null }), "start server")
            .await
    }

    pub async fn stop_server(&self, server_id: &str) -> Result<()> {
        self.action(server_id, serde_json::json!({ "os-stop": null }), "stop server")
            .await
    }

    /// Attach an allocated floating IP (by address) to the server.
    pub async fn add_floating_ip(&self, server_id: &str, address: &str) -> Result<()> {
        self.action(
            server_id,
            serde_json::json!({ "addFloatingIp": { "address": address } }),
            "add floating ip",
        )
        .await
    }
}

/// Client for the Neutron network REST API.
#[derive(Clone)]
pub struct NetworkClient {
    endpoint: String,
    token: String,
    http: reqwest::Client,
}

impl NetworkClient {
    /// `endpoint` is the Neutron base URL, without the `/v2.0` suffix.
    pub fn new(endpoint: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            token: token.into(),
            http: reqwest::Client::new(),
        }
    }

    // ── Networks ─────────────────────────────────────────────────────

    pub async fn list_networks(&self, name: Option<&str>) -> Result<Vec<Network>> {
        let mut query: Vec<(&str, &str)> = Vec::new();
        if let Some(n) = name {
            query.push(("name", n));
        }

        let req = self
            .http
            .get(format!("{}/v2.0/networks", self.endpoint))
            .header("X-Auth-Token", &self.token)
            .query(&query);
        let list: NetworkList = send(req, "list networks", false).await?.json().await?;
        Ok(list.networks)
    }
}
