//! In-memory OpenStack backend for driving the handler in tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::io;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use openstack_api::{
    CreateServerRequest, CreatedServer, ListServersQuery, Network, RebootType, Server,
    ServerAddress, ServerPage,
};
use serde_json::json;
use vm_infra::backend::{ComputeApi, NetworkApi};
use vm_infra::config::HandlerConfig;
use vm_infra::openstack::OpenStackVmHandler;
use vm_infra::types::VmReqInfo;
use tracing::Span;
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::EnvFilter;

pub const VNET: &str = "CB-VNet";
pub const ADMIN_PASS: &str = "s3cret-pass";

pub fn server(id: &str, name: &str, status: &str) -> Server {
    serde_json::from_value(json!({
        "id": id,
        "name": name,
        "status": status,
        "key_name": "ops",
        "user_id": "u-1",
        "hostId": format!("host-{id}"),
        "created": "2024-03-01T10:00:00Z",
        "image": { "id": "img-1" },
        "flavor": { "id": "m1.small" },
        "security_groups": [{ "name": "default" }],
        "addresses": {
            "CB-VNet": [{ "addr": "10.0.0.5", "version": 4, "OS-EXT-IPS:type": "fixed" }]
        }
    }))
    .unwrap()
}

pub fn request(name: &str) -> VmReqInfo {
    VmReqInfo {
        name: name.into(),
        image_id: "img-1".into(),
        spec_id: "m1.small".into(),
        security_group_ids: vec!["default".into(), "web".into()],
        key_pair_name: "ops".into(),
        public_ip: "172.24.4.9".into(),
    }
}

fn injected(endpoint: &'static str) -> openstack_api::Error {
    openstack_api::Error::Api {
        endpoint,
        status: reqwest::StatusCode::CONFLICT,
        body: "injected failure".into(),
    }
}

fn not_found(endpoint: &'static str) -> openstack_api::Error {
    openstack_api::Error::Api {
        endpoint,
        status: reqwest::StatusCode::NOT_FOUND,
        body: "no such server".into(),
    }
}

#[derive(Default)]
struct Inner {
    servers: Vec<Server>,
    /// Status sequence reported by successive reads of a server.
    scripts: HashMap<String, VecDeque<String>>,
    next_script: Option<Vec<String>>,
    failing: HashSet<&'static str>,
    created: Vec<CreateServerRequest>,
    calls: Vec<(&'static str, String)>,
    next_id: usize,
}

#[derive(Default)]
pub struct FakeCompute {
    inner: Mutex<Inner>,
}

impl FakeCompute {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert(&self, server: Server) {
        self.inner.lock().unwrap().servers.push(server);
    }

    /// Statuses the next created server reports on successive reads.
    /// The last one sticks.
    pub fn script_next_create(&self, statuses: &[&str]) {
        self.inner.lock().unwrap().next_script =
            Some(statuses.iter().map(|s| s.to_string()).collect());
    }

    /// Make every call of `op` fail (`create`, `get`, `list`, `start`,
    /// `stop`, `reboot`, `delete`, `add_floating_ip`).
    pub fn fail(&self, op: &'static str) {
        self.inner.lock().unwrap().failing.insert(op);
    }

    pub fn created(&self) -> Vec<CreateServerRequest> {
        self.inner.lock().unwrap().created.clone()
    }

    /// Every call in order, as `(op, argument)`.
    pub fn calls(&self) -> Vec<(&'static str, String)> {
        self.inner.lock().unwrap().calls.clone()
    }

    pub fn count(&self, op: &str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|(o, _)| *o == op)
            .count()
    }

    fn record(&self, op: &'static str, arg: &str) -> openstack_api::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push((op, arg.to_string()));
        if inner.failing.contains(op) {
            return Err(injected(op));
        }
        Ok(())
    }

    fn with_server<T>(
        &self,
        op: &'static str,
        id: &str,
        f: impl FnOnce(&mut Server) -> T,
    ) -> openstack_api::Result<T> {
        let mut inner = self.inner.lock().unwrap();
        let server = inner
            .servers
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| not_found(op))?;
        Ok(f(server))
    }
}

#[async_trait]
impl ComputeApi for FakeCompute {
    async fn create_server(&self, req: &CreateServerRequest) -> openstack_api::Result<CreatedServer> {
        self.record("create", &req.name)?;

        let mut inner = self.inner.lock().unwrap();
        inner.next_id += 1;
        let id = format!("srv-new-{}", inner.next_id);

        let mut created = server(&id, &req.name, "BUILD");
        created.key_name = req.key_name.clone();
        created.security_groups = req.security_groups.clone();
        inner.servers.push(created);
        inner.created.push(req.clone());
        if let Some(script) = inner.next_script.take() {
            inner.scripts.insert(id.clone(), script.into());
        }

        Ok(CreatedServer {
            id,
            admin_pass: Some(ADMIN_PASS.into()),
        })
    }

    async fn get_server(&self, server_id: &str) -> openstack_api::Result<Server> {
        self.record("get", server_id)?;

        let next = {
            let mut inner = self.inner.lock().unwrap();
            inner.scripts.get_mut(server_id).and_then(|script| {
                if script.len() > 1 {
                    script.pop_front()
                } else {
                    script.front().cloned()
                }
            })
        };

        self.with_server("get server", server_id, |s| {
            if let Some(status) = next {
                s.status = status;
            }
            s.clone()
        })
    }

    async fn list_servers(&self, query: &ListServersQuery) -> openstack_api::Result<ServerPage> {
        self.record("list", query.marker.as_deref().unwrap_or(""))?;

        let inner = self.inner.lock().unwrap();
        // Nova's name filter is a pattern, not an exact match.
        let matching: Vec<&Server> = inner
            .servers
            .iter()
            .filter(|s| query.name.as_deref().is_none_or(|n| s.name.contains(n)))
            .collect();

        let start = match &query.marker {
            Some(marker) => matching
                .iter()
                .position(|s| &s.id == marker)
                .map_or(matching.len(), |i| i + 1),
            None => 0,
        };
        let limit = query.limit.map_or(usize::MAX, |l| l as usize);
        let page: Vec<Server> = matching
            .iter()
            .skip(start)
            .take(limit)
            .map(|s| (*s).clone())
            .collect();

        let next_marker = if start + page.len() < matching.len() {
            page.last().map(|s| s.id.clone())
        } else {
            None
        };

        Ok(ServerPage {
            servers: page,
            next_marker,
        })
    }

    async fn delete_server(&self, server_id: &str) -> openstack_api::Result<()> {
        self.record("delete", server_id)?;
        self.inner
            .lock()
            .unwrap()
            .servers
            .retain(|s| s.id != server_id);
        Ok(())
    }

    async fn reboot_server(&self, server_id: &str, kind: RebootType) -> openstack_api::Result<()> {
        assert_eq!(kind, RebootType::Soft);
        self.record("reboot", server_id)
    }

    async fn start_server(&self, server_id: &str) -> openstack_api::Result<()> {
        self.record("start", server_id)
    }

    async fn stop_server(&self, server_id: &str) -> openstack_api::Result<()> {
        self.record("stop", server_id)
    }

    async fn add_floating_ip(&self, server_id: &str, address: &str) -> openstack_api::Result<()> {
        self.record("add_floating_ip", server_id)?;
        let address: ServerAddress = serde_json::from_value(json!({
            "addr": address,
            "version": 4,
            "OS-EXT-IPS:type": "floating"
        }))
        .unwrap();
        self.with_server("add floating ip", server_id, |s| {
            s.addresses.entry(VNET.to_string()).or_default().push(address);
        })
    }
}

pub struct FakeNetwork {
    networks: Vec<Network>,
}

impl FakeNetwork {
    pub fn with(names: &[&str]) -> Arc<Self> {
        let networks = names
            .iter()
            .enumerate()
            .map(|(i, name)| Network {
                id: format!("net-{i}"),
                name: name.to_string(),
                status: Some("ACTIVE".into()),
            })
            .collect();
        Arc::new(Self { networks })
    }
}

#[async_trait]
impl NetworkApi for FakeNetwork {
    async fn list_networks(&self, name: Option<&str>) -> openstack_api::Result<Vec<Network>> {
        Ok(self
            .networks
            .iter()
            .filter(|n| name.is_none_or(|want| n.name.contains(want)))
            .cloned()
            .collect())
    }
}

pub fn handler(compute: Arc<FakeCompute>, network: Arc<FakeNetwork>) -> OpenStackVmHandler {
    handler_with(compute, network, HandlerConfig::default())
}

pub fn handler_with(
    compute: Arc<FakeCompute>,
    network: Arc<FakeNetwork>,
    config: HandlerConfig,
) -> OpenStackVmHandler {
    handler_in(compute, network, config, Span::none())
}

pub fn handler_in(
    compute: Arc<FakeCompute>,
    network: Arc<FakeNetwork>,
    config: HandlerConfig,
    span: Span,
) -> OpenStackVmHandler {
    OpenStackVmHandler::new(compute, network, config, span)
}

/// Formatted log output, shared between the subscriber and the test.
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Route `info` and above on this thread into a buffer until the guard
/// drops. Needs a current-thread runtime.
pub fn capture_logs() -> (CapturedLogs, DefaultGuard) {
    let logs = CapturedLogs::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("info"))
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    (logs, tracing::subscriber::set_default(subscriber))
}
