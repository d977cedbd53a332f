use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

/// Deserialize a field, falling back to its default when the value has an
/// unexpected shape (Nova reports `"image": ""` for volume-backed servers).
fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

// ── Server types ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct CreateServerRequest {
    pub name: String,
    #[serde(rename = "imageRef")]
    pub image_ref: String,
    #[serde(rename = "flavorRef")]
    pub flavor_ref: String,
    pub networks: Vec<NetworkRef>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub security_groups: Vec<SecurityGroupRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkRef {
    pub uuid: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityGroupRef {
    pub name: String,
}

/// Response body of `POST /servers`: only the id and the one-time admin
/// password are reported before the build starts.
#[derive(Debug, Clone, Deserialize)]
pub struct CreatedServer {
    pub id: String,
    #[serde(default, rename = "adminPass")]
    pub admin_pass: Option<String>,
}

/// Image or flavor reference embedded in a server record.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ResourceRef {
    pub id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressType {
    Fixed,
    Floating,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerAddress {
    pub addr: String,
    #[serde(default)]
    pub version: Option<u8>,
    #[serde(default, rename = "OS-EXT-IPS:type")]
    pub ip_type: Option<AddressType>,
    #[serde(default, rename = "OS-EXT-IPS-MAC:mac_addr")]
    pub mac_addr: Option<String>,
}

/// A server record as returned by `GET /servers/{id}` and `/servers/detail`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Server {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub key_name: Option<String>,
    #[serde(default)]
    pub user_id: String,
    #[serde(default, rename = "adminPass")]
    pub admin_pass: Option<String>,
    #[serde(default, rename = "hostId")]
    pub host_id: String,
    #[serde(default, deserialize_with = "lenient")]
    pub created: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient")]
    pub image: Option<ResourceRef>,
    #[serde(default, deserialize_with = "lenient")]
    pub flavor: Option<ResourceRef>,
    #[serde(default, deserialize_with = "lenient")]
    pub security_groups: Vec<SecurityGroupRef>,
    /// Addresses keyed by network name.
    #[serde(default, deserialize_with = "lenient")]
    pub addresses: BTreeMap<String, Vec<ServerAddress>>,
}

impl Server {
    /// Iterate `(network, address)` pairs in network-name order.
    pub fn iter_addresses(&self) -> impl Iterator<Item = (&str, &ServerAddress)> {
        self.addresses
            .iter()
            .flat_map(|(net, addrs)| addrs.iter().map(move |a| (net.as_str(), a)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RebootType {
    Soft,
    Hard,
}

#[derive(Debug, Clone, Default)]
pub struct ListServersQuery {
    /// Backend-side name filter. Nova treats this as a pattern, not an exact match.
    pub name: Option<String>,
    pub limit: Option<u32>,
    pub marker: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Link {
    pub rel: String,
    pub href: String,
}

/// One page of `/servers/detail`.
#[derive(Debug, Clone, Default)]
pub struct ServerPage {
    pub servers: Vec<Server>,
    /// Marker for the next page, taken from the `rel=next` link.
    pub next_marker: Option<String>,
}

// ── Envelopes ────────────────────────────────────────────────────────

#[derive(Serialize)]
pub(crate) struct CreateServerBody<'a> {
    pub server: &'a CreateServerRequest,
}

#[derive(Deserialize)]
pub(crate) struct CreatedServerEnvelope {
    pub server: CreatedServer,
}

#[derive(Deserialize)]
pub(crate) struct ServerEnvelope {
    pub server: Server,
}

#[derive(Deserialize)]
pub(crate) struct ServerList {
    pub servers: Vec<Server>,
    #[serde(default)]
    pub servers_links: Vec<Link>,
}

impl ServerList {
    pub(crate) fn into_page(self) -> ServerPage {
        let next_marker = self
            .servers_links
            .iter()
            .find(|l| l.rel == "next")
            .and_then(|l| marker_from_href(&l.href));
        ServerPage {
            servers: self.servers,
            next_marker,
        }
    }
}

fn marker_from_href(href: &str) -> Option<String> {
    let url = reqwest::Url::parse(href).ok()?;
    url.query_pairs()
        .find(|(k, _)| k == "marker")
        .map(|(_, v)| v.into_owned())
}

// ── Network types ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Network {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Deserialize)]
pub(crate) struct NetworkList {
    pub networks: Vec<Network>,
}
