//! Name → id resolution for VMs and networks.

use crate::backend::{ComputeApi, NetworkApi, list_all_servers};
use crate::types::VmId;
use crate::{Error, ResourceKind, Result};

/// Resolve a VM name to the id of the single server carrying exactly that name.
///
/// Nova's `name` filter is a pattern match, so results are narrowed to exact
/// matches before counting. More than one exact match is an error; the
/// resolver never picks one on the caller's behalf.
pub async fn resolve_vm_id(
    compute: &dyn ComputeApi,
    name: &str,
    page_size: Option<u32>,
) -> Result<VmId> {
    if name.is_empty() {
        return Err(Error::InvalidName);
    }

    let servers = list_all_servers(compute, Some(name), page_size).await?;
    let ids = servers
        .into_iter()
        .filter(|s| s.name == name)
        .map(|s| s.id);

    single_match(ResourceKind::Vm, name, ids).map(VmId)
}

/// Resolve the id of the network new VMs are attached to.
pub async fn managed_network_id(network: &dyn NetworkApi, name: &str) -> Result<String> {
    let networks = network.list_networks(Some(name)).await?;
    let ids = networks
        .into_iter()
        .filter(|n| n.name == name)
        .map(|n| n.id);

    single_match(ResourceKind::Network, name, ids)
}

fn single_match(
    kind: ResourceKind,
    name: &str,
    ids: impl Iterator<Item = String>,
) -> Result<String> {
    let mut ids: Vec<String> = ids.collect();
    match ids.len() {
        0 => Err(Error::NotFound {
            kind,
            name: name.to_string(),
        }),
        1 => Ok(ids.remove(0)),
        count => Err(Error::AmbiguousIdentity {
            kind,
            name: name.to_string(),
            count,
        }),
    }
}
