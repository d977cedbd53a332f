//! Projection of Nova server records into [`VmInfo`].

use openstack_api::{AddressType, Server};

use crate::types::{VmId, VmInfo};

/// Build a [`VmInfo`] snapshot from a server record.
///
/// Assumes at most one address per type. When a server carries several
/// `floating` (or `fixed`) addresses the last one scanned wins; networks are
/// scanned in name order and addresses in backend order. See
/// [`shadowed_address_types`].
pub fn project(server: &Server) -> VmInfo {
    let mut info = VmInfo {
        name: server.name.clone(),
        id: VmId(server.id.clone()),
        key_pair_name: server.key_name.clone(),
        vm_user_id: server.user_id.clone(),
        vm_user_passwd: server.admin_pass.clone(),
        network_interface_id: server.host_id.clone(),
        start_time: server.created,
        image_id: server.image.as_ref().map(|r| r.id.clone()),
        spec_id: server.flavor.as_ref().map(|r| r.id.clone()),
        security_group_ids: server
            .security_groups
            .iter()
            .map(|sg| sg.name.clone())
            .collect(),
        virtual_network_id: None,
        public_ip: None,
        private_ip: None,
    };

    for (network, addr) in server.iter_addresses() {
        info.virtual_network_id = Some(network.to_string());
        match addr.ip_type {
            Some(AddressType::Floating) => info.public_ip = Some(addr.addr.clone()),
            Some(AddressType::Fixed) => info.private_ip = Some(addr.addr.clone()),
            _ => {}
        }
    }

    info
}

/// Address types that occur more than once on the server, i.e. where
/// [`project`] dropped an address.
pub fn shadowed_address_types(server: &Server) -> Vec<AddressType> {
    [AddressType::Floating, AddressType::Fixed]
        .into_iter()
        .filter(|ty| {
            server
                .iter_addresses()
                .filter(|(_, a)| a.ip_type == Some(*ty))
                .count()
                > 1
        })
        .collect()
}
