use std::time::Duration;

use crate::{Error, Result};

const DEFAULT_VNET_NAME: &str = "CB-VNet";
const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;
const DEFAULT_PROVISION_TIMEOUT_SECS: u64 = 600;
const MAX_POLL_INTERVAL_SECS: u64 = 3600;

/// Tunables for [`OpenStackVmHandler`](crate::openstack::OpenStackVmHandler).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerConfig {
    /// Name of the network new VMs are attached to.
    pub vnet_name: String,
    /// Delay between status reads while waiting for a new VM.
    pub poll_interval: Duration,
    /// Default upper bound on the create wait, for callers that have none.
    pub provision_timeout: Duration,
    /// Page size for server listings. `None` uses the backend default.
    pub page_size: Option<u32>,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            vnet_name: DEFAULT_VNET_NAME.into(),
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            provision_timeout: Duration::from_secs(DEFAULT_PROVISION_TIMEOUT_SECS),
            page_size: None,
        }
    }
}

impl HandlerConfig {
    /// Load from env vars, all optional:
    ///
    /// - `OPENSTACK_VNET_NAME` (default: `"CB-VNet"`)
    /// - `OPENSTACK_POLL_INTERVAL_SECS` (default: 5, 1 to 3600)
    /// - `OPENSTACK_PROVISION_TIMEOUT_SECS` (default: 600)
    /// - `OPENSTACK_PAGE_SIZE` (default: backend's)
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_vars(|key| std::env::var(key).ok())
    }

    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let vnet_name = lookup("OPENSTACK_VNET_NAME")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or(defaults.vnet_name);

        let poll_interval = parse_var(&lookup, "OPENSTACK_POLL_INTERVAL_SECS")?
            .map(|secs: u64| {
                if (1..=MAX_POLL_INTERVAL_SECS).contains(&secs) {
                    Ok(Duration::from_secs(secs))
                } else {
                    Err(Error::InvalidConfig {
                        var: "OPENSTACK_POLL_INTERVAL_SECS",
                        value: secs.to_string(),
                    })
                }
            })
            .transpose()?
            .unwrap_or(defaults.poll_interval);

        let provision_timeout = parse_var(&lookup, "OPENSTACK_PROVISION_TIMEOUT_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.provision_timeout);

        let page_size = parse_var(&lookup, "OPENSTACK_PAGE_SIZE")?;

        Ok(Self {
            vnet_name,
            poll_interval,
            provision_timeout,
            page_size,
        })
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>> {
    match lookup(var) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| Error::InvalidConfig { var, value: raw }),
    }
}
