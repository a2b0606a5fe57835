//! Domain model for cloud-init first-boot configuration.

use crate::core::domain::error::{PveResult, ValidationError};
use serde::{Deserialize, Serialize};

/// Highest ipconfig slot index PVE accepts (`ipconfig0..ipconfig7`).
pub const IPCONFIG_POSITION_MAX: u8 = 7;

/// One address family's configuration on an `ipconfigN` slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IpSpec {
    Dhcp,
    Static {
        /// CIDR notation, `address/netmask`. The netmask is mandatory.
        address: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        gateway: Option<String>,
    },
}

impl IpSpec {
    pub fn validate(&self, family: &str, position: u8) -> PveResult<()> {
        if let IpSpec::Static { address, .. } = self {
            if !address.contains('/') {
                return Err(ValidationError::Field {
                    field: format!("ipconfig{}.{}", position, family),
                    message: format!(
                        "static address '{}' must carry a netmask (address/netmask)",
                        address
                    ),
                }
                .into());
            }
        }
        Ok(())
    }
}

/// IP configuration of one cloud-init NIC slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudInitIp {
    pub position: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub v4: Option<IpSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub v6: Option<IpSpec>,
}

impl CloudInitIp {
    pub fn validate(&self) -> PveResult<()> {
        if self.position > IPCONFIG_POSITION_MAX {
            return Err(ValidationError::ConstraintViolation(format!(
                "ipconfig position ipconfig{} out of range (max ipconfig{})",
                self.position, IPCONFIG_POSITION_MAX
            ))
            .into());
        }
        if let Some(v4) = &self.v4 {
            v4.validate("ip", self.position)?;
        }
        if let Some(v6) = &self.v6 {
            v6.validate("ip6", self.position)?;
        }
        Ok(())
    }
}

/// Full cloud-init configuration for a guest.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CloudInitConfig {
    /// First-boot account name (`ciuser`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// First-boot account password (`cipassword`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Authorized SSH public keys, one per entry.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ssh_keys: Vec<String>,
    /// DNS search domain (`searchdomain`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns_domain: Option<String>,
    /// DNS servers, space-joined into `nameserver`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dns_servers: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ip_configs: Vec<CloudInitIp>,
}

impl CloudInitConfig {
    pub fn validate(&self) -> PveResult<()> {
        for ip in &self.ip_configs {
            ip.validate()?;
        }
        let mut positions: Vec<u8> = self.ip_configs.iter().map(|c| c.position).collect();
        positions.sort_unstable();
        positions.dedup();
        if positions.len() != self.ip_configs.len() {
            return Err(ValidationError::ConstraintViolation(
                "duplicate cloud-init ipconfig positions".to_string(),
            )
            .into());
        }
        Ok(())
    }
}
