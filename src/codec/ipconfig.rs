//! Codec for cloud-init `ipconfigN` strings.
//!
//! The wire form is comma-separated assignments over exactly the keys
//! `ip`, `gw`, `ip6` and `gw6`; anything else is rejected. `ip=dhcp`
//! requests DHCP, otherwise the value is `address/netmask`.

use crate::core::domain::{
    error::{PveResult, ValidationError},
    model::cloudinit::{CloudInitIp, IpSpec, IPCONFIG_POSITION_MAX},
};

/// Builds the PVE field name for a cloud-init slot (`ipconfig0`..`ipconfig7`).
pub fn ipconfig_field_name(position: u8) -> PveResult<String> {
    if position > IPCONFIG_POSITION_MAX {
        return Err(ValidationError::ConstraintViolation(format!(
            "ipconfig position ipconfig{} out of range (max ipconfig{})",
            position, IPCONFIG_POSITION_MAX
        ))
        .into());
    }
    Ok(format!("ipconfig{}", position))
}

/// Decodes one `ipconfigN` string.
pub fn decode_ipconfig(position: u8, raw: &str) -> PveResult<CloudInitIp> {
    let mut ip = None;
    let mut gw = None;
    let mut ip6 = None;
    let mut gw6 = None;

    for assignment in raw.split(',') {
        let (key, value) = assignment.split_once('=').ok_or_else(|| {
            ValidationError::Format(format!(
                "malformed ipconfig assignment '{}' in '{}'",
                assignment, raw
            ))
        })?;
        let slot = match key {
            "ip" => &mut ip,
            "gw" => &mut gw,
            "ip6" => &mut ip6,
            "gw6" => &mut gw6,
            other => {
                return Err(ValidationError::Format(format!(
                    "unknown ipconfig key '{}' in '{}'",
                    other, raw
                ))
                .into());
            }
        };
        *slot = Some(value.to_string());
    }

    let v4 = build_spec(ip, gw, "ip", position)?;
    let v6 = build_spec(ip6, gw6, "ip6", position)?;

    let config = CloudInitIp { position, v4, v6 };
    config.validate()?;
    Ok(config)
}

/// Encodes one cloud-init slot to its `ipconfigN` string.
pub fn encode_ipconfig(config: &CloudInitIp) -> PveResult<String> {
    config.validate()?;
    let mut parts = Vec::new();
    if let Some(v4) = &config.v4 {
        match v4 {
            IpSpec::Dhcp => parts.push("ip=dhcp".to_string()),
            IpSpec::Static { address, gateway } => {
                parts.push(format!("ip={}", address));
                if let Some(gateway) = gateway {
                    parts.push(format!("gw={}", gateway));
                }
            }
        }
    }
    if let Some(v6) = &config.v6 {
        match v6 {
            IpSpec::Dhcp => parts.push("ip6=dhcp".to_string()),
            IpSpec::Static { address, gateway } => {
                parts.push(format!("ip6={}", address));
                if let Some(gateway) = gateway {
                    parts.push(format!("gw6={}", gateway));
                }
            }
        }
    }
    Ok(parts.join(","))
}

fn build_spec(
    address: Option<String>,
    gateway: Option<String>,
    family: &str,
    position: u8,
) -> PveResult<Option<IpSpec>> {
    match address {
        None => {
            if gateway.is_some() {
                return Err(ValidationError::Field {
                    field: format!("ipconfig{}", position),
                    message: format!("gateway for '{}' given without an address", family),
                }
                .into());
            }
            Ok(None)
        }
        Some(addr) if addr == "dhcp" => Ok(Some(IpSpec::Dhcp)),
        Some(addr) => Ok(Some(IpSpec::Static {
            address: addr,
            gateway,
        })),
    }
}
