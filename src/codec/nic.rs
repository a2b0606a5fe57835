//! Codec for PVE network interface strings.
//!
//! The wire form leads with `model=mac`, followed by `bridge=...` and the
//! optional flags. An unknown model is a hard error; the `enabled` domain
//! flag maps to the wire `link_down` with inverted polarity.

use crate::core::domain::{
    error::{PveResult, ValidationError},
    model::nic::{Nic, NicModel, NIC_POSITION_MAX},
    value_object::{BridgeName, MacAddress},
};
use log::warn;

/// Builds the PVE field name for a NIC slot (`net0`..`net7`).
pub fn nic_field_name(position: u8) -> PveResult<String> {
    if position > NIC_POSITION_MAX {
        return Err(ValidationError::ConstraintViolation(format!(
            "NIC position net{} out of range (max net{})",
            position, NIC_POSITION_MAX
        ))
        .into());
    }
    Ok(format!("net{}", position))
}

/// Decodes one NIC configuration string.
pub fn decode_nic(position: u8, raw: &str) -> PveResult<Nic> {
    let mut model = None;
    let mut mac = None;
    let mut bridge = None;
    let mut enabled = true;
    let mut firewall = false;
    let mut vlan: Option<u16> = None;
    let mut rate_limit: Option<u64> = None;
    let mut mtu: Option<u16> = None;

    for option in raw.split(',') {
        let Some((key, value)) = option.split_once('=') else {
            warn!("ignoring malformed NIC option '{}' in '{}'", option, raw);
            continue;
        };
        match key {
            "virtio" | "e1000" | "rtl8139" | "vmxnet3" => {
                model = Some(NicModel::parse(key).expect("matched known model"));
                mac = Some(MacAddress::new(value)?);
            }
            "model" => model = Some(NicModel::parse(value)?),
            "macaddr" => mac = Some(MacAddress::new(value)?),
            "bridge" => bridge = Some(BridgeName::new(value)?),
            "link_down" => enabled = !decode_bit(key, value, raw)?,
            "firewall" => firewall = decode_bit(key, value, raw)?,
            "tag" => vlan = Some(decode_number(key, value, raw)?),
            "rate" => rate_limit = Some(decode_number(key, value, raw)?),
            "mtu" => mtu = Some(decode_number(key, value, raw)?),
            other => {
                // The leading token of a NIC string is always the model; a
                // key that is neither a known option nor a known model is a
                // model PVE does not support.
                return Err(ValidationError::Format(format!(
                    "unknown NIC model or option '{}' in '{}'",
                    other, raw
                ))
                .into());
            }
        }
    }

    let model = model.ok_or_else(|| {
        ValidationError::Format(format!("NIC string '{}' is missing a model", raw))
    })?;
    let bridge = bridge.ok_or_else(|| {
        ValidationError::Format(format!("NIC string '{}' is missing a bridge", raw))
    })?;

    let nic = Nic {
        position,
        model,
        bridge,
        mac,
        enabled,
        firewall,
        vlan,
        rate_limit,
        mtu,
    };
    nic.validate()?;
    Ok(nic)
}

/// Encodes a NIC to its configuration string. The MAC must already be
/// assigned; the planner backfills generated addresses before encoding.
pub fn encode_nic(nic: &Nic) -> PveResult<String> {
    nic.validate()?;
    let mac = nic.mac.ok_or_else(|| {
        ValidationError::Field {
            field: format!("net{}", nic.position),
            message: "cannot encode a NIC without a MAC address".to_string(),
        }
    })?;

    let mut out = format!("{}={},bridge={}", nic.model.as_str(), mac, nic.bridge);
    if let Some(tag) = nic.vlan {
        out.push_str(&format!(",tag={}", tag));
    }
    if nic.firewall {
        out.push_str(",firewall=1");
    }
    if !nic.enabled {
        out.push_str(",link_down=1");
    }
    if let Some(rate) = nic.rate_limit {
        out.push_str(&format!(",rate={}", rate));
    }
    if let Some(mtu) = nic.mtu {
        out.push_str(&format!(",mtu={}", mtu));
    }
    Ok(out)
}

fn decode_bit(key: &str, value: &str, raw: &str) -> PveResult<bool> {
    match value {
        "1" => Ok(true),
        "0" => Ok(false),
        other => Err(ValidationError::Format(format!(
            "invalid value '{}' for NIC option '{}' in '{}'",
            other, key, raw
        ))
        .into()),
    }
}

fn decode_number<T: std::str::FromStr>(key: &str, value: &str, raw: &str) -> PveResult<T> {
    value.parse().map_err(|_| {
        ValidationError::Format(format!(
            "invalid value '{}' for NIC option '{}' in '{}'",
            value, key, raw
        ))
        .into()
    })
}
