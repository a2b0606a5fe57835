//! Codec for PVE disk configuration strings.
//!
//! The wire form is `storage:volname[,key=value]*` for attached volumes,
//! `storage:<GiB>` for a volume still to be allocated, and the literal
//! `none` for an empty slot. Keys outside the known set are logged and
//! ignored so that a newer cluster cannot break decoding.

use crate::core::domain::{
    error::{PveResult, ValidationError},
    model::disk::{Disk, DiskFormat, DiskInterface, DiskSpeedLimits},
    value_object::DiskSize,
};
use log::warn;

/// Builds the PVE field name for a disk slot (`scsi3`, `virtio0`, ...).
///
/// # Errors
///
/// Returns a validation error naming the slot when the position is outside
/// the interface family's range.
pub fn disk_field_name(interface: DiskInterface, position: u8) -> PveResult<String> {
    if position > interface.max_position() {
        return Err(ValidationError::ConstraintViolation(format!(
            "disk position {}{} out of range (max {}{})",
            interface,
            position,
            interface,
            interface.max_position()
        ))
        .into());
    }
    Ok(format!("{}{}", interface, position))
}

/// Decodes one disk configuration string.
///
/// Returns `Ok(None)` for an explicitly unattached slot (`none`).
pub fn decode_disk(interface: DiskInterface, position: u8, raw: &str) -> PveResult<Option<Disk>> {
    let mut parts = raw.split(',');
    let storage_spec = parts.next().unwrap_or_default().trim();

    if storage_spec == "none" {
        return Ok(None);
    }

    let (storage, volume_spec) = storage_spec.split_once(':').ok_or_else(|| {
        ValidationError::Format(format!("invalid disk storage string: '{}'", raw))
    })?;
    if storage.is_empty() || volume_spec.is_empty() {
        return Err(
            ValidationError::Format(format!("invalid disk storage string: '{}'", raw)).into(),
        );
    }

    // A bare integer after the colon is a pending allocation in GiB, not a
    // volume name.
    let (volume, mut size) = match volume_spec.parse::<u64>() {
        Ok(gib) => (None, DiskSize::from_gib(gib)),
        Err(_) => (Some(volume_spec.to_string()), DiskSize::default()),
    };

    let mut format = None;
    let mut discard = false;
    let mut ssd = false;
    let mut iothread = false;
    let mut speed = DiskSpeedLimits::default();

    for option in parts {
        let Some((key, value)) = option.split_once('=') else {
            warn!("ignoring malformed disk option '{}' in '{}'", option, raw);
            continue;
        };
        match key {
            "size" => size = DiskSize::parse(value)?,
            "discard" => discard = decode_flag(key, value, raw)?,
            "ssd" => ssd = decode_flag(key, value, raw)?,
            "iothread" => iothread = decode_flag(key, value, raw)?,
            "format" => format = Some(DiskFormat::parse(value)?),
            "mbps_rd" => speed.read = Some(decode_rate(key, value, raw)?),
            "mbps_wr" => speed.write = Some(decode_rate(key, value, raw)?),
            "mbps_rd_max" => speed.read_max = Some(decode_rate(key, value, raw)?),
            "mbps_wr_max" => speed.write_max = Some(decode_rate(key, value, raw)?),
            other => {
                warn!("ignoring unknown disk option '{}' in '{}'", other, raw);
            }
        }
    }

    Ok(Some(Disk {
        interface,
        position,
        storage: storage.to_string(),
        volume,
        format,
        size,
        discard,
        ssd,
        iothread,
        speed,
    }))
}

/// Encodes a disk to its configuration string.
///
/// Disks without a volume encode as an allocation request
/// (`storage:<GiB>`); attached disks carry their volume name and an
/// explicit `size` key.
pub fn encode_disk(disk: &Disk) -> String {
    let mut out = match &disk.volume {
        Some(volume) => {
            let mut s = format!("{}:{}", disk.storage, volume);
            s.push_str(&format!(",size={}", disk.size));
            s
        }
        None => format!(
            "{}:{}",
            disk.storage,
            disk.size.bytes() / (1024 * 1024 * 1024)
        ),
    };
    if let Some(format) = disk.format {
        out.push_str(&format!(",format={}", format.as_str()));
    }
    if disk.discard {
        out.push_str(",discard=on");
    }
    if disk.ssd {
        out.push_str(",ssd=on");
    }
    if disk.iothread {
        out.push_str(",iothread=1");
    }
    if let Some(rate) = disk.speed.read {
        out.push_str(&format!(",mbps_rd={}", rate));
    }
    if let Some(rate) = disk.speed.read_max {
        out.push_str(&format!(",mbps_rd_max={}", rate));
    }
    if let Some(rate) = disk.speed.write {
        out.push_str(&format!(",mbps_wr={}", rate));
    }
    if let Some(rate) = disk.speed.write_max {
        out.push_str(&format!(",mbps_wr_max={}", rate));
    }
    out
}

fn decode_flag(key: &str, value: &str, raw: &str) -> PveResult<bool> {
    match value {
        "1" | "on" => Ok(true),
        "0" | "off" => Ok(false),
        other => Err(ValidationError::Format(format!(
            "invalid value '{}' for disk option '{}' in '{}'",
            other, key, raw
        ))
        .into()),
    }
}

fn decode_rate(key: &str, value: &str, raw: &str) -> PveResult<u64> {
    value.parse().map_err(|_| {
        ValidationError::Format(format!(
            "invalid value '{}' for disk option '{}' in '{}'",
            value, key, raw
        ))
        .into()
    })
}
