//! Codec for the QEMU guest agent string.
//!
//! The wire form leads with a bare `0|1` enabled flag, optionally followed
//! by `fstrim_cloned_disks=1` and `type=<value>`. An absent string means
//! the agent is unset on the guest, which is not the same as disabled.

use crate::core::domain::{
    error::{PveResult, ValidationError},
    model::vm::AgentConfig,
};
use log::warn;

/// Decodes the agent configuration string.
pub fn decode_agent(raw: &str) -> PveResult<AgentConfig> {
    let mut parts = raw.split(',');
    let head = parts.next().unwrap_or_default().trim();

    // Some cluster versions spell the leading flag as `enabled=1`.
    let enabled = match head {
        "1" => true,
        "0" => false,
        "enabled=1" => true,
        "enabled=0" => false,
        other => {
            return Err(ValidationError::Format(format!(
                "invalid agent string '{}': expected a leading 0|1, got '{}'",
                raw, other
            ))
            .into());
        }
    };

    let mut fstrim_cloned_disks = false;
    let mut agent_type = None;
    for option in parts {
        let Some((key, value)) = option.split_once('=') else {
            warn!("ignoring malformed agent option '{}' in '{}'", option, raw);
            continue;
        };
        match key {
            "fstrim_cloned_disks" => fstrim_cloned_disks = value == "1",
            "type" => agent_type = Some(value.to_string()),
            other => {
                warn!("ignoring unknown agent option '{}' in '{}'", other, raw);
            }
        }
    }

    Ok(AgentConfig {
        enabled,
        fstrim_cloned_disks,
        agent_type,
    })
}

/// Encodes an agent configuration to its wire string.
pub fn encode_agent(agent: &AgentConfig) -> String {
    let mut out = if agent.enabled { "1" } else { "0" }.to_string();
    if agent.fstrim_cloned_disks {
        out.push_str(",fstrim_cloned_disks=1");
    }
    if let Some(agent_type) = &agent.agent_type {
        out.push_str(&format!(",type={}", agent_type));
    }
    out
}
