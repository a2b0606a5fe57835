use crate::core::domain::{
    error::{PveResult, ValidationError},
    value_object::base_value_object::ValueObject,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// The naming family of a node-level network interface.
///
/// Bridges and bonds share one flat namespace per node; the prefix decides
/// which family a name belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IfaceKind {
    Bridge,
    Bond,
}

impl IfaceKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            IfaceKind::Bridge => "vmbr",
            IfaceKind::Bond => "bond",
        }
    }
}

/// A validated Linux bridge name (`vmbr<n>`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BridgeName(String);

impl BridgeName {
    /// Creates a new BridgeName instance with validation
    pub fn new(name: impl Into<String>) -> PveResult<Self> {
        <Self as ValueObject>::new(name.into())
    }

    pub fn new_unchecked(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl ValueObject for BridgeName {
    type Value = String;

    fn validate(value: &String) -> Result<(), ValidationError> {
        validate_prefixed_name(value, IfaceKind::Bridge)
    }

    fn create(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for BridgeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A validated bond name (`bond<n>`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BondName(String);

impl BondName {
    /// Creates a new BondName instance with validation
    pub fn new(name: impl Into<String>) -> PveResult<Self> {
        <Self as ValueObject>::new(name.into())
    }

    pub fn new_unchecked(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl ValueObject for BondName {
    type Value = String;

    fn validate(value: &String) -> Result<(), ValidationError> {
        validate_prefixed_name(value, IfaceKind::Bond)
    }

    fn create(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for BondName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn validate_prefixed_name(value: &str, kind: IfaceKind) -> Result<(), ValidationError> {
    let prefix = kind.prefix();
    let suffix = value.strip_prefix(prefix).ok_or_else(|| {
        ValidationError::Format(format!(
            "invalid interface name '{}': expected {}<n>",
            value, prefix
        ))
    })?;
    if suffix.is_empty() || !suffix.chars().all(|c| c.is_ascii_digit()) {
        return Err(ValidationError::Format(format!(
            "invalid interface name '{}': expected {}<n>",
            value, prefix
        )));
    }
    Ok(())
}

/// Picks the next free interface name for a prefix family.
///
/// Returns `<prefix><n>` where `n` is the smallest non-negative integer
/// whose name is absent from `existing`; `<prefix>0` when the set is empty.
/// Names in `existing` that do not belong to the family are ignored.
pub fn allocate_iface_name(kind: IfaceKind, existing: &[String]) -> String {
    let prefix = kind.prefix();
    let taken: BTreeSet<u32> = existing
        .iter()
        .filter_map(|name| name.strip_prefix(prefix))
        .filter_map(|suffix| suffix.parse().ok())
        .collect();
    let mut candidate = 0u32;
    while taken.contains(&candidate) {
        candidate += 1;
    }
    format!("{}{}", prefix, candidate)
}
