use crate::core::domain::error::{PveResult, ValidationError};
use serde::{Deserialize, Serialize};
use std::fmt;

const KIB: u64 = 1024;
const MIB: u64 = KIB * 1024;
const GIB: u64 = MIB * 1024;
const TIB: u64 = GIB * 1024;

/// A disk size in bytes, parsed from and formatted to PVE's suffix notation.
///
/// PVE size strings use exact binary multiples: `10K` is 10240 bytes, `10G`
/// is 10 * 1024^3. A bare integer is a byte count.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct DiskSize(u64);

impl DiskSize {
    pub fn from_bytes(bytes: u64) -> Self {
        Self(bytes)
    }

    pub fn from_gib(gib: u64) -> Self {
        Self(gib * GIB)
    }

    pub fn bytes(&self) -> u64 {
        self.0
    }

    /// Parses a PVE size string (`10G`, `512M`, `10240`, ...).
    ///
    /// # Returns
    ///
    /// * `Ok(DiskSize)` for a well-formed size
    /// * `Err(PveError)` otherwise
    pub fn parse(value: &str) -> PveResult<Self> {
        let value = value.trim();
        if value.is_empty() {
            return Err(ValidationError::Format("empty disk size string".to_string()).into());
        }
        let (digits, multiplier) = match value.as_bytes()[value.len() - 1] {
            b'K' | b'k' => (&value[..value.len() - 1], KIB),
            b'M' | b'm' => (&value[..value.len() - 1], MIB),
            b'G' | b'g' => (&value[..value.len() - 1], GIB),
            b'T' | b't' => (&value[..value.len() - 1], TIB),
            _ => (value, 1),
        };
        let count: u64 = digits.parse().map_err(|_| {
            ValidationError::Format(format!("invalid disk size string: '{}'", value))
        })?;
        Ok(Self(count * multiplier))
    }
}

impl fmt::Display for DiskSize {
    /// Formats with the largest suffix that divides the size exactly, the
    /// same canonical form PVE itself emits.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes = self.0;
        if bytes > 0 && bytes % TIB == 0 {
            write!(f, "{}T", bytes / TIB)
        } else if bytes > 0 && bytes % GIB == 0 {
            write!(f, "{}G", bytes / GIB)
        } else if bytes > 0 && bytes % MIB == 0 {
            write!(f, "{}M", bytes / MIB)
        } else if bytes > 0 && bytes % KIB == 0 {
            write!(f, "{}K", bytes / KIB)
        } else {
            write!(f, "{}", bytes)
        }
    }
}
