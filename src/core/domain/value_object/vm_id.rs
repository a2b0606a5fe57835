use crate::core::domain::{
    error::{PveResult, ValidationError},
    value_object::base_value_object::ValueObject,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lowest identifier PVE accepts for a guest.
pub const VM_ID_MIN: u32 = 100;
/// Highest identifier PVE accepts for a guest.
pub const VM_ID_MAX: u32 = 1_000_000_000;

/// A validated QEMU guest identifier.
///
/// PVE rejects identifiers below 100 (reserved) and above 10^9.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VmId(u32);

impl VmId {
    /// Creates a new VmId instance with validation
    ///
    /// # Returns
    ///
    /// * `Ok(VmId)` if the identifier is within the accepted range
    /// * `Err(PveError)` otherwise
    pub fn new(id: u32) -> PveResult<Self> {
        <Self as ValueObject>::new(id)
    }

    pub fn new_unchecked(id: u32) -> Self {
        Self(id)
    }

    pub fn value(&self) -> u32 {
        self.0
    }
}

impl ValueObject for VmId {
    type Value = u32;

    fn validate(value: &u32) -> Result<(), ValidationError> {
        if !(VM_ID_MIN..=VM_ID_MAX).contains(value) {
            return Err(ValidationError::Field {
                field: "vmid".to_string(),
                message: format!(
                    "{} is outside the accepted range [{}, {}]",
                    value, VM_ID_MIN, VM_ID_MAX
                ),
            });
        }
        Ok(())
    }

    fn create(value: u32) -> Self {
        Self(value)
    }
}

impl fmt::Display for VmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
