use crate::core::domain::{
    error::{PveResult, ValidationError},
    value_object::base_value_object::ValueObject,
};
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A validated unicast MAC address in `xx:xx:xx:xx:xx:xx` form.
///
/// PVE refuses multicast MACs on NICs, so the multicast bit of the first
/// octet must be clear (the second hex digit is even). Addresses generated
/// by [`MacAddress::generate`] additionally set the locally-administered
/// bit so they can never collide with a vendor-assigned address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    /// Parses and validates a textual MAC address
    ///
    /// # Returns
    ///
    /// * `Ok(MacAddress)` for a well-formed unicast address
    /// * `Err(PveError)` otherwise
    pub fn new(mac: &str) -> PveResult<Self> {
        <Self as ValueObject>::new(mac.to_string())
    }

    pub fn new_unchecked(mac: &str) -> Self {
        Self(parse_octets(mac).expect("new_unchecked requires a parsable MAC"))
    }

    /// Generates a random locally-administered unicast address.
    ///
    /// The randomness source must be cryptographically strong; tests inject
    /// a deterministic one through the same bound.
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let mut octets = [0u8; 6];
        rng.fill_bytes(&mut octets);
        // clear multicast, set locally-administered
        octets[0] = (octets[0] & 0xFE) | 0x02;
        Self(octets)
    }

    pub fn octets(&self) -> [u8; 6] {
        self.0
    }
}

fn parse_octets(value: &str) -> Option<[u8; 6]> {
    let parts: Vec<&str> = value.split(':').collect();
    if parts.len() != 6 {
        return None;
    }
    let mut octets = [0u8; 6];
    for (i, part) in parts.iter().enumerate() {
        if part.len() != 2 {
            return None;
        }
        octets[i] = u8::from_str_radix(part, 16).ok()?;
    }
    Some(octets)
}

impl ValueObject for MacAddress {
    type Value = String;

    fn validate(value: &String) -> Result<(), ValidationError> {
        let octets = parse_octets(value).ok_or_else(|| {
            ValidationError::Format(format!(
                "invalid MAC address '{}': expected xx:xx:xx:xx:xx:xx",
                value
            ))
        })?;
        if octets[0] & 0x01 != 0 {
            return Err(ValidationError::ConstraintViolation(format!(
                "MAC address '{}' is multicast; guest NICs require unicast",
                value
            )));
        }
        Ok(())
    }

    fn create(value: String) -> Self {
        Self(parse_octets(&value).expect("validated before create"))
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let o = &self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            o[0], o[1], o[2], o[3], o[4], o[5]
        )
    }
}

impl FromStr for MacAddress {
    type Err = crate::core::domain::error::PveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for MacAddress {
    type Error = crate::core::domain::error::PveError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<MacAddress> for String {
    fn from(mac: MacAddress) -> Self {
        mac.to_string()
    }
}
