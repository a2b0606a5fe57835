use crate::core::domain::{
    error::{PveResult, ValidationError},
    value_object::base_value_object::ValueObject,
};
use std::fmt;

/// A cross-reference identifier in `{node}/{name}` form.
///
/// Network interfaces, storage objects, disks and guests are addressed this
/// way when imported; `/` is the only separator and must occur exactly once.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectId {
    node: String,
    name: String,
}

impl ObjectId {
    /// Parses a `{node}/{name}` identifier
    ///
    /// # Returns
    ///
    /// * `Ok(ObjectId)` when the input has exactly one separator and both
    ///   halves are non-empty
    /// * `Err(PveError)` otherwise
    pub fn parse(id: &str) -> PveResult<Self> {
        <Self as ValueObject>::new(id.to_string())
    }

    pub fn new_unchecked(node: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            name: name.into(),
        }
    }

    pub fn node(&self) -> &str {
        &self.node
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl ValueObject for ObjectId {
    type Value = String;

    fn validate(value: &String) -> Result<(), ValidationError> {
        let mut parts = value.split('/');
        let node = parts.next().unwrap_or_default();
        let name = parts.next().unwrap_or_default();
        if node.is_empty() || name.is_empty() || parts.next().is_some() {
            return Err(ValidationError::Format(format!(
                "invalid object id '{}': expected {{node}}/{{name}}",
                value
            )));
        }
        Ok(())
    }

    fn create(value: String) -> Self {
        let (node, name) = value.split_once('/').expect("validated before create");
        Self {
            node: node.to_string(),
            name: name.to_string(),
        }
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.node, self.name)
    }
}
