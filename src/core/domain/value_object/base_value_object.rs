use crate::core::domain::error::{PveError, PveResult, ValidationError};
use std::backtrace::Backtrace;

/// A trait representing a domain value object with built-in validation.
///
/// Every identifier or quantity that crosses the API boundary is wrapped in
/// a type implementing this trait, so an invalid value cannot exist past
/// construction. `new` validates, `new_unchecked` is for input that the
/// cluster itself produced (and for tests).
pub trait ValueObject: Sized {
    /// The underlying type of the value
    type Value;

    /// Validates the value according to domain rules
    ///
    /// # Returns
    ///
    /// * `Ok(())` if validation passes
    /// * `Err(ValidationError)` if validation fails
    fn validate(value: &Self::Value) -> Result<(), ValidationError>;

    /// Creates a new instance without validating. Reserved for values read
    /// back from the cluster and for test fixtures.
    fn create(value: Self::Value) -> Self;

    /// Creates a new validated instance
    ///
    /// # Returns
    ///
    /// * `Ok(Self)` if creation and validation succeed
    /// * `Err(PveError)` if validation fails
    fn new(value: Self::Value) -> PveResult<Self> {
        Self::validate(&value).map_err(|e| PveError::Validation {
            source: e,
            backtrace: Backtrace::capture(),
        })?;
        Ok(Self::create(value))
    }
}
