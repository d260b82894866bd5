pub mod validation;

pub use validation::{validate_changes, validate_object, ValidationFailure};
