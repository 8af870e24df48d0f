//! Binding validation for coded values.
//!
//! A value is checked against a [`ValueSet`] under a [`BindingStrength`].
//! Only `required` bindings can fail; every other strength is accepted as-is.

use serde_json::Value as JsonValue;
use thiserror::Error;

use super::{BindingStrength, ValueSet};

/// Terminology membership violation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BindingError {
    #[error("\"{code}\" is not in the \"{value_set}\" value set")]
    CodeNotInValueSet { code: String, value_set: String },

    #[error("\"{code}\" in system \"{system}\" is not in the \"{value_set}\" value set")]
    CodingNotInValueSet {
        code: String,
        system: String,
        value_set: String,
    },

    #[error("None of the codes in the \"coding\" array are in the \"{value_set}\" value set")]
    NoMatchingCoding { value_set: String },
}

/// The coded shapes a binding can apply to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindableKind {
    Code = 0,
    Coding = 1,
    CodeableConcept = 2,
}

type BindingCheck = fn(&JsonValue, &ValueSet, BindingStrength) -> Result<(), BindingError>;

/// Indexed by `BindableKind as usize`.
const BINDING_CHECKS: [BindingCheck; 3] = [
    check_code_value,
    validate_coding,
    validate_codeable_concept,
];

impl BindableKind {
    /// Run the membership check matching this kind.
    pub fn validate(
        self,
        value: &JsonValue,
        value_set: &ValueSet,
        strength: BindingStrength,
    ) -> Result<(), BindingError> {
        BINDING_CHECKS[self as usize](value, value_set, strength)
    }
}

pub fn validate_code(
    code: &str,
    value_set: &ValueSet,
    strength: BindingStrength,
) -> Result<(), BindingError> {
    if strength.is_enforced() && !value_set.contains(code, None) {
        return Err(BindingError::CodeNotInValueSet {
            code: code.to_string(),
            value_set: value_set.name().to_string(),
        });
    }
    Ok(())
}

fn check_code_value(
    value: &JsonValue,
    value_set: &ValueSet,
    strength: BindingStrength,
) -> Result<(), BindingError> {
    validate_code(value.as_str().unwrap_or_default(), value_set, strength)
}

/// Check a `Coding` object using both its `system` and `code`.
pub fn validate_coding(
    coding: &JsonValue,
    value_set: &ValueSet,
    strength: BindingStrength,
) -> Result<(), BindingError> {
    if !strength.is_enforced() {
        return Ok(());
    }

    let system = coding.get("system").and_then(JsonValue::as_str);
    let code = coding.get("code").and_then(JsonValue::as_str);

    let member = code.is_some_and(|code| value_set.contains(code, system));
    if member {
        Ok(())
    } else {
        Err(BindingError::CodingNotInValueSet {
            code: code.unwrap_or_default().to_string(),
            system: system.unwrap_or_default().to_string(),
            value_set: value_set.name().to_string(),
        })
    }
}

/// A `CodeableConcept` passes when at least one of its codings passes.
pub fn validate_codeable_concept(
    concept: &JsonValue,
    value_set: &ValueSet,
    strength: BindingStrength,
) -> Result<(), BindingError> {
    if !strength.is_enforced() {
        return Ok(());
    }

    let passing = concept
        .get("coding")
        .and_then(JsonValue::as_array)
        .is_some_and(|codings| {
            codings
                .iter()
                .any(|coding| validate_coding(coding, value_set, strength).is_ok())
        });

    if passing {
        Ok(())
    } else {
        Err(BindingError::NoMatchingCoding {
            value_set: value_set.name().to_string(),
        })
    }
}
