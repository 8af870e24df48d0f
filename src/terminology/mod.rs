//! Terminology support for binding validation.
//!
//! This module holds the in-memory value sets the certification profiles bind
//! to, and the binding validator that checks `code`, `Coding` and
//! `CodeableConcept` values against them.
//!
//! # Architecture
//!
//! - [`ValueSet`] is immutable after construction and shared through `Arc`
//! - [`BindingStrength`] mirrors the FHIR binding strengths
//! - [`binding`] holds the three membership checks and [`BindingError`]
//! - [`value_sets`] is the catalog of sets used by the bundled profiles
//!
//! Only `required` bindings are enforced. The other strengths are accepted
//! unconditionally.

pub mod binding;
pub mod value_sets;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

pub use binding::{BindableKind, BindingError, validate_code, validate_codeable_concept, validate_coding};

/// FHIR binding strength levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BindingStrength {
    /// Code MUST be from the value set
    Required,
    /// Code SHOULD be from the value set, but others allowed with text
    Extensible,
    /// Code SHOULD be from the value set for interoperability
    Preferred,
    /// Value set is just an example
    Example,
}

impl BindingStrength {
    /// Parse binding strength from string
    pub fn parse_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "required" => Some(BindingStrength::Required),
            "extensible" => Some(BindingStrength::Extensible),
            "preferred" => Some(BindingStrength::Preferred),
            "example" => Some(BindingStrength::Example),
            _ => None,
        }
    }

    /// Whether a membership miss at this strength is reported.
    pub fn is_enforced(&self) -> bool {
        // TODO: report extensible/preferred misses as warnings once scenario
        // results can carry per-error severities.
        matches!(self, BindingStrength::Required)
    }
}

/// A named set of allowed codes, grouped by coding system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueSet {
    name: String,
    uri: String,
    codings: BTreeMap<String, BTreeSet<String>>,
}

impl ValueSet {
    pub fn new(name: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            uri: uri.into(),
            codings: BTreeMap::new(),
        }
    }

    /// Add codes under `system`. Calling it with an empty iterator still
    /// registers the system.
    pub fn with_codes<I, S>(mut self, system: impl Into<String>, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.codings
            .entry(system.into())
            .or_default()
            .extend(codes.into_iter().map(Into::into));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn systems(&self) -> impl Iterator<Item = &str> {
        self.codings.keys().map(String::as_str)
    }

    /// Membership test. With a system the code must be in that system's
    /// set; without one (or with an empty one) any system may hold it.
    pub fn contains(&self, code: &str, system: Option<&str>) -> bool {
        match system.filter(|s| !s.is_empty()) {
            Some(system) => self
                .codings
                .get(system)
                .is_some_and(|codes| codes.contains(code)),
            None => self.codings.values().any(|codes| codes.contains(code)),
        }
    }
}
