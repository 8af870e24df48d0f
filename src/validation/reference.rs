//! Reference resolution for the `reference` semantic type.
//!
//! The schema validator never performs I/O. It asks an injected
//! [`ReferenceResolver`] whether a reference string points at something that
//! exists. Resource tests resolve references up front and hand the validator
//! a [`KnownReferences`] set built from the results.

use serde_json::Value as JsonValue;
use std::collections::{HashMap, HashSet};

/// Confirms that a reference target exists.
pub trait ReferenceResolver: Send + Sync {
    fn exists(&self, reference: &str) -> bool;
}

impl<F> ReferenceResolver for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn exists(&self, reference: &str) -> bool {
        self(reference)
    }
}

/// Accepts every reference.
#[derive(Debug, Default, Clone)]
pub struct NoOpReferenceResolver;

impl NoOpReferenceResolver {
    pub fn new() -> Self {
        Self
    }
}

impl ReferenceResolver for NoOpReferenceResolver {
    fn exists(&self, _reference: &str) -> bool {
        true
    }
}

/// A fixed set of references already known to resolve.
#[derive(Debug, Default, Clone)]
pub struct KnownReferences {
    references: HashSet<String>,
}

impl KnownReferences {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, reference: impl Into<String>) {
        self.references.insert(reference.into());
    }

    pub fn len(&self) -> usize {
        self.references.len()
    }

    pub fn is_empty(&self) -> bool {
        self.references.is_empty()
    }
}

impl FromIterator<String> for KnownReferences {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self {
            references: iter.into_iter().collect(),
        }
    }
}

impl ReferenceResolver for KnownReferences {
    fn exists(&self, reference: &str) -> bool {
        self.references.contains(reference)
    }
}

/// Map of `contained` resource ids to their resource type.
#[derive(Debug, Clone, Default)]
pub struct ContainedContext {
    contained: HashMap<String, String>,
}

impl ContainedContext {
    pub fn from_resource(resource: &JsonValue) -> Self {
        let mut contained = HashMap::new();

        if let Some(items) = resource.get("contained").and_then(|c| c.as_array()) {
            for item in items {
                if let Some(id) = item.get("id").and_then(|i| i.as_str()) {
                    let resource_type = item
                        .get("resourceType")
                        .and_then(|t| t.as_str())
                        .unwrap_or("")
                        .to_string();
                    contained.insert(id.to_string(), resource_type);
                }
            }
        }

        Self { contained }
    }

    /// Check a contained id (without the `#` prefix).
    pub fn contains(&self, id: &str) -> bool {
        self.contained.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.contained.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contained.is_empty()
    }
}

/// Entries of a `Bundle`, addressable by `fullUrl` or `Type/id`.
#[derive(Debug, Clone, Default)]
pub struct BundleContext {
    keys: HashSet<String>,
}

impl BundleContext {
    pub fn from_bundle(bundle: &JsonValue) -> Self {
        let mut keys = HashSet::new();

        if bundle.get("resourceType").and_then(|t| t.as_str()) != Some("Bundle") {
            return Self { keys };
        }

        for entry in bundle
            .get("entry")
            .and_then(|e| e.as_array())
            .into_iter()
            .flatten()
        {
            if let Some(full_url) = entry.get("fullUrl").and_then(|u| u.as_str()) {
                keys.insert(full_url.to_string());
            }
            if let Some(resource) = entry.get("resource")
                && let (Some(resource_type), Some(id)) = (
                    resource.get("resourceType").and_then(|t| t.as_str()),
                    resource.get("id").and_then(|i| i.as_str()),
                )
            {
                keys.insert(format!("{resource_type}/{id}"));
            }
        }

        Self { keys }
    }

    pub fn contains(&self, reference: &str) -> bool {
        self.keys.contains(reference)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Collect every `reference` string found anywhere in `value`, in document
/// order and without duplicates.
pub fn collect_references(value: &JsonValue) -> Vec<String> {
    fn walk(value: &JsonValue, seen: &mut HashSet<String>, out: &mut Vec<String>) {
        match value {
            JsonValue::Object(map) => {
                for (key, child) in map {
                    if key == "reference"
                        && let Some(reference) = child.as_str()
                    {
                        if !reference.is_empty() && seen.insert(reference.to_string()) {
                            out.push(reference.to_string());
                        }
                        continue;
                    }
                    walk(child, seen, out);
                }
            }
            JsonValue::Array(items) => {
                for item in items {
                    walk(item, seen, out);
                }
            }
            _ => {}
        }
    }

    let mut seen = HashSet::new();
    let mut out = Vec::new();
    walk(value, &mut seen, &mut out);
    out
}
